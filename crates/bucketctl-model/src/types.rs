//! Closed enumerations used across the bucket configuration model.
//!
//! Each enum serializes in its wire spelling and offers `as_str`,
//! [`Display`](std::fmt::Display) and [`FromStr`](std::str::FromStr).

use crate::error::ModelError;

/// Declares a closed string enum with its wire spelling.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Returns the wire spelling of this variant.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(ModelError::UnknownVariant {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Canned access control list applied to a bucket.
    CannedAcl, "canned ACL" {
        /// Owner gets full control, nobody else has access.
        Private => "private",
        /// Anyone may read.
        PublicRead => "public-read",
        /// Anyone may read and write.
        PublicReadWrite => "public-read-write",
        /// EC2 may read AMI bundles.
        AwsExecRead => "aws-exec-read",
        /// Authenticated principals may read.
        AuthenticatedRead => "authenticated-read",
        /// The bucket owner may read.
        BucketOwnerRead => "bucket-owner-read",
        /// The bucket owner has full control.
        BucketOwnerFullControl => "bucket-owner-full-control",
        /// The log delivery group may write.
        LogDeliveryWrite => "log-delivery-write",
    }
}

impl Default for CannedAcl {
    fn default() -> Self {
        Self::Private
    }
}

wire_enum! {
    /// Observed bucket versioning mode.
    VersioningStatus, "versioning status" {
        /// Versioning has never been configured.
        Unset => "Unset",
        /// Versioning is enabled.
        Enabled => "Enabled",
        /// Versioning was enabled and is now suspended.
        Suspended => "Suspended",
    }
}

impl Default for VersioningStatus {
    fn default() -> Self {
        Self::Unset
    }
}

wire_enum! {
    /// Transfer acceleration status.
    AccelerateStatus, "acceleration status" {
        /// Acceleration is enabled.
        Enabled => "Enabled",
        /// Acceleration is suspended.
        Suspended => "Suspended",
    }
}

wire_enum! {
    /// Who pays for requests and data transfer.
    Payer, "request payer" {
        /// The bucket owner pays.
        BucketOwner => "BucketOwner",
        /// The requester pays.
        Requester => "Requester",
    }
}

impl Default for Payer {
    fn default() -> Self {
        Self::BucketOwner
    }
}

wire_enum! {
    /// Server-side encryption algorithm.
    SseAlgorithm, "SSE algorithm" {
        /// S3-managed keys.
        Aes256 => "AES256",
        /// KMS-managed keys.
        AwsKms => "aws:kms",
    }
}

wire_enum! {
    /// A two-state switch used by replication rules and delete-marker replication.
    RuleStatus, "rule status" {
        /// The rule is active.
        Enabled => "Enabled",
        /// The rule is inactive.
        Disabled => "Disabled",
    }
}

impl Default for RuleStatus {
    fn default() -> Self {
        Self::Disabled
    }
}

wire_enum! {
    /// Object storage class.
    StorageClass, "storage class" {
        /// Standard storage.
        Standard => "STANDARD",
        /// Reduced redundancy.
        ReducedRedundancy => "REDUCED_REDUNDANCY",
        /// Standard infrequent access.
        StandardIa => "STANDARD_IA",
        /// One-zone infrequent access.
        OnezoneIa => "ONEZONE_IA",
        /// Intelligent tiering.
        IntelligentTiering => "INTELLIGENT_TIERING",
        /// Glacier flexible retrieval.
        Glacier => "GLACIER",
        /// Glacier instant retrieval.
        GlacierIr => "GLACIER_IR",
        /// Glacier deep archive.
        DeepArchive => "DEEP_ARCHIVE",
    }
}

wire_enum! {
    /// Redirect protocol for website hosting.
    Protocol, "protocol" {
        /// Plain HTTP.
        Http => "http",
        /// HTTPS.
        Https => "https",
    }
}

wire_enum! {
    /// Replica ownership override for cross-account replication.
    OwnerOverride, "owner override" {
        /// Replicas are owned by the destination bucket owner.
        Destination => "Destination",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_wire_spelling() {
        assert_eq!("aws:kms".parse::<SseAlgorithm>(), Ok(SseAlgorithm::AwsKms));
        assert_eq!("STANDARD_IA".parse::<StorageClass>(), Ok(StorageClass::StandardIa));
        assert_eq!(
            "log-delivery-write".parse::<CannedAcl>(),
            Ok(CannedAcl::LogDeliveryWrite)
        );
    }

    #[test]
    fn test_should_reject_unknown_variant() {
        let err = "sometimes".parse::<RuleStatus>().unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownVariant {
                kind: "rule status",
                value: "sometimes".to_owned(),
            }
        );
    }

    #[test]
    fn test_should_display_wire_spelling() {
        assert_eq!(Payer::Requester.to_string(), "Requester");
        assert_eq!(Protocol::Https.to_string(), "https");
    }

    #[test]
    fn test_should_use_documented_defaults() {
        assert_eq!(CannedAcl::default(), CannedAcl::Private);
        assert_eq!(VersioningStatus::default(), VersioningStatus::Unset);
        assert_eq!(Payer::default(), Payer::BucketOwner);
        assert_eq!(RuleStatus::default(), RuleStatus::Disabled);
    }

    #[test]
    fn test_should_serialize_in_wire_spelling() {
        let json = serde_json::to_string(&SseAlgorithm::AwsKms).unwrap();
        assert_eq!(json, "\"aws:kms\"");
        let back: StorageClass = serde_json::from_str("\"GLACIER\"").unwrap();
        assert_eq!(back, StorageClass::Glacier);
    }
}
