//! Convergence integration tests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bucketctl_engine::api::operation;
    use bucketctl_engine::{BucketApi, ReconcileState, SubResource};
    use bucketctl_model::{
        AccelerateStatus, CannedAcl, DesiredConfiguration, EncryptionRule, LifecycleExpiration,
        LifecycleRule, LoggingConfig, Payer, SseAlgorithm, StorageClass, Transition,
        VersioningStatus, WebsiteConfiguration,
    };

    use crate::{cors_rule, desired_from_json, harness, test_bucket_name};

    fn lifecycle(prefix: &str, days: i32) -> LifecycleRule {
        LifecycleRule {
            prefix: Some(prefix.to_owned()),
            enabled: true,
            expiration: Some(LifecycleExpiration {
                days: Some(days),
                ..LifecycleExpiration::default()
            }),
            transitions: vec![Transition {
                days: Some(30),
                date: None,
                storage_class: StorageClass::StandardIa,
            }],
            ..LifecycleRule::default()
        }
    }

    fn full_configuration(name: &str) -> DesiredConfiguration {
        DesiredConfiguration {
            acl: CannedAcl::PublicRead,
            versioning_enabled: true,
            acceleration_status: Some(AccelerateStatus::Enabled),
            request_payer: Some(Payer::Requester),
            policy: Some(r#"{"Version":"2012-10-17","Statement":[]}"#.to_owned()),
            logging: Some(LoggingConfig {
                target_bucket: "log-bucket".into(),
                target_prefix: Some("log/".to_owned()),
            }),
            cors_rules: vec![
                cors_rule(&["PUT", "POST"], &["https://www.example.com"]),
                cors_rule(&["GET"], &["*"]),
            ],
            lifecycle_rules: vec![lifecycle("logs/", 90), lifecycle("tmp/", 7)],
            encryption_rules: vec![EncryptionRule {
                sse_algorithm: SseAlgorithm::Aes256,
                kms_master_key_id: None,
            }],
            website: Some(WebsiteConfiguration {
                index_document: Some("index.html".to_owned()),
                error_document: Some("error.html".to_owned()),
                ..WebsiteConfiguration::default()
            }),
            tags: BTreeMap::from([("TestName".to_owned(), "converge".to_owned())]),
            ..DesiredConfiguration::named(name)
        }
    }

    #[tokio::test]
    async fn test_should_converge_every_sub_resource() {
        let (_api, reconciler) = harness();
        let name = test_bucket_name("full");

        let outcome = reconciler.ensure(&full_configuration(&name)).await.unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.state, ReconcileState::Stable);
        assert_eq!(
            outcome.applied,
            vec![
                SubResource::Versioning,
                SubResource::Logging,
                SubResource::Lifecycle,
                SubResource::Cors,
                SubResource::Encryption,
                SubResource::Website,
                SubResource::Accelerate,
                SubResource::RequestPayment,
                SubResource::Policy,
                SubResource::Tags,
            ]
        );
        assert_eq!(
            outcome.outputs.website_endpoint.as_deref(),
            Some(format!("{name}.s3-website-us-west-2.amazonaws.com").as_str())
        );
        assert_eq!(outcome.outputs.hosted_zone_id.as_deref(), Some("Z3BJ6K6RIION7M"));

        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.acl, Some(CannedAcl::PublicRead));
        assert_eq!(observed.versioning, VersioningStatus::Enabled);
        assert_eq!(observed.request_payer, Payer::Requester);
        assert_eq!(observed.cors_rules.len(), 2);
        assert_eq!(observed.lifecycle_rules.len(), 2);
        assert!(observed.lifecycle_rules.iter().all(|r| r.id.is_some()));
    }

    #[tokio::test]
    async fn test_should_make_no_mutations_when_already_converged() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("idem");
        let desired = full_configuration(&name);
        reconciler.ensure(&desired).await.unwrap();
        api.clear_journal();

        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert!(!outcome.created);
        assert!(outcome.plan.is_empty());
        assert!(api.mutations().is_empty(), "unexpected: {:?}", api.mutations());
        assert_eq!(
            outcome.transitions,
            vec![ReconcileState::Stable, ReconcileState::Converging, ReconcileState::Stable]
        );
    }

    #[tokio::test]
    async fn test_should_ignore_reordered_collections() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("order");
        let desired = full_configuration(&name);
        reconciler.ensure(&desired).await.unwrap();
        api.clear_journal();

        let mut reordered = desired.clone();
        reordered.cors_rules.reverse();
        reordered.lifecycle_rules.reverse();
        reordered.cors_rules[1].allowed_methods.reverse();

        let outcome = reconciler.ensure(&reordered).await.unwrap();
        assert!(outcome.plan.is_empty());
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_should_correct_remote_drift() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("drift");
        let desired = full_configuration(&name);
        reconciler.ensure(&desired).await.unwrap();

        api.put_cors(&name, &[cors_rule(&["DELETE"], &["https://evil.example.com"])])
            .await
            .unwrap();
        api.delete_tags(&name).await.unwrap();
        api.clear_journal();

        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert_eq!(outcome.applied, vec![SubResource::Cors, SubResource::Tags]);
        let cors = outcome
            .plan
            .block_diffs
            .iter()
            .find(|d| d.sub_resource == SubResource::Cors)
            .unwrap();
        assert_eq!((cors.created, cors.deleted, cors.unchanged), (2, 1, 0));

        api.clear_journal();
        reconciler.ensure(&desired).await.unwrap();
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_should_remove_sub_resources_no_longer_desired() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("shrink");
        reconciler.ensure(&full_configuration(&name)).await.unwrap();

        let minimal = DesiredConfiguration {
            acl: CannedAcl::PublicRead,
            versioning_enabled: true,
            ..DesiredConfiguration::named(&name)
        };
        let outcome = reconciler.ensure(&minimal).await.unwrap();
        assert_eq!(
            outcome.applied,
            vec![
                SubResource::Logging,
                SubResource::Lifecycle,
                SubResource::Cors,
                SubResource::Encryption,
                SubResource::Website,
                SubResource::Tags,
            ]
        );
        assert!(outcome.outputs.website_endpoint.is_none());

        let observed = reconciler.read(&name).await.unwrap();
        assert!(observed.cors_rules.is_empty());
        assert!(observed.website.is_none());
        // Unmanaged scalars and an unset policy stay as they were.
        assert_eq!(observed.acceleration_status, Some(AccelerateStatus::Enabled));
        assert_eq!(observed.request_payer, Payer::Requester);
        assert!(observed.policy.is_some());
        assert_eq!(api.calls_for(operation::DELETE_POLICY), 0);
    }

    #[tokio::test]
    async fn test_should_delete_policy_for_empty_document() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("policy");
        reconciler.ensure(&full_configuration(&name)).await.unwrap();

        let mut desired = full_configuration(&name);
        desired.policy = Some(String::new());
        let outcome = reconciler.ensure(&desired).await.unwrap();

        assert_eq!(outcome.applied, vec![SubResource::Policy]);
        assert_eq!(api.calls_for(operation::DELETE_POLICY), 1);
        assert_eq!(api.calls_for(operation::PUT_POLICY), 1);
        assert!(reconciler.read(&name).await.unwrap().policy.is_none());
    }

    #[tokio::test]
    async fn test_should_converge_configuration_loaded_from_json() {
        let (_api, reconciler) = harness();
        let name = test_bucket_name("json");
        let desired = desired_from_json(&format!(
            r#"{{
                "name": "{name}",
                "versioningEnabled": true,
                "corsRules": [{{
                    "allowedMethods": ["GET"],
                    "allowedOrigins": ["*"],
                    "maxAgeSeconds": 3000
                }}],
                "encryptionRules": [{{
                    "sseAlgorithm": "aws:kms",
                    "kmsMasterKeyId": "arn:aws:kms:us-west-2:123456789012:key/k"
                }}],
                "tags": {{"env": "test"}}
            }}"#
        ))
        .unwrap();

        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert_eq!(
            outcome.applied,
            vec![
                SubResource::Versioning,
                SubResource::Cors,
                SubResource::Encryption,
                SubResource::Tags
            ]
        );
        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.encryption_rules[0].sse_algorithm, SseAlgorithm::AwsKms);
    }

    #[tokio::test]
    async fn test_should_plan_offline_without_remote_calls() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("plan");
        let plan = reconciler.plan(&full_configuration(&name), None).unwrap();

        assert_eq!(plan.bucket, name);
        assert_eq!(plan.changes.len(), 10);
        assert!(api.calls().is_empty());
    }
}
