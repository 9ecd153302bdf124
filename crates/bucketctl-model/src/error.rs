//! Model-level error types.

/// Errors raised while converting wire strings or references into model types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A string did not name any variant of a closed enum.
    #[error("unknown {kind} value: {value:?}")]
    UnknownVariant {
        /// The enum being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A resource reference was not of the form `resource.attribute`.
    #[error("malformed resource reference: {0:?}")]
    MalformedReference(String),
}
