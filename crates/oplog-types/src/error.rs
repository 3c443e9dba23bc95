/// Errors produced while constructing foundation types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// A keypath string could not be parsed.
    #[error("invalid keypath `{path}`: {reason}")]
    InvalidKeyPath { path: String, reason: String },

    /// An object id string was empty.
    #[error("object id cannot be empty")]
    EmptyObjectId,
}
