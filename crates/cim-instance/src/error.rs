use cim_codec::CodecError;
use cim_registry::RegistryError;
use cim_types::{ErrorKind, TypeError};

/// Errors from instance operations.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// The instance was released; every handle sharing it is dead.
    #[error("instance handle has been released")]
    InvalidHandle,

    #[error("no such property: {0}")]
    NoSuchProperty(String),

    #[error(transparent)]
    Class(#[from] RegistryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl InstanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHandle => ErrorKind::InvalidHandle,
            Self::NoSuchProperty(_) => ErrorKind::NoSuchProperty,
            Self::Class(e) => e.kind(),
            Self::Codec(e) => e.kind(),
            Self::Type(_) => ErrorKind::FormatError,
        }
    }
}

/// Result alias for instance operations.
pub type InstanceResult<T> = Result<T, InstanceError>;
