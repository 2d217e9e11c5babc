use std::path::PathBuf;

use cim_codec::CodecError;
use cim_types::ErrorKind;

/// Errors from class registry and namespace directory operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("class not found: {0}")]
    NotFound(String),

    #[error("class already exists: {0}")]
    AlreadyExists(String),

    #[error("superclass {superclass} of class {class} does not exist")]
    InvalidSuperclass { class: String, superclass: String },

    #[error("class {0} has subclasses")]
    ClassHasChildren(String),

    /// A record in a class store could not be used.
    #[error("corrupt class store {} at offset {position}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        position: u64,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Format(#[from] CodecError),

    /// Compressed stores cannot be modified in place.
    #[error("class store {} is read-only", .0.display())]
    ReadOnly(PathBuf),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Startup found no namespace with a usable class store.
    #[error("no loadable namespaces under {}", .0.display())]
    NoNamespaces(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidSuperclass { .. } => ErrorKind::InvalidSuperclass,
            Self::ClassHasChildren(_) => ErrorKind::ClassHasChildren,
            Self::Corrupt { .. } | Self::Format(_) | Self::Config(_) => ErrorKind::FormatError,
            Self::ReadOnly(_) => ErrorKind::ReadOnly,
            Self::InvalidNamespace(_) | Self::NoNamespaces(_) => ErrorKind::InvalidNamespace,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
