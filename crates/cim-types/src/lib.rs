//! Value model shared by every crate of the CIM class repository.
//!
//! Classes and instances in the repository are built from a small set of
//! primitives: typed values, qualifiers with propagation flavors, and object
//! paths that identify instances by their key properties. Higher layers
//! (`cim-codec`, `cim-registry`, `cim-instance`) only ever exchange these
//! types across their APIs.
//!
//! # Key Types
//!
//! - [`CimType`] / [`DataType`]: scalar kind plus array flag
//! - [`CimValue`]: a typed scalar or array value
//! - [`Qualifier`] / [`QualifierFlavor`]: named metadata attached to classes and members
//! - [`ObjectPath`]: namespace, class name, and ordered key bindings
//! - [`ErrorKind`]: the error kinds reported at the repository boundary

pub mod error;
pub mod path;
pub mod qualifier;
pub mod types;
pub mod value;

pub use error::{ErrorKind, TypeError};
pub use path::{KeyBinding, ObjectPath};
pub use qualifier::{Qualifier, QualifierFlavor};
pub use types::{CimType, DataType};
pub use value::{CimValue, ValueState};
