//! Instance representation for the CIM class repository.
//!
//! Instances are built per request: seeded from their class, populated
//! property by property, optionally restricted to a requested property list,
//! and identified by an [`cim_types::ObjectPath`] derived from their key
//! properties.
//!
//! # Key Types
//!
//! - [`Instance`]: shared handle to a mutable instance
//! - [`PropertyFilter`]: requested properties plus the identifying keys
//! - [`ClassSource`]: schema lookup used when seeding and deriving paths
//! - [`KeyListCache`]: bounded cache of class key lists
//! - [`RequestArena`]: releases request-scoped instances at teardown

pub mod arena;
pub mod error;
pub mod instance;
pub mod source;

pub use arena::RequestArena;
pub use error::{InstanceError, InstanceResult};
pub use instance::{Instance, PropertyData, PropertyFilter};
pub use source::{ClassSource, KeyListCache, DEFAULT_KEY_CACHE_LIMIT};
