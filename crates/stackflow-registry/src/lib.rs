//! Resource Descriptor Registry
//!
//! The registry is the static catalog of resource types and their
//! relationships, read from the topology file (`stack.kdl`) together with
//! the deployments (scopes) that instantiate those types.
//!
//! # Relationships
//!
//! - **depends-on**: the type needs an instance of another type to exist
//!   first (a subnet needs its network)
//! - **blocked-by**: the type cannot be deleted while instances of another
//!   type are attached to it (a security group held by a network interface)
//! - **attachment**: instances of the type are never created or deleted,
//!   only detached from their holders

pub mod discovery;
pub mod error;
pub mod model;
pub mod parser;

pub use discovery::*;
pub use error::*;
pub use model::*;
pub use parser::*;
