//! StackFlow Cloud Gateway
//!
//! This crate defines the boundary between StackFlow's lifecycle engine and
//! a concrete cloud provider. Providers expose four operations per resource
//! type (describe, create, delete, detach) and report failures through a
//! structured [`ErrorKind`] so that the engine never inspects error text.
//!
//! # Providers
//!
//! - **memory**: in-process simulated provider with fault injection
//!   ([`MemoryGateway`])
//! - **aws**: EC2 / S3 / IAM (in `stackflow-cloud-aws`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  StackFlow CLI                  │
//! │             (stack plan / stack apply)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 stackflow-core                  │
//! │   graph ─▶ resolver ─▶ executor ─▶ report       │
//! └─────────────────┬───────────────────────────────┘
//!                   │  trait CloudGateway
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-cloud                  │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ ErrorKind    │  │ RetryConfig              │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │    memory     │ │      aws      │
//! │    gateway    │ │    gateway    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod gateway;
pub mod memory;

// Re-exports
pub use error::{CloudError, ErrorKind, GatewayError, GatewayResult, Result};
pub use gateway::{
    CloudGateway, DiscoveredResource, Filter, Lifecycle, ResourceSpec, RetryConfig,
};
pub use memory::{Call, MemoryGateway, MemoryResource, Operation};
