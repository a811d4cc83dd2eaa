//! Attache tool surface
//!
//! The `Tool` trait, the name-keyed registry, and the adapter that plugs a
//! registry into the runtime engine's catalog seam.

pub mod adapter;
pub mod error;
pub mod registry;
pub mod tools;

pub use adapter::RegistryCatalog;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use tools::{EchoTool, Tool};
