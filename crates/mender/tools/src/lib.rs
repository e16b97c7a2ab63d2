//! Mender tool registry
//!
//! Catalog of schema-described infrastructure operations grouped by
//! resource family. Plans reference tools by name; the [`ToolRegistry`]
//! validates arguments and dispatches to the family's [`ToolAdapter`],
//! which hands the operation to a [`ToolBackend`].

pub mod adapter;
pub mod backend;
pub mod error;
pub mod families;
pub mod family;
pub mod registry;
pub mod schema;

pub use adapter::{FamilyAdapter, ToolAdapter};
pub use backend::{BackendOutcome, ToolBackend};
pub use error::{ToolCallResult, ToolError};
pub use family::{ToolDefaults, ToolFamily};
pub use registry::ToolRegistry;
