//! Tool System - tool descriptors, the registry and routing

mod definition;
mod registry;
mod router;

pub use definition::{InputContract, ToolDescriptor, ToolKind};
pub use registry::{LIST_TABLES_TOOL, QUERY_CHECKER_TOOL, QUERY_TOOL, SCHEMA_TOOL, ToolRegistry};
pub use router::ToolRouter;
