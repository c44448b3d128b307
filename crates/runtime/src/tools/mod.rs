//! Tool sessions and the registry that aggregates them.

mod mcp_host;
mod registry;
mod r#trait;
mod types;

pub use mcp_host::StdioConnector;
pub use r#trait::{Connector, ToolSession};
pub use registry::{NO_OUTPUT, ToolRegistry, render_content};
pub use types::{QUALIFIER, ToolDescriptor, qualify};
