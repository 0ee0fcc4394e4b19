//! Tool Dispatch (spec §4.H): thirteen named tools exposed over whichever
//! transport is active, each wrapped in a declared argument schema and a
//! bounded text response.

mod dispatch;
mod response;
mod schema;

pub use dispatch::ToolDispatcher;
pub use response::{render_error, ToolResponse};
pub use schema::{ArgKind, ArgSpec};
