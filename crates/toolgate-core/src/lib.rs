pub mod contract;
pub mod error;
pub mod local;
pub mod registry;
pub mod traits;

pub use contract::{Arguments, Param, ParamType, ToolContract};
pub use error::Error;
pub use local::FnTool;
pub use registry::{Toolset, ToolsetRegistry};
pub use traits::{SharedTool, Tool};
