pub mod chat;
pub mod echo;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod search;
pub mod weather;

pub use chat::ChatTool;
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use schema::{display_value, EnumOption, ParamSpec, ParameterSchema, ValidationError};
pub use search::SearchTool;
pub use weather::WeatherTool;
