pub mod aop;
pub mod components;
pub mod engine;
pub mod types;

pub use aop::{Outcome, Payload, Report};
pub use components::*;
pub use engine::{ExecuteOptions, LoosePipeline, NodeTree, Tool, ToolOutput, ToolRegistry};
pub use types::*;
