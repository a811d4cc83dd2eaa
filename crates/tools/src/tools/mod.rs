pub mod base;
pub mod echo;

pub use base::Tool;
pub use echo::EchoTool;
