//! CLI command implementations.

mod chat;
mod config;
mod doctor;
mod tools;

pub use chat::{run_chat, ChatOptions};
pub use config::run_config;
pub use doctor::run_doctor;
pub use tools::run_tools;
