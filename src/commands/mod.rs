pub mod account;
pub mod lists;
pub mod render;
mod resolve;
pub mod sharing;
pub mod watch;

pub use account::{LoginArgs, RegisterArgs, ResetArgs};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
