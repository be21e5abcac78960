//! ms-server: Remote side of mqtt-shell
//!
//! The server subscribes to the command topic, opens each envelope, runs
//! the requested program under a wall-clock bound, and publishes exactly
//! one sealed response per message it receives.

pub mod executor;
pub mod handler;
pub mod server;

pub use executor::{ExecutionError, ExecutionOutcome, Executor, DEFAULT_EXEC_TIMEOUT};
pub use handler::CommandHandler;
pub use server::ShellServer;
