//! mqtt-shell: Interactive client for mqtt-shell
//!
//! Provides the `mqtt-shell` binary's building blocks: the correlator that
//! pairs each sent command with the next response, the `remote>` loop, and
//! response formatting.

pub mod correlator;
pub mod output;
pub mod shell;

pub use correlator::{ClientError, Correlator, RESPONSE_QUEUE_CAPACITY};
pub use shell::{parse_command, Input, InteractiveShell};
