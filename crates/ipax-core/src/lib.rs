//! Everything the extractor front-ends share: how the remote tools are
//! invoked, how their output is streamed back, and how the form reacts to
//! each result.

pub mod command;
pub mod diagnostics;
pub mod error;
pub mod extraction;
pub mod history;
pub mod log;
pub mod profile;
pub mod runner;
pub mod session;
pub mod tools;

pub use command::{Action, CommandBuilder, RemoteCommand};
pub use error::ToolError;
pub use log::{LogLevel, LogLine, LogSink};
pub use profile::{ConnectionProfile, ScriptMode, ScriptSource};
pub use runner::{run, RunOutcome};
pub use session::{Controls, LinkState, Session};
pub use tools::{Tool, ToolAvailability};
