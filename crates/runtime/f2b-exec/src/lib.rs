//! Running `fail2ban-client`
//!
//! [`CommandExecutor`] is the seam between the dashboard and the outside
//! world: [`ClientExecutor`] spawns the real client (locally, under `sudo`,
//! or over SSH) and tests substitute an in-memory daemon. [`Fail2banClient`]
//! puts named commands on top of any executor.

pub mod client;
pub mod executor;

pub use client::Fail2banClient;
pub use executor::{shell_quote, ClientExecutor, CommandExecutor, CommandOutput};

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs_f32())]
    Timeout { program: String, timeout: Duration },

    #[error("Command exited with status {code}: {message}")]
    Failed { code: i32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;
