//! Configuration/context used by xtask operations.

use std::path::PathBuf;
use std::process;

use xshell::{Cmd, Shell};

use crate::stage::StageError;

// -------------------------------------------------------------------------------------------------

/// Configuration which is passed down through everything.
#[derive(Debug)]
pub(crate) struct Config<'a> {
    /// For executing commands.
    pub sh: &'a Shell,
    /// The `cargo` executable to build with.
    pub cargo_path: PathBuf,
    pub cargo_timings: bool,
    pub cargo_quiet: bool,
}

impl Config<'_> {
    /// Start a [`Cmd`] with the cargo command we should use.
    pub fn cargo(&self) -> Cmd<'_> {
        self.sh.cmd(&self.cargo_path)
    }

    /// Arguments that should be passed to any Cargo command that runs a build.
    pub fn cargo_build_args(&self) -> Vec<&str> {
        let mut args = Vec::with_capacity(2);
        if self.cargo_timings {
            args.push("--timings")
        }
        if self.cargo_quiet {
            args.push("--quiet")
        }
        args
    }

    /// Run `cmd` to completion, inheriting stdio, and fail if it does not exit successfully.
    ///
    /// Unlike [`Cmd::run()`], this keeps the exit status so that it can become our own.
    pub fn run(&self, cmd: Cmd<'_>) -> Result<(), StageError> {
        let command = cmd.to_string();
        log::info!("$ {command}");
        let status = process::Command::from(cmd)
            .status()
            .map_err(|error| StageError::Spawn {
                command: command.clone(),
                error,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(StageError::ProcessFailed { command, status })
        }
    }
}

/// The `cargo` that is running us, if any, else whichever one is on the `PATH`.
pub(crate) fn default_cargo_path() -> PathBuf {
    std::env::var_os("CARGO").map_or_else(|| PathBuf::from("cargo"), PathBuf::from)
}
