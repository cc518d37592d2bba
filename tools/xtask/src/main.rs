//! Build and staging operations for cropbots.
//!
//! This is an instance of the `cargo-xtask` pattern as described by
//! <https://github.com/matklad/cargo-xtask>.
//!
//! `cargo xtask` with no arguments compiles the game for the web and stages it,
//! with its assets, into `web/`. Results are printed to stdout; everything else goes to stderr.

// Crate-specific lint settings. (General settings can be found in the workspace manifest.)
#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use anyhow::Error as ActionError;
use xshell::Shell;

// -------------------------------------------------------------------------------------------------

mod args;
use args::{XtaskArgs, XtaskCommand};

mod context;
use context::{Config, default_cargo_path};

mod fs_ops;

mod layout;
use layout::WebLayout;

mod logging;

mod preflight;

mod reporting;
use reporting::{Timing, print_time_log};

mod stage;
use stage::{Aborted, build_web, clean_web, stale_web};

// -------------------------------------------------------------------------------------------------

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:?}");
            ExitCode::from(exit_code(&error))
        }
    }
}

fn run() -> Result<(), ActionError> {
    let XtaskArgs {
        command,
        timings,
        quiet,
        verbose,
    } = <XtaskArgs as clap::Parser>::parse();

    logging::install(verbose)?;

    let sh = &Shell::new()?;
    let config = Config {
        sh,
        cargo_path: default_cargo_path(),
        cargo_timings: timings,
        cargo_quiet: quiet,
    };

    dispatch(
        &config,
        command.unwrap_or_default(),
        layout::project_dir(),
        &mut io::stdout().lock(),
    )
}

/// Perform `command` on the project at `root`. Results are written to `out`;
/// nothing is written there if the command fails.
fn dispatch(
    config: &Config<'_>,
    command: XtaskCommand,
    root: &Path,
    out: &mut impl Write,
) -> Result<(), ActionError> {
    let resolve_layout = || {
        WebLayout::resolve(root)
            .with_context(|| format!("could not find project directory {}", root.display()))
    };

    match command {
        XtaskCommand::BuildWeb => {
            let mut time_log: Vec<Timing> = Vec::new();
            let result = build_web(config, root, &mut time_log);
            // Timings are worth seeing even if a step failed.
            print_time_log(&time_log);
            let staged = result?;
            log::info!(
                "{} bytes of wasm and {} asset files",
                staged.artifact_bytes,
                staged.asset_files
            );
            writeln!(out, "{staged}")?;
        }
        XtaskCommand::CleanWeb => {
            let layout = resolve_layout()?;
            match clean_web(&layout)? {
                Some(removed) => writeln!(out, "Removed {}", removed.display())?,
                None => writeln!(out, "Nothing to remove at {}", layout.output_dir().display())?,
            }
        }
        XtaskCommand::StaleWeb => {
            let layout = resolve_layout()?;
            let output_dir = layout.output_dir();
            let stale = stale_web(&layout)?;
            for path in &stale {
                writeln!(out, "{}", output_dir.join(path).display())?;
            }
            log::info!("{} stale paths", stale.len());
        }
        XtaskCommand::Preflight => {
            preflight::preflight(config.sh, &resolve_layout()?, out)?;
        }
    }

    Ok(())
}

/// Exit with the same code as the child process which failed, if there was one.
fn exit_code(error: &ActionError) -> u8 {
    error
        .downcast_ref::<Aborted>()
        .and_then(|aborted| aborted.error.exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .filter(|&code| code != 0)
        .unwrap_or(1)
}
