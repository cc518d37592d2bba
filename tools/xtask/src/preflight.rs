//! Checks that what `build-web` needs is present, without building anything.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::Error as ActionError;
use strum::IntoEnumIterator as _;
use xshell::{Shell, cmd};

use crate::layout::{AssetCategory, TARGET_WASM, WebLayout};

// -------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Outcome {
    Ok,
    Missing,
    NotExecutable,
    /// The check could not be performed. Does not fail the preflight.
    Unknown,
}

impl Outcome {
    fn is_failure(self) -> bool {
        matches!(self, Self::Missing | Self::NotExecutable)
    }
}

#[derive(Debug)]
pub(crate) struct Check {
    pub what: String,
    pub outcome: Outcome,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>14}  {}", self.outcome.to_string(), self.what)
    }
}

// -------------------------------------------------------------------------------------------------

/// Run all checks, writing one line for each to `out`, and fail if any of them failed.
pub(crate) fn preflight(
    sh: &Shell,
    layout: &WebLayout,
    out: &mut impl io::Write,
) -> Result<(), ActionError> {
    let mut checks = check_sources(layout);
    checks.push(check_wasm_target(sh));
    report(&checks, out)
}

fn report(checks: &[Check], out: &mut impl io::Write) -> Result<(), ActionError> {
    for check in checks {
        writeln!(out, "{check}")?;
    }

    let failures = checks.iter().filter(|c| c.outcome.is_failure()).count();
    if failures > 0 {
        anyhow::bail!("{failures} preflight checks failed");
    }
    Ok(())
}

/// Check the inputs that are part of the project itself.
pub(crate) fn check_sources(layout: &WebLayout) -> Vec<Check> {
    let mut checks = vec![
        check_exists("manifest", &layout.manifest_path(), Path::is_file),
        check_exists("assets", &layout.assets_source(), Path::is_dir),
    ];
    for category in AssetCategory::iter() {
        checks.push(check_exists(
            &format!("{category} assets"),
            &layout.category_source(category),
            Path::is_dir,
        ));
    }
    checks.push(check_executable("index generator", &layout.index_generator()));
    checks
}

fn check_exists(label: &str, path: &Path, predicate: fn(&Path) -> bool) -> Check {
    Check {
        what: format!("{label} {}", path.display()),
        outcome: if predicate(path) {
            Outcome::Ok
        } else {
            Outcome::Missing
        },
    }
}

fn check_executable(label: &str, path: &Path) -> Check {
    let outcome = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() && is_executable(&metadata) => Outcome::Ok,
        Ok(metadata) if metadata.is_file() => Outcome::NotExecutable,
        _ => Outcome::Missing,
    };
    Check {
        what: format!("{label} {}", path.display()),
        outcome,
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_: &fs::Metadata) -> bool {
    true
}

/// Ask rustup whether the standard library for [`TARGET_WASM`] is installed.
pub(crate) fn check_wasm_target(sh: &Shell) -> Check {
    let what = format!("rust target {TARGET_WASM}");
    let outcome = match cmd!(sh, "rustup target list --installed")
        .quiet()
        .ignore_stderr()
        .read()
    {
        Ok(installed) if target_listed(&installed, TARGET_WASM) => Outcome::Ok,
        Ok(_) => Outcome::Missing,
        Err(error) => {
            // Toolchains not managed by rustup may still have the target.
            log::debug!("could not list installed targets: {error}");
            Outcome::Unknown
        }
    };
    Check { what, outcome }
}

fn target_listed(installed: &str, target: &str) -> bool {
    installed.lines().any(|line| line.trim() == target)
}
