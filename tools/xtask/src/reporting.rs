//! Progress and summary output, all of which goes to stderr.
//!
//! Stdout is reserved for each command's result, so that it can be consumed by scripts.

use std::fmt;
use std::mem;
use std::time::{Duration, Instant};

// -------------------------------------------------------------------------------------------------

/// How long one step took.
#[derive(Debug)]
pub(crate) struct Timing {
    label: String,
    time: Duration,
}

#[cfg(test)]
impl Timing {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { label, time } = self;
        write!(f, "{time:5.1?} s  {label}", time = time.as_secs_f64())
    }
}

/// Print the collected timings, followed by their total.
pub(crate) fn print_time_log(time_log: &[Timing]) {
    if time_log.is_empty() {
        return;
    }
    for timing in time_log {
        eprintln!("{timing}");
    }
    let total: Duration = time_log.iter().map(|t| t.time).sum();
    eprintln!("{total:5.1?} s  total", total = total.as_secs_f64());
}

// -------------------------------------------------------------------------------------------------

/// Measures the time from creation to drop, and marks the start and end of the span on stderr.
///
/// The span is recorded even if the step inside it fails.
pub(crate) struct CaptureTime<'a> {
    label: String,
    start: Instant,
    output: &'a mut Vec<Timing>,
}

impl<'a> CaptureTime<'a> {
    pub fn new(time_log: &'a mut Vec<Timing>, label: impl Into<String>) -> Self {
        let label = label.into();
        if in_github_actions() {
            eprintln!("::group::{label}");
        } else {
            eprintln!("------ [xtask] START: {label} ------");
        }
        Self {
            label,
            start: Instant::now(),
            output: time_log,
        }
    }
}

impl Drop for CaptureTime<'_> {
    fn drop(&mut self) {
        let label = mem::take(&mut self.label);
        let time = self.start.elapsed();
        if in_github_actions() {
            eprintln!("::endgroup::");
        } else {
            eprintln!(
                "------ [xtask] END: {label} ({time:.1?} s) ------",
                time = time.as_secs_f64()
            );
        }
        self.output.push(Timing { label, time });
    }
}

/// GitHub Actions folds log groups marked this way.
fn in_github_actions() -> bool {
    std::env::var_os("GITHUB_ACTIONS").is_some()
}

// -------------------------------------------------------------------------------------------------

/// Formats a byte count with thousands separators, right-aligned to a constant width
/// so that sizes line up in columns.
pub(crate) struct WithCommas(pub u64);

impl fmt::Display for WithCommas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut in_leading_zeroes = true;
        for i in (0..4).rev() {
            let scale = 1000u64.pow(i);
            let group = (self.0 / scale) % 1000;
            let separator = if i > 0 { "," } else { "" };
            if !in_leading_zeroes {
                write!(f, "{group:03}{separator}")?;
            } else if group != 0 || i == 0 {
                in_leading_zeroes = false;
                write!(f, "{group:3}{separator}")?;
            } else {
                // pad the absent group
                write!(f, "    ")?;
            }
        }
        Ok(())
    }
}
