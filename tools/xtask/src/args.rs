//! Command-line parser.

#[derive(Debug, clap::Parser)]
pub(crate) struct XtaskArgs {
    /// What to do. Defaults to `build-web`.
    #[clap(subcommand)]
    pub command: Option<XtaskCommand>,

    /// Pass the `--timings` flag to the `cargo build` invocation, producing
    /// HTML files reporting the time taken.
    #[arg(long, global = true)]
    pub timings: bool,

    /// Pass the `--quiet` flag to the `cargo build` invocation.
    /// This hides build progress.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Additional logging to stderr.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, clap::Subcommand)]
pub(crate) enum XtaskCommand {
    /// Compile the game for wasm32-unknown-unknown with the release profile and stage it,
    /// together with its assets, into `web/`.
    ///
    /// Existing files in `web/` are overwritten but never deleted;
    /// use `clean-web` first for a bundle with nothing stale in it.
    #[default]
    BuildWeb,

    /// Remove the `web/` output directory.
    CleanWeb,

    /// List files in `web/` that no source file corresponds to.
    ///
    /// This includes files written by the index generator.
    StaleWeb,

    /// Check that the tools and source directories `build-web` needs are present,
    /// without building anything.
    Preflight,
}
