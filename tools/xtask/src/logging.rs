//! Installs the [`log`] logger.

use simplelog::LevelFilter::{self, Debug, Info, Off};

/// Log level for the given `--verbose` setting.
pub(crate) fn level(verbose: bool) -> LevelFilter {
    if verbose { Debug } else { Info }
}

/// Send log messages to stderr, so they never mix with results printed to stdout.
pub(crate) fn install(verbose: bool) -> Result<(), log::SetLoggerError> {
    simplelog::WriteLogger::init(
        level(verbose),
        simplelog::ConfigBuilder::new()
            .set_target_level(Off)
            .set_location_level(Off)
            .set_thread_level(Off)
            .set_time_level(Off)
            .build(),
        std::io::stderr(),
    )
}
