//! Command-line driver for the `reprise` debugger engine.

mod cli;
#[cfg(windows)]
mod handler;
#[cfg(windows)]
mod run;

pub use self::cli::CliOpts;
#[cfg(windows)]
pub use self::run::evaluate_run;
