#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use reprise_cli::CliOpts;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    let mut filter = EnvFilter::builder()
        .with_env_var("REPRISE_LOG")
        .from_env_lossy();

    if cli.trace_debug_events {
        filter = filter.add_directive("reprise_debugger=debug".parse().expect("static directive"));
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
fn run(cli: CliOpts) -> miette::Result<i32> {
    reprise_cli::evaluate_run(cli)
}

#[cfg(not(windows))]
fn run(_cli: CliOpts) -> miette::Result<i32> {
    Err(miette::miette!("reprise only debugs Windows processes"))
}
