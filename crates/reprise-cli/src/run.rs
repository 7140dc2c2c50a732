use std::time::Duration;

use miette::{miette, IntoDiagnostic};
use reprise_debugger::{Command, DebugStatus, Debugger};

use crate::cli::CliOpts;
use crate::handler::RunEventHandler;

/// Drives one debugging session from the parsed command line.
///
/// On success, returns the exit code the driver process should end with:
/// the debuggee's own exit code, `2` for a crash, `3` for a hang.
pub fn evaluate_run(cli: CliOpts) -> miette::Result<i32> {
    let timeout = Duration::from_millis(cli.timeout);

    let mut debugger =
        Debugger::new(cli.to_options(), RunEventHandler::default()).into_diagnostic()?;

    let mut status = if let Some(pid) = cli.attach {
        debugger.attach(pid, timeout).into_diagnostic()?
    } else {
        let (program, args) = cli
            .command
            .split_first()
            .ok_or_else(|| miette!("no program to spawn"))?;

        let command = Command::new(program).args(args.iter().map(String::as_str));

        debugger.run(&command, timeout).into_diagnostic()?
    };

    let mut iterations_left = cli.iterations;

    loop {
        match status {
            DebugStatus::Attached | DebugStatus::TargetStart => {
                // a fuzzing harness would mutate the target's inputs here
                status = debugger.resume(timeout).into_diagnostic()?;
            }
            DebugStatus::TargetEnd => {
                // the iteration budget only drives loop-mode re-invocation;
                // a single-shot target resumes its caller and the process
                // runs to its own exit
                if cli.loop_mode {
                    iterations_left = iterations_left.saturating_sub(1);

                    if iterations_left == 0 {
                        debugger.kill().into_diagnostic()?;
                        return Ok(0);
                    }
                }

                status = debugger.resume(timeout).into_diagnostic()?;
            }
            DebugStatus::Crashed => {
                if let Some(crash) = debugger.handler().crash() {
                    tracing::info!(
                        code = format_args!("{:#x}", crash.code),
                        "harvested a crash"
                    );
                }

                debugger.kill().into_diagnostic()?;
                return Ok(2);
            }
            DebugStatus::Hanged => {
                debugger.kill().into_diagnostic()?;
                return Ok(3);
            }
            DebugStatus::ProcessExit => {
                let exit_code = debugger.handler().exit_code().map_or(0, |code| code as i32);
                return Ok(exit_code);
            }
        }
    }
}
