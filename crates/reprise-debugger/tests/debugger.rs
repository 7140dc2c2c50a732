// Once clippy takes `clippy.toml` into account (for `tests` targets),
// we can remove these.
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]
#![cfg(windows)]

use std::time::Duration;

use reprise_debugger::{Command, DebugEventHandler, DebugStatus, Debugger, DebuggerOptions};
use test_log::test;

#[derive(Default)]
struct RecordingHandler {
    entrypoint_seen: bool,
    modules: Vec<String>,
    exit_code: Option<u32>,
}

impl DebugEventHandler for RecordingHandler {
    fn on_entrypoint(&mut self) {
        self.entrypoint_seen = true;
    }

    fn on_module_loaded(&mut self, _base: u64, name: &str) {
        assert!(self.entrypoint_seen, "module reported before the entrypoint");
        self.modules.push(name.to_ascii_lowercase());
    }

    fn on_process_exit(&mut self, exit_code: u32) {
        self.exit_code = Some(exit_code);
    }
}

#[test]
fn spawned_process_runs_to_exit() {
    let command = Command::new("cmd.exe").arg("/c").arg("exit").arg("3");

    let mut debugger =
        Debugger::new(DebuggerOptions::default(), RecordingHandler::default()).unwrap();

    let status = debugger.run(&command, Duration::from_secs(60)).unwrap();

    assert_eq!(status, DebugStatus::ProcessExit);
    assert!(debugger.handler().entrypoint_seen);
    assert!(debugger
        .handler()
        .modules
        .iter()
        .any(|name| name == "ntdll.dll"));
    assert_eq!(debugger.handler().exit_code, Some(3));
}

#[test]
fn hung_process_reports_hanged_and_dies_on_kill() {
    let command = Command::new("ping.exe").arg("-n").arg("60").arg("127.0.0.1");

    let mut debugger =
        Debugger::new(DebuggerOptions::default(), RecordingHandler::default()).unwrap();

    let status = debugger.run(&command, Duration::from_millis(500)).unwrap();
    assert_eq!(status, DebugStatus::Hanged);

    let status = debugger.kill().unwrap();
    assert_eq!(status, DebugStatus::ProcessExit);

    // the debugger is reusable after a kill
    let command = Command::new("cmd.exe").arg("/c").arg("exit").arg("0");
    let status = debugger.run(&command, Duration::from_secs(60)).unwrap();
    assert_eq!(status, DebugStatus::ProcessExit);
}

#[test]
fn missing_program_fails_to_spawn() {
    let command = Command::new("reprise-does-not-exist.exe");

    let mut debugger =
        Debugger::new(DebuggerOptions::default(), RecordingHandler::default()).unwrap();

    assert!(debugger.run(&command, Duration::from_secs(5)).is_err());
}
