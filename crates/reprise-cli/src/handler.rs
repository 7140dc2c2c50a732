use reprise_debugger::{DebugEventHandler, ExceptionInfo};

/// Event handler backing the `reprise` driver: reports events through
/// `tracing` and records what the driver needs afterwards.
#[derive(Default)]
pub struct RunEventHandler {
    exit_code: Option<u32>,
    crash: Option<ExceptionInfo>,
}

impl RunEventHandler {
    /// Exit code of the debuggee, once it has exited.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// The fault that crashed the debuggee, if any.
    pub fn crash(&self) -> Option<&ExceptionInfo> {
        self.crash.as_ref()
    }
}

impl DebugEventHandler for RunEventHandler {
    fn on_entrypoint(&mut self) {
        tracing::info!("debuggee entrypoint reached");
    }

    fn on_module_loaded(&mut self, base: u64, name: &str) {
        tracing::debug!(base = format_args!("{base:#x}"), name, "module loaded");
    }

    fn on_module_unloaded(&mut self, base: u64) {
        tracing::debug!(base = format_args!("{base:#x}"), "module unloaded");
    }

    fn on_target_method_reached(&mut self, thread_id: u32) {
        tracing::info!(thread_id, "target function reached");
    }

    fn on_crashed(&mut self, exception: &ExceptionInfo) {
        tracing::error!(
            code = format_args!("{:#x}", exception.code),
            address = format_args!("{:#x}", exception.address),
            "debuggee crashed"
        );

        self.crash = Some(*exception);
    }

    fn on_process_exit(&mut self, exit_code: u32) {
        tracing::info!(exit_code, "debuggee exited");

        self.exit_code = Some(exit_code);
    }
}
