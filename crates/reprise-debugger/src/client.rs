use crate::events::ExceptionInfo;

/// Trait for receiving debugger callbacks.
///
/// An implementation is supplied to [`Debugger::new`](crate::Debugger::new)
/// and invoked while the debuggee is suspended; every hook fully completes
/// before the debuggee resumes. All methods default to no-ops.
pub trait DebugEventHandler {
    /// Function called when the debuggee reaches its entrypoint.
    fn on_entrypoint(&mut self) {}

    /// Function called when a module is mapped into the debuggee.
    ///
    /// # Note
    ///
    /// Modules mapped before the entrypoint is reached are reported in one
    /// batch once execution gets there; load events arriving earlier are
    /// swallowed because most process queries are unreliable until then.
    fn on_module_loaded(&mut self, _base: u64, _name: &str) {}

    /// Function called when a module is unmapped from the debuggee.
    fn on_module_unloaded(&mut self, _base: u64) {}

    /// Function called the first time execution reaches the target function.
    fn on_target_method_reached(&mut self, _thread_id: u32) {}

    /// Function called on any exception the debugger does not recognize as
    /// its own breakpoint or return trap.
    ///
    /// Returning `true` marks the exception as handled: the debuggee is
    /// resumed and no further classification happens.
    fn on_exception(&mut self, _exception: &ExceptionInfo, _thread_id: u32) -> bool {
        false
    }

    /// Function called once when the debuggee raises a fault it cannot
    /// survive, before the fault is handed back to the OS.
    fn on_crashed(&mut self, _exception: &ExceptionInfo) {}

    /// Function called when the debuggee exits.
    fn on_process_exit(&mut self, _exit_code: u32) {}

    /// Maps a code address through whatever instrumentation layer may have
    /// relocated it.
    ///
    /// The engine consults this before re-arming a breakpoint on code that
    /// already executed once, since instrumentation is free to move it in
    /// the meantime.
    fn translated_address(&mut self, addr: u64) -> u64 {
        addr
    }
}
