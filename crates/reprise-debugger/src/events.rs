/// Status returned to the harness by the debugger's blocking operations.
///
/// Only [`Crashed`](Self::Crashed) and [`Hanged`](Self::Hanged) describe
/// misbehavior of the debuggee; they are the signals a fuzzing harness is
/// built to harvest. Everything the engine itself cannot recover from is
/// reported as an [`Error`](crate::Error) instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DebugStatus {
    /// The debugger attached to a running process.
    Attached,

    /// The debuggee has exited.
    ProcessExit,

    /// Execution stopped at the entry of the target function.
    TargetStart,

    /// The target function has returned.
    TargetEnd,

    /// The debuggee raised a fault it cannot survive.
    Crashed,

    /// No terminal event arrived within the deadline.
    Hanged,
}

/// Exception reported by the debuggee.
#[derive(Copy, Clone, Debug)]
pub struct ExceptionInfo {
    /// NTSTATUS exception code.
    pub code: u32,

    /// Address of the faulting instruction, or the inaccessible address for
    /// access violations raised by a bad control transfer.
    pub address: u64,

    /// Whether the debuggee has not yet seen this exception.
    pub first_chance: bool,
}
