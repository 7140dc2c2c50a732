mod intercept;

use std::time::{Duration, Instant};

use windows_sys::Win32::Foundation::{
    CloseHandle, DBG_CONTINUE, DBG_EXCEPTION_NOT_HANDLED, HANDLE, NTSTATUS,
    STATUS_ACCESS_VIOLATION, STATUS_BREAKPOINT, STATUS_FATAL_APP_EXIT, STATUS_HEAP_CORRUPTION,
    STATUS_ILLEGAL_INSTRUCTION, STATUS_INTEGER_DIVIDE_BY_ZERO, STATUS_PRIVILEGED_INSTRUCTION,
    STATUS_STACK_BUFFER_OVERRUN, STATUS_STACK_OVERFLOW, STATUS_WX86_BREAKPOINT,
};
use windows_sys::Win32::System::Diagnostics::Debug::{
    ContinueDebugEvent, WaitForDebugEvent, CREATE_PROCESS_DEBUG_EVENT, CREATE_PROCESS_DEBUG_INFO,
    CREATE_THREAD_DEBUG_EVENT, DEBUG_EVENT, EXCEPTION_DEBUG_EVENT, EXIT_PROCESS_DEBUG_EVENT,
    EXIT_THREAD_DEBUG_EVENT, LOAD_DLL_DEBUG_EVENT, LOAD_DLL_DEBUG_INFO, UNLOAD_DLL_DEBUG_EVENT,
};

use crate::breakpoint::{Breakpoint, BreakpointKind, BreakpointManager, TRAP_OPCODE};
use crate::client::DebugEventHandler;
use crate::command::Command;
use crate::config::DebuggerOptions;
use crate::convention::CallingConvention;
use crate::error::{Error, Result};
use crate::events::{DebugStatus, ExceptionInfo};
use crate::pe;
use crate::sys::process::Child;
use crate::sys::thread::ThreadContext;
use crate::sys::{mem, module, process, Handle};

/// Forged return address written over the target function's return slot.
///
/// The debuggee never maps this address, so returning from the target
/// function raises an access violation whose exception address equals this
/// value. That fault is the signal that the function has finished.
pub const SENTINEL_RETURN_ADDRESS: u64 = 0x0f22;

/// Granularity of the debug-event wait, so deadlines are honored.
const WAIT_SLICE_MS: u32 = 100;

const CRASH_CODES: [u32; 7] = [
    STATUS_ILLEGAL_INSTRUCTION as u32,
    STATUS_PRIVILEGED_INSTRUCTION as u32,
    STATUS_INTEGER_DIVIDE_BY_ZERO as u32,
    STATUS_STACK_OVERFLOW as u32,
    STATUS_HEAP_CORRUPTION as u32,
    STATUS_STACK_BUFFER_OVERRUN as u32,
    STATUS_FATAL_APP_EXIT as u32,
];

fn is_breakpoint_code(code: u32) -> bool {
    code == STATUS_BREAKPOINT as u32 || code == STATUS_WX86_BREAKPOINT as u32
}

fn close_event_handle(handle: HANDLE) {
    if !handle.is_null() {
        unsafe { CloseHandle(handle) };
    }
}

/// User-mode debugger driving one debuggee at a time.
///
/// Callbacks go to the [`DebugEventHandler`] supplied at construction. The
/// debugger owns the calling thread while any of its blocking operations
/// run; the debuggee is fully suspended whenever a callback fires.
pub struct Debugger<H> {
    handler: H,
    options: DebuggerOptions,

    /// Convention in effect; `Default` resolves per bitness once probed.
    calling_convention: CallingConvention,

    /// Offset of the target function in its module; debug-symbol resolution
    /// caches its discovery here.
    target_offset: Option<u64>,

    breakpoints: BreakpointManager,
    child: Option<Child>,
    child_ptr_size: u32,
    wow64_target: bool,

    /// Absolute address of the target function, valid once its module
    /// loaded and resolution succeeded.
    target_address: u64,
    target_reached: bool,
    entrypoint_reached: bool,
    attach_mode: bool,

    /// Stack pointer at target entry, valid until the matching return.
    saved_sp: u64,
    saved_return_address: u64,
    saved_args: Vec<u64>,

    /// Whether a received debug event still needs `ContinueDebugEvent`.
    continue_needed: bool,
    continue_status: NTSTATUS,
    last_status: Option<DebugStatus>,
    deadline: Option<Instant>,
    last_event_ids: (u32, u32),

    sink_device: Option<Handle>,
}

impl<H: DebugEventHandler> Debugger<H> {
    /// Creates a debugger from validated options and a callback handler.
    pub fn new(options: DebuggerOptions, handler: H) -> Result<Self> {
        options.validate()?;

        let saved_args = vec![0u64; options.num_args as usize];

        Ok(Self {
            handler,
            calling_convention: options.calling_convention,
            target_offset: options.target_offset,
            options,
            breakpoints: BreakpointManager::default(),
            child: None,
            child_ptr_size: std::mem::size_of::<usize>() as u32,
            wow64_target: false,
            target_address: 0,
            target_reached: false,
            entrypoint_reached: false,
            attach_mode: false,
            saved_sp: 0,
            saved_return_address: 0,
            saved_args,
            continue_needed: false,
            continue_status: DBG_CONTINUE,
            last_status: None,
            deadline: None,
            last_event_ids: (0, 0),
            sink_device: None,
        })
    }

    /// Returns the callback handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the callback handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Spawns the debuggee and pumps events until a terminal status.
    pub fn run(&mut self, command: &Command, timeout: Duration) -> Result<DebugStatus> {
        self.attach_mode = false;

        self.start_process(command)?;

        self.resume(timeout)
    }

    /// Attaches to a running process and pumps events until a terminal
    /// status.
    pub fn attach(&mut self, pid: u32, timeout: Duration) -> Result<DebugStatus> {
        self.attach_mode = true;
        self.continue_needed = false;

        process::attach_debuggee(pid)?;

        self.last_status = Some(DebugStatus::Attached);

        self.resume(timeout)
    }

    /// Resumes the debuggee after a previous status and pumps events until
    /// the next terminal one.
    pub fn resume(&mut self, timeout: Duration) -> Result<DebugStatus> {
        if self.child.is_none() && self.last_status != Some(DebugStatus::Attached) {
            return Ok(DebugStatus::ProcessExit);
        }

        // after a loop-mode return the debuggee is already rewound to the
        // target entry; report the re-entry without pumping any event
        if self.options.loop_mode && self.last_status == Some(DebugStatus::TargetEnd) {
            self.last_status = Some(DebugStatus::TargetStart);
            return Ok(DebugStatus::TargetStart);
        }

        self.deadline = Some(Instant::now() + timeout);

        let status = self.debug_loop()?;

        self.last_status = Some(status);

        if status == DebugStatus::ProcessExit {
            self.child = None;
        }

        Ok(status)
    }

    /// Kills the debuggee (if not dead already) and drains its exit.
    pub fn kill(&mut self) -> Result<DebugStatus> {
        let Some(child) = &self.child else {
            return Ok(DebugStatus::ProcessExit);
        };

        process::terminate_debuggee(child.process.raw());

        // no deadline while draining the exit
        self.deadline = None;

        let status = self.debug_loop()?;

        self.last_status = Some(status);

        if status != DebugStatus::ProcessExit {
            return Err(Error::KillEscaped(status));
        }

        self.child = None;
        self.breakpoints.clear();

        Ok(status)
    }

    fn start_process(&mut self, command: &Command) -> Result<()> {
        self.continue_needed = false;
        self.last_status = None;
        self.breakpoints.clear();

        if self.options.sinkhole_stdio && self.sink_device.is_none() {
            self.sink_device = Some(process::open_sink_device()?);
        }

        let child = process::spawn_debuggee(
            command,
            self.sink_device.as_ref().map(Handle::raw),
            self.options.mem_limit,
            self.options.cpu_affinity,
        )?;

        self.child = Some(child);
        self.entrypoint_reached = false;
        self.target_reached = false;

        self.probe_platform()
    }

    /// Detects the debuggee's bitness, fixing `child_ptr_size`,
    /// `wow64_target` and the effective calling convention.
    fn probe_platform(&mut self) -> Result<()> {
        let process = self.child_process()?;

        let child_is_wow64 = process::is_wow64_process(process)?;
        let host_is_wow64 = process::is_wow64_process(process::current_process())?;
        let host_ptr_size = std::mem::size_of::<usize>() as u32;

        if child_is_wow64 {
            self.wow64_target = host_ptr_size == 8;
            self.child_ptr_size = 4;
        } else if host_ptr_size == 8 {
            self.child_ptr_size = 8;
        } else if host_is_wow64 {
            // 32-bit debugger on a 64-bit OS, facing a native 64-bit debuggee
            return Err(Error::PointerWidthMismatch);
        } else {
            self.child_ptr_size = 4;
        }

        if self.child_ptr_size == 4 && self.calling_convention == CallingConvention::Default {
            self.calling_convention = CallingConvention::Cdecl;
        }

        tracing::debug!(
            ptr_size = self.child_ptr_size,
            wow64 = self.wow64_target,
            "debuggee platform probed"
        );

        Ok(())
    }

    fn child_process(&self) -> Result<HANDLE> {
        self.child
            .as_ref()
            .map(|child| child.process.raw())
            .ok_or(Error::NoChild)
    }

    /// Pumps debug events until a terminal status.
    #[tracing::instrument(name = "DebugLoop", skip_all)]
    fn debug_loop(&mut self) -> Result<DebugStatus> {
        // an event held over from the previous pump, so the caller could
        // inspect state before the debuggee resumes
        if self.continue_needed {
            self.continue_event();
        }

        loop {
            let mut event: DEBUG_EVENT = unsafe { std::mem::zeroed() };
            let waited = unsafe { WaitForDebugEvent(&mut event, WAIT_SLICE_MS) } != 0;

            self.continue_needed = waited;
            if waited {
                self.last_event_ids = (event.dwProcessId, event.dwThreadId);
            }

            if self
                .deadline
                .is_some_and(|deadline| Instant::now() > deadline)
            {
                return Ok(DebugStatus::Hanged);
            }

            if !waited {
                continue;
            }

            self.continue_status = DBG_CONTINUE;

            let mut loop_exit = None;

            match event.dwDebugEventCode {
                EXCEPTION_DEBUG_EVENT => {
                    let info = unsafe { &event.u.Exception };
                    let exception = ExceptionInfo {
                        code: info.ExceptionRecord.ExceptionCode as u32,
                        address: info.ExceptionRecord.ExceptionAddress as usize as u64,
                        first_chance: info.dwFirstChance != 0,
                    };

                    if let Some(status) = self.handle_exception(&exception, event.dwThreadId)? {
                        if status == DebugStatus::Crashed {
                            self.handler.on_crashed(&exception);
                        }

                        return Ok(status);
                    }
                }
                CREATE_PROCESS_DEBUG_EVENT => {
                    tracing::debug!("debuggee process created or attached");

                    let info = unsafe { &event.u.CreateProcessInfo };
                    self.handle_process_created(info, event.dwProcessId)?;
                    close_event_handle(info.hFile);
                }
                EXIT_PROCESS_DEBUG_EVENT => {
                    let exit_code = unsafe { event.u.ExitProcess.dwExitCode };

                    tracing::debug!(exit_code, "debuggee exited");

                    self.handler.on_process_exit(exit_code);
                    loop_exit = Some(DebugStatus::ProcessExit);
                }
                LOAD_DLL_DEBUG_EVENT => {
                    let info = unsafe { &event.u.LoadDll };
                    self.handle_dll_loaded(info)?;
                    close_event_handle(info.hFile);
                }
                UNLOAD_DLL_DEBUG_EVENT => {
                    let base = unsafe { event.u.UnloadDll.lpBaseOfDll } as usize as u64;

                    tracing::debug!(base = format_args!("{base:#x}"), "module unloaded");

                    self.handler.on_module_unloaded(base);
                }
                CREATE_THREAD_DEBUG_EVENT | EXIT_THREAD_DEBUG_EVENT => (),
                _ => (),
            }

            self.continue_event();

            if let Some(status) = loop_exit {
                return Ok(status);
            }
        }
    }

    fn continue_event(&mut self) {
        unsafe {
            ContinueDebugEvent(
                self.last_event_ids.0,
                self.last_event_ids.1,
                self.continue_status,
            );
        }

        self.continue_needed = false;
    }

    /// Classifies an exception raised within the debuggee.
    ///
    /// `None` means the loop keeps pumping; a status terminates the pump.
    fn handle_exception(
        &mut self,
        exception: &ExceptionInfo,
        thread_id: u32,
    ) -> Result<Option<DebugStatus>> {
        // instrumentation may put its own int3 on the same addresses;
        // one-shot debugger breakpoints take precedence
        if is_breakpoint_code(exception.code) {
            match self.handle_breakpoint(exception.address, thread_id)? {
                Some(BreakpointKind::Target) => return Ok(Some(DebugStatus::TargetStart)),
                Some(BreakpointKind::Entrypoint) => return Ok(None),
                None => (),
            }
        }

        if self.handler.on_exception(exception, thread_id) {
            return Ok(None);
        }

        tracing::debug!(
            code = format_args!("{:#x}", exception.code),
            address = format_args!("{:#x}", exception.address),
            "debuggee exception"
        );

        match exception.code {
            code if is_breakpoint_code(code) => {
                // a breakpoint that is neither ours nor the client's
                self.continue_status = DBG_EXCEPTION_NOT_HANDLED;
                Ok(None)
            }
            code if code == STATUS_ACCESS_VIOLATION as u32 => {
                if self.options.target_function_defined()
                    && exception.address == SENTINEL_RETURN_ADDRESS
                {
                    tracing::debug!("target function returned");

                    self.handle_target_ended(thread_id)?;

                    Ok(Some(DebugStatus::TargetEnd))
                } else {
                    self.continue_status = DBG_EXCEPTION_NOT_HANDLED;
                    Ok(Some(DebugStatus::Crashed))
                }
            }
            code if CRASH_CODES.contains(&code) => {
                self.continue_status = DBG_EXCEPTION_NOT_HANDLED;
                Ok(Some(DebugStatus::Crashed))
            }
            code => {
                tracing::warn!(code = format_args!("{code:#x}"), "unhandled exception");

                self.continue_status = DBG_EXCEPTION_NOT_HANDLED;
                Ok(None)
            }
        }
    }

    /// Consumes a one-shot breakpoint at `address`, if the debugger armed
    /// one there.
    fn handle_breakpoint(
        &mut self,
        address: u64,
        thread_id: u32,
    ) -> Result<Option<BreakpointKind>> {
        let Some(breakpoint) = self.breakpoints.take(address) else {
            return Ok(None);
        };

        let process = self.child_process()?;

        // put the original code byte back
        mem::write_process_memory(process, address, &[breakpoint.original_opcode])?;
        mem::flush_instruction_cache(process, address, 1)?;

        // the trap byte has already executed; rewind the instruction
        // pointer over it
        let mut context = ThreadContext::capture(thread_id, self.wow64_target)?;
        context.set_instruction_pointer(context.instruction_pointer() - 1);
        context.apply(thread_id)?;

        match breakpoint.kind {
            BreakpointKind::Entrypoint => self.handle_entrypoint()?,
            BreakpointKind::Target => {
                tracing::debug!(thread_id, "target function reached");

                self.handle_target_reached(thread_id)?;
            }
        }

        Ok(Some(breakpoint.kind))
    }

    /// Runs once execution reaches the image entrypoint: the module list is
    /// reliable from here on.
    fn handle_entrypoint(&mut self) -> Result<()> {
        self.handler.on_entrypoint();

        let process = self.child_process()?;

        for base in module::enumerate_modules(process)? {
            let name = match module::module_base_name(process, base) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(base = format_args!("{base:#x}"), error = %e, "module name query failed");
                    continue;
                }
            };

            tracing::debug!(base = format_args!("{base:#x}"), name = %name, "module loaded");

            self.module_loaded(base, &name)?;
        }

        self.entrypoint_reached = true;

        tracing::debug!("debuggee entrypoint reached");

        Ok(())
    }

    fn handle_process_created(
        &mut self,
        info: &CREATE_PROCESS_DEBUG_INFO,
        process_id: u32,
    ) -> Result<()> {
        if self.attach_mode {
            // a live process is past its entrypoint already
            self.child = Some(Child::from_debug_event(
                info.hProcess,
                info.hThread,
                process_id,
            ));
            self.entrypoint_reached = true;

            self.probe_platform()
        } else {
            let process = self.child_process()?;
            let base = info.lpBaseOfImage as usize as u64;

            let mut header = vec![0u8; pe::HEADER_PREFIX_LEN];
            mem::read_process_memory(process, base, &mut header)?;

            let Some(rva) = pe::entry_point_rva(&header)? else {
                return Err(Error::BadPe("image has no entrypoint"));
            };

            self.arm_breakpoint(base + u64::from(rva), BreakpointKind::Entrypoint)
        }
    }

    fn handle_dll_loaded(&mut self, info: &LOAD_DLL_DEBUG_INFO) -> Result<()> {
        // before the entrypoint most process queries are unreliable; the
        // modules loaded until then are enumerated once execution gets there
        if !self.entrypoint_reached {
            return Ok(());
        }

        let base = info.lpBaseOfDll as usize as u64;

        let Some(name) = module::final_path_base_name(info.hFile) else {
            return Ok(());
        };

        tracing::debug!(base = format_args!("{base:#x}"), name = %name, "module loaded");

        self.module_loaded(base, &name)
    }

    /// Arms a one-shot software breakpoint at `addr`.
    fn arm_breakpoint(&mut self, addr: u64, kind: BreakpointKind) -> Result<()> {
        let process = self.child_process()?;

        let mut original = [0u8; 1];
        mem::read_process_memory(process, addr, &mut original)?;
        mem::write_process_memory(process, addr, &[TRAP_OPCODE])?;
        mem::flush_instruction_cache(process, addr, 1)?;

        self.breakpoints.insert(Breakpoint {
            addr,
            original_opcode: original[0],
            kind,
        });

        tracing::debug!(addr = format_args!("{addr:#x}"), ?kind, "breakpoint armed");

        Ok(())
    }
}
