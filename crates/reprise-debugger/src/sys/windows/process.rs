use core::ffi::c_void;
use std::ptr;

use windows_sys::Win32::Foundation::{
    GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE, TRUE,
};
use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Diagnostics::Debug::DebugActiveProcess;
use windows_sys::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
    SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_AFFINITY,
    JOB_OBJECT_LIMIT_PROCESS_MEMORY,
};
use windows_sys::Win32::System::Threading::{
    CreateProcessW, GetCurrentProcess, IsWow64Process, TerminateProcess, DEBUG_ONLY_THIS_PROCESS,
    DEBUG_PROCESS, PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
};

use super::{os_error, to_wide, Handle};
use crate::command::Command;

/// Handles to the debuggee's process and initial thread.
pub struct Child {
    pub process: Handle,
    pub thread: Handle,
    pub id: u32,

    /// Job object limiting the debuggee, kept alive alongside it.
    job: Option<Handle>,
}

impl Child {
    /// Wraps handles delivered by a process-creation debug event (attach
    /// mode).
    pub fn from_debug_event(process: HANDLE, thread: HANDLE, id: u32) -> Self {
        Self {
            process: Handle::new(process),
            thread: Handle::new(thread),
            id,
            job: None,
        }
    }
}

/// Spawns the debuggee under this debugger.
///
/// `DEBUG_ONLY_THIS_PROCESS` keeps events from grandchildren out of our
/// queue. The new process is stopped at its first debug event until the
/// caller pumps the loop.
pub fn spawn_debuggee(
    command: &Command,
    stdio_sink: Option<HANDLE>,
    mem_limit: Option<u64>,
    cpu_affinity: Option<u64>,
) -> crate::Result<Child> {
    let mut command_line = to_wide(command.to_command_line());
    let current_dir = command.current_dir.as_ref().map(to_wide);

    let mut startup_info: STARTUPINFOW = unsafe { std::mem::zeroed() };
    startup_info.cb = std::mem::size_of::<STARTUPINFOW>() as u32;

    let mut inherit_handles = 0;
    if let Some(sink) = stdio_sink {
        startup_info.hStdOutput = sink;
        startup_info.hStdError = sink;
        startup_info.dwFlags |= STARTF_USESTDHANDLES;
        inherit_handles = TRUE;
    }

    let job = if mem_limit.is_some() || cpu_affinity.is_some() {
        Some(create_limit_job(mem_limit, cpu_affinity)?)
    } else {
        None
    };

    let mut process_info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

    let ok = unsafe {
        CreateProcessW(
            ptr::null(),
            command_line.as_mut_ptr(),
            ptr::null(),
            ptr::null(),
            inherit_handles,
            DEBUG_PROCESS | DEBUG_ONLY_THIS_PROCESS,
            ptr::null(),
            current_dir.as_ref().map_or(ptr::null(), |dir| dir.as_ptr()),
            &startup_info,
            &mut process_info,
        )
    };

    if ok == 0 {
        return Err(os_error("CreateProcessW"));
    }

    let child = Child {
        process: Handle::new(process_info.hProcess),
        thread: Handle::new(process_info.hThread),
        id: process_info.dwProcessId,
        job,
    };

    if let Some(job) = &child.job {
        if unsafe { AssignProcessToJobObject(job.raw(), child.process.raw()) } == 0 {
            return Err(os_error("AssignProcessToJobObject"));
        }
    }

    tracing::info!(pid = child.id, "debuggee spawned");

    Ok(child)
}

fn create_limit_job(mem_limit: Option<u64>, cpu_affinity: Option<u64>) -> crate::Result<Handle> {
    let raw = unsafe { CreateJobObjectW(ptr::null(), ptr::null()) };
    if raw.is_null() {
        return Err(os_error("CreateJobObjectW"));
    }
    let job = Handle::new(raw);

    let mut limits: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { std::mem::zeroed() };

    if let Some(megabytes) = mem_limit {
        limits.BasicLimitInformation.LimitFlags |= JOB_OBJECT_LIMIT_PROCESS_MEMORY;
        limits.ProcessMemoryLimit = (megabytes * 1024 * 1024) as usize;
    }

    if let Some(mask) = cpu_affinity {
        limits.BasicLimitInformation.LimitFlags |= JOB_OBJECT_LIMIT_AFFINITY;
        limits.BasicLimitInformation.Affinity = mask as usize;
    }

    let ok = unsafe {
        SetInformationJobObject(
            job.raw(),
            JobObjectExtendedLimitInformation,
            (&limits as *const JOBOBJECT_EXTENDED_LIMIT_INFORMATION).cast::<c_void>(),
            std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
        )
    };

    if ok == 0 {
        return Err(os_error("SetInformationJobObject"));
    }

    Ok(job)
}

/// Opens the `NUL` device for sinkholing the debuggee's stdout/stderr.
///
/// The handle is created inheritable so `CreateProcessW` can pass it down.
pub fn open_sink_device() -> crate::Result<Handle> {
    let security = SECURITY_ATTRIBUTES {
        nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: ptr::null_mut(),
        bInheritHandle: TRUE,
    };

    let name = to_wide("nul");

    let handle = unsafe {
        CreateFileW(
            name.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            &security,
            OPEN_EXISTING,
            0,
            ptr::null_mut(),
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        Err(os_error("CreateFileW"))
    } else {
        Ok(Handle::new(handle))
    }
}

/// Requests live-attach to a running process.
pub fn attach_debuggee(pid: u32) -> crate::Result<()> {
    if unsafe { DebugActiveProcess(pid) } == 0 {
        Err(os_error("DebugActiveProcess"))
    } else {
        Ok(())
    }
}

/// Terminates the debuggee, best effort.
///
/// An already-exiting process makes this fail benignly; the debug loop still
/// observes the exit event either way.
pub fn terminate_debuggee(process: HANDLE) {
    if unsafe { TerminateProcess(process, 0) } == 0 {
        tracing::debug!(error = %std::io::Error::last_os_error(), "TerminateProcess");
    }
}

/// Whether the given process runs under WOW64.
pub fn is_wow64_process(process: HANDLE) -> crate::Result<bool> {
    let mut wow64 = 0;

    if unsafe { IsWow64Process(process, &mut wow64) } == 0 {
        Err(os_error("IsWow64Process"))
    } else {
        Ok(wow64 != 0)
    }
}

/// Pseudo-handle of the debugger process itself.
pub fn current_process() -> HANDLE {
    unsafe { GetCurrentProcess() }
}
