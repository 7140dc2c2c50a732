use core::ffi::c_void;

use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
};

use super::os_error;

/// Reads memory from the debuggee's address space.
pub fn read_process_memory(process: HANDLE, addr: u64, buf: &mut [u8]) -> crate::Result<()> {
    let mut num_read = 0usize;

    let ok = unsafe {
        ReadProcessMemory(
            process,
            addr as usize as *const c_void,
            buf.as_mut_ptr().cast(),
            buf.len(),
            &mut num_read,
        )
    };

    if ok == 0 {
        tracing::error!(addr = format_args!("{addr:#x}"), len = buf.len(), "ReadProcessMemory");
        return Err(os_error("ReadProcessMemory"));
    }

    if num_read != buf.len() {
        Err(crate::Error::PartialMemOp(num_read, buf.len()))
    } else {
        Ok(())
    }
}

/// Writes memory into the debuggee's address space.
pub fn write_process_memory(process: HANDLE, addr: u64, buf: &[u8]) -> crate::Result<()> {
    let mut num_written = 0usize;

    let ok = unsafe {
        WriteProcessMemory(
            process,
            addr as usize as *const c_void,
            buf.as_ptr().cast(),
            buf.len(),
            &mut num_written,
        )
    };

    if ok == 0 {
        tracing::error!(addr = format_args!("{addr:#x}"), len = buf.len(), "WriteProcessMemory");
        return Err(os_error("WriteProcessMemory"));
    }

    if num_written != buf.len() {
        Err(crate::Error::PartialMemOp(num_written, buf.len()))
    } else {
        Ok(())
    }
}

/// Flushes the debuggee's instruction cache after a code patch.
pub fn flush_instruction_cache(process: HANDLE, addr: u64, len: usize) -> crate::Result<()> {
    let ok = unsafe { FlushInstructionCache(process, addr as usize as *const c_void, len) };

    if ok == 0 {
        Err(os_error("FlushInstructionCache"))
    } else {
        Ok(())
    }
}

/// Reads one pointer-sized slot from the debuggee.
///
/// 32-bit slots are zero-extended into the host's width.
pub fn read_ptr(process: HANDLE, addr: u64, ptr_size: u32) -> crate::Result<u64> {
    if ptr_size == 4 {
        let mut buf = [0u8; 4];
        read_process_memory(process, addr, &mut buf)?;
        Ok(u64::from(u32::from_le_bytes(buf)))
    } else {
        let mut buf = [0u8; 8];
        read_process_memory(process, addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Writes one pointer-sized slot into the debuggee.
///
/// Values are truncated to 32 bits for 32-bit debuggees.
pub fn write_ptr(process: HANDLE, addr: u64, value: u64, ptr_size: u32) -> crate::Result<()> {
    if ptr_size == 4 {
        write_process_memory(process, addr, &(value as u32).to_le_bytes())
    } else {
        write_process_memory(process, addr, &value.to_le_bytes())
    }
}
