use std::ptr;

use windows_sys::Win32::Foundation::{HANDLE, HMODULE, MAX_PATH};
use windows_sys::Win32::Storage::FileSystem::GetFinalPathNameByHandleW;
use windows_sys::Win32::System::Diagnostics::Debug::{
    SymCleanup, SymFromNameW, SymInitializeW, SymLoadModuleExW, MAX_SYM_NAME, SYMBOL_INFOW,
};
use windows_sys::Win32::System::ProcessStatus::{
    EnumProcessModulesEx, GetModuleBaseNameW, GetModuleFileNameExW, LIST_MODULES_ALL,
};

use super::{os_error, to_wide};

/// Enumerates the base addresses of every module mapped in the debuggee.
///
/// The handle buffer is grown until the OS reports that the full list fit.
pub fn enumerate_modules(process: HANDLE) -> crate::Result<Vec<u64>> {
    let mut capacity = 1024usize;

    loop {
        let mut handles: Vec<HMODULE> = vec![ptr::null_mut(); capacity];
        let buf_size = (capacity * std::mem::size_of::<HMODULE>()) as u32;
        let mut needed = 0u32;

        let ok = unsafe {
            EnumProcessModulesEx(
                process,
                handles.as_mut_ptr(),
                buf_size,
                &mut needed,
                LIST_MODULES_ALL,
            )
        };

        if ok == 0 {
            return Err(os_error("EnumProcessModulesEx"));
        }

        if needed <= buf_size {
            let count = needed as usize / std::mem::size_of::<HMODULE>();
            return Ok(handles[..count].iter().map(|&h| h as usize as u64).collect());
        }

        capacity *= 2;
    }
}

/// Base name of a module mapped in the debuggee.
pub fn module_base_name(process: HANDLE, base: u64) -> crate::Result<String> {
    let mut buf = [0u16; MAX_PATH as usize];

    let len = unsafe {
        GetModuleBaseNameW(process, base as usize as HMODULE, buf.as_mut_ptr(), buf.len() as u32)
    };

    if len == 0 {
        Err(os_error("GetModuleBaseNameW"))
    } else {
        Ok(String::from_utf16_lossy(&buf[..len as usize]))
    }
}

/// On-disk path of a module mapped in the debuggee.
pub fn module_file_name(process: HANDLE, base: u64) -> crate::Result<String> {
    let mut buf = [0u16; MAX_PATH as usize];

    let len = unsafe {
        GetModuleFileNameExW(process, base as usize as HMODULE, buf.as_mut_ptr(), buf.len() as u32)
    };

    if len == 0 {
        Err(os_error("GetModuleFileNameExW"))
    } else {
        Ok(String::from_utf16_lossy(&buf[..len as usize]))
    }
}

/// Resolves a file handle from a DLL-load event to the module's base name.
pub fn final_path_base_name(file: HANDLE) -> Option<String> {
    let mut buf = [0u16; MAX_PATH as usize];

    let len = unsafe { GetFinalPathNameByHandleW(file, buf.as_mut_ptr(), buf.len() as u32, 0) };

    if len == 0 || len as usize > buf.len() {
        tracing::debug!("GetFinalPathNameByHandleW failed");
        return None;
    }

    let path = String::from_utf16_lossy(&buf[..len as usize]);

    Some(path.rsplit('\\').next().unwrap_or(&path).to_owned())
}

/// Releases the symbol subsystem when a resolution attempt ends.
struct SymbolSession(HANDLE);

impl Drop for SymbolSession {
    fn drop(&mut self) {
        if unsafe { SymCleanup(self.0) } == 0 {
            tracing::warn!(error = %std::io::Error::last_os_error(), "SymCleanup");
        }
    }
}

/// Best-effort debug-symbol lookup of `symbol` in the module at
/// `module_path`, returning its offset from the module base.
///
/// The symbol subsystem is initialized against the debuggee and torn down
/// again before returning, so no global state outlives the attempt.
pub fn find_symbol_offset(
    process: HANDLE,
    module_path: &str,
    symbol: &str,
) -> crate::Result<Option<u64>> {
    let wide_path = to_wide(module_path);
    let wide_symbol = to_wide(symbol);

    if unsafe { SymInitializeW(process, ptr::null(), 0) } == 0 {
        return Err(os_error("SymInitializeW"));
    }
    let session = SymbolSession(process);

    let load_base = unsafe {
        SymLoadModuleExW(
            session.0,
            ptr::null_mut(),
            wide_path.as_ptr(),
            ptr::null(),
            0,
            0,
            ptr::null(),
            0,
        )
    };

    let mut buf =
        vec![0u64; (std::mem::size_of::<SYMBOL_INFOW>() + MAX_SYM_NAME as usize * 2 + 7) / 8];
    let info = buf.as_mut_ptr().cast::<SYMBOL_INFOW>();

    unsafe {
        (*info).SizeOfStruct = std::mem::size_of::<SYMBOL_INFOW>() as u32;
        (*info).MaxNameLen = MAX_SYM_NAME;
    }

    if unsafe { SymFromNameW(session.0, wide_symbol.as_ptr(), info) } == 0 {
        return Ok(None);
    }

    let (address, module_base) = unsafe { ((*info).Address, (*info).ModBase) };

    // SymLoadModuleExW returns 0 with ERROR_SUCCESS when the module is
    // already known to the symbol handler
    let base = if load_base != 0 { load_base } else { module_base };

    Ok(address.checked_sub(base))
}
