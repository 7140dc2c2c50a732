pub mod mem;
pub mod module;
pub mod process;
pub mod thread;

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};

/// Builds the error for a failed Windows API call from the calling thread's
/// last OS error.
pub(crate) fn os_error(api: &'static str) -> crate::Error {
    crate::Error::Os(api, std::io::Error::last_os_error())
}

/// Owned Windows handle, closed on drop.
pub(crate) struct Handle(HANDLE);

impl Handle {
    pub fn new(raw: HANDLE) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.0.is_null() && self.0 != INVALID_HANDLE_VALUE {
            unsafe { CloseHandle(self.0) };
        }
    }
}

/// Encodes a string as NUL-terminated UTF-16 for the wide Win32 APIs.
pub(crate) fn to_wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(Some(0)).collect()
}
