use windows_sys::Win32::System::Diagnostics::Debug::{
    GetThreadContext, SetThreadContext, Wow64GetThreadContext, Wow64SetThreadContext, CONTEXT,
    WOW64_CONTEXT, WOW64_CONTEXT_ALL,
};
#[cfg(target_arch = "x86")]
use windows_sys::Win32::System::Diagnostics::Debug::CONTEXT_ALL_X86 as CONTEXT_ALL;
#[cfg(target_arch = "x86_64")]
use windows_sys::Win32::System::Diagnostics::Debug::CONTEXT_ALL_AMD64 as CONTEXT_ALL;
use windows_sys::Win32::System::Threading::{OpenThread, THREAD_ALL_ACCESS};

use super::{os_error, Handle};
use crate::convention::ArgReg;

/// Native `CONTEXT` carrying the 16-byte alignment `GetThreadContext`
/// requires.
#[repr(align(16))]
pub struct AlignedContext {
    ctx: CONTEXT,
}

/// Machine context of a stopped debuggee thread.
///
/// WOW64 debuggees get the 32-bit view of their threads; everything else
/// uses the host-native context.
pub enum ThreadContext {
    Native(Box<AlignedContext>),
    Wow64(Box<WOW64_CONTEXT>),
}

fn open_thread(thread_id: u32) -> crate::Result<Handle> {
    let handle = unsafe { OpenThread(THREAD_ALL_ACCESS, 0, thread_id) };

    if handle.is_null() {
        Err(os_error("OpenThread"))
    } else {
        Ok(Handle::new(handle))
    }
}

impl ThreadContext {
    /// Snapshots the full machine context of the given thread.
    pub fn capture(thread_id: u32, wow64: bool) -> crate::Result<Self> {
        let thread = open_thread(thread_id)?;

        if wow64 {
            let mut ctx: Box<WOW64_CONTEXT> = Box::new(unsafe { std::mem::zeroed() });
            ctx.ContextFlags = WOW64_CONTEXT_ALL;

            if unsafe { Wow64GetThreadContext(thread.raw(), ctx.as_mut()) } == 0 {
                return Err(os_error("Wow64GetThreadContext"));
            }

            Ok(Self::Wow64(ctx))
        } else {
            let mut ctx: Box<AlignedContext> = Box::new(unsafe { std::mem::zeroed() });
            ctx.ctx.ContextFlags = CONTEXT_ALL;

            if unsafe { GetThreadContext(thread.raw(), &mut ctx.ctx) } == 0 {
                return Err(os_error("GetThreadContext"));
            }

            Ok(Self::Native(ctx))
        }
    }

    /// Writes this context back into the given thread.
    pub fn apply(&self, thread_id: u32) -> crate::Result<()> {
        let thread = open_thread(thread_id)?;

        let ok = match self {
            Self::Native(ctx) => unsafe { SetThreadContext(thread.raw(), &ctx.ctx) },
            Self::Wow64(ctx) => unsafe { Wow64SetThreadContext(thread.raw(), ctx.as_ref()) },
        };

        if ok == 0 {
            Err(os_error("SetThreadContext"))
        } else {
            Ok(())
        }
    }

    pub fn instruction_pointer(&self) -> u64 {
        match self {
            Self::Native(ctx) => {
                #[cfg(target_arch = "x86_64")]
                {
                    ctx.ctx.Rip
                }
                #[cfg(target_arch = "x86")]
                {
                    u64::from(ctx.ctx.Eip)
                }
            }
            Self::Wow64(ctx) => u64::from(ctx.Eip),
        }
    }

    pub fn set_instruction_pointer(&mut self, addr: u64) {
        match self {
            Self::Native(ctx) => {
                #[cfg(target_arch = "x86_64")]
                {
                    ctx.ctx.Rip = addr;
                }
                #[cfg(target_arch = "x86")]
                {
                    ctx.ctx.Eip = addr as u32;
                }
            }
            Self::Wow64(ctx) => ctx.Eip = addr as u32,
        }
    }

    pub fn stack_pointer(&self) -> u64 {
        match self {
            Self::Native(ctx) => {
                #[cfg(target_arch = "x86_64")]
                {
                    ctx.ctx.Rsp
                }
                #[cfg(target_arch = "x86")]
                {
                    u64::from(ctx.ctx.Esp)
                }
            }
            Self::Wow64(ctx) => u64::from(ctx.Esp),
        }
    }

    pub fn set_stack_pointer(&mut self, addr: u64) {
        match self {
            Self::Native(ctx) => {
                #[cfg(target_arch = "x86_64")]
                {
                    ctx.ctx.Rsp = addr;
                }
                #[cfg(target_arch = "x86")]
                {
                    ctx.ctx.Esp = addr as u32;
                }
            }
            Self::Wow64(ctx) => ctx.Esp = addr as u32,
        }
    }

    /// Reads an argument-passing register, widened to 64 bits.
    pub fn arg_register(&self, reg: ArgReg) -> u64 {
        match self {
            Self::Native(ctx) => {
                #[cfg(target_arch = "x86_64")]
                {
                    match reg {
                        ArgReg::Cx => ctx.ctx.Rcx,
                        ArgReg::Dx => ctx.ctx.Rdx,
                        ArgReg::R8 => ctx.ctx.R8,
                        ArgReg::R9 => ctx.ctx.R9,
                    }
                }
                #[cfg(target_arch = "x86")]
                {
                    match reg {
                        ArgReg::Cx => u64::from(ctx.ctx.Ecx),
                        ArgReg::Dx => u64::from(ctx.ctx.Edx),
                        ArgReg::R8 | ArgReg::R9 => {
                            unreachable!("no r8/r9 argument registers on 32-bit hosts")
                        }
                    }
                }
            }
            Self::Wow64(ctx) => match reg {
                ArgReg::Cx => u64::from(ctx.Ecx),
                ArgReg::Dx => u64::from(ctx.Edx),
                ArgReg::R8 | ArgReg::R9 => {
                    unreachable!("no r8/r9 argument registers on 32-bit targets")
                }
            },
        }
    }

    /// Writes an argument-passing register, truncating for 32-bit targets.
    pub fn set_arg_register(&mut self, reg: ArgReg, value: u64) {
        match self {
            Self::Native(ctx) => {
                #[cfg(target_arch = "x86_64")]
                {
                    match reg {
                        ArgReg::Cx => ctx.ctx.Rcx = value,
                        ArgReg::Dx => ctx.ctx.Rdx = value,
                        ArgReg::R8 => ctx.ctx.R8 = value,
                        ArgReg::R9 => ctx.ctx.R9 = value,
                    }
                }
                #[cfg(target_arch = "x86")]
                {
                    match reg {
                        ArgReg::Cx => ctx.ctx.Ecx = value as u32,
                        ArgReg::Dx => ctx.ctx.Edx = value as u32,
                        ArgReg::R8 | ArgReg::R9 => {
                            unreachable!("no r8/r9 argument registers on 32-bit hosts")
                        }
                    }
                }
            }
            Self::Wow64(ctx) => match reg {
                ArgReg::Cx => ctx.Ecx = value as u32,
                ArgReg::Dx => ctx.Edx = value as u32,
                ArgReg::R8 | ArgReg::R9 => {
                    unreachable!("no r8/r9 argument registers on 32-bit targets")
                }
            },
        }
    }
}
