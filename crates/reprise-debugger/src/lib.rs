//! User-mode debugger engine for persistent fuzzing of Windows targets.
//!
//! The engine spawns (or attaches to) a debuggee, pumps its debug events and
//! installs software breakpoints. When a target function is configured, every
//! call into it is intercepted: the arguments and stack pointer are captured
//! on entry, the return address is replaced with a trap value so the return
//! faults predictably, and (in loop mode) the function is re-entered in
//! place with its original inputs, so a fuzzing harness can exercise it many
//! times without paying process startup cost.
//!
//! Higher-level instrumentation plugs in through the
//! [`DebugEventHandler`](crate::DebugEventHandler) trait, supplied at
//! construction.
//!
//! # Supported Platforms
//!
//! <table>
//!     <thead>
//!         <tr>
//!             <th>Host Machine</th>
//!             <th>Debuggee Platform</th>
//!         </tr>
//!     </thead>
//!     <tbody>
//!         <tr>
//!             <td rowspan="2">Windows <code>x86_64</code></td>
//!             <td><code>x86_64</code></td>
//!         </tr>
//!         <tr>
//!             <td><code>i686</code> (WOW64)</td>
//!         </tr>
//!         <tr>
//!             <td>Windows <code>i686</code></td>
//!             <td><code>i686</code></td>
//!         </tr>
//!     </tbody>
//! </table>

#[cfg_attr(not(windows), allow(dead_code))]
mod breakpoint;
mod client;
mod command;
mod config;
#[cfg_attr(not(windows), allow(dead_code))]
mod convention;
#[cfg(windows)]
mod debugger;
mod error;
mod events;
#[cfg_attr(not(windows), allow(dead_code))]
mod pe;
#[cfg(windows)]
mod sys;

pub use self::client::DebugEventHandler;
pub use self::command::Command;
pub use self::config::DebuggerOptions;
pub use self::convention::CallingConvention;
#[cfg(windows)]
pub use self::debugger::{Debugger, SENTINEL_RETURN_ADDRESS};
pub use self::error::{Error, Result};
pub use self::events::{DebugStatus, ExceptionInfo};
