/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid option combination, rejected before any process is touched.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A Windows API call failed.
    #[error("{0} failed: {1}")]
    Os(&'static str, #[source] std::io::Error),

    /// Remote memory access moved fewer bytes than requested.
    #[error("remote memory access moved {0} bytes instead of {1}")]
    PartialMemOp(usize, usize),

    /// Malformed PE image in the debuggee's address space.
    #[error("bad PE image: {0}")]
    BadPe(&'static str),

    /// The target function could not be located in its module.
    #[error("unable to resolve {module}!{symbol}")]
    SymbolResolution {
        /// Module the lookup ran against.
        module: String,
        /// Symbol that was searched for.
        symbol: String,
    },

    /// The Microsoft x64 convention has no 32-bit rendition.
    #[error("the ms64 calling convention is not supported for 32-bit targets")]
    UnsupportedConvention,

    /// A 32-bit debugger cannot operate on a 64-bit debuggee.
    #[error("a 64-bit build is needed to debug 64-bit targets")]
    PointerWidthMismatch,

    /// An operation that needs a live debuggee found none.
    #[error("no debuggee attached")]
    NoChild,

    /// The debuggee survived a terminate-and-drain cycle.
    #[error("debuggee did not exit on kill (last status: {0:?})")]
    KillEscaped(crate::DebugStatus),
}

impl From<scroll::Error> for Error {
    fn from(_: scroll::Error) -> Self {
        Error::BadPe("truncated image")
    }
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
