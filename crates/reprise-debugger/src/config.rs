use crate::convention::CallingConvention;
use crate::error::{Error, Result};

/// Debugger options, fixed for the lifetime of a
/// [`Debugger`](crate::Debugger).
#[derive(Debug, Clone, Default)]
pub struct DebuggerOptions {
    /// Base name of the module containing the function to intercept.
    pub target_module: Option<String>,

    /// Exported or symbolic name of the function to intercept.
    pub target_method: Option<String>,

    /// Offset of the target function within its module, as an alternative
    /// to [`target_method`](Self::target_method).
    pub target_offset: Option<u64>,

    /// Number of arguments to capture when the target function is entered.
    pub num_args: u32,

    /// Calling convention of the target function.
    pub calling_convention: CallingConvention,

    /// Re-invoke the target function in place after each return.
    pub loop_mode: bool,

    /// Redirect the debuggee's stdout/stderr to the null device.
    pub sinkhole_stdio: bool,

    /// Process memory cap in megabytes.
    pub mem_limit: Option<u64>,

    /// CPU affinity mask applied to the debuggee.
    pub cpu_affinity: Option<u64>,
}

impl DebuggerOptions {
    /// Whether the options describe a function to intercept.
    pub(crate) fn target_function_defined(&self) -> bool {
        self.target_module.is_some()
            || self.target_method.is_some()
            || self.target_offset.is_some()
    }

    /// Checks the option combination rules.
    pub fn validate(&self) -> Result<()> {
        if self.target_function_defined()
            && (self.target_module.is_none()
                || (self.target_method.is_none() && self.target_offset.is_none()))
        {
            return Err(Error::Config(
                "target_module and either target_offset or target_method \
                 must be specified together"
                    .to_owned(),
            ));
        }

        if self.loop_mode && !self.target_function_defined() {
            return Err(Error::Config(
                "a target function must be defined to use loop mode".to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DebuggerOptions;

    fn full_target() -> DebuggerOptions {
        DebuggerOptions {
            target_module: Some("t.dll".to_owned()),
            target_method: Some("fuzz_me".to_owned()),
            ..DebuggerOptions::default()
        }
    }

    #[test]
    fn no_target_is_valid() {
        assert!(DebuggerOptions::default().validate().is_ok());
    }

    #[test]
    fn module_with_method_or_offset_is_valid() {
        assert!(full_target().validate().is_ok());

        let opts = DebuggerOptions {
            target_module: Some("t.dll".to_owned()),
            target_offset: Some(0x1000),
            ..DebuggerOptions::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn module_without_method_or_offset_is_rejected() {
        let opts = DebuggerOptions {
            target_module: Some("t.dll".to_owned()),
            ..DebuggerOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn method_without_module_is_rejected() {
        let opts = DebuggerOptions {
            target_method: Some("fuzz_me".to_owned()),
            ..DebuggerOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn loop_mode_requires_a_target() {
        let opts = DebuggerOptions {
            loop_mode: true,
            ..DebuggerOptions::default()
        };
        assert!(opts.validate().is_err());

        let opts = DebuggerOptions {
            loop_mode: true,
            ..full_target()
        };
        assert!(opts.validate().is_ok());
    }
}
