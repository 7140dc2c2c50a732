use reprise_debugger::{CallingConvention, DebuggerOptions};

/// Persistent-fuzzing debugger for Windows targets.
#[derive(clap::Parser, Debug)]
#[command(name = "reprise", version)]
pub struct CliOpts {
    /// Log every debug event the engine sees.
    #[arg(long)]
    pub trace_debug_events: bool,

    /// Base name of the module containing the function to intercept.
    #[arg(long, value_name = "NAME")]
    pub target_module: Option<String>,

    /// Exported or symbolic name of the function to intercept.
    #[arg(long, value_name = "NAME")]
    pub target_method: Option<String>,

    /// Offset of the target function within the module (hex or decimal),
    /// as an alternative to --target-method.
    #[arg(long, value_name = "OFFSET", value_parser = parse_number)]
    pub target_offset: Option<u64>,

    /// Number of arguments to capture at target entry.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub nargs: u32,

    /// Calling convention of the target function.
    #[arg(long, value_name = "CONV", value_enum)]
    pub callconv: Option<CliCallConv>,

    /// Re-invoke the target function in place after each return.
    #[arg(long = "loop")]
    pub loop_mode: bool,

    /// Attach to the given process instead of spawning one.
    #[arg(long, value_name = "PID")]
    pub attach: Option<u32>,

    /// Redirect the debuggee's stdout/stderr to the null device.
    #[arg(long)]
    pub sinkhole_stdio: bool,

    /// Memory cap for the debuggee, in megabytes.
    #[arg(long, value_name = "MB")]
    pub mem_limit: Option<u64>,

    /// CPU affinity mask for the debuggee (hex or decimal).
    #[arg(long, value_name = "MASK", value_parser = parse_number)]
    pub cpu_affinity: Option<u64>,

    /// Deadline for each debugger operation, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 10_000)]
    pub timeout: u64,

    /// Number of target invocations to drive in loop mode.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub iterations: u64,

    /// Program to spawn, followed by its arguments.
    #[arg(
        value_name = "COMMAND",
        required_unless_present = "attach",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Calling-convention names accepted on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CliCallConv {
    /// Callee-cleaned stack convention; argument layout matches cdecl.
    Stdcall,
    Fastcall,
    Thiscall,
    Ms64,
}

fn parse_number(value: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse()
    };

    parsed.map_err(|e| format!("invalid number {value:?}: {e}"))
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Lowers the parsed flags into engine options.
    pub fn to_options(&self) -> DebuggerOptions {
        DebuggerOptions {
            target_module: self.target_module.clone(),
            target_method: self.target_method.clone(),
            target_offset: self.target_offset,
            num_args: self.nargs,
            calling_convention: match self.callconv {
                None => CallingConvention::Default,
                Some(CliCallConv::Stdcall) => CallingConvention::Cdecl,
                Some(CliCallConv::Fastcall) => CallingConvention::Fastcall,
                Some(CliCallConv::Thiscall) => CallingConvention::Thiscall,
                Some(CliCallConv::Ms64) => CallingConvention::MicrosoftX64,
            },
            loop_mode: self.loop_mode,
            sinkhole_stdio: self.sinkhole_stdio,
            mem_limit: self.mem_limit,
            cpu_affinity: self.cpu_affinity,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use reprise_debugger::CallingConvention;

    use super::CliOpts;

    #[test]
    fn target_flags_and_command_parse() {
        let cli = CliOpts::try_parse_from([
            "reprise",
            "--target-module",
            "t.dll",
            "--target-method",
            "fuzz_me",
            "--loop",
            "--nargs",
            "5",
            "--callconv",
            "ms64",
            "target.exe",
            "input",
        ])
        .unwrap();

        assert_eq!(cli.command, ["target.exe", "input"]);

        let options = cli.to_options();
        assert_eq!(options.target_module.as_deref(), Some("t.dll"));
        assert_eq!(options.target_method.as_deref(), Some("fuzz_me"));
        assert_eq!(options.num_args, 5);
        assert_eq!(options.calling_convention, CallingConvention::MicrosoftX64);
        assert!(options.loop_mode);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn stdcall_maps_to_cdecl() {
        let cli =
            CliOpts::try_parse_from(["reprise", "--callconv", "stdcall", "target.exe"]).unwrap();

        assert_eq!(cli.to_options().calling_convention, CallingConvention::Cdecl);
    }

    #[test]
    fn offsets_parse_as_hex_or_decimal() {
        let cli =
            CliOpts::try_parse_from(["reprise", "--target-offset", "0x1a2b", "target.exe"])
                .unwrap();
        assert_eq!(cli.target_offset, Some(0x1a2b));

        let cli =
            CliOpts::try_parse_from(["reprise", "--target-offset", "26", "target.exe"]).unwrap();
        assert_eq!(cli.target_offset, Some(26));

        assert!(CliOpts::try_parse_from(["reprise", "--target-offset", "xyz", "t.exe"]).is_err());
    }

    #[test]
    fn command_is_required_unless_attaching() {
        assert!(CliOpts::try_parse_from(["reprise"]).is_err());

        let cli = CliOpts::try_parse_from(["reprise", "--attach", "1234"]).unwrap();
        assert_eq!(cli.attach, Some(1234));
        assert!(cli.command.is_empty());
    }

    #[test]
    fn debuggee_flags_pass_through_untouched() {
        let cli = CliOpts::try_parse_from([
            "reprise",
            "--sinkhole-stdio",
            "target.exe",
            "-in",
            "corpus",
        ])
        .unwrap();

        assert!(cli.sinkhole_stdio);
        assert_eq!(cli.command, ["target.exe", "-in", "corpus"]);
    }
}
