use crate::error::{Error, Result};

/// Calling convention of the target function.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CallingConvention {
    /// Per-bitness default: Microsoft x64 for 64-bit debuggees, cdecl for
    /// 32-bit ones.
    #[default]
    Default,

    /// Microsoft x64: `rcx, rdx, r8, r9`, then stack above the 32-byte
    /// shadow space.
    MicrosoftX64,

    /// All arguments on the stack. Also covers stdcall, which differs only
    /// in who pops the stack.
    Cdecl,

    /// `(e|r)cx, (e|r)dx`, then stack.
    Fastcall,

    /// `this` in `(e|r)cx`, remaining arguments on the stack.
    Thiscall,
}

/// Argument-passing register, named independently of operand width.
///
/// `Cx`/`Dx` widen to `rcx`/`rdx` on 64-bit debuggees and narrow to
/// `ecx`/`edx` on 32-bit ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgReg {
    Cx,
    Dx,
    R8,
    R9,
}

/// Storage location of one call argument at function entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgSlot {
    /// The argument travels in a register.
    Register(ArgReg),

    /// The argument sits on the stack, at the given byte offset from the
    /// stack pointer (the return-address slot is offset 0).
    Stack(u64),
}

/// Maps one argument of the target function to its storage location.
///
/// Entry capture and re-entry restoration both go through this single
/// mapping, so the two sides cannot drift apart.
pub fn arg_slot(convention: CallingConvention, ptr_size: u32, index: u32) -> Result<ArgSlot> {
    use CallingConvention::*;

    let ptr = u64::from(ptr_size);
    let index64 = u64::from(index);

    let convention = match (convention, ptr_size) {
        (Default, 8) => MicrosoftX64,
        (Default, _) => Cdecl,
        (MicrosoftX64, s) if s != 8 => return Err(Error::UnsupportedConvention),
        (other, _) => other,
    };

    let slot = match convention {
        MicrosoftX64 => match index {
            0 => ArgSlot::Register(ArgReg::Cx),
            1 => ArgSlot::Register(ArgReg::Dx),
            2 => ArgSlot::Register(ArgReg::R8),
            3 => ArgSlot::Register(ArgReg::R9),
            // return slot, then the 32-byte shadow space
            _ => ArgSlot::Stack((index64 + 1) * ptr),
        },
        Cdecl => ArgSlot::Stack((index64 + 1) * ptr),
        Fastcall => match index {
            0 => ArgSlot::Register(ArgReg::Cx),
            1 => ArgSlot::Register(ArgReg::Dx),
            _ => ArgSlot::Stack((index64 - 1) * ptr),
        },
        Thiscall => match index {
            0 => ArgSlot::Register(ArgReg::Cx),
            _ => ArgSlot::Stack(index64 * ptr),
        },
        Default => unreachable!("resolved above"),
    };

    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::ArgReg::*;
    use super::ArgSlot::{Register, Stack};
    use super::{arg_slot, CallingConvention};

    fn slots(convention: CallingConvention, ptr_size: u32, count: u32) -> Vec<super::ArgSlot> {
        (0..count)
            .map(|i| arg_slot(convention, ptr_size, i).unwrap())
            .collect()
    }

    #[test]
    fn ms64_five_args() {
        // four register arguments, fifth above the shadow space
        assert_eq!(
            slots(CallingConvention::MicrosoftX64, 8, 5),
            vec![Register(Cx), Register(Dx), Register(R8), Register(R9), Stack(40)],
        );
    }

    #[test]
    fn default_matches_bitness() {
        assert_eq!(
            slots(CallingConvention::Default, 8, 2),
            slots(CallingConvention::MicrosoftX64, 8, 2),
        );
        assert_eq!(
            slots(CallingConvention::Default, 4, 2),
            slots(CallingConvention::Cdecl, 4, 2),
        );
    }

    #[test]
    fn cdecl_is_all_stack() {
        assert_eq!(slots(CallingConvention::Cdecl, 4, 3), vec![Stack(4), Stack(8), Stack(12)]);
        assert_eq!(slots(CallingConvention::Cdecl, 8, 2), vec![Stack(8), Stack(16)]);
    }

    #[test]
    fn fastcall_stack_begins_at_index_two() {
        assert_eq!(
            slots(CallingConvention::Fastcall, 4, 4),
            vec![Register(Cx), Register(Dx), Stack(4), Stack(8)],
        );
        assert_eq!(
            slots(CallingConvention::Fastcall, 8, 3),
            vec![Register(Cx), Register(Dx), Stack(8)],
        );
    }

    #[test]
    fn thiscall_stack_begins_at_index_one() {
        assert_eq!(
            slots(CallingConvention::Thiscall, 4, 3),
            vec![Register(Cx), Stack(4), Stack(8)],
        );
    }

    #[test]
    fn ms64_is_rejected_for_32_bit_targets() {
        assert!(matches!(
            arg_slot(CallingConvention::MicrosoftX64, 4, 0),
            Err(crate::Error::UnsupportedConvention),
        ));
    }
}
