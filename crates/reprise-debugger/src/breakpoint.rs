/// Software breakpoint opcode (`int3`), identical for x86 and x86_64.
pub(crate) const TRAP_OPCODE: u8 = 0xcc;

/// What the debugger armed a breakpoint for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BreakpointKind {
    /// The debuggee's image entrypoint.
    Entrypoint,

    /// The configured target function.
    Target,
}

/// A one-shot software breakpoint placed within the debuggee.
#[derive(Debug)]
pub(crate) struct Breakpoint {
    /// Address the trap opcode was written to.
    pub addr: u64,

    /// Code byte the trap opcode replaced.
    pub original_opcode: u8,

    pub kind: BreakpointKind,
}

/// Table of breakpoints currently armed within the debuggee.
///
/// Records are owned by the table and transferred out by value on the first
/// hit; identity is the address, nothing more.
#[derive(Default)]
pub(crate) struct BreakpointManager {
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointManager {
    /// Registers an armed breakpoint.
    ///
    /// Arming one address twice is a caller bug: the second record would
    /// capture the trap opcode as the "original" byte.
    pub fn insert(&mut self, breakpoint: Breakpoint) {
        debug_assert!(
            !self.contains(breakpoint.addr),
            "double arm at {:#x}",
            breakpoint.addr,
        );

        self.breakpoints.push(breakpoint);
    }

    /// Removes and returns the breakpoint armed at `addr`, if any.
    pub fn take(&mut self, addr: u64) -> Option<Breakpoint> {
        let index = self.breakpoints.iter().position(|bk| bk.addr == addr)?;

        Some(self.breakpoints.swap_remove(index))
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.breakpoints.iter().any(|bk| bk.addr == addr)
    }

    /// Drops every record. Trap opcodes still written into the debuggee are
    /// left as they are.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Breakpoint, BreakpointKind, BreakpointManager};

    fn breakpoint(addr: u64) -> Breakpoint {
        Breakpoint {
            addr,
            original_opcode: 0x55,
            kind: BreakpointKind::Target,
        }
    }

    #[test]
    fn take_consumes_exactly_once() {
        let mut manager = BreakpointManager::default();
        manager.insert(breakpoint(0x1000));
        manager.insert(breakpoint(0x2000));

        let hit = manager.take(0x1000).unwrap();
        assert_eq!(hit.addr, 0x1000);
        assert_eq!(hit.original_opcode, 0x55);

        assert!(manager.take(0x1000).is_none());
        assert!(manager.contains(0x2000));
    }

    #[test]
    fn unknown_address_is_not_matched() {
        let mut manager = BreakpointManager::default();
        manager.insert(breakpoint(0x1000));

        assert!(manager.take(0x1001).is_none());
        assert!(manager.contains(0x1000));
    }

    #[test]
    fn clear_empties_the_table() {
        let mut manager = BreakpointManager::default();
        manager.insert(breakpoint(0x1000));
        manager.insert(breakpoint(0x2000));

        manager.clear();

        assert!(!manager.contains(0x1000));
        assert!(!manager.contains(0x2000));
    }
}
