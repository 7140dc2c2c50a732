//! Target-function interception: entry capture, forced-return trap and
//! loop-mode re-entry.

use super::{Debugger, SENTINEL_RETURN_ADDRESS};
use crate::breakpoint::BreakpointKind;
use crate::client::DebugEventHandler;
use crate::convention::{arg_slot, ArgSlot};
use crate::error::{Error, Result};
use crate::pe;
use crate::sys::thread::ThreadContext;
use crate::sys::{mem, module};

impl<H: DebugEventHandler> Debugger<H> {
    /// Reacts to a module load, resolving and arming the target function
    /// when its module comes in.
    pub(super) fn module_loaded(&mut self, base: u64, name: &str) -> Result<()> {
        self.handler.on_module_loaded(base, name);

        let is_target = self
            .options
            .target_module
            .as_deref()
            .is_some_and(|module| name.eq_ignore_ascii_case(module));

        if !is_target {
            return Ok(());
        }

        let addr = self.resolve_target_address(base)?;

        tracing::info!(addr = format_args!("{addr:#x}"), "target function resolved");

        self.target_address = addr;

        self.arm_breakpoint(addr, BreakpointKind::Target)
    }

    /// Resolves the target function inside its freshly loaded module:
    /// explicit offset first, then the export table, then debug symbols.
    ///
    /// Failure is fatal; there is no other way to reach the target.
    fn resolve_target_address(&mut self, base: u64) -> Result<u64> {
        if let Some(offset) = self.target_offset {
            return Ok(base + offset);
        }

        // validation guarantees a method name whenever no offset is given
        let Some(method) = self.options.target_method.clone() else {
            return Err(Error::Config(
                "either target_offset or target_method is required".to_owned(),
            ));
        };

        let process = self.child_process()?;

        //
        // Try the exported symbols.
        //

        let mut header = vec![0u8; pe::HEADER_PREFIX_LEN];
        mem::read_process_memory(process, base, &mut header)?;

        let mut image = vec![0u8; pe::image_size(&header)? as usize];
        mem::read_process_memory(process, base, &mut image)?;

        if let Some(rva) = pe::export_rva(&image, &method)? {
            return Ok(base + u64::from(rva));
        }

        //
        // Fall back to debug symbols, caching the discovered offset.
        //

        let path = module::module_file_name(process, base)?;

        if let Some(offset) = module::find_symbol_offset(process, &path, &method)? {
            self.target_offset = Some(offset);

            return Ok(base + offset);
        }

        Err(Error::SymbolResolution {
            module: self.options.target_module.clone().unwrap_or_default(),
            symbol: method,
        })
    }

    /// Entry protocol, run with the debuggee stopped on the first byte of
    /// the target function, before its prologue executes.
    pub(super) fn handle_target_reached(&mut self, thread_id: u32) -> Result<()> {
        let process = self.child_process()?;
        let context = ThreadContext::capture(thread_id, self.wow64_target)?;

        // the caller's return address still sits on top of the stack
        self.saved_sp = context.stack_pointer();
        self.saved_return_address = mem::read_ptr(process, self.saved_sp, self.child_ptr_size)?;

        if self.options.loop_mode {
            for index in 0..self.options.num_args {
                let value = match arg_slot(self.calling_convention, self.child_ptr_size, index)? {
                    ArgSlot::Register(reg) => context.arg_register(reg),
                    ArgSlot::Stack(offset) => {
                        mem::read_ptr(process, self.saved_sp + offset, self.child_ptr_size)?
                    }
                };

                self.saved_args[index as usize] = value;
            }
        }

        // overwrite the return slot so that returning from the target jumps
        // to an unmapped address and faults with the sentinel
        mem::write_ptr(
            process,
            self.saved_sp,
            SENTINEL_RETURN_ADDRESS,
            self.child_ptr_size,
        )?;

        if !self.target_reached {
            self.target_reached = true;
            self.handler.on_target_method_reached(thread_id);
        }

        Ok(())
    }

    /// Return protocol, run on the access violation raised by the sentinel
    /// return address.
    pub(super) fn handle_target_ended(&mut self, thread_id: u32) -> Result<()> {
        let process = self.child_process()?;
        let mut context = ThreadContext::capture(thread_id, self.wow64_target)?;

        if self.options.loop_mode {
            // rewind to the entry state; the function body is intact, so no
            // breakpoint needs re-arming
            context.set_instruction_pointer(self.target_address);
            context.set_stack_pointer(self.saved_sp);

            // instrumentation may have overwritten the return slot
            mem::write_ptr(
                process,
                self.saved_sp,
                SENTINEL_RETURN_ADDRESS,
                self.child_ptr_size,
            )?;

            for index in 0..self.options.num_args {
                let value = self.saved_args[index as usize];

                match arg_slot(self.calling_convention, self.child_ptr_size, index)? {
                    ArgSlot::Register(reg) => context.set_arg_register(reg, value),
                    ArgSlot::Stack(offset) => mem::write_ptr(
                        process,
                        self.saved_sp + offset,
                        value,
                        self.child_ptr_size,
                    )?,
                }
            }
        } else {
            // single shot: resume the caller, and re-arm through the
            // translation hook since instrumentation may have relocated the
            // target in the meantime
            context.set_instruction_pointer(self.saved_return_address);

            let addr = self.handler.translated_address(self.target_address);
            self.arm_breakpoint(addr, BreakpointKind::Target)?;
        }

        context.apply(thread_id)
    }
}
