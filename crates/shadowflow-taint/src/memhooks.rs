//! Emission of the memory-taint hook ops.
//!
//! Hooks move taint between the pending register and the memory taint store. The run-time
//! side is a [`MemoryTaintHooks`] implementation.

use shadowflow_ir::{MemSize, Op, Operand, Slot, Width};

pub use shadowflow_ir::TaintHooks as MemoryTaintHooks;

use crate::emit::Emitter;
use crate::error::{Result, TaintError};

/// A memory access must fit the slot it moves data through.
///
/// Narrower accesses are fine: the hook ops take their size from the access itself, so the
/// taint moved always matches the bytes moved, and the rules zero- or sign-extend it into the
/// slot's width.
pub(crate) fn check_access(pos: usize, slot: Slot, width: Width, size: MemSize) -> Result<()> {
    if size.bytes() > width.bytes() {
        return Err(TaintError::WidthMismatch {
            pos,
            slot,
            size: size.bytes(),
            width: width.bits(),
        });
    }
    Ok(())
}

/// `pending = taint(mem[addr .. addr + size])`
pub(crate) fn emit_load_hook(em: &mut Emitter, pending: Slot, addr: Operand, size: MemSize) {
    em.emit(Op::LoadTaint {
        size,
        dst: pending,
        addr,
    });
}

/// `taint(mem[addr .. addr + size]) = pending`
pub(crate) fn emit_store_hook(em: &mut Emitter, pending: Slot, addr: Operand, size: MemSize) {
    em.emit(Op::StoreTaint {
        size,
        taint: Operand::Slot(pending),
        addr,
    });
}
