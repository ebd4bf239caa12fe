use shadowflow_ir::{MemSize, Op, Operand, Slot, Width};

use super::Rewriter;
use crate::error::Result;
use crate::memhooks::{check_access, emit_load_hook, emit_store_hook};
use crate::pointer::{self, Access};

impl Rewriter<'_> {
    /// The taint fetch goes first: the load may overwrite its own address operand.
    pub(super) fn load_before(&mut self, pos: usize, dst: Slot, addr: Operand, size: MemSize) -> Result<()> {
        let width = self.width_of(dst)?;
        check_access(pos, dst, width, size)?;
        let pending = self.ctx.pending_taint();
        emit_load_hook(&mut self.em, pending, addr, size);
        Ok(())
    }

    /// Written after the load so a faulting access leaves every shadow untouched.
    pub(super) fn load_after(&mut self, dst: Slot, addr: Operand, size: MemSize, signed: bool) -> Result<()> {
        let width = self.width_of(dst)?;
        let mut t = Operand::Slot(self.ctx.pending_taint());
        if let Some(ext) = size.sign_ext().filter(|_| signed) {
            let tmp = self.em.scratch(Width::W64)?;
            self.em.emit(Op::Ext {
                op: ext,
                width: Width::W64,
                dst: tmp,
                src: t,
            });
            t = Operand::Slot(tmp);
        }
        let addr_taint = self.taint_of(addr);
        let addr_width = self.operand_width(addr)?;
        let t = pointer::combine(
            &mut self.em,
            self.cfg,
            Access::Load,
            t,
            addr_taint,
            addr_width,
            width,
        )?;
        let shadow = self.shadow_for_write(dst)?;
        self.em.store(shadow, t);
        Ok(())
    }

    /// Stores always update memory taint, clean data included.
    pub(super) fn rule_store(&mut self, pos: usize, size: MemSize, value: Operand, addr: Operand) -> Result<()> {
        if let Operand::Slot(slot) = value {
            let width = self.width_of(slot)?;
            check_access(pos, slot, width, size)?;
        }
        let pending = self.ctx.pending_taint();
        let data_taint = self.taint_of(value);
        let addr_taint = self.taint_of(addr);
        let addr_width = self.operand_width(addr)?;
        let t = pointer::combine(
            &mut self.em,
            self.cfg,
            Access::Store,
            data_taint,
            addr_taint,
            addr_width,
            Width::W64,
        )?;
        self.em.store(pending, t);
        emit_store_hook(&mut self.em, pending, addr, size);
        Ok(())
    }
}
