use shadowflow_ir::{BswapOp, ExtOp, Op, Operand, Slot, Width};

use super::Rewriter;
use crate::error::Result;

impl Rewriter<'_> {
    /// Extension and byte swaps move taint exactly like they move data.
    pub(super) fn rule_ext(&mut self, op: ExtOp, width: Width, dst: Slot, src: Operand) -> Result<()> {
        let t = self.taint_of(src);
        if t.is_zero() {
            return self.clear_taint(dst);
        }
        let tmp = self.em.scratch(width)?;
        self.em.emit(Op::Ext {
            op,
            width,
            dst: tmp,
            src: t,
        });
        self.set_taint(dst, Operand::Slot(tmp))
    }

    pub(super) fn rule_bswap(&mut self, op: BswapOp, width: Width, dst: Slot, src: Operand) -> Result<()> {
        let t = self.taint_of(src);
        if t.is_zero() {
            return self.clear_taint(dst);
        }
        let tmp = self.em.scratch(width)?;
        self.em.emit(Op::Bswap {
            op,
            width,
            dst: tmp,
            src: t,
        });
        self.set_taint(dst, Operand::Slot(tmp))
    }

    pub(super) fn rule_deposit(
        &mut self,
        width: Width,
        dst: Slot,
        base: Operand,
        field: Operand,
        pos: u8,
        len: u8,
    ) -> Result<()> {
        let (tb, tf) = (self.taint_of(base), self.taint_of(field));
        if tb.is_zero() && tf.is_zero() {
            return self.clear_taint(dst);
        }
        if u32::from(len) >= width.bits() {
            return self.set_taint(dst, tf);
        }
        if len == 0 {
            return self.set_taint(dst, tb);
        }
        let tmp = self.em.scratch(width)?;
        self.em.emit(Op::Deposit {
            width,
            dst: tmp,
            base: tb,
            field: tf,
            pos,
            len,
        });
        self.set_taint(dst, Operand::Slot(tmp))
    }

    /// Every output is fully tainted as soon as any input bit is.
    pub(super) fn rule_any(&mut self, width: Width, inputs: &[Operand], outputs: &[Slot]) -> Result<()> {
        let taints: Vec<Operand> = inputs.iter().map(|&v| self.taint_of(v)).collect();
        if taints.iter().all(|t| t.is_zero()) {
            for &out in outputs {
                self.clear_taint(out)?;
            }
            return Ok(());
        }
        let Some(&first) = outputs.first() else {
            return Ok(());
        };
        let out_width = self.width_of(first)?;
        let any = self.em.or_all(width, &taints)?;
        let t = self.em.pcast(any, width, out_width)?;
        if let [only] = outputs {
            return self.set_taint(*only, t);
        }
        for &out in outputs {
            self.share_taint(out, t)?;
        }
        Ok(())
    }
}
