//! Taint propagation rules, one family per submodule.
//!
//! The [`Rewriter`] walks the input stream once. For each op it emits the shadow computation
//! (before the op, or after it for loads and calls), then the op itself. Shadow computations
//! read input shadows before anything writes the output shadow, so `dst` may alias any input.
//!
//! In straight-line code a temporary read before its first write holds no taint, so shadows
//! are bound lazily on first write. Once a block branches, a read can observe a write that
//! comes later in the stream; such blocks bind and clear every temporary's shadow up front
//! (see [`Rewriter::pin_temporaries`]).

mod arith;
mod call;
mod convert;
mod memory;

use shadowflow_ir::{MemSize, Op, Operand, Slot, SlotRole, SourceMeta, Width};

use crate::config::TaintConfig;
use crate::context::CpuTaintContext;
use crate::emit::Emitter;
use crate::error::{Result, TaintError};
use crate::helpers::{HelperId, HelperPolicy, HelperPolicyTable, HelperResolver};
use crate::shadow::ShadowTable;

/// Shadow work that has to follow the original op.
enum After<'p> {
    Load {
        dst: Slot,
        size: MemSize,
        signed: bool,
        addr: Operand,
    },
    Call {
        outputs: Vec<Slot>,
        inputs: Vec<Operand>,
        policy: Option<(HelperId, &'p HelperPolicy)>,
    },
}

pub(crate) struct Rewriter<'a> {
    pub(crate) cfg: &'a TaintConfig,
    pub(crate) ctx: &'a CpuTaintContext,
    pub(crate) policies: &'a HelperPolicyTable,
    pub(crate) resolver: &'a dyn HelperResolver,
    pub(crate) shadows: &'a mut ShadowTable,
    pub(crate) em: Emitter,
    pub(crate) fast_paths: usize,
    /// Every value temporary is bound for the whole block; `Discard` keeps the binding.
    pub(crate) pinned: bool,
}

/// Whether any op of `ops` jumps to a label inside the block.
pub(crate) fn has_branches(ops: &[Op]) -> bool {
    ops.iter()
        .any(|op| matches!(op, Op::Br { .. } | Op::Brcond { .. }))
}

impl<'a> Rewriter<'a> {
    /// Bind a shadow to every value temporary `ops` touches and clear it at the block head.
    pub(crate) fn pin_temporaries(&mut self, ops: &[Op]) -> Result<()> {
        self.pinned = true;
        for op in ops {
            let inputs = op.inputs().into_iter().filter_map(Operand::slot);
            for slot in op.outputs().into_iter().chain(inputs) {
                if self.em.slots.is_global(slot) || self.shadows.shadow_of(slot).is_some() {
                    continue;
                }
                // Shadow and scratch slots are rejected by the op that carries them.
                if self.em.slots.info(slot)?.role != SlotRole::Value {
                    continue;
                }
                let shadow = self.shadow_for_write(slot)?;
                self.em.assign(shadow, Operand::ZERO);
            }
        }
        Ok(())
    }

    pub(crate) fn rewrite(&mut self, pos: usize, op: Op, meta: Option<SourceMeta>) -> Result<()> {
        let after = self.before(pos, &op)?;
        self.em.original(op, meta);
        if let Some(after) = after {
            self.after(after)?;
        }
        self.em.recycle_scratch();
        Ok(())
    }

    fn before(&mut self, pos: usize, op: &Op) -> Result<Option<After<'a>>> {
        match op {
            Op::LoadTaint { .. } | Op::StoreTaint { .. } => {
                return Err(TaintError::UnsupportedOp {
                    pos,
                    opcode: op.mnemonic(),
                });
            }
            Op::Nop
            | Op::SetLabel { .. }
            | Op::Br { .. }
            | Op::Brcond { .. }
            | Op::ExitTb { .. } => {}
            Op::Movi { dst, .. } => self.clear_taint(*dst)?,
            Op::Mov { dst, src } => {
                let t = self.taint_of(Operand::Slot(*src));
                self.set_taint(*dst, t)?;
            }
            Op::Bin {
                op,
                width,
                dst,
                lhs,
                rhs,
            } => self.rule_bin(*op, *width, *dst, *lhs, *rhs)?,
            // Bitwise complement and negation keep every bit's dependency.
            Op::Unary { dst, src, .. } => {
                let t = self.taint_of(*src);
                self.set_taint(*dst, t)?;
            }
            Op::Ext { op, width, dst, src } => self.rule_ext(*op, *width, *dst, *src)?,
            Op::Bswap { op, width, dst, src } => self.rule_bswap(*op, *width, *dst, *src)?,
            Op::Deposit {
                width,
                dst,
                base,
                field,
                pos: at,
                len,
            } => self.rule_deposit(*width, *dst, *base, *field, *at, *len)?,
            Op::Setcond {
                width, dst, lhs, rhs, ..
            } => self.rule_any(*width, &[*lhs, *rhs], &[*dst])?,
            Op::Wide {
                width,
                dst_lo,
                dst_hi,
                lhs_lo,
                lhs_hi,
                rhs_lo,
                rhs_hi,
                ..
            } => self.rule_any(*width, &[*lhs_lo, *lhs_hi, *rhs_lo, *rhs_hi], &[*dst_lo, *dst_hi])?,
            Op::Mulu2 {
                width,
                dst_lo,
                dst_hi,
                lhs,
                rhs,
            } => self.rule_any(*width, &[*lhs, *rhs], &[*dst_lo, *dst_hi])?,
            Op::Div2 {
                width,
                quot,
                rem,
                lo,
                hi,
                divisor,
                ..
            } => self.rule_any(*width, &[*lo, *hi, *divisor], &[*quot, *rem])?,
            Op::Discard { slot } => {
                let shadow = if self.pinned {
                    self.shadows.shadow_of(*slot)
                } else {
                    self.shadows.release(*slot)
                };
                if let Some(shadow) = shadow {
                    self.em.emit(Op::Discard { slot: shadow });
                }
            }
            Op::Load {
                size,
                signed,
                dst,
                addr,
            } => {
                self.load_before(pos, *dst, *addr, *size)?;
                return Ok(Some(After::Load {
                    dst: *dst,
                    size: *size,
                    signed: *signed,
                    addr: *addr,
                }));
            }
            Op::Store { size, value, addr } => self.rule_store(pos, *size, *value, *addr)?,
            Op::Call {
                target,
                outputs,
                inputs,
            } => {
                let policy = self.call_before(*target, inputs)?;
                return Ok(Some(After::Call {
                    outputs: outputs.clone(),
                    inputs: inputs.clone(),
                    policy,
                }));
            }
        }
        Ok(None)
    }

    fn after(&mut self, after: After<'a>) -> Result<()> {
        match after {
            After::Load {
                dst,
                size,
                signed,
                addr,
            } => self.load_after(dst, addr, size, signed),
            After::Call {
                outputs,
                inputs,
                policy,
            } => self.call_after(&outputs, &inputs, policy),
        }
    }

    /// Shadow of an operand; immediates and unbound slots are clean.
    pub(crate) fn taint_of(&self, v: Operand) -> Operand {
        match v {
            Operand::Imm(_) => Operand::ZERO,
            Operand::Slot(s) => self
                .shadows
                .shadow_of(s)
                .map_or(Operand::ZERO, Operand::Slot),
        }
    }

    pub(crate) fn width_of(&self, slot: Slot) -> Result<Width> {
        Ok(self.em.slots.width(slot)?)
    }

    pub(crate) fn operand_width(&self, v: Operand) -> Result<Width> {
        match v {
            Operand::Slot(s) => self.width_of(s),
            Operand::Imm(_) => Ok(Width::W64),
        }
    }

    pub(crate) fn shadow_for_write(&mut self, dst: Slot) -> Result<Slot> {
        self.shadows.ensure_shadow(&mut self.em.slots, dst)
    }

    /// `shadow(dst) = t`. `t` must not be needed afterwards.
    pub(crate) fn set_taint(&mut self, dst: Slot, t: Operand) -> Result<()> {
        if t.is_zero() {
            return self.clear_taint(dst);
        }
        let shadow = self.shadow_for_write(dst)?;
        self.em.store(shadow, t);
        Ok(())
    }

    /// `shadow(dst) = t`, leaving `t` intact for further readers.
    pub(crate) fn share_taint(&mut self, dst: Slot, t: Operand) -> Result<()> {
        if t.is_zero() {
            return self.clear_taint(dst);
        }
        let shadow = self.shadow_for_write(dst)?;
        self.em.assign(shadow, t);
        Ok(())
    }

    /// The output is statically clean. Only an existing binding needs resetting; an unbound
    /// temporary already reads as clean.
    pub(crate) fn clear_taint(&mut self, dst: Slot) -> Result<()> {
        match self.shadows.shadow_of(dst) {
            Some(shadow) => self.em.assign(shadow, Operand::ZERO),
            None => {
                if self.em.slots.is_global(dst) {
                    return Err(TaintError::NotShadowable(dst));
                }
                self.fast_paths += 1;
            }
        }
        Ok(())
    }
}
