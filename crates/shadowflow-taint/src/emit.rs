//! Output stream construction for the instrumentation pass.
//!
//! The helpers here work on [`Operand`]s so that statically clean shadows (`Imm(0)`) fold away
//! instead of producing ops.

use shadowflow_ir::interp::eval_bin;
use shadowflow_ir::{BinOp, Cond, Op, Operand, Slot, SlotRole, SlotSpace, SourceMeta, UnaryOp, Width};

use crate::error::Result;
use crate::reindex::MetaWriter;

/// Scratch temporaries are recycled after every original op.
#[derive(Debug, Default)]
struct ScratchPool {
    free: Vec<(Width, Slot)>,
    busy: Vec<(Width, Slot)>,
    allocated: usize,
}

#[derive(Debug)]
pub(crate) struct Emitter {
    pub(crate) slots: SlotSpace,
    ops: Vec<Op>,
    meta: Option<MetaWriter>,
    scratch: ScratchPool,
    inserted: usize,
}

impl Emitter {
    pub(crate) fn new(slots: SlotSpace, meta: Option<MetaWriter>, capacity: usize) -> Self {
        Self {
            slots,
            ops: Vec::with_capacity(capacity),
            meta,
            scratch: ScratchPool::default(),
            inserted: 0,
        }
    }

    /// Append an instrumentation op.
    pub(crate) fn emit(&mut self, op: Op) {
        if let Some(meta) = self.meta.as_mut() {
            meta.inserted();
        }
        self.inserted += 1;
        self.ops.push(op);
    }

    /// Append an op of the input stream together with its metadata entry.
    pub(crate) fn original(&mut self, op: Op, meta: Option<SourceMeta>) {
        if let Some(writer) = self.meta.as_mut() {
            writer.original(meta);
        }
        self.ops.push(op);
    }

    pub(crate) fn inserted(&self) -> usize {
        self.inserted
    }

    pub(crate) fn scratch_allocated(&self) -> usize {
        self.scratch.allocated
    }

    pub(crate) fn scratch(&mut self, width: Width) -> Result<Slot> {
        let pool = &mut self.scratch;
        let slot = match pool.free.iter().position(|(w, _)| *w == width) {
            Some(idx) => pool.free.swap_remove(idx).1,
            None => {
                pool.allocated += 1;
                self.slots.new_temp(width, SlotRole::Scratch)?
            }
        };
        self.scratch.busy.push((width, slot));
        Ok(slot)
    }

    pub(crate) fn recycle_scratch(&mut self) {
        let pool = &mut self.scratch;
        pool.free.append(&mut pool.busy);
    }

    pub(crate) fn finish(self) -> Result<(SlotSpace, Vec<Op>, Option<Vec<Option<SourceMeta>>>)> {
        let meta = match self.meta {
            Some(writer) => Some(writer.finish(self.ops.len())?),
            None => None,
        };
        Ok((self.slots, self.ops, meta))
    }

    /// `dst = v`.
    pub(crate) fn assign(&mut self, dst: Slot, v: Operand) {
        match v {
            Operand::Imm(value) => self.emit(Op::Movi { dst, value }),
            Operand::Slot(src) if src == dst => {}
            Operand::Slot(src) => self.emit(Op::Mov { dst, src }),
        }
    }

    /// `dst = v` where `v` is dead afterwards. A scratch result of the last emitted op is
    /// written to `dst` directly instead of being copied.
    pub(crate) fn store(&mut self, dst: Slot, v: Operand) {
        if let Operand::Slot(src) = v {
            let is_scratch = self
                .slots
                .info(src)
                .is_ok_and(|info| info.role == SlotRole::Scratch);
            if is_scratch {
                if let Some(last) = self.ops.last_mut() {
                    if retarget(last, src, dst) {
                        return;
                    }
                }
            }
        }
        self.assign(dst, v);
    }

    /// `op(a, b)` as an operand, folding constants and identities.
    pub(crate) fn bin(&mut self, op: BinOp, width: Width, a: Operand, b: Operand) -> Result<Operand> {
        if let Some(folded) = fold_bin(op, width, a, b) {
            return Ok(folded);
        }
        let dst = self.scratch(width)?;
        self.emit(Op::Bin {
            op,
            width,
            dst,
            lhs: a,
            rhs: b,
        });
        Ok(Operand::Slot(dst))
    }

    /// `dst = op(a, b)`.
    pub(crate) fn bin_into(&mut self, dst: Slot, op: BinOp, width: Width, a: Operand, b: Operand) {
        match fold_bin(op, width, a, b) {
            Some(v) => self.assign(dst, v),
            None => self.emit(Op::Bin {
                op,
                width,
                dst,
                lhs: a,
                rhs: b,
            }),
        }
    }

    pub(crate) fn and(&mut self, width: Width, a: Operand, b: Operand) -> Result<Operand> {
        self.bin(BinOp::And, width, a, b)
    }

    pub(crate) fn or(&mut self, width: Width, a: Operand, b: Operand) -> Result<Operand> {
        self.bin(BinOp::Or, width, a, b)
    }

    pub(crate) fn not(&mut self, width: Width, a: Operand) -> Result<Operand> {
        self.unary(UnaryOp::Not, width, a)
    }

    pub(crate) fn neg(&mut self, width: Width, a: Operand) -> Result<Operand> {
        self.unary(UnaryOp::Neg, width, a)
    }

    fn unary(&mut self, op: UnaryOp, width: Width, a: Operand) -> Result<Operand> {
        if let Operand::Imm(v) = a {
            let r = match op {
                UnaryOp::Not => !v,
                UnaryOp::Neg => v.wrapping_neg(),
            };
            return Ok(Operand::Imm(width.truncate(r)));
        }
        let dst = self.scratch(width)?;
        self.emit(Op::Unary {
            op,
            width,
            dst,
            src: a,
        });
        Ok(Operand::Slot(dst))
    }

    /// Pessimistic cast: all ones at `width` if any bit of `a` (read at `src_width`) is set.
    pub(crate) fn pcast(&mut self, a: Operand, src_width: Width, width: Width) -> Result<Operand> {
        if let Operand::Imm(v) = a {
            let any = src_width.truncate(v) != 0;
            return Ok(Operand::Imm(if any { width.mask() } else { 0 }));
        }
        let flag = self.scratch(width)?;
        self.emit(Op::Setcond {
            cond: Cond::Ne,
            width: src_width,
            dst: flag,
            lhs: a,
            rhs: Operand::ZERO,
        });
        self.neg(width, Operand::Slot(flag))
    }

    /// OR of every operand, folded.
    pub(crate) fn or_all(&mut self, width: Width, items: &[Operand]) -> Result<Operand> {
        let mut acc = Operand::ZERO;
        for &item in items {
            acc = self.or(width, acc, item)?;
        }
        Ok(acc)
    }
}

fn retarget(op: &mut Op, from: Slot, to: Slot) -> bool {
    let dst = match op {
        Op::Movi { dst, .. }
        | Op::Mov { dst, .. }
        | Op::Bin { dst, .. }
        | Op::Unary { dst, .. }
        | Op::Ext { dst, .. }
        | Op::Bswap { dst, .. }
        | Op::Deposit { dst, .. }
        | Op::Setcond { dst, .. } => dst,
        _ => return false,
    };
    if *dst != from {
        return false;
    }
    *dst = to;
    true
}

fn fold_bin(op: BinOp, width: Width, a: Operand, b: Operand) -> Option<Operand> {
    let mask = width.mask();
    let imm = |o: Operand| match o {
        Operand::Imm(v) => Some(width.truncate(v)),
        Operand::Slot(_) => None,
    };
    if let (Some(x), Some(y)) = (imm(a), imm(b)) {
        return eval_bin(op, width, x, y).map(Operand::Imm);
    }
    let (ia, ib) = (imm(a), imm(b));
    match op {
        BinOp::And => match (ia, ib) {
            (Some(0), _) | (_, Some(0)) => Some(Operand::ZERO),
            (Some(m), _) if m == mask => Some(b),
            (_, Some(m)) if m == mask => Some(a),
            _ => None,
        },
        BinOp::Or => match (ia, ib) {
            (Some(0), _) => Some(b),
            (_, Some(0)) => Some(a),
            (Some(m), _) | (_, Some(m)) if m == mask => Some(Operand::Imm(mask)),
            _ => None,
        },
        BinOp::Xor | BinOp::Add => match (ia, ib) {
            (Some(0), _) => Some(b),
            (_, Some(0)) => Some(a),
            _ => None,
        },
        BinOp::Sub => match ib {
            Some(0) => Some(a),
            _ => None,
        },
        BinOp::Shl | BinOp::Shr | BinOp::Sar | BinOp::Rotl | BinOp::Rotr => match (ia, ib) {
            (Some(0), _) => Some(Operand::ZERO),
            (_, Some(0)) => Some(a),
            _ => None,
        },
        BinOp::Mul => match (ia, ib) {
            (Some(0), _) | (_, Some(0)) => Some(Operand::ZERO),
            _ => None,
        },
        BinOp::DivS | BinOp::DivU | BinOp::RemS | BinOp::RemU => None,
    }
}
