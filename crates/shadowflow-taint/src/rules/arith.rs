use shadowflow_ir::{BinOp, Operand, Slot, Width};

use super::Rewriter;
use crate::error::Result;

impl Rewriter<'_> {
    pub(super) fn rule_bin(&mut self, op: BinOp, width: Width, dst: Slot, lhs: Operand, rhs: Operand) -> Result<()> {
        let (t1, t2) = (self.taint_of(lhs), self.taint_of(rhs));
        if t1.is_zero() && t2.is_zero() {
            return self.clear_taint(dst);
        }
        let t = match op {
            BinOp::And => self.and_taint(width, lhs, t1, rhs, t2)?,
            BinOp::Or => self.or_taint(width, lhs, t1, rhs, t2)?,
            BinOp::Xor => self.em.or(width, t1, t2)?,
            BinOp::Add | BinOp::Sub => self.carry_taint(op, width, lhs, t1, rhs, t2)?,
            BinOp::Mul => {
                // Taint spreads from the lowest tainted bit upwards.
                let t = self.em.or(width, t1, t2)?;
                let n = self.em.neg(width, t)?;
                self.em.or(width, t, n)?
            }
            BinOp::Shl | BinOp::Shr | BinOp::Sar | BinOp::Rotl | BinOp::Rotr => {
                let moved = self.em.bin(op, width, t1, rhs)?;
                let amount = self.em.pcast(t2, width, width)?;
                self.em.or(width, moved, amount)?
            }
            BinOp::DivS | BinOp::DivU | BinOp::RemS | BinOp::RemU => {
                let any = self.em.or(width, t1, t2)?;
                self.em.pcast(any, width, width)?
            }
        };
        self.set_taint(dst, t)
    }

    /// An untainted 0 in either operand forces a clean result bit.
    ///
    /// `(~T1 & V1 & T2) | (T1 & ~T2 & V2) | (T1 & T2)`
    fn and_taint(&mut self, w: Width, v1: Operand, t1: Operand, v2: Operand, t2: Operand) -> Result<Operand> {
        let em = &mut self.em;
        if t1.is_zero() {
            return em.and(w, v1, t2);
        }
        if t2.is_zero() {
            return em.and(w, t1, v2);
        }
        let n1 = em.not(w, t1)?;
        let a = em.and(w, n1, v1)?;
        let a = em.and(w, a, t2)?;
        let n2 = em.not(w, t2)?;
        let b = em.and(w, t1, n2)?;
        let b = em.and(w, b, v2)?;
        let c = em.and(w, t1, t2)?;
        let ab = em.or(w, a, b)?;
        em.or(w, ab, c)
    }

    /// An untainted 1 in either operand forces a clean result bit.
    ///
    /// `(~T1 & ~V1 & T2) | (T1 & ~T2 & ~V2) | (T1 & T2)`
    fn or_taint(&mut self, w: Width, v1: Operand, t1: Operand, v2: Operand, t2: Operand) -> Result<Operand> {
        let em = &mut self.em;
        if t1.is_zero() {
            let nv1 = em.not(w, v1)?;
            return em.and(w, nv1, t2);
        }
        if t2.is_zero() {
            let nv2 = em.not(w, v2)?;
            return em.and(w, t1, nv2);
        }
        let n1 = em.not(w, t1)?;
        let nv1 = em.not(w, v1)?;
        let a = em.and(w, n1, nv1)?;
        let a = em.and(w, a, t2)?;
        let n2 = em.not(w, t2)?;
        let nv2 = em.not(w, v2)?;
        let b = em.and(w, t1, n2)?;
        let b = em.and(w, b, nv2)?;
        let c = em.and(w, t1, t2)?;
        let ab = em.or(w, a, b)?;
        em.or(w, ab, c)
    }

    /// Add/sub: the operand taints, plus every bit whose result differs between the smallest
    /// and largest values the tainted bits allow (carry/borrow reach).
    fn carry_taint(
        &mut self,
        op: BinOp,
        w: Width,
        v1: Operand,
        t1: Operand,
        v2: Operand,
        t2: Operand,
    ) -> Result<Operand> {
        let em = &mut self.em;
        let t = em.or(w, t1, t2)?;
        let n1 = em.not(w, t1)?;
        let a_min = em.and(w, v1, n1)?;
        let a_max = em.or(w, v1, t1)?;
        let n2 = em.not(w, t2)?;
        let b_min = em.and(w, v2, n2)?;
        let b_max = em.or(w, v2, t2)?;
        let (lo, hi) = match op {
            BinOp::Sub => (em.bin(op, w, a_min, b_max)?, em.bin(op, w, a_max, b_min)?),
            _ => (em.bin(op, w, a_min, b_min)?, em.bin(op, w, a_max, b_max)?),
        };
        let reach = em.bin(BinOp::Xor, w, lo, hi)?;
        em.or(w, t, reach)
    }
}
