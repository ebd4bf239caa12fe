//! Reference interpreter for op streams.
//!
//! Used to run translated blocks before and after instrumentation and compare the results.
//! Every write is truncated to the width of the destination slot.

use std::collections::HashMap;

use thiserror::Error;

use crate::block::Block;
use crate::op::{BinOp, BswapOp, Cond, ExtOp, Label, MemSize, Op, Operand, UnaryOp, WideOp};
use crate::runtime::{GuestBus, MemFault, TaintHooks};
use crate::slot::{GlobalSet, Slot, SlotError, Width};

pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("op {pos}: divide error")]
    DivideError { pos: usize },
    #[error("op {pos}: {fault}")]
    Memory {
        pos: usize,
        #[source]
        fault: MemFault,
    },
    #[error("branch to undefined label L{label}")]
    UnknownLabel { label: u32 },
    #[error("op {pos}: helper returned {got} values, {expected} outputs declared")]
    HelperArity {
        pos: usize,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("step limit of {0} exceeded")]
    StepLimit(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecExit {
    /// Ran off the end of the block.
    Fallthrough,
    ExitTb(u64),
}

/// Register file of one guest CPU plus the temporaries of the block being run.
#[derive(Debug, Clone)]
pub struct Machine {
    pub globals: Vec<u64>,
    temps: Vec<u64>,
    step_limit: usize,
}

impl Machine {
    pub fn new(globals: &GlobalSet) -> Self {
        Self {
            globals: vec![0; globals.len()],
            temps: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Current value of `slot`. Temporaries keep their values from the last run.
    pub fn value(&self, slot: Slot) -> u64 {
        let idx = slot.index();
        match idx.checked_sub(self.globals.len()) {
            None => self.globals[idx],
            Some(t) => self.temps.get(t).copied().unwrap_or(0),
        }
    }

    pub fn set_global(&mut self, slot: Slot, value: u64) {
        self.globals[slot.index()] = value;
    }

    pub fn run<B, H>(&mut self, block: &Block, bus: &mut B, hooks: &mut H) -> Result<ExecExit, ExecError>
    where
        B: GuestBus + ?Sized,
        H: TaintHooks + ?Sized,
    {
        self.temps.clear();
        self.temps.resize(block.slots.nb_temps(), 0);

        let labels: HashMap<Label, usize> = block
            .ops
            .iter()
            .enumerate()
            .filter_map(|(pos, op)| match op {
                Op::SetLabel { label } => Some((*label, pos)),
                _ => None,
            })
            .collect();
        let jump = |label: Label| labels.get(&label).copied().ok_or(ExecError::UnknownLabel { label: label.0 });

        let mut pc = 0usize;
        let mut steps = 0usize;
        while pc < block.ops.len() {
            steps += 1;
            if steps > self.step_limit {
                return Err(ExecError::StepLimit(self.step_limit));
            }
            let pos = pc;
            pc += 1;
            match &block.ops[pos] {
                Op::Nop | Op::SetLabel { .. } => {}
                Op::Movi { dst, value } => self.write(block, *dst, *value)?,
                Op::Mov { dst, src } => {
                    let v = self.value(*src);
                    self.write(block, *dst, v)?;
                }
                Op::Bin {
                    op,
                    width,
                    dst,
                    lhs,
                    rhs,
                } => {
                    let a = self.eval(*lhs, *width);
                    let b = self.eval(*rhs, *width);
                    let r = eval_bin(*op, *width, a, b).ok_or(ExecError::DivideError { pos })?;
                    self.write(block, *dst, r)?;
                }
                Op::Unary { op, width, dst, src } => {
                    let a = self.eval(*src, *width);
                    let r = match op {
                        UnaryOp::Not => !a,
                        UnaryOp::Neg => a.wrapping_neg(),
                    };
                    self.write(block, *dst, width.truncate(r))?;
                }
                Op::Ext { op, width, dst, src } => {
                    let a = self.eval(*src, Width::W64);
                    self.write(block, *dst, width.truncate(eval_ext(*op, a)))?;
                }
                Op::Bswap { op, width, dst, src } => {
                    let a = self.eval(*src, *width);
                    let r = match op {
                        BswapOp::B16 => (a as u16).swap_bytes() as u64,
                        BswapOp::B32 => (a as u32).swap_bytes() as u64,
                        BswapOp::B64 => a.swap_bytes(),
                    };
                    self.write(block, *dst, width.truncate(r))?;
                }
                Op::Deposit {
                    width,
                    dst,
                    base,
                    field,
                    pos: at,
                    len,
                } => {
                    let base = self.eval(*base, *width);
                    let field = self.eval(*field, *width);
                    let r = deposit(base, field, u32::from(*at), u32::from(*len));
                    self.write(block, *dst, width.truncate(r))?;
                }
                Op::Setcond {
                    cond,
                    width,
                    dst,
                    lhs,
                    rhs,
                } => {
                    let a = self.eval(*lhs, *width);
                    let b = self.eval(*rhs, *width);
                    self.write(block, *dst, u64::from(eval_cond(*cond, *width, a, b)))?;
                }
                Op::Wide {
                    op,
                    width,
                    dst_lo,
                    dst_hi,
                    lhs_lo,
                    lhs_hi,
                    rhs_lo,
                    rhs_hi,
                } => {
                    let bits = width.bits();
                    let a = join(*width, self.eval(*lhs_lo, *width), self.eval(*lhs_hi, *width));
                    let b = join(*width, self.eval(*rhs_lo, *width), self.eval(*rhs_hi, *width));
                    let r = match op {
                        WideOp::Add2 => a.wrapping_add(b),
                        WideOp::Sub2 => a.wrapping_sub(b),
                    };
                    self.write(block, *dst_lo, width.truncate(r as u64))?;
                    self.write(block, *dst_hi, width.truncate((r >> bits) as u64))?;
                }
                Op::Mulu2 {
                    width,
                    dst_lo,
                    dst_hi,
                    lhs,
                    rhs,
                } => {
                    let r = u128::from(self.eval(*lhs, *width)) * u128::from(self.eval(*rhs, *width));
                    self.write(block, *dst_lo, width.truncate(r as u64))?;
                    self.write(block, *dst_hi, width.truncate((r >> width.bits()) as u64))?;
                }
                Op::Div2 {
                    signed,
                    width,
                    quot,
                    rem,
                    lo,
                    hi,
                    divisor,
                } => {
                    let n = join(*width, self.eval(*lo, *width), self.eval(*hi, *width));
                    let d = self.eval(*divisor, *width);
                    let (q, r) = div2(*signed, *width, n, d).ok_or(ExecError::DivideError { pos })?;
                    self.write(block, *quot, q)?;
                    self.write(block, *rem, r)?;
                }
                Op::Load {
                    size,
                    signed,
                    dst,
                    addr,
                } => {
                    let addr = self.eval(*addr, Width::W64);
                    let v = bus
                        .load(addr, *size)
                        .map_err(|fault| ExecError::Memory { pos, fault })?;
                    let v = match size.sign_ext() {
                        Some(ext) if *signed => eval_ext(ext, v),
                        _ => v & size.mask(),
                    };
                    self.write(block, *dst, v)?;
                }
                Op::Store { size, value, addr } => {
                    let addr = self.eval(*addr, Width::W64);
                    let v = self.eval(*value, Width::W64) & size.mask();
                    bus.store(addr, *size, v)
                        .map_err(|fault| ExecError::Memory { pos, fault })?;
                }
                Op::Call {
                    target,
                    outputs,
                    inputs,
                } => {
                    let args: Vec<u64> = inputs.iter().map(|&i| self.eval(i, Width::W64)).collect();
                    let results = bus.call_helper(*target, &args, &mut self.globals);
                    if results.len() != outputs.len() {
                        return Err(ExecError::HelperArity {
                            pos,
                            expected: outputs.len(),
                            got: results.len(),
                        });
                    }
                    for (dst, v) in outputs.iter().zip(results) {
                        self.write(block, *dst, v)?;
                    }
                }
                Op::Discard { slot } => {
                    if !block.slots.is_global(*slot) {
                        self.write(block, *slot, 0)?;
                    }
                }
                Op::Br { label } => pc = jump(*label)?,
                Op::Brcond {
                    cond,
                    width,
                    lhs,
                    rhs,
                    label,
                } => {
                    let a = self.eval(*lhs, *width);
                    let b = self.eval(*rhs, *width);
                    if eval_cond(*cond, *width, a, b) {
                        pc = jump(*label)?;
                    }
                }
                Op::ExitTb { code } => return Ok(ExecExit::ExitTb(*code)),
                Op::LoadTaint { size, dst, addr } => {
                    let addr = self.eval(*addr, Width::W64);
                    let t = hooks.load_taint(addr, *size) & size.mask();
                    self.write(block, *dst, t)?;
                }
                Op::StoreTaint { size, taint, addr } => {
                    let addr = self.eval(*addr, Width::W64);
                    let t = self.eval(*taint, Width::W64) & size.mask();
                    hooks.store_taint(addr, *size, t);
                }
            }
        }
        Ok(ExecExit::Fallthrough)
    }

    fn eval(&self, op: Operand, width: Width) -> u64 {
        match op {
            Operand::Imm(v) => width.truncate(v),
            Operand::Slot(s) => width.truncate(self.value(s)),
        }
    }

    fn write(&mut self, block: &Block, dst: Slot, value: u64) -> Result<(), ExecError> {
        let width = block.slots.width(dst)?;
        let v = width.truncate(value);
        let idx = dst.index();
        match idx.checked_sub(self.globals.len()) {
            None => self.globals[idx] = v,
            Some(t) => self.temps[t] = v,
        }
        Ok(())
    }
}

/// `None` on division by zero.
pub fn eval_bin(op: BinOp, width: Width, a: u64, b: u64) -> Option<u64> {
    let amt = (b & u64::from(width.bits() - 1)) as u32;
    let r = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a << amt,
        BinOp::Shr => width.truncate(a) >> amt,
        BinOp::Sar => (width.sign_extend(a) >> amt) as u64,
        BinOp::Rotl => match width {
            Width::W32 => u64::from((a as u32).rotate_left(amt)),
            Width::W64 => a.rotate_left(amt),
        },
        BinOp::Rotr => match width {
            Width::W32 => u64::from((a as u32).rotate_right(amt)),
            Width::W64 => a.rotate_right(amt),
        },
        BinOp::DivU => width.truncate(a).checked_div(width.truncate(b))?,
        BinOp::RemU => width.truncate(a).checked_rem(width.truncate(b))?,
        BinOp::DivS => {
            let (a, b) = (width.sign_extend(a), width.sign_extend(b));
            if b == 0 {
                return None;
            }
            a.wrapping_div(b) as u64
        }
        BinOp::RemS => {
            let (a, b) = (width.sign_extend(a), width.sign_extend(b));
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b) as u64
        }
    };
    Some(width.truncate(r))
}

pub fn eval_ext(op: ExtOp, a: u64) -> u64 {
    match op {
        ExtOp::S8 => a as u8 as i8 as i64 as u64,
        ExtOp::U8 => a as u8 as u64,
        ExtOp::S16 => a as u16 as i16 as i64 as u64,
        ExtOp::U16 => a as u16 as u64,
        ExtOp::S32 => a as u32 as i32 as i64 as u64,
        ExtOp::U32 => a as u32 as u64,
    }
}

pub fn eval_cond(cond: Cond, width: Width, a: u64, b: u64) -> bool {
    let (sa, sb) = (width.sign_extend(a), width.sign_extend(b));
    let (ua, ub) = (width.truncate(a), width.truncate(b));
    match cond {
        Cond::Eq => ua == ub,
        Cond::Ne => ua != ub,
        Cond::LtS => sa < sb,
        Cond::LtU => ua < ub,
        Cond::LeS => sa <= sb,
        Cond::LeU => ua <= ub,
        Cond::GtS => sa > sb,
        Cond::GtU => ua > ub,
        Cond::GeS => sa >= sb,
        Cond::GeU => ua >= ub,
    }
}

pub fn deposit(base: u64, field: u64, pos: u32, len: u32) -> u64 {
    let field_mask = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };
    let mask = field_mask.checked_shl(pos).unwrap_or(0);
    (base & !mask) | (field.checked_shl(pos).unwrap_or(0) & mask)
}

fn join(width: Width, lo: u64, hi: u64) -> u128 {
    (u128::from(hi) << width.bits()) | u128::from(lo)
}

/// Double-word divide. `None` on a zero divisor or a quotient that does not fit `width`.
fn div2(signed: bool, width: Width, n: u128, d: u64) -> Option<(u64, u64)> {
    let bits = width.bits();
    if signed {
        let n = ((n << (128 - 2 * bits)) as i128) >> (128 - 2 * bits);
        let d = i128::from(width.sign_extend(d));
        let q = n.checked_div(d)?;
        let r = n.checked_rem(d)?;
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        if q < min || q > max {
            return None;
        }
        Some((width.truncate(q as u64), width.truncate(r as u64)))
    } else {
        let d = u128::from(width.truncate(d));
        let q = n.checked_div(d)?;
        let r = n % d;
        if q > u128::from(width.mask()) {
            return None;
        }
        Some((q as u64, r as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_and_rotates_respect_width() {
        assert_eq!(eval_bin(BinOp::Shl, Width::W32, 0x8000_0001, 1), Some(2));
        assert_eq!(eval_bin(BinOp::Sar, Width::W32, 0x8000_0000, 4), Some(0xf800_0000));
        assert_eq!(eval_bin(BinOp::Rotl, Width::W32, 0x8000_0001, 1), Some(3));
        assert_eq!(eval_bin(BinOp::Rotr, Width::W64, 1, 1), Some(1 << 63));
        assert_eq!(eval_bin(BinOp::Shr, Width::W32, 0xf0, 36), Some(0xf));
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(eval_bin(BinOp::DivU, Width::W32, 7, 0), None);
        assert_eq!(eval_bin(BinOp::RemS, Width::W64, 7, 0), None);
        assert_eq!(eval_bin(BinOp::DivS, Width::W32, 0xffff_fff9, 2), Some(0xffff_fffd));
    }

    #[test]
    fn deposit_replaces_field() {
        assert_eq!(deposit(0xffff_ffff, 0, 8, 8), 0xffff_00ff);
        assert_eq!(deposit(0, 0xab, 0, 64), 0xab);
        assert_eq!(deposit(0x1234, 0xff, 4, 4), 0x12f4);
    }

    #[test]
    fn double_word_divide_detects_overflow() {
        assert_eq!(div2(false, Width::W32, 100, 7), Some((14, 2)));
        assert_eq!(div2(false, Width::W32, 1 << 40, 2), None);
        assert_eq!(div2(true, Width::W32, u128::from(u64::MAX), 1), Some((0xffff_ffff, 0)));
        assert_eq!(div2(true, Width::W32, 5, 0), None);
    }
}
