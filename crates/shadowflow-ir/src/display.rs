//! Textual dumps of op streams, one op per line.

use std::fmt;

use crate::block::Block;
use crate::op::{Cond, MemSize, Op, Operand};
use crate::slot::Width;

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Slot(s) => write!(f, "{s}"),
            Operand::Imm(v) => write!(f, "$0x{v:x}"),
        }
    }
}

fn width_suffix(width: Width) -> &'static str {
    match width {
        Width::W32 => "_i32",
        Width::W64 => "_i64",
    }
}

fn size_suffix(size: MemSize, signed: bool) -> &'static str {
    match (size, signed) {
        (MemSize::U8, false) => "8u",
        (MemSize::U8, true) => "8s",
        (MemSize::U16, false) => "16u",
        (MemSize::U16, true) => "16s",
        (MemSize::U32, false) => "32u",
        (MemSize::U32, true) => "32s",
        (MemSize::U64, _) => "64",
    }
}

fn cond_name(cond: Cond) -> &'static str {
    match cond {
        Cond::Eq => "eq",
        Cond::Ne => "ne",
        Cond::LtS => "lt",
        Cond::LtU => "ltu",
        Cond::LeS => "le",
        Cond::LeU => "leu",
        Cond::GtS => "gt",
        Cond::GtU => "gtu",
        Cond::GeS => "ge",
        Cond::GeU => "geu",
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic();
        match self {
            Op::Nop => f.write_str(name),
            Op::Movi { dst, value } => write!(f, "{name} {dst}, $0x{value:x}"),
            Op::Mov { dst, src } => write!(f, "{name} {dst}, {src}"),
            Op::Bin {
                width,
                dst,
                lhs,
                rhs,
                ..
            }
            | Op::Setcond {
                width,
                dst,
                lhs,
                rhs,
                ..
            } => {
                write!(f, "{name}{} {dst}, {lhs}, {rhs}", width_suffix(*width))?;
                if let Op::Setcond { cond, .. } = self {
                    write!(f, ", {}", cond_name(*cond))?;
                }
                Ok(())
            }
            Op::Unary { width, dst, src, .. }
            | Op::Ext { width, dst, src, .. }
            | Op::Bswap { width, dst, src, .. } => {
                write!(f, "{name}{} {dst}, {src}", width_suffix(*width))
            }
            Op::Deposit {
                width,
                dst,
                base,
                field,
                pos,
                len,
            } => write!(
                f,
                "{name}{} {dst}, {base}, {field}, {pos}, {len}",
                width_suffix(*width)
            ),
            Op::Wide {
                width,
                dst_lo,
                dst_hi,
                lhs_lo,
                lhs_hi,
                rhs_lo,
                rhs_hi,
                ..
            } => write!(
                f,
                "{name}{} {dst_lo}, {dst_hi}, {lhs_lo}, {lhs_hi}, {rhs_lo}, {rhs_hi}",
                width_suffix(*width)
            ),
            Op::Mulu2 {
                width,
                dst_lo,
                dst_hi,
                lhs,
                rhs,
            } => write!(
                f,
                "{name}{} {dst_lo}, {dst_hi}, {lhs}, {rhs}",
                width_suffix(*width)
            ),
            Op::Div2 {
                width,
                quot,
                rem,
                lo,
                hi,
                divisor,
                ..
            } => write!(
                f,
                "{name}{} {quot}, {rem}, {lo}, {hi}, {divisor}",
                width_suffix(*width)
            ),
            Op::Load {
                size,
                signed,
                dst,
                addr,
            } => write!(f, "{name}{} {dst}, [{addr}]", size_suffix(*size, *signed)),
            Op::Store { size, value, addr } => {
                write!(f, "{name}{} {value}, [{addr}]", size_suffix(*size, false))
            }
            Op::LoadTaint { size, dst, addr } => {
                write!(f, "{name}{} {dst}, [{addr}]", size.bytes())
            }
            Op::StoreTaint { size, taint, addr } => {
                write!(f, "{name}{} {taint}, [{addr}]", size.bytes())
            }
            Op::Call {
                target,
                outputs,
                inputs,
            } => {
                write!(f, "{name} 0x{target:x}")?;
                for (i, out) in outputs.iter().enumerate() {
                    f.write_str(if i == 0 { " -> " } else { ", " })?;
                    write!(f, "{out}")?;
                }
                f.write_str(" (")?;
                for (i, input) in inputs.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{input}")?;
                }
                f.write_str(")")
            }
            Op::Discard { slot } => write!(f, "{name} {slot}"),
            Op::SetLabel { label } | Op::Br { label } => write!(f, "{name} L{}", label.0),
            Op::Brcond {
                cond,
                width,
                lhs,
                rhs,
                label,
            } => write!(
                f,
                "{name}{} {lhs}, {rhs}, {}, L{}",
                width_suffix(*width),
                cond_name(*cond),
                label.0
            ),
            Op::ExitTb { code } => write!(f, "{name} $0x{code:x}"),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, op) in self.ops.iter().enumerate() {
            let meta = self.meta.as_ref().and_then(|m| m.get(pos).copied().flatten());
            if let Some(meta) = meta {
                writeln!(f, " ---- 0x{:x}", meta.pc)?;
            }
            writeln!(f, " {op}")?;
        }
        Ok(())
    }
}
