use crate::slot::{Slot, Width};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Slot(Slot),
    Imm(u64),
}

impl Operand {
    pub const ZERO: Operand = Operand::Imm(0);

    pub fn slot(self) -> Option<Slot> {
        match self {
            Operand::Slot(s) => Some(s),
            Operand::Imm(_) => None,
        }
    }

    pub fn is_zero(self) -> bool {
        matches!(self, Operand::Imm(0))
    }
}

impl From<Slot> for Operand {
    fn from(slot: Slot) -> Self {
        Operand::Slot(slot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Rotl,
    Rotr,
    DivS,
    DivU,
    RemS,
    RemU,
}

impl BinOp {
    pub fn is_shift(self) -> bool {
        matches!(
            self,
            BinOp::Shl | BinOp::Shr | BinOp::Sar | BinOp::Rotl | BinOp::Rotr
        )
    }

    pub fn is_div(self) -> bool {
        matches!(self, BinOp::DivS | BinOp::DivU | BinOp::RemS | BinOp::RemU)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Sign/zero extension from the low 8/16/32 bits of the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtOp {
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BswapOp {
    B16,
    B32,
    B64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    LtS,
    LtU,
    LeS,
    LeU,
    GtS,
    GtU,
    GeS,
    GeU,
}

/// Double-word add/subtract on `(hi:lo)` pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WideOp {
    Add2,
    Sub2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemSize {
    U8,
    U16,
    U32,
    U64,
}

impl MemSize {
    pub const fn bytes(self) -> usize {
        match self {
            MemSize::U8 => 1,
            MemSize::U16 => 2,
            MemSize::U32 => 4,
            MemSize::U64 => 8,
        }
    }

    pub const fn mask(self) -> u64 {
        match self {
            MemSize::U8 => 0xff,
            MemSize::U16 => 0xffff,
            MemSize::U32 => 0xffff_ffff,
            MemSize::U64 => u64::MAX,
        }
    }

    /// The extension a signed load of this size performs.
    pub const fn sign_ext(self) -> Option<ExtOp> {
        match self {
            MemSize::U8 => Some(ExtOp::S8),
            MemSize::U16 => Some(ExtOp::S16),
            MemSize::U32 => Some(ExtOp::S32),
            MemSize::U64 => None,
        }
    }
}

/// One IR operation.
///
/// Each op names its output slots and input operands explicitly. `LoadTaint` and `StoreTaint`
/// are the memory-taint runtime hooks; translators never produce them, only the taint
/// instrumentation pass does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Nop,
    Movi {
        dst: Slot,
        value: u64,
    },
    Mov {
        dst: Slot,
        src: Slot,
    },
    Bin {
        op: BinOp,
        width: Width,
        dst: Slot,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnaryOp,
        width: Width,
        dst: Slot,
        src: Operand,
    },
    Ext {
        op: ExtOp,
        width: Width,
        dst: Slot,
        src: Operand,
    },
    Bswap {
        op: BswapOp,
        width: Width,
        dst: Slot,
        src: Operand,
    },
    /// `dst = base` with bits `[pos, pos + len)` replaced by the low `len` bits of `field`.
    Deposit {
        width: Width,
        dst: Slot,
        base: Operand,
        field: Operand,
        pos: u8,
        len: u8,
    },
    Setcond {
        cond: Cond,
        width: Width,
        dst: Slot,
        lhs: Operand,
        rhs: Operand,
    },
    Wide {
        op: WideOp,
        width: Width,
        dst_lo: Slot,
        dst_hi: Slot,
        lhs_lo: Operand,
        lhs_hi: Operand,
        rhs_lo: Operand,
        rhs_hi: Operand,
    },
    /// Unsigned widening multiply.
    Mulu2 {
        width: Width,
        dst_lo: Slot,
        dst_hi: Slot,
        lhs: Operand,
        rhs: Operand,
    },
    /// `(hi:lo) / divisor` producing quotient and remainder.
    Div2 {
        signed: bool,
        width: Width,
        quot: Slot,
        rem: Slot,
        lo: Operand,
        hi: Operand,
        divisor: Operand,
    },
    Load {
        size: MemSize,
        signed: bool,
        dst: Slot,
        addr: Operand,
    },
    Store {
        size: MemSize,
        value: Operand,
        addr: Operand,
    },
    Call {
        target: u64,
        outputs: Vec<Slot>,
        inputs: Vec<Operand>,
    },
    Discard {
        slot: Slot,
    },
    SetLabel {
        label: Label,
    },
    Br {
        label: Label,
    },
    Brcond {
        cond: Cond,
        width: Width,
        lhs: Operand,
        rhs: Operand,
        label: Label,
    },
    ExitTb {
        code: u64,
    },
    /// Fetch the taint of `size` bytes at `addr` into `dst`.
    LoadTaint {
        size: MemSize,
        dst: Slot,
        addr: Operand,
    },
    /// Record `taint` for `size` bytes at `addr`.
    StoreTaint {
        size: MemSize,
        taint: Operand,
        addr: Operand,
    },
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::Movi { .. } => "movi",
            Op::Mov { .. } => "mov",
            Op::Bin { op, .. } => match op {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::Mul => "mul",
                BinOp::And => "and",
                BinOp::Or => "or",
                BinOp::Xor => "xor",
                BinOp::Shl => "shl",
                BinOp::Shr => "shr",
                BinOp::Sar => "sar",
                BinOp::Rotl => "rotl",
                BinOp::Rotr => "rotr",
                BinOp::DivS => "div",
                BinOp::DivU => "divu",
                BinOp::RemS => "rem",
                BinOp::RemU => "remu",
            },
            Op::Unary { op: UnaryOp::Not, .. } => "not",
            Op::Unary { op: UnaryOp::Neg, .. } => "neg",
            Op::Ext { op, .. } => match op {
                ExtOp::S8 => "ext8s",
                ExtOp::U8 => "ext8u",
                ExtOp::S16 => "ext16s",
                ExtOp::U16 => "ext16u",
                ExtOp::S32 => "ext32s",
                ExtOp::U32 => "ext32u",
            },
            Op::Bswap { op, .. } => match op {
                BswapOp::B16 => "bswap16",
                BswapOp::B32 => "bswap32",
                BswapOp::B64 => "bswap64",
            },
            Op::Deposit { .. } => "deposit",
            Op::Setcond { .. } => "setcond",
            Op::Wide { op: WideOp::Add2, .. } => "add2",
            Op::Wide { op: WideOp::Sub2, .. } => "sub2",
            Op::Mulu2 { .. } => "mulu2",
            Op::Div2 { signed: true, .. } => "div2",
            Op::Div2 { signed: false, .. } => "divu2",
            Op::Load { .. } => "ld",
            Op::Store { .. } => "st",
            Op::Call { .. } => "call",
            Op::Discard { .. } => "discard",
            Op::SetLabel { .. } => "set_label",
            Op::Br { .. } => "br",
            Op::Brcond { .. } => "brcond",
            Op::ExitTb { .. } => "exit_tb",
            Op::LoadTaint { .. } => "ld_taint",
            Op::StoreTaint { .. } => "st_taint",
        }
    }

    /// Slots written by this op.
    pub fn outputs(&self) -> Vec<Slot> {
        match self {
            Op::Movi { dst, .. }
            | Op::Mov { dst, .. }
            | Op::Bin { dst, .. }
            | Op::Unary { dst, .. }
            | Op::Ext { dst, .. }
            | Op::Bswap { dst, .. }
            | Op::Deposit { dst, .. }
            | Op::Setcond { dst, .. }
            | Op::Load { dst, .. }
            | Op::LoadTaint { dst, .. } => vec![*dst],
            Op::Wide { dst_lo, dst_hi, .. } | Op::Mulu2 { dst_lo, dst_hi, .. } => {
                vec![*dst_lo, *dst_hi]
            }
            Op::Div2 { quot, rem, .. } => vec![*quot, *rem],
            Op::Call { outputs, .. } => outputs.clone(),
            Op::Nop
            | Op::Store { .. }
            | Op::Discard { .. }
            | Op::SetLabel { .. }
            | Op::Br { .. }
            | Op::Brcond { .. }
            | Op::ExitTb { .. }
            | Op::StoreTaint { .. } => Vec::new(),
        }
    }

    /// Operands read by this op.
    pub fn inputs(&self) -> Vec<Operand> {
        match self {
            Op::Mov { src, .. } => vec![Operand::Slot(*src)],
            Op::Bin { lhs, rhs, .. }
            | Op::Setcond { lhs, rhs, .. }
            | Op::Brcond { lhs, rhs, .. }
            | Op::Mulu2 { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Unary { src, .. } | Op::Ext { src, .. } | Op::Bswap { src, .. } => vec![*src],
            Op::Deposit { base, field, .. } => vec![*base, *field],
            Op::Wide {
                lhs_lo,
                lhs_hi,
                rhs_lo,
                rhs_hi,
                ..
            } => vec![*lhs_lo, *lhs_hi, *rhs_lo, *rhs_hi],
            Op::Div2 { lo, hi, divisor, .. } => vec![*lo, *hi, *divisor],
            Op::Load { addr, .. } | Op::LoadTaint { addr, .. } => vec![*addr],
            Op::Store { value, addr, .. } => vec![*value, *addr],
            Op::StoreTaint { taint, addr, .. } => vec![*taint, *addr],
            Op::Call { inputs, .. } => inputs.clone(),
            Op::Nop
            | Op::Movi { .. }
            | Op::Discard { .. }
            | Op::SetLabel { .. }
            | Op::Br { .. }
            | Op::ExitTb { .. } => Vec::new(),
        }
    }

    pub fn is_taint_hook(&self) -> bool {
        matches!(self, Op::LoadTaint { .. } | Op::StoreTaint { .. })
    }
}
