//! Helper policies for an x86 guest.

use shadowflow_ir::Slot;

use super::{DivKind, HelperId, HelperPolicy, HelperPolicyTable, PostCallFixup};
use crate::context::CpuTaintContext;

pub const INB: HelperId = HelperId(0x100);
pub const INW: HelperId = HelperId(0x101);
pub const INL: HelperId = HelperId(0x102);
pub const OUTB: HelperId = HelperId(0x110);
pub const OUTW: HelperId = HelperId(0x111);
pub const OUTL: HelperId = HelperId(0x112);
pub const CMPXCHG8B: HelperId = HelperId(0x120);
pub const RDMSR: HelperId = HelperId(0x130);
pub const RDTSC: HelperId = HelperId(0x131);
pub const RDTSCP: HelperId = HelperId(0x132);
pub const CPUID: HelperId = HelperId(0x133);
pub const SYSEXIT: HelperId = HelperId(0x140);
pub const DIVB: HelperId = HelperId(0x150);
pub const IDIVB: HelperId = HelperId(0x151);
pub const DIVW: HelperId = HelperId(0x152);
pub const IDIVW: HelperId = HelperId(0x153);
pub const DIVL: HelperId = HelperId(0x154);
pub const IDIVL: HelperId = HelperId(0x155);

/// Port helpers take `(port, data)`.
pub const OUT_DATA_INPUT: usize = 1;
/// Divide helpers take the divisor as their only input.
pub const DIV_DIVISOR_INPUT: usize = 0;

/// Guest register globals the x86 policies refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X86Registers {
    pub eax: Slot,
    pub ecx: Slot,
    pub edx: Slot,
    pub ebx: Slot,
    pub esp: Slot,
    /// Only present when the guest pc is kept in a global.
    pub eip: Option<Slot>,
}

impl X86Registers {
    /// Look the registers up by their conventional names.
    pub fn from_context(ctx: &CpuTaintContext) -> Option<Self> {
        Some(Self {
            eax: ctx.global("eax")?,
            ecx: ctx.global("ecx")?,
            edx: ctx.global("edx")?,
            ebx: ctx.global("ebx")?,
            esp: ctx.global("esp")?,
            eip: ctx.global("eip"),
        })
    }
}

pub fn policy_table(regs: &X86Registers) -> HelperPolicyTable {
    let mut table = HelperPolicyTable::new();

    for id in [INB, INW, INL] {
        table.insert(id, HelperPolicy::read_pending());
    }
    for id in [OUTB, OUTW, OUTL] {
        table.insert(id, HelperPolicy::relay_input(OUT_DATA_INPUT));
    }

    table.insert(CMPXCHG8B, HelperPolicy::zeroing([regs.eax]));
    table.insert(RDMSR, HelperPolicy::zeroing([regs.eax, regs.edx]));
    table.insert(RDTSC, HelperPolicy::zeroing([regs.eax, regs.edx]));
    table.insert(RDTSCP, HelperPolicy::zeroing([regs.eax, regs.ecx, regs.edx]));
    table.insert(
        CPUID,
        HelperPolicy::zeroing([regs.eax, regs.ebx, regs.ecx, regs.edx]),
    );

    let mut sysexit = HelperPolicy::default().with_fixup(PostCallFixup::CopyShadow {
        from: regs.ecx,
        to: regs.esp,
    });
    if let Some(eip) = regs.eip {
        sysexit = sysexit.with_fixup(PostCallFixup::CopyShadow {
            from: regs.edx,
            to: eip,
        });
    }
    table.insert(SYSEXIT, sysexit);

    for (ids, kind) in [
        ([DIVB, IDIVB], DivKind::Byte),
        ([DIVW, IDIVW], DivKind::Word),
        ([DIVL, IDIVL], DivKind::Long),
    ] {
        for id in ids {
            table.insert(
                id,
                HelperPolicy::default().with_fixup(PostCallFixup::DivideAccumulator {
                    kind,
                    divisor_input: DIV_DIVISOR_INPUT,
                    eax: regs.eax,
                    edx: regs.edx,
                }),
            );
        }
    }

    table
}
