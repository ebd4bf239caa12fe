mod common;

use common::{Harness, RAM};
use shadowflow_ir::{ExecError, MemSize, Op, Operand, Width};
use shadowflow_taint::{TaintConfig, TaintError};

const W: Width = Width::W32;

#[test]
fn stores_carry_data_taint_into_memory() {
    let mut h = Harness::enabled();
    h.shadow_mem.write_taint(0x1000, MemSize::U16, 0x00ff);
    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(Op::Load {
        size: MemSize::U16,
        signed: false,
        dst: t,
        addr: Operand::Imm(0x1000),
    });
    b.push(Op::Store {
        size: MemSize::U32,
        value: Operand::Slot(t),
        addr: Operand::Imm(0x2000),
    });
    h.instrument_and_run(b.finish());
    assert_eq!(h.shadow_mem.read_taint(0x2000, MemSize::U32), 0x0000_00ff);
}

#[test]
fn clean_stores_wash_out_memory_taint() {
    let mut h = Harness::enabled();
    h.shadow_mem.write_taint(0x2000, MemSize::U32, 0xffff_ffff);
    let mut b = h.ctx.block_builder();
    b.push(Op::Store {
        size: MemSize::U16,
        value: Operand::Imm(0x1234),
        addr: Operand::Imm(0x2000),
    });
    h.instrument_and_run(b.finish());
    assert_eq!(h.shadow_mem.read_taint(0x2000, MemSize::U32), 0xffff_0000);
    assert_eq!(h.bus.mem[0x2000..0x2002], [0x34, 0x12]);
}

#[test]
fn stores_move_global_taint() {
    let mut h = Harness::enabled();
    let ecx = h.regs.ecx;
    h.set_global_taint(ecx, 0x00ff_00ff);
    let mut b = h.ctx.block_builder();
    b.push(Op::Store {
        size: MemSize::U32,
        value: Operand::Slot(ecx),
        addr: Operand::Imm(0x3000),
    });
    h.instrument_and_run(b.finish());
    assert_eq!(h.shadow_mem.read_taint(0x3000, MemSize::U32), 0x00ff_00ff);
}

/// `t = ld32 [0x1000]` (the address), then `ld32 [t]` and `st32 [t], 7`.
fn access_through_tainted_pointer(config: TaintConfig) -> (Harness, shadowflow_ir::Slot) {
    let mut h = Harness::new(config);
    h.write_mem(0x1000, &0x4000u32.to_le_bytes());
    h.shadow_mem.write_taint(0x1000, MemSize::U32, 0x0000_00ff);
    h.shadow_mem.write_taint(0x4000, MemSize::U32, 0x0000_0f00);

    let mut b = h.ctx.block_builder();
    let ptr = b.temp(W).unwrap();
    let data = b.temp(W).unwrap();
    b.push(Op::Load {
        size: MemSize::U32,
        signed: false,
        dst: ptr,
        addr: Operand::Imm(0x1000),
    });
    b.push(Op::Load {
        size: MemSize::U32,
        signed: false,
        dst: data,
        addr: Operand::Slot(ptr),
    });
    b.push(Op::Store {
        size: MemSize::U32,
        value: Operand::Imm(7),
        addr: Operand::Slot(ptr),
    });
    h.instrument_and_run(b.finish());
    (h, data)
}

#[test]
fn pointer_taint_is_ignored_by_default() {
    let (h, data) = access_through_tainted_pointer(TaintConfig::enabled());
    assert_eq!(h.taint(data), 0x0000_0f00);
    assert_eq!(h.shadow_mem.read_taint(0x4000, MemSize::U32), 0);
}

#[test]
fn pointer_taint_for_loads_taints_the_whole_value() {
    let (h, data) =
        access_through_tainted_pointer(TaintConfig::enabled().with_pointer_tainting(true, false));
    assert_eq!(h.taint(data), 0xffff_ffff);
    assert_eq!(h.shadow_mem.read_taint(0x4000, MemSize::U32), 0);
}

#[test]
fn pointer_taint_for_stores_taints_the_stored_bytes() {
    let (h, data) =
        access_through_tainted_pointer(TaintConfig::enabled().with_pointer_tainting(false, true));
    assert_eq!(h.taint(data), 0x0000_0f00);
    assert_eq!(h.shadow_mem.read_taint(0x4000, MemSize::U32), 0xffff_ffff);
    assert_eq!(h.shadow_mem.read_taint(0x4004, MemSize::U32), 0);
}

#[test]
fn signed_loads_extend_the_taint_sign_bit() {
    let mut h = Harness::enabled();
    h.write_mem(0x1000, &[0x80]);
    h.shadow_mem.write_taint(0x1000, MemSize::U8, 0x80);
    let mut b = h.ctx.block_builder();
    let s = b.temp(W).unwrap();
    let u = b.temp(W).unwrap();
    for (dst, signed) in [(s, true), (u, false)] {
        b.push(Op::Load {
            size: MemSize::U8,
            signed,
            dst,
            addr: Operand::Imm(0x1000),
        });
    }
    h.instrument_and_run(b.finish());
    assert_eq!(h.value(s), 0xffff_ff80);
    assert_eq!(h.taint(s), 0xffff_ff80);
    assert_eq!(h.value(u), 0x80);
    assert_eq!(h.taint(u), 0x80);
}

#[test]
fn taint_fetch_precedes_a_load_that_overwrites_its_address() {
    let mut h = Harness::enabled();
    h.write_mem(0x1000, &0x2000u32.to_le_bytes());
    h.write_mem(0x2000, &0xdeadu32.to_le_bytes());
    h.shadow_mem.write_taint(0x2000, MemSize::U32, 0xff00_0000);

    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(Op::Movi { dst: t, value: 0x1000 });
    b.push(Op::Load {
        size: MemSize::U32,
        signed: false,
        dst: t,
        addr: Operand::Slot(t),
    });
    b.push(Op::Load {
        size: MemSize::U32,
        signed: false,
        dst: t,
        addr: Operand::Slot(t),
    });
    let block = h.instrument_and_run(b.finish());

    let hooks: Vec<usize> = block
        .ops
        .iter()
        .enumerate()
        .filter(|(_, op)| matches!(op, Op::LoadTaint { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(hooks.len(), 2);
    for i in hooks {
        assert!(matches!(block.ops[i + 1], Op::Load { .. }));
    }
    assert_eq!(h.value(t), 0xdead);
    assert_eq!(h.taint(t), 0xff00_0000);
}

#[test]
fn oversized_accesses_are_rejected() {
    let mut h = Harness::enabled();
    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(Op::Nop);
    b.push(Op::Load {
        size: MemSize::U64,
        signed: false,
        dst: t,
        addr: Operand::Imm(0),
    });
    let err = h.pass.process(b.finish()).unwrap_err();
    assert!(
        matches!(err, TaintError::WidthMismatch { pos: 1, slot, size: 8, width: 32 } if slot == t),
        "{err}"
    );

    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(Op::Store {
        size: MemSize::U64,
        value: Operand::Slot(t),
        addr: Operand::Imm(0),
    });
    assert!(matches!(
        h.pass.process(b.finish()),
        Err(TaintError::WidthMismatch { pos: 0, .. })
    ));
}

#[test]
fn faulting_load_leaves_the_destination_shadow_alone() {
    let mut h = Harness::enabled();
    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    h.shadow_mem.write_taint(0x1000, MemSize::U32, 0x0000_ff00);
    b.push(Op::Load {
        size: MemSize::U32,
        signed: false,
        dst: t,
        addr: Operand::Imm(0x1000),
    });
    b.push(Op::Load {
        size: MemSize::U32,
        signed: false,
        dst: t,
        addr: Operand::Imm(RAM + 0x100),
    });
    let block = h.pass.process(b.finish()).unwrap();
    let err = h.run(&block).unwrap_err();
    assert!(matches!(err, ExecError::Memory { .. }), "{err}");
    assert_eq!(h.taint(t), 0x0000_ff00);
}
