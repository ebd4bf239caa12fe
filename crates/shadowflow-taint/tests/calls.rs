mod common;

use std::sync::Arc;

use common::*;
use shadowflow_ir::{MemSize, Op, Operand, Slot, Width};
use shadowflow_taint::helpers::x86;
use shadowflow_taint::{
    HelperId, HelperPolicy, HelperPolicyTable, HelperRegistry, Instrumenter, TaintConfig,
    TaintError,
};

const W: Width = Width::W32;

fn call(target: u64, outputs: Vec<Slot>, inputs: Vec<Operand>) -> Op {
    Op::Call {
        target,
        outputs,
        inputs,
    }
}

fn load(dst: Slot, addr: u64) -> Op {
    Op::Load {
        size: MemSize::U32,
        signed: false,
        dst,
        addr: Operand::Imm(addr),
    }
}

#[test]
fn unknown_helpers_return_clean_values() {
    let mut h = Harness::enabled();
    let pending = h.ctx.pending_taint();
    h.machine.set_global(pending, 0xdead);
    h.write_mem(0x1000, &5u32.to_le_bytes());
    h.shadow_mem.write_taint(0x1000, MemSize::U32, 0xffff_ffff);

    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(load(t, 0x1000));
    b.push(call(T_SUM, vec![t], vec![Operand::Slot(t), Operand::Imm(2)]));
    h.instrument_and_run(b.finish());

    assert_eq!(h.value(t), 7);
    assert_eq!(h.taint(t), 0);
    assert_eq!(h.value(pending), 0);
}

#[test]
fn port_reads_take_the_pending_taint() {
    let mut h = Harness::enabled();
    h.bus.port_value = 0x41;
    h.bus.port_taint = 0xff;
    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(call(T_INB, vec![t], vec![Operand::Imm(0x60)]));
    h.instrument_and_run(b.finish());
    assert_eq!(h.value(t), 0x41);
    assert_eq!(h.taint(t), 0xff);
}

#[test]
fn port_writes_relay_the_data_taint() {
    let mut h = Harness::enabled();
    h.shadow_mem.write_taint(0x1000, MemSize::U32, 0xff00);
    let mut b = h.ctx.block_builder();
    let t = b.temp(W).unwrap();
    b.push(load(t, 0x1000));
    b.push(call(T_OUTB, vec![], vec![Operand::Imm(0x3f8), Operand::Slot(t)]));
    h.instrument_and_run(b.finish());
    assert_eq!(h.bus.out_taint, Some(0xff00));

    let pending = h.ctx.pending_taint();
    h.machine.set_global(pending, 0xffff);
    let mut b = h.ctx.block_builder();
    b.push(call(T_OUTB, vec![], vec![Operand::Imm(0x3f8), Operand::Imm(b'A'.into())]));
    h.instrument_and_run(b.finish());
    assert_eq!(h.bus.out_taint, Some(0));
}

#[test]
fn cpuid_and_rdtsc_clean_the_registers_they_write() {
    let mut h = Harness::enabled();
    let r = h.regs;
    for reg in [r.eax, r.ebx, r.ecx, r.edx, r.esp] {
        h.set_global_taint(reg, 0xffff_ffff);
    }
    let mut b = h.ctx.block_builder();
    b.push(call(T_RDTSC, vec![], vec![]));
    h.instrument_and_run(b.finish());
    assert_eq!((h.taint(r.eax), h.taint(r.edx)), (0, 0));
    assert_eq!(h.taint(r.ecx), 0xffff_ffff);
    assert_eq!(h.value(r.eax), 0x1234);

    let mut b = h.ctx.block_builder();
    b.push(call(T_CPUID, vec![], vec![]));
    h.instrument_and_run(b.finish());
    for reg in [r.eax, r.ebx, r.ecx, r.edx] {
        assert_eq!(h.taint(reg), 0, "{reg}");
    }
    assert_eq!(h.taint(r.esp), 0xffff_ffff);
    assert_eq!(h.value(r.ebx), 0x756e_6547);
}

#[test]
fn sysexit_moves_stack_and_pc_taint() {
    let mut h = Harness::enabled();
    let r = h.regs;
    let eip = r.eip.unwrap();
    h.machine.set_global(r.ecx, 0x8000);
    h.machine.set_global(r.edx, 0x40_1000);
    h.set_global_taint(r.ecx, 0x0000_00ff);
    h.set_global_taint(r.edx, 0x00ff_0000);
    let mut b = h.ctx.block_builder();
    b.push(call(T_SYSEXIT, vec![], vec![]));
    h.instrument_and_run(b.finish());
    assert_eq!(h.value(r.esp), 0x8000);
    assert_eq!(h.value(eip), 0x40_1000);
    assert_eq!(h.taint(r.esp), 0x0000_00ff);
    assert_eq!(h.taint(eip), 0x00ff_0000);
}

#[test]
fn long_divide_taints_both_result_registers() {
    let mut h = Harness::enabled();
    let r = h.regs;
    h.machine.set_global(r.eax, 100);
    h.set_global_taint(r.eax, 0x1);
    let mut b = h.ctx.block_builder();
    b.push(call(T_DIVL, vec![], vec![Operand::Imm(7)]));
    h.instrument_and_run(b.finish());
    assert_eq!((h.value(r.eax), h.value(r.edx)), (14, 2));
    assert_eq!(h.taint(r.eax), 0xffff_ffff);
    assert_eq!(h.taint(r.edx), 0xffff_ffff);
}

#[test]
fn clean_long_divide_stays_clean() {
    let mut h = Harness::enabled();
    let r = h.regs;
    h.machine.set_global(r.eax, 100);
    let mut b = h.ctx.block_builder();
    b.push(call(T_DIVL, vec![], vec![Operand::Imm(7)]));
    h.instrument_and_run(b.finish());
    assert_eq!((h.taint(r.eax), h.taint(r.edx)), (0, 0));
}

#[test]
fn byte_divide_only_touches_ax() {
    let mut h = Harness::enabled();
    let r = h.regs;
    h.write_mem(0x1000, &3u32.to_le_bytes());
    h.shadow_mem.write_taint(0x1000, MemSize::U32, 0x1);
    h.machine.set_global(r.eax, 100);
    h.set_global_taint(r.eax, 0xff00_0000);
    h.set_global_taint(r.edx, 0x0000_00f0);

    let mut b = h.ctx.block_builder();
    let d = b.temp(W).unwrap();
    b.push(load(d, 0x1000));
    b.push(call(T_DIVB, vec![], vec![Operand::Slot(d)]));
    h.instrument_and_run(b.finish());

    // AL = 33, AH = 1
    assert_eq!(h.value(r.eax) & 0xffff, 0x0121);
    assert_eq!(h.taint(r.eax), 0xff00_ffff);
    assert_eq!(h.taint(r.edx), 0x0000_00f0);
}

#[test]
fn word_divide_taints_ax_and_dx() {
    let mut h = Harness::enabled();
    let r = h.regs;
    h.write_mem(0x1000, &3u32.to_le_bytes());
    h.shadow_mem.write_taint(0x1000, MemSize::U32, 0x1);
    h.machine.set_global(r.eax, 100);

    let mut b = h.ctx.block_builder();
    let d = b.temp(W).unwrap();
    b.push(load(d, 0x1000));
    b.push(call(T_DIVW, vec![], vec![Operand::Slot(d)]));
    h.instrument_and_run(b.finish());

    assert_eq!((h.value(r.eax), h.value(r.edx)), (33, 1));
    assert_eq!(h.taint(r.eax), 0x0000_ffff);
    assert_eq!(h.taint(r.edx), 0x0000_ffff);
}

#[test]
fn policies_referencing_missing_inputs_are_rejected() {
    let mut h = Harness::enabled();
    let mut b = h.ctx.block_builder();
    b.push(call(T_DIVL, vec![], vec![]));
    assert_eq!(
        h.pass.process(b.finish()).unwrap_err(),
        TaintError::BadHelperPolicy {
            helper: x86::DIVL,
            reason: "divisor input 0 but the call has 0 inputs".to_string(),
        }
    );

    const PORT_OUT: HelperId = HelperId(7);
    let mut policies = HelperPolicyTable::new();
    policies.insert(PORT_OUT, HelperPolicy::relay_input(3));
    let mut registry = HelperRegistry::new();
    registry.register(0x9000, PORT_OUT);
    let mut pass = Instrumenter::new(
        TaintConfig::enabled(),
        h.ctx.clone(),
        Arc::new(policies),
        Arc::new(registry),
    );
    let mut b = h.ctx.block_builder();
    b.push(call(0x9000, vec![], vec![Operand::Imm(1)]));
    assert!(matches!(
        pass.process(b.finish()),
        Err(TaintError::BadHelperPolicy { helper: PORT_OUT, .. })
    ));
}
