#![allow(dead_code)]

use std::sync::Arc;

use shadowflow_ir::{
    Block, ExecError, ExecExit, GlobalSet, GuestBus, Machine, MemFault, MemSize, Slot, SlotRole,
    Width,
};
use shadowflow_mem::ShadowMemory;
use shadowflow_taint::helpers::x86::{self, X86Registers};
use shadowflow_taint::{
    CpuTaintContext, HelperPolicyTable, HelperRegistry, Instrumenter, TaintConfig,
};

pub const RAM: u64 = 0x1_0000;

// Call targets the test translator emits.
pub const T_INB: u64 = 0xf000;
pub const T_OUTB: u64 = 0xf010;
pub const T_CPUID: u64 = 0xf020;
pub const T_RDTSC: u64 = 0xf030;
pub const T_SYSEXIT: u64 = 0xf040;
pub const T_DIVB: u64 = 0xf050;
pub const T_DIVW: u64 = 0xf060;
pub const T_DIVL: u64 = 0xf070;
/// Not registered: returns the sum of its arguments.
pub const T_SUM: u64 = 0xf100;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn x86_context() -> Arc<CpuTaintContext> {
    let mut g = GlobalSet::new();
    for name in ["eax", "ecx", "edx", "ebx", "esp", "eip"] {
        g.add(name, Width::W32, SlotRole::Value).unwrap();
    }
    g.add("rflags", Width::W64, SlotRole::Value).unwrap();
    Arc::new(CpuTaintContext::new(g).unwrap())
}

pub fn x86_registry() -> HelperRegistry {
    let mut reg = HelperRegistry::new();
    reg.register(T_INB, x86::INB);
    reg.register(T_OUTB, x86::OUTB);
    reg.register(T_CPUID, x86::CPUID);
    reg.register(T_RDTSC, x86::RDTSC);
    reg.register(T_SYSEXIT, x86::SYSEXIT);
    reg.register(T_DIVB, x86::DIVB);
    reg.register(T_DIVW, x86::DIVW);
    reg.register(T_DIVL, x86::DIVL);
    reg
}

/// Guest memory plus a handful of x86-flavoured helpers.
pub struct TestBus {
    pub mem: Vec<u8>,
    pub regs: X86Registers,
    pub pending: Slot,
    /// Taint the device attaches to port reads.
    pub port_taint: u64,
    pub port_value: u64,
    /// Pending taint observed by the last port write.
    pub out_taint: Option<u64>,
}

impl GuestBus for TestBus {
    fn load(&mut self, addr: u64, size: MemSize) -> Result<u64, MemFault> {
        let start = addr as usize;
        let bytes = self
            .mem
            .get(start..start + size.bytes())
            .ok_or(MemFault { addr, size })?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn store(&mut self, addr: u64, size: MemSize, value: u64) -> Result<(), MemFault> {
        let start = addr as usize;
        let dst = self
            .mem
            .get_mut(start..start + size.bytes())
            .ok_or(MemFault { addr, size })?;
        dst.copy_from_slice(&value.to_le_bytes()[..size.bytes()]);
        Ok(())
    }

    fn call_helper(&mut self, target: u64, args: &[u64], globals: &mut [u64]) -> Vec<u64> {
        let r = self.regs;
        let g = |s: Slot| s.index();
        match target {
            T_INB => {
                globals[g(self.pending)] = self.port_taint;
                vec![self.port_value]
            }
            T_OUTB => {
                self.out_taint = Some(globals[g(self.pending)]);
                Vec::new()
            }
            T_CPUID => {
                globals[g(r.eax)] = 0x0d;
                globals[g(r.ebx)] = 0x756e_6547;
                globals[g(r.ecx)] = 0x6c65_746e;
                globals[g(r.edx)] = 0x4965_6e69;
                Vec::new()
            }
            T_RDTSC => {
                globals[g(r.eax)] = 0x1234;
                globals[g(r.edx)] = 0;
                Vec::new()
            }
            T_SYSEXIT => {
                globals[g(r.esp)] = globals[g(r.ecx)];
                if let Some(eip) = r.eip {
                    globals[g(eip)] = globals[g(r.edx)];
                }
                Vec::new()
            }
            T_DIVB => {
                let d = args[0] & 0xff;
                let ax = globals[g(r.eax)] & 0xffff;
                if d != 0 {
                    let (q, rem) = ((ax / d) & 0xff, (ax % d) & 0xff);
                    globals[g(r.eax)] = (globals[g(r.eax)] & !0xffff) | (rem << 8) | q;
                }
                Vec::new()
            }
            T_DIVW => {
                let d = args[0] & 0xffff;
                let n = ((globals[g(r.edx)] & 0xffff) << 16) | (globals[g(r.eax)] & 0xffff);
                if d != 0 {
                    globals[g(r.eax)] = (globals[g(r.eax)] & !0xffff) | ((n / d) & 0xffff);
                    globals[g(r.edx)] = (globals[g(r.edx)] & !0xffff) | ((n % d) & 0xffff);
                }
                Vec::new()
            }
            T_DIVL => {
                let d = args[0] & 0xffff_ffff;
                let n = (globals[g(r.edx)] << 32) | globals[g(r.eax)];
                if d != 0 {
                    globals[g(r.eax)] = (n / d) & 0xffff_ffff;
                    globals[g(r.edx)] = (n % d) & 0xffff_ffff;
                }
                Vec::new()
            }
            T_SUM => vec![args.iter().fold(0u64, |a, b| a.wrapping_add(*b))],
            _ => Vec::new(),
        }
    }
}

pub struct Harness {
    pub ctx: Arc<CpuTaintContext>,
    pub regs: X86Registers,
    pub pass: Instrumenter,
    pub machine: Machine,
    pub bus: TestBus,
    pub shadow_mem: ShadowMemory,
}

impl Harness {
    pub fn new(config: TaintConfig) -> Self {
        init_tracing();
        let ctx = x86_context();
        let regs = X86Registers::from_context(&ctx).unwrap();
        let policies: HelperPolicyTable = x86::policy_table(&regs);
        let pass = Instrumenter::new(
            config,
            ctx.clone(),
            Arc::new(policies),
            Arc::new(x86_registry()),
        );
        let machine = Machine::new(ctx.globals());
        let bus = TestBus {
            mem: vec![0; RAM as usize],
            regs,
            pending: ctx.pending_taint(),
            port_taint: 0,
            port_value: 0,
            out_taint: None,
        };
        Self {
            shadow_mem: ShadowMemory::new(RAM),
            ctx,
            regs,
            pass,
            machine,
            bus,
        }
    }

    pub fn enabled() -> Self {
        Self::new(TaintConfig::enabled())
    }

    pub fn run(&mut self, block: &Block) -> Result<ExecExit, ExecError> {
        self.machine.run(block, &mut self.bus, &mut self.shadow_mem)
    }

    pub fn instrument_and_run(&mut self, block: Block) -> Block {
        let block = self.pass.process(block).unwrap();
        self.run(&block).unwrap();
        block
    }

    /// Run-time taint of `slot` after the last run; unbound slots are clean.
    pub fn taint(&self, slot: Slot) -> u64 {
        self.pass
            .shadow_table()
            .shadow_of(slot)
            .map_or(0, |s| self.machine.value(s))
    }

    pub fn value(&self, slot: Slot) -> u64 {
        self.machine.value(slot)
    }

    pub fn set_global_taint(&mut self, slot: Slot, taint: u64) {
        let shadow = self.ctx.shadow_of_global(slot).unwrap();
        self.machine.set_global(shadow, taint);
    }

    pub fn write_mem(&mut self, addr: u64, bytes: &[u8]) {
        self.bus.mem[addr as usize..addr as usize + bytes.len()].copy_from_slice(bytes);
    }
}
