use std::sync::Arc;

use crate::op::{Label, Op};
use crate::slot::{GlobalSet, Slot, SlotError, SlotRole, SlotSpace, Width};

/// Per-guest-instruction metadata attached to the op that starts the instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceMeta {
    pub pc: u64,
    /// Guest instruction count within the block, starting at 0.
    pub icount: u16,
    /// Architecture-specific state needed to restore the CPU at this point (condition-code
    /// state on x86, conditional-execution bits on ARM).
    pub arch_state: u32,
}

/// A straight-line sequence of ops produced by translating one guest basic block.
///
/// When `meta` is present it runs parallel to `ops`: `meta[i]` describes `ops[i]`, and only the
/// first op of each guest instruction carries an entry.
#[derive(Clone, Debug)]
pub struct Block {
    pub slots: SlotSpace,
    pub ops: Vec<Op>,
    pub meta: Option<Vec<Option<SourceMeta>>>,
}

impl Block {
    pub fn new(slots: SlotSpace) -> Self {
        Self {
            slots,
            ops: Vec::new(),
            meta: None,
        }
    }

    /// Guest pc of the instruction op `pos` belongs to.
    pub fn source_pc(&self, pos: usize) -> Option<u64> {
        self.source_meta(pos).map(|m| m.pc)
    }

    /// Metadata of the nearest instruction start at or before `pos`.
    pub fn source_meta(&self, pos: usize) -> Option<&SourceMeta> {
        let meta = self.meta.as_ref()?;
        if pos >= meta.len() {
            return None;
        }
        meta[..=pos].iter().rev().find_map(|m| m.as_ref())
    }

    pub fn instruction_count(&self) -> usize {
        self.meta
            .as_ref()
            .map_or(0, |meta| meta.iter().filter(|m| m.is_some()).count())
    }
}

/// Convenience builder used by translators and tests.
#[derive(Debug)]
pub struct BlockBuilder {
    block: Block,
    pending_meta: Option<SourceMeta>,
    next_label: u32,
    icount: u16,
}

impl BlockBuilder {
    pub fn new(globals: Arc<GlobalSet>) -> Self {
        Self {
            block: Block::new(SlotSpace::new(globals)),
            pending_meta: None,
            next_label: 0,
            icount: 0,
        }
    }

    /// Start recording per-instruction metadata. Must be called before the first op.
    pub fn with_metadata(mut self) -> Self {
        self.block.meta = Some(Vec::new());
        self
    }

    pub fn temp(&mut self, width: Width) -> Result<Slot, SlotError> {
        self.block.slots.new_temp(width, SlotRole::Value)
    }

    pub fn label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Mark the start of a guest instruction; the next pushed op carries its metadata.
    pub fn insn_start(&mut self, pc: u64, arch_state: u32) {
        self.pending_meta = Some(SourceMeta {
            pc,
            icount: self.icount,
            arch_state,
        });
        self.icount += 1;
    }

    pub fn push(&mut self, op: Op) -> &mut Self {
        if let Some(meta) = self.block.meta.as_mut() {
            meta.push(self.pending_meta.take());
        }
        self.block.ops.push(op);
        self
    }

    pub fn globals(&self) -> &Arc<GlobalSet> {
        self.block.slots.globals()
    }

    pub fn finish(self) -> Block {
        self.block
    }
}
