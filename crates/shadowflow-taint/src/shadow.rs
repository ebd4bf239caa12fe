//! Shadow slot bindings for the block being instrumented.

use std::sync::Arc;

use shadowflow_ir::{Slot, SlotRole, SlotSpace};

use crate::context::CpuTaintContext;
use crate::error::{Result, TaintError};

/// Maps value slots to the slots holding their taint.
///
/// Global bindings come from the [`CpuTaintContext`] and never change. Temporaries are bound
/// lazily on first need and forgotten by [`ShadowTable::reset_temporaries`] at the start of
/// every block. One table belongs to one compiling thread.
#[derive(Debug)]
pub struct ShadowTable {
    ctx: Arc<CpuTaintContext>,
    /// Indexed by temp number (slot index minus the global count).
    temps: Vec<Option<Slot>>,
}

impl ShadowTable {
    pub fn new(ctx: Arc<CpuTaintContext>) -> Self {
        Self {
            ctx,
            temps: Vec::new(),
        }
    }

    fn temp_index(&self, slot: Slot) -> Option<usize> {
        slot.index().checked_sub(self.ctx.globals().len())
    }

    pub fn shadow_of(&self, slot: Slot) -> Option<Slot> {
        match self.temp_index(slot) {
            None => self.ctx.shadow_of_global(slot),
            Some(idx) => self.temps.get(idx).copied().flatten(),
        }
    }

    /// The shadow of `slot`, allocating a width-matched temporary for it if needed.
    pub fn ensure_shadow(&mut self, space: &mut SlotSpace, slot: Slot) -> Result<Slot> {
        let Some(idx) = self.temp_index(slot) else {
            return self.ctx.require_shadow(slot);
        };
        if let Some(Some(shadow)) = self.temps.get(idx) {
            return Ok(*shadow);
        }
        let info = space.info(slot)?;
        if info.role != SlotRole::Value {
            return Err(TaintError::NotShadowable(slot));
        }
        let width = info.width;
        let shadow = space.new_temp(width, SlotRole::Shadow)?;
        if self.temps.len() <= idx {
            self.temps.resize(idx + 1, None);
        }
        self.temps[idx] = Some(shadow);
        Ok(shadow)
    }

    /// Drop the binding of a temporary that went dead. Returns the released shadow.
    pub fn release(&mut self, slot: Slot) -> Option<Slot> {
        let idx = self.temp_index(slot)?;
        self.temps.get_mut(idx).and_then(Option::take)
    }

    pub fn reset_temporaries(&mut self) {
        self.temps.clear();
    }

    pub fn bound_temporaries(&self) -> usize {
        self.temps.iter().filter(|t| t.is_some()).count()
    }
}
