//! Per-CPU taint state that outlives individual blocks.

use std::sync::Arc;

use shadowflow_ir::{BlockBuilder, GlobalSet, Slot, SlotRole, Width};
use tracing::debug;

use crate::error::{Result, TaintError};

/// Shadow bindings for the guest globals of one CPU context, plus the pending-taint side
/// register that carries taint between a memory hook and the op consuming it.
///
/// Built once, before any block is compiled, and immutable afterwards. Compile threads share
/// it through an `Arc`.
#[derive(Debug)]
pub struct CpuTaintContext {
    globals: Arc<GlobalSet>,
    /// Indexed by global slot number.
    shadows: Vec<Option<Slot>>,
    pending: Slot,
    guest_globals: usize,
}

impl CpuTaintContext {
    /// Allocate a width-matched shadow for every value global in `guest`.
    pub fn new(guest: GlobalSet) -> Result<Self> {
        let guest_globals = guest.len();
        let mut set = guest;
        let originals: Vec<(Slot, String, Width, SlotRole)> = set
            .iter()
            .map(|(slot, info)| {
                let name = info.name.clone().unwrap_or_else(|| slot.to_string());
                (slot, name, info.width, info.role)
            })
            .collect();

        let mut shadows = vec![None; guest_globals];
        for (slot, name, width, role) in originals {
            if role != SlotRole::Value {
                continue;
            }
            let shadow = set.add(format!("taint_{name}"), width, SlotRole::Shadow)?;
            shadows[slot.index()] = Some(shadow);
        }
        let pending = set.add("taint_pending", Width::W64, SlotRole::Shadow)?;
        shadows.resize(set.len(), None);

        debug!(
            guest_globals,
            total_globals = set.len(),
            "allocated global shadows"
        );
        Ok(Self {
            globals: Arc::new(set),
            shadows,
            pending,
            guest_globals,
        })
    }

    pub fn globals(&self) -> &Arc<GlobalSet> {
        &self.globals
    }

    /// Number of globals that existed before shadows were added.
    pub fn guest_globals(&self) -> usize {
        self.guest_globals
    }

    pub fn shadow_of_global(&self, slot: Slot) -> Option<Slot> {
        self.shadows.get(slot.index()).copied().flatten()
    }

    /// The pending-taint side register.
    pub fn pending_taint(&self) -> Slot {
        self.pending
    }

    pub fn global(&self, name: &str) -> Option<Slot> {
        self.globals.by_name(name)
    }

    /// A builder for a block over this context's globals.
    pub fn block_builder(&self) -> BlockBuilder {
        BlockBuilder::new(self.globals.clone())
    }

    pub(crate) fn require_shadow(&self, slot: Slot) -> Result<Slot> {
        self.shadow_of_global(slot)
            .ok_or(TaintError::NotShadowable(slot))
    }
}
