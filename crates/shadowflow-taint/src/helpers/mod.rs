//! Per-helper taint policies.
//!
//! Helper calls are opaque to the rule dispatcher. Unless a policy says otherwise, the pending
//! taint register is cleared before the call and every declared output is clean afterwards.
//! Policies cover helpers that move data between guest registers and the outside world, or
//! that write guest registers behind the stream's back.

pub mod x86;

use rustc_hash::FxHashMap;
use shadowflow_ir::Slot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HelperId(pub u32);

/// Maps a call target to a stable helper identity.
pub trait HelperResolver {
    fn resolve(&self, target: u64) -> Option<HelperId>;
}

/// Table-backed resolver.
#[derive(Debug, Default, Clone)]
pub struct HelperRegistry {
    by_target: FxHashMap<u64, HelperId>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id previously registered for `target`, if any.
    pub fn register(&mut self, target: u64, id: HelperId) -> Option<HelperId> {
        self.by_target.insert(target, id)
    }

    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

impl HelperResolver for HelperRegistry {
    fn resolve(&self, target: u64) -> Option<HelperId> {
        self.by_target.get(&target).copied()
    }
}

/// What happens to the pending taint register around a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PendingTaint {
    /// Zero it before the call.
    #[default]
    Clear,
    /// Copy the shadow of call input `n` into it before the call (port writes).
    RelayInput(usize),
    /// Leave it alone; after the call every output takes its value (port reads).
    ReadIntoOutputs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivKind {
    /// AL/AH from AX.
    Byte,
    /// AX/DX.
    Word,
    /// EAX/EDX.
    Long,
}

/// Shadow updates applied after the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostCallFixup {
    CopyShadow { from: Slot, to: Slot },
    /// Accumulator divide: quotient and remainder registers become fully tainted when the
    /// divisor or the dividend carried any taint, restricted to the bytes the instruction
    /// writes.
    DivideAccumulator {
        kind: DivKind,
        divisor_input: usize,
        eax: Slot,
        edx: Slot,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HelperPolicy {
    pub pending: PendingTaint,
    /// Guest globals written by the helper with clean data.
    pub zero_globals: Vec<Slot>,
    pub fixups: Vec<PostCallFixup>,
}

impl HelperPolicy {
    pub fn relay_input(input: usize) -> Self {
        Self {
            pending: PendingTaint::RelayInput(input),
            ..Self::default()
        }
    }

    pub fn read_pending() -> Self {
        Self {
            pending: PendingTaint::ReadIntoOutputs,
            ..Self::default()
        }
    }

    pub fn zeroing(globals: impl IntoIterator<Item = Slot>) -> Self {
        Self {
            zero_globals: globals.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_fixup(mut self, fixup: PostCallFixup) -> Self {
        self.fixups.push(fixup);
        self
    }
}

/// Policies keyed by helper id.
#[derive(Debug, Default, Clone)]
pub struct HelperPolicyTable {
    policies: FxHashMap<HelperId, HelperPolicy>,
}

impl HelperPolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: HelperId, policy: HelperPolicy) -> Option<HelperPolicy> {
        self.policies.insert(id, policy)
    }

    pub fn policy_for(&self, id: HelperId) -> Option<&HelperPolicy> {
        self.policies.get(&id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
