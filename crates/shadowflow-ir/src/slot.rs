//! Value slots: the guest-visible globals shared by every block of a CPU context, and the
//! per-block temporaries.
//!
//! Slot numbering is dense. Indices `[0, nb_globals)` name globals; every index at or above
//! `nb_globals` names a temporary of the owning [`SlotSpace`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Hard ceiling on the number of slots (globals + temporaries) a single block may address.
pub const MAX_SLOTS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    W32,
    W64,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::W32 => 32,
            Width::W64 => 64,
        }
    }

    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    pub const fn mask(self) -> u64 {
        match self {
            Width::W32 => 0xffff_ffff,
            Width::W64 => u64::MAX,
        }
    }

    #[inline]
    pub const fn truncate(self, v: u64) -> u64 {
        v & self.mask()
    }

    /// Sign-extend the low `bits()` of `v` to a full `i64`.
    #[inline]
    pub const fn sign_extend(self, v: u64) -> i64 {
        match self {
            Width::W32 => v as u32 as i32 as i64,
            Width::W64 => v as i64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub u32);

impl Slot {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Global,
    Temp,
}

/// What a slot holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRole {
    /// Guest data (registers, translator temporaries).
    Value,
    /// The taint mask of some value slot.
    Shadow,
    /// Short-lived working storage used while computing a taint mask.
    Scratch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotInfo {
    pub kind: SlotKind,
    pub width: Width,
    pub role: SlotRole,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("slot limit of {limit} exhausted")]
    Exhausted { limit: usize },
    #[error("slot {0} is not defined")]
    Unknown(Slot),
}

/// The set of global slots of one CPU context.
///
/// Globals are registered while the context is being set up and the set is frozen behind an
/// `Arc` afterwards; blocks only ever borrow it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalSet {
    infos: Vec<SlotInfo>,
}

impl GlobalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, width: Width, role: SlotRole) -> Result<Slot, SlotError> {
        if self.infos.len() >= MAX_SLOTS {
            return Err(SlotError::Exhausted { limit: MAX_SLOTS });
        }
        let slot = Slot(self.infos.len() as u32);
        self.infos.push(SlotInfo {
            kind: SlotKind::Global,
            width,
            role,
            name: Some(name.into()),
        });
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn info(&self, slot: Slot) -> Option<&SlotInfo> {
        self.infos.get(slot.index())
    }

    pub fn by_name(&self, name: &str) -> Option<Slot> {
        self.infos
            .iter()
            .position(|info| info.name.as_deref() == Some(name))
            .map(|idx| Slot(idx as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &SlotInfo)> {
        self.infos
            .iter()
            .enumerate()
            .map(|(idx, info)| (Slot(idx as u32), info))
    }
}

/// All slots a block can address: the shared globals followed by its own temporaries.
#[derive(Clone, Debug)]
pub struct SlotSpace {
    globals: Arc<GlobalSet>,
    temps: Vec<SlotInfo>,
    limit: usize,
}

impl SlotSpace {
    pub fn new(globals: Arc<GlobalSet>) -> Self {
        Self::with_limit(globals, MAX_SLOTS)
    }

    pub fn with_limit(globals: Arc<GlobalSet>, limit: usize) -> Self {
        Self {
            globals,
            temps: Vec::new(),
            limit,
        }
    }

    pub fn globals(&self) -> &Arc<GlobalSet> {
        &self.globals
    }

    pub fn nb_globals(&self) -> usize {
        self.globals.len()
    }

    pub fn nb_temps(&self) -> usize {
        self.temps.len()
    }

    pub fn len(&self) -> usize {
        self.nb_globals() + self.nb_temps()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn new_temp(&mut self, width: Width, role: SlotRole) -> Result<Slot, SlotError> {
        if self.len() >= self.limit {
            return Err(SlotError::Exhausted { limit: self.limit });
        }
        let slot = Slot(self.len() as u32);
        self.temps.push(SlotInfo {
            kind: SlotKind::Temp,
            width,
            role,
            name: None,
        });
        Ok(slot)
    }

    pub fn is_global(&self, slot: Slot) -> bool {
        slot.index() < self.nb_globals()
    }

    /// Index of `slot` among the temporaries, if it is one.
    pub fn temp_index(&self, slot: Slot) -> Option<usize> {
        slot.index()
            .checked_sub(self.nb_globals())
            .filter(|&idx| idx < self.temps.len())
    }

    pub fn info(&self, slot: Slot) -> Result<&SlotInfo, SlotError> {
        if self.is_global(slot) {
            return self.globals.info(slot).ok_or(SlotError::Unknown(slot));
        }
        self.temp_index(slot)
            .map(|idx| &self.temps[idx])
            .ok_or(SlotError::Unknown(slot))
    }

    pub fn width(&self, slot: Slot) -> Result<Width, SlotError> {
        self.info(slot).map(|info| info.width)
    }
}
