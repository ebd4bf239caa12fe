use shadowflow_ir::{Slot, SlotError};
use thiserror::Error;

use crate::helpers::HelperId;

/// Errors raised while instrumenting a block.
///
/// Every variant is fatal for the block being translated: no partial stream is produced and
/// the translator must not run the block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaintError {
    /// The input stream contains an op the dispatcher has no rule for. Taint-hook ops in the
    /// input mean the stream was already instrumented.
    #[error("op {pos}: unsupported opcode `{opcode}` in instrumentation input")]
    UnsupportedOp { pos: usize, opcode: &'static str },

    #[error("shadow slot allocation failed: limit of {limit} slots reached")]
    ShadowExhausted { limit: usize },

    #[error("op {pos}: {size}-byte access does not fit {width}-bit slot {slot}")]
    WidthMismatch {
        pos: usize,
        slot: Slot,
        size: usize,
        width: u32,
    },

    #[error(
        "metadata desync: {ops} ops vs {entries} entries, {starts_out} instruction starts (expected {starts_in})"
    )]
    MetadataDesync {
        ops: usize,
        entries: usize,
        starts_in: usize,
        starts_out: usize,
    },

    #[error("slot {0} cannot carry a shadow")]
    NotShadowable(Slot),

    #[error("slot {0} is not defined")]
    UnknownSlot(Slot),

    #[error("block globals do not belong to this taint context")]
    ContextMismatch,

    #[error("helper {helper:?}: {reason}")]
    BadHelperPolicy { helper: HelperId, reason: String },
}

impl From<SlotError> for TaintError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::Exhausted { limit } => TaintError::ShadowExhausted { limit },
            SlotError::Unknown(slot) => TaintError::UnknownSlot(slot),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaintError>;
