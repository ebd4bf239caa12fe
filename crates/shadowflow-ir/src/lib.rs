//! Op stream model for a dynamic binary translator's intermediate representation.
//!
//! A translated guest basic block is a [`Block`]: a linear sequence of [`Op`]s over value
//! [`Slot`]s, with optional per-guest-instruction [`SourceMeta`] kept parallel to the ops.

pub mod block;
pub mod display;
pub mod interp;
pub mod op;
pub mod runtime;
pub mod slot;

pub use block::{Block, BlockBuilder, SourceMeta};
pub use interp::{ExecError, ExecExit, Machine};
pub use op::{BinOp, BswapOp, Cond, ExtOp, Label, MemSize, Op, Operand, UnaryOp, WideOp};
pub use runtime::{GuestBus, MemFault, NoTaint, TaintHooks};
pub use slot::{GlobalSet, Slot, SlotError, SlotInfo, SlotKind, SlotRole, SlotSpace, Width, MAX_SLOTS};
