//! Dynamic taint-propagation instrumentation for translated blocks.
//!
//! Every value slot of a [`Block`](shadowflow_ir::Block) gets a shadow slot of the same width
//! whose bit `i` is set when bit `i` of the value may depend on tainted input. The
//! [`Instrumenter`] rewrites a block so shadows are updated alongside the data: arithmetic and
//! logic get bit-precise rules, memory accesses go through the [`MemoryTaintHooks`] runtime,
//! and helper calls follow a [`HelperPolicyTable`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use shadowflow_ir::{GlobalSet, SlotRole, Width};
//! use shadowflow_taint::{CpuTaintContext, HelperPolicyTable, HelperRegistry, Instrumenter, TaintConfig};
//!
//! let mut globals = GlobalSet::new();
//! globals.add("eax", Width::W32, SlotRole::Value).unwrap();
//! let ctx = Arc::new(CpuTaintContext::new(globals).unwrap());
//! let mut pass = Instrumenter::new(
//!     TaintConfig::enabled(),
//!     ctx.clone(),
//!     Arc::new(HelperPolicyTable::new()),
//!     Arc::new(HelperRegistry::new()),
//! );
//! let block = ctx.block_builder().finish();
//! let instrumented = pass.process(block).unwrap();
//! # let _ = instrumented;
//! ```

pub mod config;
pub mod context;
mod emit;
pub mod error;
pub mod helpers;
mod instrument;
pub mod memhooks;
pub mod pointer;
mod reindex;
mod rules;
pub mod shadow;

pub use config::TaintConfig;
pub use context::CpuTaintContext;
pub use error::{Result, TaintError};
pub use helpers::{
    DivKind, HelperId, HelperPolicy, HelperPolicyTable, HelperRegistry, HelperResolver,
    PendingTaint, PostCallFixup,
};
pub use instrument::{InstrumentStats, Instrumenter};
pub use memhooks::MemoryTaintHooks;
pub use shadow::ShadowTable;
