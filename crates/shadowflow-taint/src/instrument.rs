use std::sync::Arc;

use shadowflow_ir::Block;
use tracing::{debug, trace, Level};

use crate::config::TaintConfig;
use crate::context::CpuTaintContext;
use crate::emit::Emitter;
use crate::error::{Result, TaintError};
use crate::helpers::{HelperPolicyTable, HelperResolver};
use crate::reindex::MetaWriter;
use crate::rules::{has_branches, Rewriter};
use crate::shadow::ShadowTable;

/// Counters for the most recently processed block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentStats {
    pub ops_in: usize,
    pub ops_out: usize,
    pub inserted: usize,
    /// Shadow temporaries bound while instrumenting.
    pub shadow_temps: usize,
    pub scratch_temps: usize,
    /// Ops whose outputs were statically clean and needed no shadow work.
    pub fast_paths: usize,
}

/// The taint instrumentation pass.
///
/// Owns the shadow table of one compiling thread; the CPU context and helper policies are
/// shared. Each call consumes the translated block and returns the instrumented one.
pub struct Instrumenter {
    config: TaintConfig,
    ctx: Arc<CpuTaintContext>,
    policies: Arc<HelperPolicyTable>,
    resolver: Arc<dyn HelperResolver + Send + Sync>,
    shadows: ShadowTable,
    stats: InstrumentStats,
}

impl Instrumenter {
    pub fn new(
        config: TaintConfig,
        ctx: Arc<CpuTaintContext>,
        policies: Arc<HelperPolicyTable>,
        resolver: Arc<dyn HelperResolver + Send + Sync>,
    ) -> Self {
        Self {
            config,
            shadows: ShadowTable::new(ctx.clone()),
            ctx,
            policies,
            resolver,
            stats: InstrumentStats::default(),
        }
    }

    pub fn config(&self) -> &TaintConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<CpuTaintContext> {
        &self.ctx
    }

    /// Shadow bindings of the most recently instrumented block.
    pub fn shadow_table(&self) -> &ShadowTable {
        &self.shadows
    }

    pub fn stats(&self) -> InstrumentStats {
        self.stats
    }

    /// Instrument `block` if taint tracking is enabled; otherwise return it untouched.
    pub fn process(&mut self, block: Block) -> Result<Block> {
        if !self.config.taint_tracking_enabled {
            trace!(ops = block.ops.len(), "taint tracking disabled, block passed through");
            self.stats = InstrumentStats {
                ops_in: block.ops.len(),
                ops_out: block.ops.len(),
                ..InstrumentStats::default()
            };
            return Ok(block);
        }
        self.instrument(block)
    }

    /// Rewrite `block` so every value slot's shadow follows the data.
    ///
    /// On error nothing is returned; the caller must abandon the block.
    pub fn instrument(&mut self, block: Block) -> Result<Block> {
        if !Arc::ptr_eq(block.slots.globals(), self.ctx.globals()) {
            return Err(TaintError::ContextMismatch);
        }
        if tracing::enabled!(Level::TRACE) {
            trace!("before taint instrumentation:\n{block}");
        }

        self.shadows.reset_temporaries();
        let Block { slots, ops, meta } = block;
        let ops_in = ops.len();
        let temps_in = slots.nb_temps();
        let writer = match meta.as_deref() {
            Some(entries) => Some(MetaWriter::new(entries, ops_in)?),
            None => None,
        };

        let mut rw = Rewriter {
            cfg: &self.config,
            ctx: &self.ctx,
            policies: &self.policies,
            resolver: self.resolver.as_ref(),
            shadows: &mut self.shadows,
            em: Emitter::new(slots, writer, ops_in * 3),
            fast_paths: 0,
            pinned: false,
        };
        if has_branches(&ops) {
            rw.pin_temporaries(&ops)?;
        }
        for (pos, op) in ops.into_iter().enumerate() {
            let entry = meta.as_ref().and_then(|m| m[pos]);
            rw.rewrite(pos, op, entry)?;
        }

        let fast_paths = rw.fast_paths;
        let inserted = rw.em.inserted();
        let scratch_temps = rw.em.scratch_allocated();
        let (slots, ops, meta) = rw.em.finish()?;
        let block = Block { slots, ops, meta };

        self.stats = InstrumentStats {
            ops_in,
            ops_out: block.ops.len(),
            inserted,
            shadow_temps: block.slots.nb_temps() - temps_in - scratch_temps,
            scratch_temps,
            fast_paths,
        };
        debug!(
            ops_in,
            ops_out = self.stats.ops_out,
            shadow_temps = self.stats.shadow_temps,
            fast_paths,
            "instrumented block"
        );
        if tracing::enabled!(Level::TRACE) {
            trace!("after taint instrumentation:\n{block}");
        }
        Ok(block)
    }
}

impl std::fmt::Debug for Instrumenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumenter")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
