//! Address-taint propagation into loaded and stored data.

use shadowflow_ir::{Operand, Width};

use crate::config::TaintConfig;
use crate::emit::Emitter;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Load,
    Store,
}

pub fn applies(cfg: &TaintConfig, access: Access) -> bool {
    match access {
        Access::Load => cfg.pointer_tainting_for_loads,
        Access::Store => cfg.pointer_tainting_for_stores,
    }
}

/// Data taint for an access through an address with shadow `addr_taint`.
///
/// With pointer tainting on for this access kind, any taint on the address taints every bit
/// of the data. Otherwise the data taint is returned unchanged.
pub(crate) fn combine(
    em: &mut Emitter,
    cfg: &TaintConfig,
    access: Access,
    data_taint: Operand,
    addr_taint: Operand,
    addr_width: Width,
    width: Width,
) -> Result<Operand> {
    if !applies(cfg, access) || addr_taint.is_zero() {
        return Ok(data_taint);
    }
    let forced = em.pcast(addr_taint, addr_width, width)?;
    em.or(width, data_taint, forced)
}
