use shadowflow_ir::{Operand, Slot};
use tracing::trace;

use super::Rewriter;
use crate::error::{Result, TaintError};
use crate::helpers::{DivKind, HelperId, HelperPolicy, PendingTaint, PostCallFixup};

impl<'a> Rewriter<'a> {
    pub(super) fn call_before(
        &mut self,
        target: u64,
        inputs: &[Operand],
    ) -> Result<Option<(HelperId, &'a HelperPolicy)>> {
        let policies = self.policies;
        let helper = self.resolver.resolve(target);
        let policy = helper.and_then(|id| policies.policy_for(id).map(|p| (id, p)));
        trace!(target, ?helper, has_policy = policy.is_some(), "helper call");

        let pending = self.ctx.pending_taint();
        let (id, mode) = match policy {
            Some((id, p)) => (id, p.pending),
            None => {
                self.em.assign(pending, Operand::ZERO);
                return Ok(None);
            }
        };
        match mode {
            PendingTaint::Clear => self.em.assign(pending, Operand::ZERO),
            PendingTaint::RelayInput(n) => {
                let input = inputs.get(n).copied().ok_or_else(|| TaintError::BadHelperPolicy {
                    helper: id,
                    reason: format!("relays input {n} but the call has {} inputs", inputs.len()),
                })?;
                let t = self.taint_of(input);
                self.em.store(pending, t);
            }
            PendingTaint::ReadIntoOutputs => {}
        }
        Ok(policy)
    }

    pub(super) fn call_after(
        &mut self,
        outputs: &[Slot],
        inputs: &[Operand],
        policy: Option<(HelperId, &HelperPolicy)>,
    ) -> Result<()> {
        let Some((helper, policy)) = policy else {
            for &out in outputs {
                self.clear_taint(out)?;
            }
            return Ok(());
        };

        let pending = Operand::Slot(self.ctx.pending_taint());
        for &out in outputs {
            if policy.pending == PendingTaint::ReadIntoOutputs {
                self.share_taint(out, pending)?;
            } else {
                self.clear_taint(out)?;
            }
        }
        for &global in &policy.zero_globals {
            let shadow = self.ctx.require_shadow(global)?;
            self.em.assign(shadow, Operand::ZERO);
        }
        for fixup in &policy.fixups {
            match *fixup {
                PostCallFixup::CopyShadow { from, to } => {
                    let from = self.ctx.require_shadow(from)?;
                    let to = self.ctx.require_shadow(to)?;
                    self.em.assign(to, Operand::Slot(from));
                }
                PostCallFixup::DivideAccumulator {
                    kind,
                    divisor_input,
                    eax,
                    edx,
                } => {
                    let divisor = inputs.get(divisor_input).copied().ok_or_else(|| {
                        TaintError::BadHelperPolicy {
                            helper,
                            reason: format!(
                                "divisor input {divisor_input} but the call has {} inputs",
                                inputs.len()
                            ),
                        }
                    })?;
                    self.divide_fixup(kind, divisor, eax, edx)?;
                }
            }
        }
        Ok(())
    }

    /// Quotient/remainder registers become fully tainted within the bytes the divide writes
    /// whenever the divisor or the dividend is tainted.
    fn divide_fixup(&mut self, kind: DivKind, divisor: Operand, eax: Slot, edx: Slot) -> Result<()> {
        let w = self.width_of(eax)?;
        let eax_shadow = self.ctx.require_shadow(eax)?;
        let edx_shadow = self.ctx.require_shadow(edx)?;
        let td = self.taint_of(divisor);
        let (te, tx) = (Operand::Slot(eax_shadow), Operand::Slot(edx_shadow));
        let high = Operand::Imm(w.mask() & !0xffff);
        let em = &mut self.em;

        match kind {
            DivKind::Long => {
                let any = em.or_all(w, &[td, te, tx])?;
                let t = em.pcast(any, w, w)?;
                em.assign(eax_shadow, t);
                em.assign(edx_shadow, t);
            }
            DivKind::Word => {
                let low = Operand::Imm(0xffff);
                let d = em.and(w, td, low)?;
                let e = em.and(w, te, low)?;
                let x = em.and(w, tx, low)?;
                let any = em.or_all(w, &[d, e, x])?;
                let t = em.pcast(any, w, w)?;
                let t = em.and(w, t, low)?;
                let keep_e = em.and(w, te, high)?;
                let keep_x = em.and(w, tx, high)?;
                let new_e = em.or(w, keep_e, t)?;
                let new_x = em.or(w, keep_x, t)?;
                em.assign(eax_shadow, new_e);
                em.assign(edx_shadow, new_x);
            }
            DivKind::Byte => {
                // Dividend is AX, divisor is 8 bits; result lands in AL/AH.
                let d = em.and(w, td, Operand::Imm(0xff))?;
                let e = em.and(w, te, Operand::Imm(0xffff))?;
                let any = em.or(w, d, e)?;
                let t = em.pcast(any, w, w)?;
                let t = em.and(w, t, Operand::Imm(0xffff))?;
                let keep_e = em.and(w, te, high)?;
                let new_e = em.or(w, keep_e, t)?;
                em.store(eax_shadow, new_e);
            }
        }
        Ok(())
    }
}
