//! Keeps per-instruction metadata aligned with the rewritten op stream.
//!
//! Inserted ops get an empty entry; each original op keeps its own entry. Reverse lookup from
//! a faulting position therefore still lands on the right guest instruction.

use shadowflow_ir::SourceMeta;

use crate::error::{Result, TaintError};

#[derive(Debug)]
pub(crate) struct MetaWriter {
    entries: Vec<Option<SourceMeta>>,
    starts_in: usize,
}

impl MetaWriter {
    /// Validates that `input` is parallel to an `ops_len`-op stream.
    pub(crate) fn new(input: &[Option<SourceMeta>], ops_len: usize) -> Result<Self> {
        let starts_in = input.iter().filter(|m| m.is_some()).count();
        if input.len() != ops_len {
            return Err(TaintError::MetadataDesync {
                ops: ops_len,
                entries: input.len(),
                starts_in,
                starts_out: starts_in,
            });
        }
        Ok(Self {
            entries: Vec::with_capacity(ops_len * 2),
            starts_in,
        })
    }

    pub(crate) fn original(&mut self, meta: Option<SourceMeta>) {
        self.entries.push(meta);
    }

    pub(crate) fn inserted(&mut self) {
        self.entries.push(None);
    }

    pub(crate) fn finish(self, ops_len: usize) -> Result<Vec<Option<SourceMeta>>> {
        let starts_out = self.entries.iter().filter(|m| m.is_some()).count();
        if self.entries.len() != ops_len || starts_out != self.starts_in {
            return Err(TaintError::MetadataDesync {
                ops: ops_len,
                entries: self.entries.len(),
                starts_in: self.starts_in,
                starts_out,
            });
        }
        Ok(self.entries)
    }
}
