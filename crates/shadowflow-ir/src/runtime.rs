//! Run-time collaborators of an executing block.

use thiserror::Error;

use crate::op::MemSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory fault at {addr:#x} ({size:?})")]
pub struct MemFault {
    pub addr: u64,
    pub size: MemSize,
}

/// Guest memory and helper functions.
pub trait GuestBus {
    fn load(&mut self, addr: u64, size: MemSize) -> Result<u64, MemFault>;

    fn store(&mut self, addr: u64, size: MemSize, value: u64) -> Result<(), MemFault>;

    /// Invoke the helper at `target`. Helpers may read and write global slots directly and
    /// return one value per declared output.
    fn call_helper(&mut self, target: u64, args: &[u64], globals: &mut [u64]) -> Vec<u64>;
}

/// Byte-granular memory taint store consulted by the `ld_taint`/`st_taint` hook ops.
///
/// Taint words are little-endian: bit `8*i..8*i+8` covers the byte at `addr + i`.
pub trait TaintHooks {
    fn load_taint(&mut self, addr: u64, size: MemSize) -> u64;

    fn store_taint(&mut self, addr: u64, size: MemSize, taint: u64);
}

/// Hooks for running uninstrumented code: memory reads clean, writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTaint;

impl TaintHooks for NoTaint {
    fn load_taint(&mut self, _addr: u64, _size: MemSize) -> u64 {
        0
    }

    fn store_taint(&mut self, _addr: u64, _size: MemSize, _taint: u64) {}
}
