//! Byte-granular taint store for guest physical memory.
//!
//! Every guest byte owns one taint byte (one taint bit per data bit). Taint is kept in 4 KiB
//! leaves that are allocated on the first tainted write to a page; most of guest memory never
//! sees taint and never costs anything.

use rustc_hash::FxHashMap;
use shadowflow_ir::{MemSize, TaintHooks};
use tracing::{debug, trace};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

type Leaf = Box<[u8; PAGE_SIZE]>;

#[derive(Debug, Clone)]
pub struct ShadowMemory {
    ram_size: u64,
    pages: FxHashMap<u64, Leaf>,
}

impl ShadowMemory {
    pub fn new(ram_size: u64) -> Self {
        Self {
            ram_size,
            pages: FxHashMap::default(),
        }
    }

    pub fn ram_size(&self) -> u64 {
        self.ram_size
    }

    /// Number of allocated leaves.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    fn in_range(&self, addr: u64) -> bool {
        addr < self.ram_size
    }

    fn byte(&self, addr: u64) -> u8 {
        if !self.in_range(addr) {
            return 0;
        }
        self.pages
            .get(&(addr >> PAGE_SHIFT))
            .map_or(0, |leaf| leaf[(addr & PAGE_MASK) as usize])
    }

    fn set_byte(&mut self, addr: u64, taint: u8) {
        if !self.in_range(addr) {
            return;
        }
        let page = addr >> PAGE_SHIFT;
        let off = (addr & PAGE_MASK) as usize;
        match self.pages.get_mut(&page) {
            Some(leaf) => leaf[off] = taint,
            // Clearing a byte of an untracked page is a no-op.
            None if taint == 0 => {}
            None => {
                let mut leaf: Leaf = Box::new([0u8; PAGE_SIZE]);
                leaf[off] = taint;
                self.pages.insert(page, leaf);
            }
        }
    }

    /// Taint of `size` bytes at `addr`, byte `i` in bits `8*i..8*i+8`.
    pub fn read_taint(&self, addr: u64, size: MemSize) -> u64 {
        let mut bytes = [0u8; 8];
        for (i, b) in bytes.iter_mut().take(size.bytes()).enumerate() {
            *b = self.byte(addr.wrapping_add(i as u64));
        }
        u64::from_le_bytes(bytes)
    }

    pub fn write_taint(&mut self, addr: u64, size: MemSize, taint: u64) {
        let bytes = taint.to_le_bytes();
        for (i, &b) in bytes.iter().take(size.bytes()).enumerate() {
            self.set_byte(addr.wrapping_add(i as u64), b);
        }
    }

    /// Taint a byte range with per-byte masks (e.g. when a device fills a DMA buffer).
    pub fn taint_range(&mut self, addr: u64, taint: &[u8]) {
        for (i, &b) in taint.iter().enumerate() {
            self.set_byte(addr.wrapping_add(i as u64), b);
        }
    }

    /// Copy the per-byte taint of `out.len()` bytes at `addr` into `out`.
    pub fn read_range(&self, addr: u64, out: &mut [u8]) {
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.byte(addr.wrapping_add(i as u64));
        }
    }

    /// Whether any byte of the range carries taint.
    pub fn is_range_tainted(&self, addr: u64, len: usize) -> bool {
        (0..len as u64).any(|i| self.byte(addr.wrapping_add(i)) != 0)
    }

    pub fn is_page_tainted(&self, addr: u64) -> bool {
        self.pages
            .get(&(addr >> PAGE_SHIFT))
            .is_some_and(|leaf| leaf.iter().any(|&b| b != 0))
    }

    /// Number of guest bytes with a non-zero taint mask.
    pub fn tainted_bytes(&self) -> usize {
        self.pages
            .values()
            .map(|leaf| leaf.iter().filter(|&&b| b != 0).count())
            .sum()
    }

    /// Release leaves that no longer hold any taint. Returns how many were freed.
    pub fn garbage_collect(&mut self) -> usize {
        let before = self.pages.len();
        self.pages.retain(|_, leaf| leaf.iter().any(|&b| b != 0));
        let freed = before - self.pages.len();
        debug!(freed, resident = self.pages.len(), "shadow memory gc");
        freed
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

impl TaintHooks for ShadowMemory {
    fn load_taint(&mut self, addr: u64, size: MemSize) -> u64 {
        let taint = self.read_taint(addr, size);
        if taint != 0 {
            trace!(addr, taint, "tainted load");
        }
        taint
    }

    fn store_taint(&mut self, addr: u64, size: MemSize, taint: u64) {
        if taint != 0 {
            trace!(addr, taint, "tainted store");
        }
        self.write_taint(addr, size, taint);
    }
}
