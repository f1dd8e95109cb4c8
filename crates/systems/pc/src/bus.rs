//! Machine RAM for the real-mode x86 machine
//!
//! A single flat 1MB store covering the whole real-mode physical address
//! space. There is no ROM shadowing or memory-mapped device range; the boot
//! image is copied straight into RAM.

use rmx_core::logging::{log, LogCategory, LogLevel};
use rmx_core::memory::{MemoryX86, MEMORY_SIZE};

/// Flat 1MB machine RAM
pub struct MachineRam {
    data: Vec<u8>,
}

impl MachineRam {
    /// Create RAM with every byte cleared to zero
    pub fn new() -> Self {
        Self {
            data: vec![0; MEMORY_SIZE as usize],
        }
    }

    /// Copy an image into RAM at the given physical address
    ///
    /// Bytes that would land past the end of RAM are dropped.
    pub fn load_image(&mut self, addr: u32, image: &[u8]) {
        let start = addr as usize;
        if start >= self.data.len() {
            return;
        }
        let end = (start + image.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&image[..end - start]);

        log(LogCategory::Memory, LogLevel::Info, || {
            format!("MEM: loaded {} bytes at 0x{:05X}", end - start, start)
        });
    }
}

impl Default for MachineRam {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryX86 for MachineRam {
    fn read(&self, addr: u32) -> u8 {
        if (addr as usize) < self.data.len() {
            self.data[addr as usize]
        } else {
            0xFF // Open bus
        }
    }

    fn write(&mut self, addr: u32, val: u8) {
        if (addr as usize) < self.data.len() {
            self.data[addr as usize] = val;
        }
        // Writes past the end of RAM are ignored
    }
}
