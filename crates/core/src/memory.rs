//! Physical memory interface for the x86 real-mode core
//!
//! The CPU is generic over a byte-addressed store so embedding systems can
//! supply their own backing (flat RAM, ROM overlays, memory-mapped devices).
//! Segment:offset translation and multi-byte access live on the CPU itself;
//! implementations of this trait only ever see masked physical addresses.

/// Size of the real-mode physical address space (1MB)
pub const MEMORY_SIZE: u32 = 0x100000;

/// Wraparound mask applied to every physical address
pub const ADDR_MASK: u32 = MEMORY_SIZE - 1;

/// Memory interface trait for the x86 CPU
///
/// Systems using the CPU must implement this trait to provide memory access.
pub trait MemoryX86 {
    /// Read a byte from memory at the given physical address
    fn read(&self, addr: u32) -> u8;

    /// Write a byte to memory at the given physical address
    fn write(&mut self, addr: u32, val: u8);
}

/// Simple array-based memory for testing
pub struct ArrayMemory {
    data: Vec<u8>,
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self {
            data: vec![0; MEMORY_SIZE as usize],
        }
    }

    /// Load a program at a specific physical address
    pub fn load_program(&mut self, addr: u32, program: &[u8]) {
        let start = addr as usize;
        let end = start + program.len();
        if end <= self.data.len() {
            self.data[start..end].copy_from_slice(program);
        }
    }

    /// Read a 16-bit word from memory (little-endian)
    pub fn read_u16(&self, addr: u32) -> u16 {
        let low = self.read(addr);
        let high = self.read(addr + 1);
        (high as u16) << 8 | low as u16
    }

    /// Write a 16-bit word to memory (little-endian)
    pub fn write_u16(&mut self, addr: u32, val: u16) {
        self.write(addr, (val & 0xFF) as u8);
        self.write(addr + 1, ((val >> 8) & 0xFF) as u8);
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryX86 for ArrayMemory {
    fn read(&self, addr: u32) -> u8 {
        if (addr as usize) < self.data.len() {
            self.data[addr as usize]
        } else {
            0xFF
        }
    }

    fn write(&mut self, addr: u32, val: u8) {
        if (addr as usize) < self.data.len() {
            self.data[addr as usize] = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_starts_zeroed() {
        let mem = ArrayMemory::new();
        assert_eq!(mem.read(0), 0);
        assert_eq!(mem.read(ADDR_MASK), 0);
    }

    #[test]
    fn test_load_program() {
        let mut mem = ArrayMemory::new();
        mem.load_program(0x7C00, &[0xB0, 0x2A, 0x00]);

        assert_eq!(mem.read(0x7C00), 0xB0);
        assert_eq!(mem.read(0x7C01), 0x2A);
        assert_eq!(mem.read(0x7C02), 0x00);
    }

    #[test]
    fn test_load_program_past_end_is_ignored() {
        let mut mem = ArrayMemory::new();
        mem.load_program(MEMORY_SIZE - 1, &[0xAA, 0xBB]);

        // Would overrun the store, so nothing is written
        assert_eq!(mem.read(MEMORY_SIZE - 1), 0);
    }

    #[test]
    fn test_word_helpers_little_endian() {
        let mut mem = ArrayMemory::new();
        mem.write_u16(0x1000, 0xBEEF);

        assert_eq!(mem.read(0x1000), 0xEF);
        assert_eq!(mem.read(0x1001), 0xBE);
        assert_eq!(mem.read_u16(0x1000), 0xBEEF);
    }

    #[test]
    fn test_out_of_range_read_is_open_bus() {
        let mem = ArrayMemory::new();
        assert_eq!(mem.read(MEMORY_SIZE), 0xFF);
    }

    #[test]
    fn test_out_of_range_write_is_ignored() {
        let mut mem = ArrayMemory::new();
        mem.write(MEMORY_SIZE + 5, 0x12);
        assert_eq!(mem.read(0), 0);
    }
}
