//! Tests for accumulator moves with direct offset literals (0xA0-0xA3)
//!
//! The offset is an inline literal, not a ModRM operand; the data access
//! always goes through DS.

use crate::cpu_x86::{CpuX86, OpcodeTable};
use crate::memory::{ArrayMemory, MemoryX86};

// Helper function for tests to calculate physical address
fn physical_address(segment: u16, offset: u32) -> u32 {
    (((segment as u32) << 4) + offset) & 0xFFFFF
}

#[test]
fn test_mov_al_moffs8() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);

    let addr = physical_address(0x1000, 0x0080);
    cpu.memory.write(addr, 0x5A);

    // MOV AL, [0x0080] (0xA0 with moffs16)
    cpu.memory.load_program(0x7C00, &[0xA0, 0x80, 0x00]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    assert_eq!(cpu.regs.eax.low8(), 0x5A);
    assert_eq!(cpu.regs.eip.dword(), 0x7C03);
}

#[test]
fn test_mov_ax_moffs16() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);

    let addr = physical_address(0x1000, 0x0210);
    cpu.memory.write(addr, 0xFE);
    cpu.memory.write(addr + 1, 0xCA);

    // MOV AX, [0x0210] (0xA1 with moffs16)
    cpu.memory.load_program(0x7C00, &[0xA1, 0x10, 0x02]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    assert_eq!(cpu.regs.eax.word(), 0xCAFE);
}

#[test]
fn test_mov_eax_moffs32() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);

    let addr = physical_address(0x1000, 0x0320);
    cpu.memory.write(addr, 0x01);
    cpu.memory.write(addr + 1, 0x02);
    cpu.memory.write(addr + 2, 0x03);
    cpu.memory.write(addr + 3, 0x04);

    // MOV EAX, [0x0320] (0x66 0xA1 with moffs16)
    cpu.memory.load_program(0x7C00, &[0x66, 0xA1, 0x20, 0x03]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    assert_eq!(cpu.regs.eax.dword(), 0x0403_0201);
}

#[test]
fn test_mov_moffs8_al() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);
    cpu.regs.eax.set_low8(0x99);

    // MOV [0x0144], AL (0xA2 with moffs16)
    cpu.memory.load_program(0x7C00, &[0xA2, 0x44, 0x01]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    let addr = physical_address(0x1000, 0x0144);
    assert_eq!(cpu.memory.read(addr), 0x99);
}

#[test]
fn test_mov_moffs16_ax() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);
    cpu.regs.eax.set_word(0x1234);

    // MOV [0x0500], AX (0xA3 with moffs16)
    cpu.memory.load_program(0x7C00, &[0xA3, 0x00, 0x05]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    let addr = physical_address(0x1000, 0x0500);
    assert_eq!(cpu.memory.read_u16(addr), 0x1234);
}

#[test]
fn test_mov_moffs32_eax() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);
    cpu.regs.eax.set_dword(0xDEAD_BEEF);

    // MOV [0x0600], EAX (0x66 0xA3 with moffs16)
    cpu.memory.load_program(0x7C00, &[0x66, 0xA3, 0x00, 0x06]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    let addr = physical_address(0x1000, 0x0600);
    assert_eq!(cpu.memory.read(addr), 0xEF);
    assert_eq!(cpu.memory.read(addr + 1), 0xBE);
    assert_eq!(cpu.memory.read(addr + 2), 0xAD);
    assert_eq!(cpu.memory.read(addr + 3), 0xDE);
}

#[test]
fn test_moffs_32bit_offset_literal() {
    let mem = ArrayMemory::new();
    let mut cpu = CpuX86::new(mem);
    let table = OpcodeTable::new();

    cpu.regs.ds.set_word(0x1000);

    let addr = physical_address(0x1000, 0x0700);
    cpu.memory.write(addr, 0x21);
    cpu.memory.write(addr + 1, 0x43);

    // MOV AX, [0x00000700] (0x67 0xA1): the address-size prefix widens the
    // offset literal itself to four bytes
    cpu.memory
        .load_program(0x7C00, &[0x67, 0xA1, 0x00, 0x07, 0x00, 0x00]);
    cpu.regs.cs.set_word(0x0000);
    cpu.regs.eip.set_dword(0x7C00);

    cpu.step(&table).unwrap();

    assert_eq!(cpu.regs.eax.word(), 0x4321);
    assert_eq!(cpu.regs.eip.dword(), 0x7C06);
}
