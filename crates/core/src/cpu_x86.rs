//! x86 real-mode CPU core
//!
//! This module provides a reusable, generic real-mode x86 CPU that works with
//! any system by implementing the `MemoryX86` trait. It covers the 80386-style
//! decoding infrastructure (operand/address-size prefixes, ModRM/SIB, 16- and
//! 32-bit effective addresses) and the data-movement instruction set (the MOV
//! family plus PUSH r/m).
//!
//! The opcode dispatch table is built once with [`OpcodeTable::new`] and passed
//! explicitly into [`CpuX86::step`]; there is no process-wide mutable state.
//! Faults (unknown opcodes, invalid encodings, unimplemented modes) are typed
//! values returned to the caller, never process aborts.

use crate::logging::{log, LogCategory, LogLevel};
use crate::memory::{MemoryX86, ADDR_MASK};
use crate::registers::RegisterFile;

/// Processor operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum CpuMode {
    /// 16-bit segment:offset addressing with `(segment << 4) + offset`
    /// translation into a 1MB physical space
    #[default]
    Real,
    /// Descriptor-based segmentation - declared but not implemented, every
    /// address translation in this mode faults
    Protected,
    /// Virtual-8086 execution under protected mode - declared but unused
    Virtual8086,
}

/// Legacy prefix state for the instruction currently being decoded
///
/// Both flags are reset at every instruction boundary; prefixes never
/// persist across instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Prefixes {
    /// Operand-size override (0x66) seen
    pub operand_size: bool,
    /// Address-size override (0x67) seen
    pub address_size: bool,
}

/// Decoded ModRM byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    /// Addressing-form selector: 0/1/2 = memory operand with 0/1/word-or-dword
    /// displacement, 3 = register-direct
    pub modbits: u8,
    /// Register operand or opcode sub-selector
    pub reg: u8,
    /// Register or memory-form selector
    pub rm: u8,
}

impl ModRm {
    /// Split a ModRM byte into its fields
    #[inline]
    pub fn decode(byte: u8) -> Self {
        Self {
            modbits: (byte >> 6) & 0x03, // Bits 7-6
            reg: (byte >> 3) & 0x07,     // Bits 5-3
            rm: byte & 0x07,             // Bits 2-0
        }
    }
}

/// Decoded SIB byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib {
    /// Power-of-two shift applied to the index register (x1/x2/x4/x8)
    pub scale: u8,
    /// Index register selector; 4 encodes "no index"
    pub index: u8,
    /// Base register selector; 5 with mod == 0 means "no base register,
    /// use a trailing 32-bit displacement"
    pub base: u8,
}

impl Sib {
    /// Split a SIB byte into its fields
    #[inline]
    pub fn decode(byte: u8) -> Self {
        Self {
            scale: (byte >> 6) & 0x03, // Bits 7-6
            index: (byte >> 3) & 0x07, // Bits 5-3
            base: byte & 0x07,         // Bits 2-0
        }
    }
}

/// Faults the core can raise while decoding or executing an instruction
///
/// These are conditions of the guest program or of the emulator's coverage,
/// reported to the host as values. Out-of-range register indices and similar
/// caller defects are not faults; those panic immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// Address translation attempted in a mode the core does not implement
    #[error("address translation not implemented for {0:?} mode")]
    UnimplementedMode(CpuMode),
    /// ModRM.reg carries a value the opcode does not permit (#UD)
    #[error("invalid encoding for opcode 0x{opcode:02X} (ModRM.reg = {reg})")]
    InvalidOpcode { opcode: u8, reg: u8 },
    /// The fetched opcode byte has no dispatch-table entry, i.e. a decoding
    /// gap in the emulator rather than a guest error
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
}

/// Outcome of a single execution step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An instruction was decoded, dispatched and applied
    Retired {
        /// Approximate cycle cost of the retired instruction
        cycles: u32,
    },
    /// The halt sentinel was fetched, or the CPU was already halted
    Halted,
}

/// Opcode byte reserved as the emulation-harness halt signal
///
/// Not a real x86 semantic; the execution loop stops when it fetches this
/// byte instead of dispatching it.
pub const HALT_OPCODE: u8 = 0x00;

/// Opcode handler: takes the CPU state and the raw opcode byte
///
/// The byte is passed through because register-coded instructions (0xB0-0xBF)
/// derive their destination register from its low 3 bits rather than from a
/// ModRM byte.
pub type OpcodeHandler<M> = fn(&mut CpuX86<M>, u8) -> Result<(), Fault>;

/// x86 real-mode CPU state and execution engine
///
/// Generic over the memory interface so each instance exclusively owns its
/// backing store; separate CPUs share nothing.
#[derive(Debug)]
pub struct CpuX86<M: MemoryX86> {
    /// Architectural registers (GPRs, segments, EIP, EFLAGS)
    pub regs: RegisterFile,

    /// Operating mode; only `Real` executes, the others fault on translation
    pub mode: CpuMode,

    /// Prefix flags for the instruction being decoded
    prefix: Prefixes,

    /// Total cycles executed
    pub cycles: u64,

    /// Memory interface
    pub memory: M,

    /// Halt flag, set when the halt sentinel is fetched
    halted: bool,
}

impl<M: MemoryX86> CpuX86<M> {
    /// Create a new CPU in power-on state with the given memory interface
    pub fn new(memory: M) -> Self {
        Self {
            regs: RegisterFile::new(),
            mode: CpuMode::Real,
            prefix: Prefixes::default(),
            cycles: 0,
            memory,
            halted: false,
        }
    }

    /// Reset the CPU to power-on state (preserves memory contents)
    pub fn reset(&mut self) {
        self.regs = RegisterFile::new();
        self.mode = CpuMode::Real;
        self.prefix = Prefixes::default();
        self.cycles = 0;
        self.halted = false;
    }

    /// Check if the CPU is halted
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Set the CPU halted state
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Translate segment:offset to a physical address
    ///
    /// Real mode only; any other mode raises the unimplemented-mode fault
    /// instead of producing wrong addresses.
    #[inline]
    fn translate(&self, segment: u16, offset: u32) -> Result<u32, Fault> {
        match self.mode {
            CpuMode::Real => Ok(((segment as u32) << 4).wrapping_add(offset) & ADDR_MASK),
            mode => {
                log(LogCategory::Faults, LogLevel::Debug, || {
                    format!("FAULT: address translation in unimplemented {:?} mode", mode)
                });
                Err(Fault::UnimplementedMode(mode))
            }
        }
    }

    /// Read a byte from memory at segment:offset
    #[inline]
    pub fn read_u8(&self, segment: u16, offset: u32) -> Result<u8, Fault> {
        let phys = self.translate(segment, offset)?;
        Ok(self.memory.read(phys))
    }

    /// Read a little-endian word from memory at segment:offset
    ///
    /// Each constituent byte address wraps independently at the 1MB boundary,
    /// so an access spanning the top of the address space continues at
    /// physical 0.
    #[inline]
    pub fn read_u16(&self, segment: u16, offset: u32) -> Result<u16, Fault> {
        let phys = self.translate(segment, offset)?;
        let low = self.memory.read(phys) as u16;
        let high = self.memory.read((phys + 1) & ADDR_MASK) as u16;
        Ok((high << 8) | low)
    }

    /// Read a little-endian dword from memory at segment:offset, with the
    /// same per-byte wraparound as `read_u16`
    #[inline]
    pub fn read_u32(&self, segment: u16, offset: u32) -> Result<u32, Fault> {
        let phys = self.translate(segment, offset)?;
        let b0 = self.memory.read(phys) as u32;
        let b1 = self.memory.read((phys + 1) & ADDR_MASK) as u32;
        let b2 = self.memory.read((phys + 2) & ADDR_MASK) as u32;
        let b3 = self.memory.read((phys + 3) & ADDR_MASK) as u32;
        Ok((b3 << 24) | (b2 << 16) | (b1 << 8) | b0)
    }

    /// Write a byte to memory at segment:offset
    #[inline]
    pub fn write_u8(&mut self, segment: u16, offset: u32, val: u8) -> Result<(), Fault> {
        let phys = self.translate(segment, offset)?;
        self.memory.write(phys, val);
        Ok(())
    }

    /// Write a little-endian word to memory at segment:offset, each byte
    /// address wrapping independently at 1MB
    #[inline]
    pub fn write_u16(&mut self, segment: u16, offset: u32, val: u16) -> Result<(), Fault> {
        let phys = self.translate(segment, offset)?;
        self.memory.write(phys, (val & 0xFF) as u8);
        self.memory.write((phys + 1) & ADDR_MASK, (val >> 8) as u8);
        Ok(())
    }

    /// Write a little-endian dword to memory at segment:offset, each byte
    /// address wrapping independently at 1MB
    #[inline]
    pub fn write_u32(&mut self, segment: u16, offset: u32, val: u32) -> Result<(), Fault> {
        let phys = self.translate(segment, offset)?;
        self.memory.write(phys, (val & 0xFF) as u8);
        self.memory.write((phys + 1) & ADDR_MASK, ((val >> 8) & 0xFF) as u8);
        self.memory.write((phys + 2) & ADDR_MASK, ((val >> 16) & 0xFF) as u8);
        self.memory.write((phys + 3) & ADDR_MASK, ((val >> 24) & 0xFF) as u8);
        Ok(())
    }

    /// Fetch one byte from the instruction stream at CS:EIP, advancing EIP
    #[inline]
    fn fetch_u8(&mut self) -> Result<u8, Fault> {
        let val = self.read_u8(self.regs.cs.word(), self.regs.eip.dword())?;
        self.regs.eip.set_dword(self.regs.eip.dword().wrapping_add(1));
        Ok(val)
    }

    /// Fetch a little-endian word from the instruction stream
    #[inline]
    fn fetch_u16(&mut self) -> Result<u16, Fault> {
        let low = self.fetch_u8()? as u16;
        let high = self.fetch_u8()? as u16;
        Ok((high << 8) | low)
    }

    /// Fetch a little-endian dword from the instruction stream
    #[inline]
    fn fetch_u32(&mut self) -> Result<u32, Fault> {
        let low = self.fetch_u16()? as u32;
        let high = self.fetch_u16()? as u32;
        Ok((high << 16) | low)
    }

    /// Scan legacy prefixes at CS:EIP and return the opcode byte
    ///
    /// 0x66 sets the operand-size override, 0x67 the address-size override.
    /// Prefixes may repeat or combine in either order; the flags are
    /// idempotent booleans. The first byte that is neither is the opcode,
    /// already consumed from the stream.
    fn fetch_prefixes(&mut self) -> Result<u8, Fault> {
        self.prefix = Prefixes::default();
        loop {
            let byte = self.fetch_u8()?;
            match byte {
                0x66 => self.prefix.operand_size = true,
                0x67 => self.prefix.address_size = true,
                _ => return Ok(byte),
            }
        }
    }

    /// True when data-moving instructions operate on 32 bits
    ///
    /// The 0x66 prefix toggles the mode's default width: real mode defaults
    /// to 16-bit operands, every other mode to 32-bit.
    #[inline]
    fn operand_size_32(&self) -> bool {
        if self.mode == CpuMode::Real {
            self.prefix.operand_size
        } else {
            !self.prefix.operand_size
        }
    }

    /// True when memory operands use 32-bit addressing
    ///
    /// Same toggle rule as `operand_size_32`, driven by the 0x67 prefix.
    #[inline]
    fn address_size_32(&self) -> bool {
        if self.mode == CpuMode::Real {
            self.prefix.address_size
        } else {
            !self.prefix.address_size
        }
    }

    /// Fetch and decode a ModRM byte
    #[inline]
    fn fetch_modrm(&mut self) -> Result<ModRm, Fault> {
        Ok(ModRm::decode(self.fetch_u8()?))
    }

    /// Compute the (segment, offset) pair for a memory operand
    ///
    /// Consumes displacement and SIB bytes from the instruction stream.
    /// Never called for register-direct operands; callers check mod == 3
    /// first and bypass this entirely.
    fn effective_address(&mut self, m: ModRm) -> Result<(u16, u32), Fault> {
        debug_assert!(
            m.modbits != 0b11,
            "effective address requested for register-direct operand"
        );

        let addr32 = self.address_size_32();

        // The displacement is fetched before any SIB byte
        let disp: u32 = match m.modbits {
            0b01 => self.fetch_u8()? as i8 as i32 as u32,
            0b10 => {
                if addr32 {
                    self.fetch_u32()?
                } else {
                    self.fetch_u16()? as u32
                }
            }
            _ => 0,
        };

        let (seg, offset) = if !addr32 {
            let (seg, base) = match m.rm {
                0b000 => (
                    self.regs.ds.word(),
                    (self.regs.ebx.word() as u32) + (self.regs.esi.word() as u32),
                ), // [BX+SI]
                0b001 => (
                    self.regs.ds.word(),
                    (self.regs.ebx.word() as u32) + (self.regs.edi.word() as u32),
                ), // [BX+DI]
                0b010 => (
                    self.regs.ss.word(),
                    (self.regs.ebp.word() as u32) + (self.regs.esi.word() as u32),
                ), // [BP+SI]
                0b011 => (
                    self.regs.ss.word(),
                    (self.regs.ebp.word() as u32) + (self.regs.edi.word() as u32),
                ), // [BP+DI]
                0b100 => (self.regs.ds.word(), self.regs.esi.word() as u32), // [SI]
                0b101 => (self.regs.ds.word(), self.regs.edi.word() as u32), // [DI]
                0b110 => {
                    if m.modbits == 0 {
                        // Direct address: 16-bit displacement, no base register
                        let direct = self.fetch_u16()?;
                        (self.regs.ds.word(), direct as u32)
                    } else {
                        (self.regs.ss.word(), self.regs.ebp.word() as u32) // [BP]
                    }
                }
                0b111 => (self.regs.ds.word(), self.regs.ebx.word() as u32), // [BX]
                _ => unreachable!(),
            };
            (seg, base.wrapping_add(disp) & 0xFFFF)
        } else {
            let (seg, base) = match m.rm {
                0b000 => (self.regs.ds.word(), self.regs.eax.dword()), // [EAX]
                0b001 => (self.regs.ds.word(), self.regs.ecx.dword()), // [ECX]
                0b010 => (self.regs.ds.word(), self.regs.edx.dword()), // [EDX]
                0b011 => (self.regs.ds.word(), self.regs.ebx.dword()), // [EBX]
                0b100 => self.sib_address(m)?,
                0b101 => {
                    if m.modbits == 0 {
                        // 32-bit displacement, no base register
                        let direct = self.fetch_u32()?;
                        (self.regs.ds.word(), direct)
                    } else {
                        (self.regs.ss.word(), self.regs.ebp.dword()) // [EBP]
                    }
                }
                0b110 => (self.regs.ds.word(), self.regs.esi.dword()), // [ESI]
                0b111 => (self.regs.ds.word(), self.regs.edi.dword()), // [EDI]
                _ => unreachable!(),
            };
            let offset = base.wrapping_add(disp);
            // Real-mode segments are 64KB even under 32-bit addressing
            if self.mode == CpuMode::Real {
                (seg, offset & 0xFFFF)
            } else {
                (seg, offset)
            }
        };

        log(LogCategory::Decode, LogLevel::Trace, || {
            format!(
                "DECODE: EA {:04X}:{:08X} (mod={} rm={})",
                seg, offset, m.modbits, m.rm
            )
        });

        Ok((seg, offset))
    }

    /// Resolve a SIB-form address (32-bit addressing with rm == 4)
    ///
    /// Fetches the SIB byte and, for the no-base encoding, its trailing
    /// 32-bit displacement.
    fn sib_address(&mut self, m: ModRm) -> Result<(u16, u32), Fault> {
        let s = Sib::decode(self.fetch_u8()?);

        let index = if s.index == 4 {
            // index == 4 encodes "no index register"
            0
        } else {
            self.regs.reg32(s.index) << s.scale
        };

        if s.base == 5 && m.modbits == 0 {
            // No base register: a fresh 32-bit displacement takes its place
            let base = self.fetch_u32()?;
            Ok((self.regs.ds.word(), base.wrapping_add(index)))
        } else {
            let base = self.regs.reg32(s.base);
            // ESP/EBP-based addressing defaults to the stack segment
            let seg = if s.base == 4 || s.base == 5 {
                self.regs.ss.word()
            } else {
                self.regs.ds.word()
            };
            Ok((seg, base.wrapping_add(index)))
        }
    }

    /// Read an 8-bit ModRM operand (register or memory)
    fn read_rm8(&mut self, m: ModRm) -> Result<u8, Fault> {
        if m.modbits == 0b11 {
            Ok(self.regs.reg8(m.rm))
        } else {
            let (seg, offset) = self.effective_address(m)?;
            self.read_u8(seg, offset)
        }
    }

    /// Write an 8-bit ModRM operand (register or memory)
    fn write_rm8(&mut self, m: ModRm, val: u8) -> Result<(), Fault> {
        if m.modbits == 0b11 {
            self.regs.set_reg8(m.rm, val);
            Ok(())
        } else {
            let (seg, offset) = self.effective_address(m)?;
            self.write_u8(seg, offset, val)
        }
    }

    /// Read a 16-bit ModRM operand (register or memory)
    fn read_rm16(&mut self, m: ModRm) -> Result<u16, Fault> {
        if m.modbits == 0b11 {
            Ok(self.regs.reg16(m.rm))
        } else {
            let (seg, offset) = self.effective_address(m)?;
            self.read_u16(seg, offset)
        }
    }

    /// Write a 16-bit ModRM operand (register or memory)
    fn write_rm16(&mut self, m: ModRm, val: u16) -> Result<(), Fault> {
        if m.modbits == 0b11 {
            self.regs.set_reg16(m.rm, val);
            Ok(())
        } else {
            let (seg, offset) = self.effective_address(m)?;
            self.write_u16(seg, offset, val)
        }
    }

    /// Read a 32-bit ModRM operand (register or memory)
    fn read_rm32(&mut self, m: ModRm) -> Result<u32, Fault> {
        if m.modbits == 0b11 {
            Ok(self.regs.reg32(m.rm))
        } else {
            let (seg, offset) = self.effective_address(m)?;
            self.read_u32(seg, offset)
        }
    }

    /// Write a 32-bit ModRM operand (register or memory)
    fn write_rm32(&mut self, m: ModRm, val: u32) -> Result<(), Fault> {
        if m.modbits == 0b11 {
            self.regs.set_reg32(m.rm, val);
            Ok(())
        } else {
            let (seg, offset) = self.effective_address(m)?;
            self.write_u32(seg, offset, val)
        }
    }

    /// Fetch a moffs offset literal from the instruction stream
    ///
    /// The literal lives in the code segment because it is part of the
    /// instruction; the data access it names defaults to DS.
    fn fetch_moffs(&mut self) -> Result<u32, Fault> {
        if self.address_size_32() {
            self.fetch_u32()
        } else {
            Ok(self.fetch_u16()? as u32)
        }
    }

    /// Push a word onto the stack: decrement the stack pointer first, then
    /// store through the standard write primitives
    ///
    /// Real mode adjusts SP (the low 16 bits of ESP); other modes use the
    /// full ESP.
    fn push16(&mut self, val: u16) -> Result<(), Fault> {
        if self.mode == CpuMode::Real {
            let sp = self.regs.esp.word().wrapping_sub(2);
            self.regs.esp.set_word(sp);
            self.write_u16(self.regs.ss.word(), sp as u32, val)
        } else {
            let esp = self.regs.esp.dword().wrapping_sub(2);
            self.regs.esp.set_dword(esp);
            self.write_u16(self.regs.ss.word(), esp, val)
        }
    }

    /// Push a dword onto the stack, same ordering as `push16`
    fn push32(&mut self, val: u32) -> Result<(), Fault> {
        if self.mode == CpuMode::Real {
            let sp = self.regs.esp.word().wrapping_sub(4);
            self.regs.esp.set_word(sp);
            self.write_u32(self.regs.ss.word(), sp as u32, val)
        } else {
            let esp = self.regs.esp.dword().wrapping_sub(4);
            self.regs.esp.set_dword(esp);
            self.write_u32(self.regs.ss.word(), esp, val)
        }
    }

    /// Build the #UD fault for an opcode whose ModRM.reg is not permitted
    fn invalid_encoding(&self, opcode: u8, reg: u8) -> Fault {
        log(LogCategory::Faults, LogLevel::Debug, || {
            format!(
                "FAULT: #UD for opcode 0x{:02X} with ModRM.reg={}",
                opcode, reg
            )
        });
        Fault::InvalidOpcode { opcode, reg }
    }

    // --- Opcode handlers ---
    //
    // Every handler is two-phase: decode operands (ModRM, effective address,
    // immediate or moffs literal), then apply the move. Encodings are
    // validated before any register or memory state changes.

    /// 0x88: MOV r/m8, r8
    fn mov_rm8_r8(&mut self, _opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        let src = self.regs.reg8(m.reg);
        self.write_rm8(m, src)?;
        self.cycles += if m.modbits == 0b11 { 2 } else { 9 };
        Ok(())
    }

    /// 0x8A: MOV r8, r/m8
    fn mov_r8_rm8(&mut self, _opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        let val = self.read_rm8(m)?;
        self.regs.set_reg8(m.reg, val);
        self.cycles += if m.modbits == 0b11 { 2 } else { 8 };
        Ok(())
    }

    /// 0x89: MOV r/m16, r16 and MOV r/m32, r32
    fn mov_rm16or32_r16or32(&mut self, _opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if self.operand_size_32() {
            let src = self.regs.reg32(m.reg);
            self.write_rm32(m, src)?;
        } else {
            let src = self.regs.reg16(m.reg);
            self.write_rm16(m, src)?;
        }
        self.cycles += if m.modbits == 0b11 { 2 } else { 9 };
        Ok(())
    }

    /// 0x8B: MOV r16, r/m16 and MOV r32, r/m32
    fn mov_r16or32_rm16or32(&mut self, _opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if self.operand_size_32() {
            let val = self.read_rm32(m)?;
            self.regs.set_reg32(m.reg, val);
        } else {
            let val = self.read_rm16(m)?;
            self.regs.set_reg16(m.reg, val);
        }
        self.cycles += if m.modbits == 0b11 { 2 } else { 8 };
        Ok(())
    }

    /// 0x8C: MOV r/m16, Sreg (always 16-bit)
    fn mov_rm16_sreg(&mut self, opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if m.reg > 5 {
            return Err(self.invalid_encoding(opcode, m.reg));
        }
        let src = self.regs.sreg(m.reg);
        self.write_rm16(m, src)?;
        self.cycles += if m.modbits == 0b11 { 2 } else { 9 };
        Ok(())
    }

    /// 0x8E: MOV Sreg, r/m16
    ///
    /// CS (reg == 1) is not a valid destination; validation happens before
    /// any operand is read so a rejected encoding changes nothing.
    fn mov_sreg_rm16(&mut self, opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if m.reg == 1 || m.reg > 5 {
            return Err(self.invalid_encoding(opcode, m.reg));
        }
        let val = self.read_rm16(m)?;
        self.regs.set_sreg(m.reg, val);
        self.cycles += if m.modbits == 0b11 { 2 } else { 8 };
        Ok(())
    }

    /// 0xA0: MOV AL, moffs8
    fn mov_al_moffs8(&mut self, _opcode: u8) -> Result<(), Fault> {
        let offset = self.fetch_moffs()?;
        let val = self.read_u8(self.regs.ds.word(), offset)?;
        self.regs.set_reg8(0, val); // AL
        self.cycles += 10;
        Ok(())
    }

    /// 0xA1: MOV AX/EAX, moffs16/32
    fn mov_axoreax_moffs16or32(&mut self, _opcode: u8) -> Result<(), Fault> {
        let offset = self.fetch_moffs()?;
        if self.operand_size_32() {
            let val = self.read_u32(self.regs.ds.word(), offset)?;
            self.regs.eax.set_dword(val);
        } else {
            let val = self.read_u16(self.regs.ds.word(), offset)?;
            self.regs.eax.set_word(val);
        }
        self.cycles += 10;
        Ok(())
    }

    /// 0xA2: MOV moffs8, AL
    fn mov_moffs8_al(&mut self, _opcode: u8) -> Result<(), Fault> {
        let offset = self.fetch_moffs()?;
        let val = self.regs.eax.low8();
        self.write_u8(self.regs.ds.word(), offset, val)?;
        self.cycles += 10;
        Ok(())
    }

    /// 0xA3: MOV moffs16/32, AX/EAX
    fn mov_moffs16or32_axoreax(&mut self, _opcode: u8) -> Result<(), Fault> {
        let offset = self.fetch_moffs()?;
        if self.operand_size_32() {
            let val = self.regs.eax.dword();
            self.write_u32(self.regs.ds.word(), offset, val)?;
        } else {
            let val = self.regs.eax.word();
            self.write_u16(self.regs.ds.word(), offset, val)?;
        }
        self.cycles += 10;
        Ok(())
    }

    /// 0xB0-0xB7: MOV reg8, imm8 (destination register in the opcode)
    fn mov_reg8_imm8(&mut self, opcode: u8) -> Result<(), Fault> {
        let reg = opcode & 0x07;
        let imm = self.fetch_u8()?;
        self.regs.set_reg8(reg, imm);
        self.cycles += 4;
        Ok(())
    }

    /// 0xB8-0xBF: MOV reg16/32, imm16/32 (destination register in the opcode)
    fn mov_reg16or32_imm16or32(&mut self, opcode: u8) -> Result<(), Fault> {
        let reg = opcode & 0x07;
        if self.operand_size_32() {
            let imm = self.fetch_u32()?;
            self.regs.set_reg32(reg, imm);
        } else {
            let imm = self.fetch_u16()?;
            self.regs.set_reg16(reg, imm);
        }
        self.cycles += 4;
        Ok(())
    }

    /// 0xC6: MOV r/m8, imm8 (ModRM.reg must be 0)
    ///
    /// The immediate follows the ModRM byte and any displacement in the
    /// instruction stream, so for memory forms the effective address is
    /// consumed before the immediate is fetched.
    fn mov_rm8_imm8(&mut self, opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if m.reg != 0 {
            return Err(self.invalid_encoding(opcode, m.reg));
        }
        if m.modbits == 0b11 {
            let imm = self.fetch_u8()?;
            self.regs.set_reg8(m.rm, imm);
            self.cycles += 4;
        } else {
            let (seg, offset) = self.effective_address(m)?;
            let imm = self.fetch_u8()?;
            self.write_u8(seg, offset, imm)?;
            self.cycles += 10;
        }
        Ok(())
    }

    /// 0xC7: MOV r/m16/32, imm16/32 (ModRM.reg must be 0)
    fn mov_rm16or32_imm16or32(&mut self, opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if m.reg != 0 {
            return Err(self.invalid_encoding(opcode, m.reg));
        }
        if m.modbits == 0b11 {
            if self.operand_size_32() {
                let imm = self.fetch_u32()?;
                self.regs.set_reg32(m.rm, imm);
            } else {
                let imm = self.fetch_u16()?;
                self.regs.set_reg16(m.rm, imm);
            }
            self.cycles += 4;
        } else {
            let (seg, offset) = self.effective_address(m)?;
            if self.operand_size_32() {
                let imm = self.fetch_u32()?;
                self.write_u32(seg, offset, imm)?;
            } else {
                let imm = self.fetch_u16()?;
                self.write_u16(seg, offset, imm)?;
            }
            self.cycles += 10;
        }
        Ok(())
    }

    /// 0xFF /6: PUSH r/m16/32
    ///
    /// The operand is read first, then the stack pointer is decremented and
    /// the value stored at SS:[new SP].
    fn push_rm16or32(&mut self, opcode: u8) -> Result<(), Fault> {
        let m = self.fetch_modrm()?;
        if m.reg != 6 {
            return Err(self.invalid_encoding(opcode, m.reg));
        }
        if self.operand_size_32() {
            let val = self.read_rm32(m)?;
            self.push32(val)?;
        } else {
            let val = self.read_rm16(m)?;
            self.push16(val)?;
        }
        self.cycles += if m.modbits == 0b11 { 11 } else { 16 };
        Ok(())
    }

    /// Execute one instruction using the given dispatch table
    ///
    /// Scans prefixes, fetches the opcode, and dispatches. Returns `Halted`
    /// without touching state when the CPU is already halted, sets the halt
    /// flag when the sentinel opcode is fetched, and propagates any fault
    /// the instruction raises.
    pub fn step(&mut self, table: &OpcodeTable<M>) -> Result<Step, Fault> {
        if self.halted {
            return Ok(Step::Halted);
        }

        // EIP at the instruction start, for trace and fault reporting
        let start_eip = self.regs.eip.dword();

        let opcode = self.fetch_prefixes()?;

        if opcode == HALT_OPCODE {
            self.halted = true;
            log(LogCategory::Cpu, LogLevel::Debug, || {
                format!(
                    "CPU: halt at CS:EIP={:04X}:{:08X}",
                    self.regs.cs.word(),
                    start_eip
                )
            });
            return Ok(Step::Halted);
        }

        let handler = match table.lookup(opcode) {
            Some(handler) => handler,
            None => {
                log(LogCategory::Faults, LogLevel::Warn, || {
                    format!(
                        "FAULT: unknown opcode 0x{:02X} at CS:EIP={:04X}:{:08X}",
                        opcode,
                        self.regs.cs.word(),
                        start_eip
                    )
                });
                return Err(Fault::UnknownOpcode(opcode));
            }
        };

        log(LogCategory::Cpu, LogLevel::Trace, || {
            format!(
                "CPU: opcode 0x{:02X} at CS:EIP={:04X}:{:08X}",
                opcode,
                self.regs.cs.word(),
                start_eip
            )
        });

        let cycles_before = self.cycles;
        handler(self, opcode)?;

        Ok(Step::Retired {
            cycles: (self.cycles - cycles_before) as u32,
        })
    }

    /// Run until the halt sentinel is fetched; returns instructions retired
    ///
    /// Runs forever if the program neither halts nor faults. Hosts that need
    /// an upper bound drive `step` with their own budget instead.
    pub fn run(&mut self, table: &OpcodeTable<M>) -> Result<u64, Fault> {
        let mut retired: u64 = 0;
        loop {
            match self.step(table)? {
                Step::Halted => return Ok(retired),
                Step::Retired { .. } => retired += 1,
            }
        }
    }
}

/// Opcode dispatch table: 256 entries indexed by the raw opcode byte
///
/// Built once before the execution loop starts and passed into `step`
/// explicitly; entries left unmapped surface as the unknown-opcode fault at
/// dispatch time. Additional handlers plug in through [`OpcodeTable::set`]
/// without touching the decode machinery.
pub struct OpcodeTable<M: MemoryX86> {
    entries: [Option<OpcodeHandler<M>>; 256],
}

impl<M: MemoryX86> OpcodeTable<M> {
    /// Build the table with the data-movement instruction set mapped
    pub fn new() -> Self {
        let mut entries: [Option<OpcodeHandler<M>>; 256] = [None; 256];

        entries[0x88] = Some(CpuX86::mov_rm8_r8); // MOV r/m8, r8
        entries[0x8A] = Some(CpuX86::mov_r8_rm8); // MOV r8, r/m8
        entries[0x89] = Some(CpuX86::mov_rm16or32_r16or32); // MOV r/m16/32, r16/32
        entries[0x8B] = Some(CpuX86::mov_r16or32_rm16or32); // MOV r16/32, r/m16/32
        entries[0x8C] = Some(CpuX86::mov_rm16_sreg); // MOV r/m16, Sreg
        entries[0x8E] = Some(CpuX86::mov_sreg_rm16); // MOV Sreg, r/m16
        entries[0xA0] = Some(CpuX86::mov_al_moffs8); // MOV AL, moffs8
        entries[0xA1] = Some(CpuX86::mov_axoreax_moffs16or32); // MOV AX/EAX, moffs16/32
        entries[0xA2] = Some(CpuX86::mov_moffs8_al); // MOV moffs8, AL
        entries[0xA3] = Some(CpuX86::mov_moffs16or32_axoreax); // MOV moffs16/32, AX/EAX
        for opcode in 0xB0..=0xB7usize {
            entries[opcode] = Some(CpuX86::mov_reg8_imm8); // MOV reg8, imm8
        }
        for opcode in 0xB8..=0xBFusize {
            entries[opcode] = Some(CpuX86::mov_reg16or32_imm16or32); // MOV reg16/32, imm16/32
        }
        entries[0xC6] = Some(CpuX86::mov_rm8_imm8); // MOV r/m8, imm8
        entries[0xC7] = Some(CpuX86::mov_rm16or32_imm16or32); // MOV r/m16/32, imm16/32
        entries[0xFF] = Some(CpuX86::push_rm16or32); // PUSH r/m16/32

        Self { entries }
    }

    /// Map an opcode to a handler, replacing any existing entry
    pub fn set(&mut self, opcode: u8, handler: OpcodeHandler<M>) {
        self.entries[opcode as usize] = Some(handler);
    }

    /// Look up the handler for an opcode byte
    #[inline]
    pub fn lookup(&self, opcode: u8) -> Option<OpcodeHandler<M>> {
        self.entries[opcode as usize]
    }
}

impl<M: MemoryX86> Default for OpcodeTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
