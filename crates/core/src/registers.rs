//! x86 register file with overlapping 8/16/32-bit views
//!
//! Every general-purpose register is stored as an owning 32-bit value and
//! exposed through mask/shift accessors, so AL/AH/AX/EAX always agree no
//! matter which view was written last. No byte-layout reinterpretation is
//! involved, which keeps the aliasing behavior independent of host
//! endianness.

/// A 32-bit register with 16-bit and 8-bit views carved out of it
///
/// Narrow writes preserve the untouched bits of the wider value; narrow
/// reads always reflect the latest write through any overlapping view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Reg32(u32);

impl Reg32 {
    /// Create a register holding the given 32-bit value
    pub const fn new(val: u32) -> Self {
        Reg32(val)
    }

    /// Full 32-bit view (e.g. EAX)
    #[inline]
    pub fn dword(&self) -> u32 {
        self.0
    }

    /// Replace the full 32-bit value
    #[inline]
    pub fn set_dword(&mut self, val: u32) {
        self.0 = val;
    }

    /// Low 16-bit view (e.g. AX)
    #[inline]
    pub fn word(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Write the low 16 bits, preserving bits 31:16
    #[inline]
    pub fn set_word(&mut self, val: u16) {
        self.0 = (self.0 & 0xFFFF_0000) | (val as u32);
    }

    /// Low 8-bit view (e.g. AL)
    #[inline]
    pub fn low8(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Write the low 8 bits, preserving bits 31:8
    #[inline]
    pub fn set_low8(&mut self, val: u8) {
        self.0 = (self.0 & 0xFFFF_FF00) | (val as u32);
    }

    /// Bits 15:8 view (e.g. AH)
    #[inline]
    pub fn high8(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Write bits 15:8, preserving the other three bytes
    #[inline]
    pub fn set_high8(&mut self, val: u8) {
        self.0 = (self.0 & 0xFFFF_00FF) | ((val as u32) << 8);
    }
}

/// Complete x86 register file: GPRs, segment registers, EIP, EFLAGS
///
/// Register indices follow the hardware operand encodings:
/// - 8-bit: 0-7 = AL, CL, DL, BL, AH, CH, DH, BH
/// - 16-bit: 0-7 = AX, CX, DX, BX, SP, BP, SI, DI
/// - 32-bit: 0-7 = EAX, ECX, EDX, EBX, ESP, EBP, ESI, EDI
/// - segment: 0-5 = ES, CS, SS, DS, FS, GS
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisterFile {
    // General purpose registers
    /// EAX register (accumulator) - low word AX, bytes AH:AL
    pub eax: Reg32,
    /// EBX register (base) - low word BX, bytes BH:BL
    pub ebx: Reg32,
    /// ECX register (count) - low word CX, bytes CH:CL
    pub ecx: Reg32,
    /// EDX register (data) - low word DX, bytes DH:DL
    pub edx: Reg32,
    /// ESI register (source index)
    pub esi: Reg32,
    /// EDI register (destination index)
    pub edi: Reg32,
    /// EBP register (base pointer)
    pub ebp: Reg32,
    /// ESP register (stack pointer)
    pub esp: Reg32,

    // Segment registers (only the low 16 bits matter in real mode)
    /// CS register (code segment)
    pub cs: Reg32,
    /// DS register (data segment)
    pub ds: Reg32,
    /// SS register (stack segment)
    pub ss: Reg32,
    /// ES register (extra segment)
    pub es: Reg32,
    /// FS register (extra segment, 80386+)
    pub fs: Reg32,
    /// GS register (extra segment, 80386+)
    pub gs: Reg32,

    // Control registers
    /// EIP register (instruction pointer)
    pub eip: Reg32,
    /// EFLAGS register (status flags)
    pub eflags: Reg32,
}

/// Reserved EFLAGS bit 1, always set on real hardware
pub const EFLAGS_RESERVED: u32 = 0x0000_0002;

impl RegisterFile {
    /// Create a register file in power-on state: everything zero except the
    /// reserved EFLAGS bit
    pub fn new() -> Self {
        Self {
            eax: Reg32::default(),
            ebx: Reg32::default(),
            ecx: Reg32::default(),
            edx: Reg32::default(),
            esi: Reg32::default(),
            edi: Reg32::default(),
            ebp: Reg32::default(),
            esp: Reg32::default(),
            cs: Reg32::default(),
            ds: Reg32::default(),
            ss: Reg32::default(),
            es: Reg32::default(),
            fs: Reg32::default(),
            gs: Reg32::default(),
            eip: Reg32::default(),
            eflags: Reg32::new(EFLAGS_RESERVED),
        }
    }

    /// Get 8-bit register by operand encoding
    #[inline]
    pub fn reg8(&self, reg: u8) -> u8 {
        debug_assert!(reg < 8, "Invalid 8-bit register index: {} (must be 0-7)", reg);
        match reg {
            0 => self.eax.low8(),  // AL
            1 => self.ecx.low8(),  // CL
            2 => self.edx.low8(),  // DL
            3 => self.ebx.low8(),  // BL
            4 => self.eax.high8(), // AH
            5 => self.ecx.high8(), // CH
            6 => self.edx.high8(), // DH
            7 => self.ebx.high8(), // BH
            _ => unreachable!(),
        }
    }

    /// Set 8-bit register by operand encoding
    #[inline]
    pub fn set_reg8(&mut self, reg: u8, val: u8) {
        debug_assert!(reg < 8, "Invalid 8-bit register index: {} (must be 0-7)", reg);
        match reg {
            0 => self.eax.set_low8(val),  // AL
            1 => self.ecx.set_low8(val),  // CL
            2 => self.edx.set_low8(val),  // DL
            3 => self.ebx.set_low8(val),  // BL
            4 => self.eax.set_high8(val), // AH
            5 => self.ecx.set_high8(val), // CH
            6 => self.edx.set_high8(val), // DH
            7 => self.ebx.set_high8(val), // BH
            _ => unreachable!(),
        }
    }

    /// Get 16-bit register by operand encoding
    #[inline]
    pub fn reg16(&self, reg: u8) -> u16 {
        debug_assert!(reg < 8, "Invalid 16-bit register index: {} (must be 0-7)", reg);
        match reg {
            0 => self.eax.word(), // AX
            1 => self.ecx.word(), // CX
            2 => self.edx.word(), // DX
            3 => self.ebx.word(), // BX
            4 => self.esp.word(), // SP
            5 => self.ebp.word(), // BP
            6 => self.esi.word(), // SI
            7 => self.edi.word(), // DI
            _ => unreachable!(),
        }
    }

    /// Set 16-bit register by operand encoding, preserving the high word
    #[inline]
    pub fn set_reg16(&mut self, reg: u8, val: u16) {
        debug_assert!(reg < 8, "Invalid 16-bit register index: {} (must be 0-7)", reg);
        match reg {
            0 => self.eax.set_word(val), // AX
            1 => self.ecx.set_word(val), // CX
            2 => self.edx.set_word(val), // DX
            3 => self.ebx.set_word(val), // BX
            4 => self.esp.set_word(val), // SP
            5 => self.ebp.set_word(val), // BP
            6 => self.esi.set_word(val), // SI
            7 => self.edi.set_word(val), // DI
            _ => unreachable!(),
        }
    }

    /// Get 32-bit register by operand encoding
    #[inline]
    pub fn reg32(&self, reg: u8) -> u32 {
        debug_assert!(reg < 8, "Invalid 32-bit register index: {} (must be 0-7)", reg);
        match reg {
            0 => self.eax.dword(), // EAX
            1 => self.ecx.dword(), // ECX
            2 => self.edx.dword(), // EDX
            3 => self.ebx.dword(), // EBX
            4 => self.esp.dword(), // ESP
            5 => self.ebp.dword(), // EBP
            6 => self.esi.dword(), // ESI
            7 => self.edi.dword(), // EDI
            _ => unreachable!(),
        }
    }

    /// Set 32-bit register by operand encoding
    #[inline]
    pub fn set_reg32(&mut self, reg: u8, val: u32) {
        debug_assert!(reg < 8, "Invalid 32-bit register index: {} (must be 0-7)", reg);
        match reg {
            0 => self.eax.set_dword(val), // EAX
            1 => self.ecx.set_dword(val), // ECX
            2 => self.edx.set_dword(val), // EDX
            3 => self.ebx.set_dword(val), // EBX
            4 => self.esp.set_dword(val), // ESP
            5 => self.ebp.set_dword(val), // EBP
            6 => self.esi.set_dword(val), // ESI
            7 => self.edi.set_dword(val), // EDI
            _ => unreachable!(),
        }
    }

    /// Get segment register (low 16 bits) by segment encoding
    #[inline]
    pub fn sreg(&self, seg: u8) -> u16 {
        match seg {
            0 => self.es.word(),
            1 => self.cs.word(),
            2 => self.ss.word(),
            3 => self.ds.word(),
            4 => self.fs.word(),
            5 => self.gs.word(),
            _ => panic!("Invalid segment register index: {} (must be 0-5)", seg),
        }
    }

    /// Set segment register (low 16 bits) by segment encoding
    ///
    /// Instruction-level restrictions (CS is not a valid MOV destination)
    /// are enforced by the opcode handlers, not here.
    #[inline]
    pub fn set_sreg(&mut self, seg: u8, val: u16) {
        match seg {
            0 => self.es.set_word(val),
            1 => self.cs.set_word(val),
            2 => self.ss.set_word(val),
            3 => self.ds.set_word(val),
            4 => self.fs.set_word(val),
            5 => self.gs.set_word(val),
            _ => panic!("Invalid segment register index: {} (must be 0-5)", seg),
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state() {
        let regs = RegisterFile::new();

        assert_eq!(regs.eax.dword(), 0);
        assert_eq!(regs.esp.dword(), 0);
        assert_eq!(regs.cs.word(), 0);
        assert_eq!(regs.eip.dword(), 0);
        assert_eq!(regs.eflags.dword(), EFLAGS_RESERVED);
    }

    #[test]
    fn test_narrow_views_of_dword_write() {
        let mut r = Reg32::default();
        r.set_dword(0xDEADBEEF);

        assert_eq!(r.word(), 0xBEEF);
        assert_eq!(r.low8(), 0xEF);
        assert_eq!(r.high8(), 0xBE);
    }

    #[test]
    fn test_word_write_preserves_high_word() {
        let mut r = Reg32::new(0x12345678);
        r.set_word(0xAAAA);

        assert_eq!(r.dword(), 0x1234AAAA);
        assert_eq!(r.word(), 0xAAAA);
    }

    #[test]
    fn test_byte_writes_preserve_other_bytes() {
        let mut r = Reg32::new(0x12345678);

        r.set_low8(0xFF);
        assert_eq!(r.dword(), 0x123456FF);

        r.set_high8(0x00);
        assert_eq!(r.dword(), 0x123400FF);
        assert_eq!(r.low8(), 0xFF);
        assert_eq!(r.high8(), 0x00);
    }

    #[test]
    fn test_reg8_encoding_order() {
        let mut regs = RegisterFile::new();
        regs.eax.set_dword(0x0000_AABB); // AH=0xAA AL=0xBB
        regs.ecx.set_dword(0x0000_CCDD);
        regs.edx.set_dword(0x0000_EE11);
        regs.ebx.set_dword(0x0000_2233);

        // AL CL DL BL AH CH DH BH
        assert_eq!(regs.reg8(0), 0xBB);
        assert_eq!(regs.reg8(1), 0xDD);
        assert_eq!(regs.reg8(2), 0x11);
        assert_eq!(regs.reg8(3), 0x33);
        assert_eq!(regs.reg8(4), 0xAA);
        assert_eq!(regs.reg8(5), 0xCC);
        assert_eq!(regs.reg8(6), 0xEE);
        assert_eq!(regs.reg8(7), 0x22);
    }

    #[test]
    fn test_reg16_encoding_order() {
        let mut regs = RegisterFile::new();
        for reg in 0..8u8 {
            regs.set_reg16(reg, 0x1000 + reg as u16);
        }

        assert_eq!(regs.eax.word(), 0x1000); // AX
        assert_eq!(regs.ecx.word(), 0x1001); // CX
        assert_eq!(regs.edx.word(), 0x1002); // DX
        assert_eq!(regs.ebx.word(), 0x1003); // BX
        assert_eq!(regs.esp.word(), 0x1004); // SP
        assert_eq!(regs.ebp.word(), 0x1005); // BP
        assert_eq!(regs.esi.word(), 0x1006); // SI
        assert_eq!(regs.edi.word(), 0x1007); // DI
    }

    #[test]
    fn test_view_aliasing_through_encodings() {
        let mut regs = RegisterFile::new();

        regs.set_reg32(0, 0xCAFEBABE); // EAX
        assert_eq!(regs.reg16(0), 0xBABE); // AX
        assert_eq!(regs.reg8(0), 0xBE); // AL
        assert_eq!(regs.reg8(4), 0xBA); // AH

        // Writing AH must not disturb AL or the high word
        regs.set_reg8(4, 0x55);
        assert_eq!(regs.reg32(0), 0xCAFE55BE);

        // Writing AX must not disturb the high word
        regs.set_reg16(0, 0x1234);
        assert_eq!(regs.reg32(0), 0xCAFE1234);
    }

    #[test]
    fn test_esp_has_no_byte_views() {
        let mut regs = RegisterFile::new();
        regs.esp.set_dword(0x00007C00);

        // Index 4 in 8-bit encoding is AH, not any part of ESP
        regs.set_reg8(4, 0xFF);
        assert_eq!(regs.esp.dword(), 0x00007C00);
        assert_eq!(regs.eax.high8(), 0xFF);
    }

    #[test]
    fn test_sreg_encoding_order() {
        let mut regs = RegisterFile::new();
        for seg in 0..6u8 {
            regs.set_sreg(seg, 0x2000 + seg as u16);
        }

        assert_eq!(regs.es.word(), 0x2000);
        assert_eq!(regs.cs.word(), 0x2001);
        assert_eq!(regs.ss.word(), 0x2002);
        assert_eq!(regs.ds.word(), 0x2003);
        assert_eq!(regs.fs.word(), 0x2004);
        assert_eq!(regs.gs.word(), 0x2005);
    }

    #[test]
    fn test_sreg_write_keeps_low16_semantics() {
        let mut regs = RegisterFile::new();
        regs.ds.set_dword(0xFFFF_0000);

        regs.set_sreg(3, 0x7C0);
        assert_eq!(regs.ds.word(), 0x7C0);
        // Only the architecturally meaningful low word is replaced
        assert_eq!(regs.ds.dword(), 0xFFFF_07C0);
    }

    #[test]
    #[should_panic(expected = "Invalid segment register index")]
    fn test_sreg_out_of_range_panics() {
        let regs = RegisterFile::new();
        let _ = regs.sreg(6);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut regs = RegisterFile::new();
        regs.eax.set_dword(0x11223344);
        regs.esp.set_dword(0x7C00);
        regs.cs.set_word(0xFFFF);

        let json = serde_json::to_value(&regs).unwrap();
        let restored: RegisterFile = serde_json::from_value(json).unwrap();

        assert_eq!(restored, regs);
    }
}
