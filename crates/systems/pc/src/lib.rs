//! Real-mode x86 machine
//!
//! Wires the x86 CPU core to a flat 1MB RAM and drives it the way a PC
//! firmware hand-off would: a boot image of at most one 512-byte sector is
//! copied to 0000:7C00, the stack pointer and instruction pointer both start
//! at 0x7C00, and execution runs until the program halts, faults, or an
//! instruction budget runs out.

mod bus;

use rmx_core::cpu_x86::{CpuX86, OpcodeTable, Step};
use serde_json::Value;
use thiserror::Error;

pub use bus::MachineRam;
pub use rmx_core::cpu_x86::{CpuMode, Fault};

/// Physical address the boot image is copied to and executed from
pub const BOOT_SECTOR_ADDR: u32 = 0x7C00;

/// Boot images are limited to a single sector
pub const BOOT_SECTOR_SIZE: usize = 512;

#[derive(Debug, Error)]
pub enum MachineError {
    /// Boot images must fit in one sector
    #[error("boot image is {0} bytes; the limit is one 512-byte sector")]
    BootImageTooLarge(usize),
    /// The CPU raised a fault while executing
    #[error("cpu fault: {0}")]
    Cpu(#[from] Fault),
    /// A save state could not be encoded or decoded
    #[error("state serialization: {0}")]
    State(#[from] serde_json::Error),
}

/// How a bounded run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program fetched the halt sentinel
    Halted {
        /// Instructions retired before the halt
        instructions: u64,
    },
    /// The instruction budget ran out first; execution can be resumed
    BudgetExhausted {
        /// Instructions retired, equal to the budget
        instructions: u64,
    },
}

/// Register and progress snapshot for host-side display
#[derive(Debug, Clone, serde::Serialize)]
pub struct DebugInfo {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
    pub cs: u16,
    pub ds: u16,
    pub ss: u16,
    pub es: u16,
    pub cycles: u64,
    pub halted: bool,
}

/// Real-mode machine: CPU, RAM, and the opcode dispatch table
pub struct RealModeMachine {
    cpu: CpuX86<MachineRam>,
    table: OpcodeTable<MachineRam>,
}

impl Default for RealModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RealModeMachine {
    /// Create a machine in the firmware hand-off state
    pub fn new() -> Self {
        let mut machine = Self {
            cpu: CpuX86::new(MachineRam::new()),
            table: OpcodeTable::new(),
        };
        machine.apply_boot_registers();
        machine
    }

    /// Point the stack and instruction pointers at the boot sector address
    ///
    /// Everything else keeps its power-on value: registers and segments
    /// zero, EFLAGS with only the reserved bit, real mode.
    fn apply_boot_registers(&mut self) {
        self.cpu.regs.esp.set_dword(BOOT_SECTOR_ADDR);
        self.cpu.regs.eip.set_dword(BOOT_SECTOR_ADDR);
    }

    /// Copy a boot image to 0000:7C00
    ///
    /// The image may be shorter than a full sector; anything longer is
    /// rejected before memory is touched.
    pub fn load_boot_image(&mut self, image: &[u8]) -> Result<(), MachineError> {
        if image.len() > BOOT_SECTOR_SIZE {
            return Err(MachineError::BootImageTooLarge(image.len()));
        }
        self.cpu.memory.load_image(BOOT_SECTOR_ADDR, image);
        Ok(())
    }

    /// Reset CPU state to the firmware hand-off state
    ///
    /// Memory contents survive, so a loaded boot image can be re-run.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.apply_boot_registers();
    }

    /// Execute a single instruction
    pub fn step(&mut self) -> Result<Step, MachineError> {
        Ok(self.cpu.step(&self.table)?)
    }

    /// Run until the program halts or the instruction budget is spent
    ///
    /// Faults end the run immediately; the machine state reflects every
    /// instruction retired before the faulting one.
    pub fn run(&mut self, max_instructions: u64) -> Result<RunOutcome, MachineError> {
        let mut instructions = 0;
        while instructions < max_instructions {
            match self.cpu.step(&self.table)? {
                Step::Halted => return Ok(RunOutcome::Halted { instructions }),
                Step::Retired { .. } => instructions += 1,
            }
        }
        Ok(RunOutcome::BudgetExhausted { instructions })
    }

    /// Borrow the CPU for register and memory read-back
    pub fn cpu(&self) -> &CpuX86<MachineRam> {
        &self.cpu
    }

    /// Borrow the CPU mutably, e.g. to preset registers before a run
    pub fn cpu_mut(&mut self) -> &mut CpuX86<MachineRam> {
        &mut self.cpu
    }

    /// Check if the CPU has fetched the halt sentinel
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Total cycles executed so far
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Snapshot the registers and progress counters for display
    pub fn debug_info(&self) -> DebugInfo {
        let regs = &self.cpu.regs;
        DebugInfo {
            eax: regs.eax.dword(),
            ebx: regs.ebx.dword(),
            ecx: regs.ecx.dword(),
            edx: regs.edx.dword(),
            esi: regs.esi.dword(),
            edi: regs.edi.dword(),
            ebp: regs.ebp.dword(),
            esp: regs.esp.dword(),
            eip: regs.eip.dword(),
            eflags: regs.eflags.dword(),
            cs: regs.cs.word(),
            ds: regs.ds.word(),
            ss: regs.ss.word(),
            es: regs.es.word(),
            cycles: self.cpu.cycles,
            halted: self.cpu.is_halted(),
        }
    }

    /// Serialize machine state for debugging
    ///
    /// Captures registers, mode, cycle count and the halt flag. Memory
    /// contents are not included; reload the boot image instead.
    pub fn save_state(&self) -> Value {
        serde_json::json!({
            "version": 1,
            "system": "x86-realmode",
            "registers": self.cpu.regs,
            "mode": self.cpu.mode,
            "cycles": self.cpu.cycles,
            "halted": self.cpu.is_halted(),
        })
    }

    /// Restore machine state saved by `save_state`
    pub fn load_state(&mut self, state: &Value) -> Result<(), MachineError> {
        if let Some(regs) = state.get("registers") {
            self.cpu.regs = serde_json::from_value(regs.clone())?;
        }
        if let Some(mode) = state.get("mode") {
            self.cpu.mode = serde_json::from_value(mode.clone())?;
        }
        if let Some(cycles) = state.get("cycles").and_then(|v| v.as_u64()) {
            self.cpu.cycles = cycles;
        }
        if let Some(halted) = state.get("halted").and_then(|v| v.as_bool()) {
            self.cpu.set_halted(halted);
        }
        Ok(())
    }
}
