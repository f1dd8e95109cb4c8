//! Core x86 emulation primitives: registers, memory, CPU, and logging.

pub mod cpu_x86;
pub mod logging;
pub mod memory;
pub mod registers;
