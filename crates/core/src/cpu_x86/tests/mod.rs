//! Tests for the x86 real-mode CPU core
//!
//! Tests are organized by operation size and type:
//! - `tests_8bit`: 8-bit data movement
//! - `tests_16bit`: 16-bit data movement
//! - `tests_32bit`: 32-bit operand forms (0x66/0x67 prefixes)
//! - `tests_addressing`: ModRM/SIB decoding and effective addresses
//! - `tests_moffs`: accumulator moves with direct offset literals
//! - `tests_stack`: PUSH operations
//! - `tests_faults`: invalid encodings and decode faults
//! - `tests_misc`: construction, reset, translation, halting, dispatch

mod tests_moffs;
