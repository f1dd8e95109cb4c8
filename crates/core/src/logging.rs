//! Centralized logging configuration for the emulator core.
//!
//! # Architecture
//!
//! - **LogConfig**: Thread-safe global configuration using atomic operations
//! - **LogLevel**: Hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: Emulator components (Cpu, Decode, Memory, Faults)
//! - **log()**: Common logging function for all output with async file I/O
//!
//! The global instance is initialized from the environment on first use:
//! `RMX_LOG` holds either a bare level (`debug`) or a comma-separated list of
//! `category=level` pairs (`cpu=trace,faults=debug`); `RMX_LOG_FILE` routes
//! output to a file through a background writer thread instead of stderr.
//!
//! # Performance
//!
//! - Messages are built lazily; a disabled category costs one atomic load
//! - File I/O happens on a background thread, never on the execution loop
//! - Console output goes straight to stderr
//!
//! # Usage
//!
//! ```rust
//! use rmx_core::logging::{log, LogLevel, LogCategory};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("CPU: halt at CS:EIP={:04X}:{:08X}", 0u16, 0x7C00u32)
//! });
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to u8 for atomic storage
    fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from u8 for atomic loading
    fn from_u8(val: u8) -> Self {
        match val {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the emulator components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Execution loop (instruction retirement, halts)
    Cpu,
    /// Instruction decoding (prefixes, ModRM/SIB, effective addresses)
    Decode,
    /// Segment:offset memory access
    Memory,
    /// Raised faults (unknown opcodes, invalid encodings, mode errors)
    Faults,
}

impl LogCategory {
    /// Parse category from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(LogCategory::Cpu),
            "decode" => Some(LogCategory::Decode),
            "memory" | "mem" => Some(LogCategory::Memory),
            "faults" | "fault" => Some(LogCategory::Faults),
            _ => None,
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Global log level (applies to all categories unless overridden)
    global_level: AtomicU8,
    /// Execution-loop log level
    cpu_level: AtomicU8,
    /// Decoder log level
    decode_level: AtomicU8,
    /// Memory-access log level
    memory_level: AtomicU8,
    /// Fault log level
    fault_level: AtomicU8,
    /// Channel for sending log messages to the background thread
    log_sender: Mutex<Option<Sender<String>>>,
    /// Flag indicating if logging to file is enabled
    file_logging_enabled: AtomicBool,
}

impl LogConfig {
    /// Create a new LogConfig with all logging disabled
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            cpu_level: AtomicU8::new(LogLevel::Off as u8),
            decode_level: AtomicU8::new(LogLevel::Off as u8),
            memory_level: AtomicU8::new(LogLevel::Off as u8),
            fault_level: AtomicU8::new(LogLevel::Off as u8),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
        }
    }

    /// Create a LogConfig from the `RMX_LOG` / `RMX_LOG_FILE` environment
    fn from_env() -> Self {
        let config = Self::new();
        if let Ok(spec) = std::env::var("RMX_LOG") {
            config.apply_spec(&spec);
        }
        if let Ok(path) = std::env::var("RMX_LOG_FILE") {
            // A broken log file must not prevent emulation from starting
            let _ = config.set_log_file(PathBuf::from(path));
        }
        config
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::from_env)
    }

    /// Apply a configuration spec: either a bare level (`debug`) or
    /// comma-separated `category=level` pairs (`cpu=trace,faults=debug`).
    /// Unrecognized entries are ignored.
    pub fn apply_spec(&self, spec: &str) {
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((cat, level)) => {
                    if let (Some(cat), Some(level)) = (
                        LogCategory::from_str(cat.trim()),
                        LogLevel::from_str(level.trim()),
                    ) {
                        self.set_level(cat, level);
                    }
                }
                None => {
                    if let Some(level) = LogLevel::from_str(part) {
                        self.set_global_level(level);
                    }
                }
            }
        }
    }

    /// Set the global log level (applies to all categories unless overridden)
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level.to_u8(), Ordering::Relaxed);
    }

    /// Get the global log level
    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_atomic(category)
            .store(level.to_u8(), Ordering::Relaxed);
    }

    /// Get log level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_atomic(category).load(Ordering::Relaxed))
    }

    fn category_atomic(&self, category: LogCategory) -> &AtomicU8 {
        match category {
            LogCategory::Cpu => &self.cpu_level,
            LogCategory::Decode => &self.decode_level,
            LogCategory::Memory => &self.memory_level,
            LogCategory::Faults => &self.fault_level,
        }
    }

    /// Check if a message should be logged for the given category and level
    ///
    /// Returns true if:
    /// 1. The category-specific level is set and >= the message level, OR
    /// 2. The category-specific level is Off AND the global level >= the message level
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            // Category has a specific level set
            level <= category_level
        } else {
            // Fall back to global level
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        self.set_level(LogCategory::Cpu, LogLevel::Off);
        self.set_level(LogCategory::Decode, LogLevel::Off);
        self.set_level(LogCategory::Memory, LogLevel::Off);
        self.set_level(LogCategory::Faults, LogLevel::Off);
    }

    /// Set the log file path
    ///
    /// Starts a background thread for async file I/O to keep the execution
    /// loop free of disk writes. If a logging thread is already running it is
    /// replaced; the old one exits when its sender is dropped.
    ///
    /// Returns Ok(()) if successful, or an error if the file cannot be opened.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        // Open the file first to validate it works
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        // Create a channel for log messages
        let (sender, receiver) = channel::<String>();

        // Spawn background thread for async file writing
        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                // Process messages until the channel is closed
                while let Ok(message) = receiver.recv() {
                    // Write to file, ignore errors (logging must not crash emulation)
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
                let _ = file.flush();
            })?;

        // Store the sender
        let mut log_sender = self.log_sender.lock().unwrap();
        *log_sender = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);

        Ok(())
    }

    /// Close the log file and fall back to stderr output
    pub fn clear_log_file(&self) {
        let mut log_sender = self.log_sender.lock().unwrap();
        *log_sender = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
        // Thread stops on its own when the sender is dropped
    }

    /// Write a message to the configured output (file or stderr)
    fn write_message(&self, message: &str) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            let log_sender = self.log_sender.lock().unwrap();
            if let Some(ref sender) = *log_sender {
                // If the writer thread is gone, fall back to stderr
                if sender.send(message.to_string()).is_err() {
                    eprintln!("{}", message);
                }
            } else {
                eprintln!("{}", message);
            }
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Log a message with the specified category and level
///
/// The message is lazily evaluated via a closure, so formatting only occurs
/// when logging is actually enabled for the given category and level.
///
/// # Examples
///
/// ```rust
/// use rmx_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Faults, LogLevel::Debug, || {
///     format!("FAULT: unknown opcode 0x{:02X}", 0x0Fu8)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if config.should_log(category, level) {
        let message = message_fn();
        config.write_message(&message);
    }
}
