//! Logging support.
//!
//! A [`Logger`] value is threaded through the engine rather than kept as
//! process-wide state. Callers may install callbacks for both the
//! level-gated progress stream and the typed message stream; without
//! callbacks, output goes to stderr.

use std::fmt;

/// Bitmask of message detail levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLevel(u8);

impl MessageLevel {
    /// No output
    pub const NONE: MessageLevel = MessageLevel(0);
    /// Per-iteration detail
    pub const VERBOSE: MessageLevel = MessageLevel(1);
    /// Rebuild-level detail
    pub const DETAILED: MessageLevel = MessageLevel(2);
    /// Solve-level summary
    pub const MINIMAL: MessageLevel = MessageLevel(4);
    /// Unconditional output
    pub const ALWAYS: MessageLevel = MessageLevel(8);

    /// True when any bit of `other` is enabled in `self`.
    pub fn accepts(self, other: MessageLevel) -> bool {
        other.0 & MessageLevel::ALWAYS.0 != 0 || self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for MessageLevel {
    type Output = MessageLevel;
    fn bitor(self, rhs: MessageLevel) -> MessageLevel {
        MessageLevel(self.0 | rhs.0)
    }
}

/// Category of a typed log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    /// Informational
    Info,
    /// Recoverable anomaly
    Warning,
    /// Hard error
    Error,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Info => write!(f, "INFO"),
            LogType::Warning => write!(f, "WARNING"),
            LogType::Error => write!(f, "ERROR"),
        }
    }
}

/// Callback for the level-gated progress stream.
pub type PrintCallback = Box<dyn Fn(MessageLevel, &str) + Send + Sync>;

/// Callback for the typed message stream.
pub type LogCallback = Box<dyn Fn(LogType, &str) + Send + Sync>;

/// Message sink threaded through the engine.
pub struct Logger {
    level: MessageLevel,
    print_callback: Option<PrintCallback>,
    log_callback: Option<LogCallback>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("print_callback", &self.print_callback.is_some())
            .field("log_callback", &self.log_callback.is_some())
            .finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new(MessageLevel::MINIMAL)
    }
}

impl Logger {
    /// Logger accepting messages matching `level`, writing to stderr.
    pub fn new(level: MessageLevel) -> Self {
        Logger {
            level,
            print_callback: None,
            log_callback: None,
        }
    }

    /// Logger with all detail levels enabled.
    pub fn verbose() -> Self {
        Logger::new(MessageLevel::VERBOSE | MessageLevel::DETAILED | MessageLevel::MINIMAL)
    }

    /// Silent logger.
    pub fn quiet() -> Self {
        Logger::new(MessageLevel::NONE)
    }

    /// Install a callback for the progress stream.
    pub fn with_print_callback(mut self, callback: PrintCallback) -> Self {
        self.print_callback = Some(callback);
        self
    }

    /// Install a callback for the typed message stream.
    pub fn with_log_callback(mut self, callback: LogCallback) -> Self {
        self.log_callback = Some(callback);
        self
    }

    /// Currently enabled levels.
    pub fn level(&self) -> MessageLevel {
        self.level
    }

    /// Emit a progress message at `level`; dropped unless the logger's
    /// mask accepts it.
    pub fn print(&self, level: MessageLevel, msg: &str) {
        if !self.level.accepts(level) {
            return;
        }
        match &self.print_callback {
            Some(cb) => cb(level, msg),
            None => eprintln!("{}", msg),
        }
    }

    /// Emit a typed message. Warnings and errors are never dropped.
    pub fn log(&self, log_type: LogType, msg: &str) {
        if log_type == LogType::Info && !self.level.accepts(MessageLevel::MINIMAL) {
            return;
        }
        match &self.log_callback {
            Some(cb) => cb(log_type, msg),
            None => eprintln!("{}: {}", log_type, msg),
        }
    }
}
