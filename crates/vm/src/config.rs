//! Virtual machine configuration.
//!
//! Injected once when a processor or worker is constructed; nothing in the
//! machine reads configuration from ambient state.

use serde::{Deserialize, Serialize};

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("verbosity must be between 0 and 3, got {0}")]
    InvalidVerbosity(u8),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Logging and validation level.
///
/// | level | behavior                                   |
/// |-------|--------------------------------------------|
/// | 0     | silent                                     |
/// | 1     | log failures                               |
/// | 2     | validate inputs and log failures           |
/// | 3     | validate and trace every instruction       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Verbosity(u8);

impl Verbosity {
    pub const SILENT: Verbosity = Verbosity(0);
    pub const FAILURES: Verbosity = Verbosity(1);
    pub const VALIDATE: Verbosity = Verbosity(2);
    pub const TRACE: Verbosity = Verbosity(3);

    pub fn new(level: u8) -> Result<Self, ConfigError> {
        if level > 3 {
            return Err(ConfigError::InvalidVerbosity(level));
        }
        Ok(Self(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn logs_failures(self) -> bool {
        self.0 >= 1
    }

    pub fn validates(self) -> bool {
        self.0 >= 2
    }

    pub fn traces(self) -> bool {
        self.0 >= 3
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::FAILURES
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Verbosity::new(level)
    }
}

impl From<Verbosity> for u8 {
    fn from(verbosity: Verbosity) -> Self {
        verbosity.0
    }
}

/// Processor and worker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub verbosity: Verbosity,
    /// Instructions a worker executes for one task before requeueing it.
    pub quantum: u64,
    /// Maximum depth of a task's component stack.
    pub max_components: usize,
    /// Maximum depth of a task's call stack.
    pub max_contexts: usize,
}

impl VmConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantum == 0 {
            return Err(ConfigError::Invalid("quantum must be > 0".to_string()));
        }
        if self.max_components == 0 {
            return Err(ConfigError::Invalid("max_components must be > 0".to_string()));
        }
        if self.max_contexts == 0 {
            return Err(ConfigError::Invalid("max_contexts must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            quantum: 1000,
            max_components: 1024,
            max_contexts: 256,
        }
    }
}
