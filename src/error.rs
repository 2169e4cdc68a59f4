//! Error types for the snapshot delivery pipeline.
//!
//! Every fallible operation in the crate returns [`LinkError`]. Errors carry
//! structured context so the refresh boundary can log them precisely and decide
//! whether a later attempt is worthwhile.
//!
//! ## Error Categories
//!
//! - **Decode Errors**: shared-memory region shorter than its declared contents
//! - **Integrity Errors**: CRC or length mismatches seen on the receiving side
//! - **Transport Errors**: notification emission failures
//! - **I/O and Config Errors**: region, serial file, or config file problems
//! - **Command Errors**: measurement control or time synchronisation failures
//!
//! ## Recovery
//!
//! ```rust
//! use databox_link::LinkError;
//!
//! let error = LinkError::transport_unavailable("adapter powered off");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for the delivery pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error(
        "Shared memory region truncated: {num_devices} devices need {required} bytes, have {actual}"
    )]
    TruncatedBuffer { required: usize, actual: usize, num_devices: u8 },

    #[error("Integrity check failed for {context}: expected {expected:#010x}, found {actual:#010x}")]
    Integrity { context: String, expected: u32, actual: u32 },

    #[error("Notification transport unavailable: {reason}")]
    TransportUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Status probe failed: {reason}")]
    StatusProbe { reason: String },

    #[error("Command '{command}' failed: {reason}")]
    Command {
        command: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Protocol error: {details}")]
    Protocol { details: String },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::TruncatedBuffer { .. } => true,
            LinkError::TransportUnavailable { .. } => true,
            LinkError::StatusProbe { .. } => true,
            LinkError::Command { .. } => true,
            LinkError::Io { .. } => true,
            LinkError::Integrity { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::Parse { .. } => false,
            LinkError::UnsupportedPlatform { .. } => false,
            LinkError::Protocol { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::TruncatedBuffer { .. } => vec![
                "Check that the producer process is running",
                "Verify the configured region size matches the producer",
                "Request another refresh once the producer has written a full frame",
            ],
            LinkError::Integrity { .. } => vec![
                "Request a fresh transfer",
                "Check link quality between the peers",
            ],
            LinkError::TransportUnavailable { .. } => vec![
                "Check that the peer is still connected",
                "Verify the Bluetooth adapter is powered",
            ],
            LinkError::Io { .. } => vec![
                "Check the file exists and is readable",
                "Check file permissions",
            ],
            LinkError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare values against the documented defaults",
            ],
            LinkError::Parse { .. } => vec![
                "Check the data format",
                "Verify the source data is not corrupted",
            ],
            LinkError::StatusProbe { .. } => vec![
                "Check the status file path",
                "Verify the status producer is running",
            ],
            LinkError::Command { .. } => vec![
                "Check the measurement service is listening",
                "Verify the process has permission to set the system clock",
            ],
            LinkError::UnsupportedPlatform { .. } => vec![
                "Use an in-memory snapshot source on this platform",
                "Check documentation for platform requirements",
            ],
            LinkError::Protocol { .. } => vec![
                "Reduce the blob size or increase the payload size",
                "Check the frame was produced by a compatible sender",
            ],
        }
    }

    /// Helper constructor for truncated shared-memory regions.
    pub fn truncated(required: usize, actual: usize, num_devices: u8) -> Self {
        LinkError::TruncatedBuffer { required, actual, num_devices }
    }

    /// Helper constructor for CRC or length mismatches.
    pub fn integrity(context: impl Into<String>, expected: u32, actual: u32) -> Self {
        LinkError::Integrity { context: context.into(), expected, actual }
    }

    /// Helper constructor for transport failures.
    pub fn transport_unavailable(reason: impl Into<String>) -> Self {
        LinkError::TransportUnavailable { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_unavailable_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::TransportUnavailable { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for I/O errors with path context.
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LinkError::Io { path: path.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for command failures.
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        LinkError::Command { command: command.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for command failures with source.
    pub fn command_failed_with_source(
        command: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Command { command: command.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol(details: impl Into<String>) -> Self {
        LinkError::Protocol { details: details.into() }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        LinkError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io { path: PathBuf::from("<unknown>"), source: err }
    }
}
