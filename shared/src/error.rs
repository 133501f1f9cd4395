//! Error types for request resolution and raw batches

use thiserror::Error;

/// Problems with how a tool was invoked. No protocol call is made once one
/// of these is raised; the front end prints it with the usage text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Unrecognized command \"{0}\"")]
    UnknownOperation(String),

    #[error("Unsupported arguments for {operation} ({got} given)")]
    Arity { operation: &'static str, got: usize },

    #[error("Incorrect write length for raw command: {supplied} bytes given for write length {write_len}")]
    RawWriteLength { write_len: u8, supplied: usize },

    #[error("Invalid loop count \"{0}\"")]
    InvalidLoopCount(String),

    #[error("Invalid address \"{0}\"")]
    InvalidAddress(String),

    #[error("Invalid domain ID \"{0}\"")]
    InvalidDomainId(String),

    #[error("Invalid size \"{0}\"")]
    InvalidSize(String),
}

/// A raw batch that cannot be issued at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFormatError {
    #[error("Command Length too short: command {index} has {len} bytes")]
    CommandTooShort { index: usize, len: usize },

    #[error("Response too large: up to {needed} bytes (max: {limit})")]
    ResponseTooLarge { needed: usize, limit: usize },
}
