//! Raw command IPC messages

use prost::{Enumeration, Message};

/// Outcome of a raw send
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum SendStatus {
    /// Every command ran
    Complete = 0,
    /// The batch deadline passed; `responses` is a prefix of the commands
    DeadlineAborted = 1,
    /// A command was malformed; nothing ran
    InvalidRequest = 2,
}

/// Send a batch of raw PECI commands to one device
#[derive(Clone, PartialEq, Message)]
pub struct RawSendRequest {
    /// Device node, e.g. `/dev/peci-0`. Empty selects the default.
    #[prost(string, tag = "1")]
    pub device: String,

    /// Each command is `[address, write length, read length, payload...]`
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub commands: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RawSendResponse {
    /// One response per executed command, `read length` bytes each
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub responses: Vec<Vec<u8>>,

    #[prost(enumeration = "SendStatus", tag = "2")]
    pub status: i32,

    /// Set when `status` is `InvalidRequest`
    #[prost(string, tag = "3")]
    pub fault: String,
}
