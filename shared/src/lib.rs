//! PECI command engine
//!
//! This crate provides the pieces shared by the `peci_cmds` CLI and the raw
//! command IPC server: the operation catalog, argument resolution, the looped
//! execution engine, the deadline-guarded raw batch runner, and the IPC
//! message codec.

pub mod args;
pub mod catalog;
pub mod clock;
pub mod codec;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod format;
pub mod proto;
pub mod sim;
pub mod transport;

// Re-export commonly used types at crate root
pub use catalog::OperationDescriptor;
pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use deadline::{BatchOutcome, DeadlineGuard};
pub use engine::{CcHistogram, ExecutionLoop, LoopConfig, LoopReport, LoopStats};
pub use error::{RequestFormatError, UsageError};
pub use proto::{RawSendRequest, RawSendResponse, SendStatus};
pub use transport::{Outcome, PeciTransport, Reading, Request, ResolvedRequest, Status, Target};

/// Protocol limits enforced by the front ends
pub mod limits {
    /// Lowest client address a PECI target answers on (48)
    pub const MIN_CLIENT_ADDR: u8 = 0x30;

    /// Highest client address a PECI target answers on (55)
    pub const MAX_CLIENT_ADDR: u8 = 0x37;

    /// Address used when none is given
    pub const DEFAULT_CLIENT_ADDR: u8 = MIN_CLIENT_ADDR;

    /// Domain IDs are only 7 bits wide
    pub const MAX_DOMAIN_ID: u8 = 127;

    /// Data sizes accepted by the sized read/write commands, in bytes
    pub const VALID_DATA_SIZES: [u8; 5] = [1, 2, 4, 8, 16];

    /// Data size used when none is given (a DWORD)
    pub const DEFAULT_DATA_SIZE: u8 = 4;

    /// Wall-clock budget for one raw IPC batch. IPC callers give up at 24-25s.
    pub const RAW_BATCH_BUDGET_SECS: u64 = 23;

    /// Raw sub-transaction header: address, write length, read length
    pub const RAW_HEADER_LEN: usize = 3;
}

/// Builder helpers for creating responses
impl RawSendResponse {
    /// Every command in the batch ran
    pub fn complete(responses: Vec<Vec<u8>>) -> Self {
        Self {
            responses,
            status: SendStatus::Complete.into(),
            fault: String::new(),
        }
    }

    /// The batch deadline passed before every command ran
    pub fn aborted(responses: Vec<Vec<u8>>) -> Self {
        Self {
            responses,
            status: SendStatus::DeadlineAborted.into(),
            fault: String::new(),
        }
    }

    /// The request was rejected before any command ran
    pub fn invalid(fault: impl Into<String>) -> Self {
        Self {
            responses: Vec::new(),
            status: SendStatus::InvalidRequest.into(),
            fault: fault.into(),
        }
    }

    /// Build the response matching a batch outcome
    pub fn from_outcome(outcome: BatchOutcome) -> Self {
        if outcome.is_partial() {
            Self::aborted(outcome.responses)
        } else {
            Self::complete(outcome.responses)
        }
    }
}

impl RawSendRequest {
    /// Create a new raw send request
    pub fn new(device: impl Into<String>, commands: Vec<Vec<u8>>) -> Self {
        Self {
            device: device.into(),
            commands,
        }
    }

    /// Encoded size of the largest response this request can produce: every
    /// command answered with its full read length, plus the status field.
    pub fn max_response_len(&self) -> usize {
        use prost::encoding::{encoded_len_varint, int32, key_len};

        let responses: usize = self
            .commands
            .iter()
            .map(|command| {
                let read_len = command.get(2).copied().map_or(0, usize::from);
                key_len(1) + encoded_len_varint(read_len as u64) + read_len
            })
            .sum();
        responses + int32::encoded_len(2, &(SendStatus::DeadlineAborted as i32))
    }
}
