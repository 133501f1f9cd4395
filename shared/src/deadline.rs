//! Deadline-guarded raw batches
//!
//! IPC callers time out on their own at roughly 24-25 seconds. A batch of raw
//! commands is therefore given a fixed 23 second budget, fixed once before the
//! first command starts. The budget is checked before each command; once it
//! has passed, the remaining commands are skipped and the responses gathered
//! so far are returned. A command already on the wire always completes.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::engine::CcHistogram;
use crate::error::RequestFormatError;
use crate::limits;
use crate::transport::{PeciTransport, RawCommand, Reading, Request, Target};

/// Wall-clock budget for one batch
pub const RAW_BATCH_BUDGET: Duration = Duration::from_secs(limits::RAW_BATCH_BUDGET_SECS);

impl RawCommand {
    /// Decode one batch entry: address, write length, read length, payload.
    /// `index` is only used to report which entry was malformed.
    pub fn from_wire(index: usize, bytes: &[u8]) -> Result<Self, RequestFormatError> {
        if bytes.len() < limits::RAW_HEADER_LEN {
            return Err(RequestFormatError::CommandTooShort {
                index,
                len: bytes.len(),
            });
        }
        Ok(Self::new(
            bytes[0],
            bytes[1],
            bytes[2],
            &bytes[limits::RAW_HEADER_LEN..],
        ))
    }
}

/// Absolute point after which no further command may start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineBudget {
    deadline: Instant,
}

impl DeadlineBudget {
    pub fn start<C: Clock + ?Sized>(clock: &C, budget: Duration) -> Self {
        Self {
            deadline: clock.now() + budget,
        }
    }

    pub fn is_exhausted(&self, now: Instant) -> bool {
        now > self.deadline
    }
}

/// Result of a batch that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// One response per executed command, in request order
    pub responses: Vec<Vec<u8>>,
    /// Completion codes (first response byte) of executed commands
    pub histogram: CcHistogram,
    /// Number of commands in the request
    pub requested: usize,
}

impl BatchOutcome {
    /// True when the deadline cut the batch short
    pub fn is_partial(&self) -> bool {
        self.responses.len() < self.requested
    }
}

/// Runs raw batches under a single deadline
pub struct DeadlineGuard<C = MonotonicClock> {
    budget: Duration,
    clock: C,
}

impl DeadlineGuard<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }
}

impl Default for DeadlineGuard<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> DeadlineGuard<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            budget: RAW_BATCH_BUDGET,
            clock,
        }
    }

    /// Validate and execute a batch of raw commands.
    ///
    /// Every command is checked before any is issued: one that is shorter
    /// than its header fails the whole batch and nothing reaches the
    /// transport.
    pub fn run_batch<T, B>(
        &self,
        commands: &[B],
        transport: &mut T,
    ) -> Result<BatchOutcome, RequestFormatError>
    where
        T: PeciTransport + ?Sized,
        B: AsRef<[u8]>,
    {
        let parsed = commands
            .iter()
            .enumerate()
            .map(|(index, bytes)| RawCommand::from_wire(index, bytes.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let requested = parsed.len();
        let budget = DeadlineBudget::start(&self.clock, self.budget);
        let mut outcome = BatchOutcome {
            responses: Vec::with_capacity(requested),
            histogram: CcHistogram::new(),
            requested,
        };

        for command in parsed {
            if budget.is_exhausted(self.clock.now()) {
                warn!(
                    "{} second deadline reached after {}/{} raw commands, aborting the rest to avoid a caller timeout",
                    self.budget.as_secs(),
                    outcome.responses.len(),
                    requested
                );
                break;
            }

            let target = Target {
                address: command.address,
                ..Target::default()
            };
            let read_len = command.read_len as usize;
            let result = transport.transact(&target, &Request::Raw(command));
            if !result.is_success() {
                debug!(
                    "Raw command to 0x{:02x} returned status {}",
                    target.address, result.status
                );
            }

            let mut response = match result.reading {
                Reading::Raw(bytes) => bytes,
                _ => Vec::new(),
            };
            response.resize(read_len, 0);
            if let Some(&cc) = response.first() {
                outcome.histogram.record(cc);
            }
            outcome.responses.push(response);
        }

        debug!(
            "Raw batch finished: {}/{} commands, cc counts {:?}",
            outcome.responses.len(),
            requested,
            outcome.histogram.iter().collect::<Vec<_>>()
        );
        Ok(outcome)
    }
}
