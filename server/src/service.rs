//! Raw command service
//!
//! Owns the transport and runs one batch at a time under the deadline guard.

use peci_shared::codec;
use peci_shared::{
    Clock, DeadlineGuard, MonotonicClock, PeciTransport, RawSendRequest, RawSendResponse,
    RequestFormatError, SendStatus,
};
use tracing::{info, warn};

pub struct RawService<T, C = MonotonicClock> {
    transport: T,
    guard: DeadlineGuard<C>,
}

impl<T: PeciTransport> RawService<T, MonotonicClock> {
    pub fn new(transport: T) -> Self {
        Self::with_guard(transport, DeadlineGuard::new())
    }
}

impl<T: PeciTransport, C: Clock> RawService<T, C> {
    pub fn with_guard(transport: T, guard: DeadlineGuard<C>) -> Self {
        Self { transport, guard }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one batch. The device named in the request is selected for the
    /// batch only; the default device is restored before returning.
    ///
    /// A batch whose full response could not fit in one frame is rejected
    /// before anything is sent.
    pub fn send(&mut self, request: &RawSendRequest) -> RawSendResponse {
        let device = Some(request.device.as_str()).filter(|d| !d.is_empty());

        let result = check_response_size(request).and_then(|()| {
            self.transport.set_device(device);
            let result = self
                .guard
                .run_batch(request.commands.as_slice(), &mut self.transport);
            self.transport.set_device(None);
            result
        });

        let response = match result {
            Ok(outcome) => RawSendResponse::from_outcome(outcome),
            Err(e) => {
                warn!("Rejected raw batch: {}", e);
                RawSendResponse::invalid(e.to_string())
            }
        };

        if response.status() != SendStatus::InvalidRequest {
            info!(
                "Raw batch on {}: {}/{} commands, {:?}",
                device.unwrap_or("default device"),
                response.responses.len(),
                request.commands.len(),
                response.status()
            );
        }
        response
    }
}

fn check_response_size(request: &RawSendRequest) -> Result<(), RequestFormatError> {
    let needed = request.max_response_len();
    let limit = codec::MAX_MESSAGE_SIZE as usize;
    if needed > limit {
        return Err(RequestFormatError::ResponseTooLarge { needed, limit });
    }
    Ok(())
}
