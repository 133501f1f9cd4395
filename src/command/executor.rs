//! Command executor - resolves an invocation and runs it

use std::io::{self, Write};

use peci_shared::{args, catalog, ExecutionLoop, LoopReport, PeciTransport, UsageError};
use thiserror::Error;
use tracing::{debug, info};

use crate::cli::Invocation;

/// Why a command could not be run to completion
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command was rejected before any protocol call
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Writing results failed
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Runs invocations against one transport
pub struct CommandExecutor<T> {
    transport: T,
}

impl<T: PeciTransport> CommandExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve the invocation and run it.
    ///
    /// Name and argument problems are reported before the device is selected
    /// or any request is sent.
    pub fn execute<W: Write + ?Sized>(
        &mut self,
        invocation: &Invocation,
        out: &mut W,
    ) -> Result<LoopReport, CommandError> {
        let operation = catalog::resolve(&invocation.operation)?;
        let resolved = args::resolve(operation, invocation.target, &invocation.params)?;
        debug!("Resolved {} to {:?}", operation.name, resolved);

        if let Some(device) = invocation.device.as_deref() {
            info!("Using PECI device {}", device);
            self.transport.set_device(Some(device));
        }

        let report = ExecutionLoop::new(invocation.loops).run(&resolved, &mut self.transport, out)?;
        out.flush()?;
        Ok(report)
    }
}
