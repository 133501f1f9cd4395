mod cli;
mod command;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;

use cli::{CliError, Parsed};
use command::{CommandError, CommandExecutor};
use peci_shared::sim::SimTarget;
use peci_shared::PeciTransport;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<ExitCode> {
    // Results go to stdout; diagnostics stay on stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let code = run(std::env::args_os(), SimTarget::new(), &mut out);
    out.flush().context("Failed to flush stdout")?;
    Ok(ExitCode::from(code))
}

/// Parse `args`, run the command against `transport`, and return the exit code
fn run<I, T, P, W>(args: I, transport: P, out: &mut W) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    P: PeciTransport,
    W: Write + ?Sized,
{
    let invocation = match cli::parse(args) {
        Ok(Parsed::Run(invocation)) => invocation,
        Ok(Parsed::Help) => {
            let _ = write!(out, "{}", cli::usage());
            return 0;
        }
        Err(CliError::Clap(e)) => {
            let _ = writeln!(out, "{}", e.render());
            let _ = write!(out, "{}", cli::usage());
            return 1;
        }
        Err(CliError::Usage(e)) => return usage_failure(&e, out),
    };

    let mut executor = CommandExecutor::new(transport);
    match executor.execute(&invocation, out) {
        Ok(report) => {
            debug!("Finished with {} failed calls", report.stats.failures);
            0
        }
        Err(CommandError::Usage(e)) => usage_failure(&e, out),
        Err(CommandError::Io(e)) => {
            error!("{}", e);
            1
        }
    }
}

fn usage_failure<E: std::fmt::Display, W: Write + ?Sized>(err: &E, out: &mut W) -> u8 {
    let _ = writeln!(out, "ERROR: {}", err);
    let _ = write!(out, "{}", cli::usage());
    1
}
