//! Command-line options
//!
//! Flags are taken as strings and validated here rather than by clap so that
//! numeric values accept the same decimal / `0x` forms as positional
//! parameters, and so every rejection is reported as a [`UsageError`].

use clap::{error::ErrorKind, CommandFactory, FromArgMatches, Parser};
use peci_shared::args::parse_number;
use peci_shared::{catalog, limits, LoopConfig, Target, UsageError};

#[derive(Parser, Debug)]
#[command(
    name = "peci_cmds",
    about = "Send PECI commands to a target",
    disable_version_flag = true
)]
pub struct Cli {
    /// Display additional information about the command
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Measure request-to-response time
    #[arg(short = 't')]
    pub time: bool,

    /// Loop the command the given number of times (1 to 4294967295)
    #[arg(short = 'l', value_name = "count")]
    pub loops: Option<String>,

    /// Address of the target. Accepted values are 48-55 (0x30-0x37). Default is 48 (0x30)
    #[arg(short = 'a', value_name = "addr")]
    pub address: Option<String>,

    /// Domain ID of the target. Accepted values are 0-127. Default is 0
    #[arg(short = 'i', value_name = "domain id")]
    pub domain: Option<String>,

    /// Size of data to read or write in bytes. Accepted values are 1, 2, 4, 8, and 16. Default is 4
    #[arg(short = 's', value_name = "size")]
    pub size: Option<String>,

    /// Set PECI device name, for example "-d /dev/peci-0"
    #[arg(short = 'd', value_name = "devName")]
    pub device: Option<String>,

    /// Command to send (case-insensitive)
    pub command: Option<String>,

    /// Command parameters
    pub params: Vec<String>,
}

/// A validated invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: Target,
    pub loops: LoopConfig,
    pub device: Option<String>,
    pub operation: String,
    pub params: Vec<String>,
}

/// What the command line asked for
#[derive(Debug)]
pub enum Parsed {
    /// Print usage and exit successfully
    Help,
    Run(Invocation),
}

/// Why the command line was rejected
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(#[from] UsageError),

    #[error("{0}")]
    Clap(#[from] clap::Error),
}

/// The clap command, with the operation list appended to its help
pub fn command() -> clap::Command {
    Cli::command().after_help(catalog::help_text())
}

/// Full usage text
pub fn usage() -> String {
    command().render_help().to_string()
}

/// Parse and validate a command line (including the program name)
pub fn parse<I, T>(args: I) -> Result<Parsed, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => return Ok(Parsed::Help),
        Err(e) => return Err(e.into()),
    };
    let cli = Cli::from_arg_matches(&matches)?;
    cli.into_parsed().map_err(CliError::from)
}

impl Cli {
    fn into_parsed(self) -> Result<Parsed, UsageError> {
        let mut loops = match &self.loops {
            Some(raw) => LoopConfig::parse(raw)?,
            None => LoopConfig::default(),
        };
        loops = loops.with_timing(self.time).with_verbose(self.verbose);

        let defaults = Target::default();
        let target = Target {
            address: match &self.address {
                Some(raw) => parse_address(raw)?,
                None => defaults.address,
            },
            domain_id: match &self.domain {
                Some(raw) => parse_domain_id(raw)?,
                None => defaults.domain_id,
            },
            size: match &self.size {
                Some(raw) => parse_size(raw)?,
                None => defaults.size,
            },
        };

        let Some(operation) = self.command else {
            return Ok(Parsed::Help);
        };

        Ok(Parsed::Run(Invocation {
            target,
            loops,
            device: self.device,
            operation,
            params: self.params,
        }))
    }
}

fn parse_address(raw: &str) -> Result<u8, UsageError> {
    let range = u64::from(limits::MIN_CLIENT_ADDR)..=u64::from(limits::MAX_CLIENT_ADDR);
    parse_number(raw)
        .filter(|value| range.contains(value))
        .map(|value| value as u8)
        .ok_or_else(|| UsageError::InvalidAddress(raw.to_string()))
}

fn parse_domain_id(raw: &str) -> Result<u8, UsageError> {
    parse_number(raw)
        .filter(|&value| value <= u64::from(limits::MAX_DOMAIN_ID))
        .map(|value| value as u8)
        .ok_or_else(|| UsageError::InvalidDomainId(raw.to_string()))
}

fn parse_size(raw: &str) -> Result<u8, UsageError> {
    parse_number(raw)
        .filter(|&value| limits::VALID_DATA_SIZES.iter().any(|&s| u64::from(s) == value))
        .map(|value| value as u8)
        .ok_or_else(|| UsageError::InvalidSize(raw.to_string()))
}
