//! Looped execution engine
//!
//! Runs one resolved request a configured number of times, timing every call
//! and tallying the completion codes the target returns. The histogram and
//! the timing totals belong to a single run and are handed back in the
//! [`LoopReport`].

use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;

use crate::args::parse_number;
use crate::clock::{Clock, MonotonicClock};
use crate::error::UsageError;
use crate::format;
use crate::transport::{Outcome, PeciTransport, Reading, Request, ResolvedRequest};

/// A completion code is a byte, so it has 256 possible values
pub const CC_COUNT: usize = 256;

/// Occurrence count per completion code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcHistogram {
    counts: [u32; CC_COUNT],
}

impl CcHistogram {
    pub fn new() -> Self {
        Self {
            counts: [0; CC_COUNT],
        }
    }

    pub fn record(&mut self, cc: u8) {
        let slot = &mut self.counts[cc as usize];
        *slot = slot.saturating_add(1);
    }

    pub fn count(&self, cc: u8) -> u32 {
        self.counts[cc as usize]
    }

    /// Sum of every bucket
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Nonzero buckets in ascending code order
    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(cc, &count)| (cc as u8, count))
    }
}

impl Default for CcHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// How many times to run a request and what to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    count: u32,
    /// Measure and report request-to-response time
    pub timing: bool,
    /// Report every iteration instead of only the last
    pub verbose: bool,
}

impl LoopConfig {
    /// Run `count` times; zero is rejected
    pub fn new(count: u32) -> Result<Self, UsageError> {
        if count == 0 {
            return Err(UsageError::InvalidLoopCount(count.to_string()));
        }
        Ok(Self {
            count,
            timing: false,
            verbose: false,
        })
    }

    /// Parse a loop count argument. Values past `u32::MAX` clamp to it;
    /// zero and unparsable values are rejected.
    pub fn parse(raw: &str) -> Result<Self, UsageError> {
        let count = parse_number(raw)
            .filter(|&n| n > 0)
            .ok_or_else(|| UsageError::InvalidLoopCount(raw.to_string()))?;
        Self::new(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            count: 1,
            timing: false,
            verbose: false,
        }
    }
}

/// Timing and failure totals for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Iterations requested by the caller
    pub requested: u32,
    /// Iterations actually executed
    pub iterations: u32,
    /// Iterations whose call returned a nonzero status
    pub failures: u32,
    /// Time spent inside transport calls
    pub total: Duration,
}

impl LoopStats {
    /// Mean time per call over the requested count, reported only for loops
    pub fn average(&self) -> Option<Duration> {
        (self.requested > 1).then(|| self.total / self.requested)
    }
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    /// `None` for operations that carry no completion code
    pub histogram: Option<CcHistogram>,
    pub stats: LoopStats,
    pub last: Option<Outcome>,
}

/// Runs a resolved request according to a [`LoopConfig`]
pub struct ExecutionLoop<C = MonotonicClock> {
    config: LoopConfig,
    clock: C,
}

impl ExecutionLoop<MonotonicClock> {
    pub fn new(config: LoopConfig) -> Self {
        Self::with_clock(config, MonotonicClock)
    }
}

impl<C: Clock> ExecutionLoop<C> {
    pub fn with_clock(config: LoopConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// Execute the request, writing human-readable output to `out`.
    ///
    /// A failing call never stops the loop and is never retried.
    pub fn run<T, W>(
        &self,
        resolved: &ResolvedRequest,
        transport: &mut T,
        out: &mut W,
    ) -> io::Result<LoopReport>
    where
        T: PeciTransport + ?Sized,
        W: Write + ?Sized,
    {
        let LoopConfig {
            count,
            timing,
            verbose,
        } = self.config;
        let reports_cc = resolved.request.reports_cc();

        if verbose {
            write!(out, "{}", format::target_banner(&resolved.target))?;
        }
        if timing && verbose && count > 1 {
            writeln!(out, "{}", format::TIMING_WARNING)?;
        }
        if verbose {
            write!(out, "{}", format::describe(resolved))?;
        }

        let mut histogram = CcHistogram::new();
        let mut stats = LoopStats {
            requested: count,
            ..Default::default()
        };
        let mut last = None;

        for iteration in 1..=count {
            let started = self.clock.now();
            let outcome = transport.transact(&resolved.target, &resolved.request);
            let elapsed = self.clock.now().saturating_duration_since(started);

            if verbose && timing {
                write!(out, "{}", format::iteration_time(iteration, elapsed))?;
            }
            stats.total += elapsed;
            stats.iterations += 1;
            if !outcome.is_success() {
                stats.failures += 1;
            }

            if reports_cc {
                histogram.record(completion_code(&resolved.request, &outcome));
            }

            if verbose || iteration == count {
                write!(out, "{}", format::outcome(resolved, &outcome))?;
            }
            last = Some(outcome);
        }

        if reports_cc && count > 1 {
            write!(out, "{}", format::histogram_summary(&histogram))?;
        }
        if timing {
            write!(out, "{}", format::timing_summary(&stats))?;
        }

        debug!(
            "Ran {:?} {} times: {} failed, {:?} total",
            resolved.request, stats.iterations, stats.failures, stats.total
        );

        Ok(LoopReport {
            histogram: reports_cc.then_some(histogram),
            stats,
            last,
        })
    }
}

/// The completion code an iteration counts under. Raw frames carry it as
/// the first response byte; other requests report it separately, and a
/// missing one counts as zero.
fn completion_code(request: &Request, outcome: &Outcome) -> u8 {
    match (request, &outcome.reading) {
        (Request::Raw(_), Reading::Raw(bytes)) => bytes.first().copied().unwrap_or(0),
        (Request::Raw(_), _) => 0,
        _ => outcome.cc.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::SimTarget;
    use crate::transport::{PciAddress, RawCommand, Target};

    fn resolved(request: Request) -> ResolvedRequest {
        ResolvedRequest {
            target: Target::default(),
            request,
        }
    }

    fn run_with(
        config: LoopConfig,
        request: Request,
        sim: &mut SimTarget,
        clock: &ManualClock,
    ) -> (LoopReport, String) {
        let engine = ExecutionLoop::with_clock(config, clock.clone());
        let mut out = Vec::new();
        let report = engine
            .run(&resolved(request), sim, &mut out)
            .expect("write to Vec");
        (report, String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn test_loop_config_rejects_zero() {
        assert!(LoopConfig::new(0).is_err());
        assert!(LoopConfig::parse("0").is_err());
        assert!(LoopConfig::parse("0x0").is_err());
        assert!(LoopConfig::parse("many").is_err());
    }

    #[test]
    fn test_loop_config_clamps_to_u32() {
        assert_eq!(LoopConfig::parse("0x1ffffffff").unwrap().count(), u32::MAX);
        assert_eq!(LoopConfig::parse("10").unwrap().count(), 10);
        assert_eq!(LoopConfig::parse("0x10").unwrap().count(), 16);
    }

    #[test]
    fn test_histogram_sums_to_iteration_count() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new().with_clock(clock.clone());
        sim.queue_completion_codes([0x40, 0x80, 0x40, 0x90, 0x40]);

        let config = LoopConfig::new(25).unwrap();
        let (report, _) = run_with(
            config,
            Request::RdPkgConfig { index: 0, param: 0 },
            &mut sim,
            &clock,
        );

        let histogram = report.histogram.expect("pkg read reports cc");
        assert_eq!(histogram.total(), 25);
        assert_eq!(histogram.count(0x80), 1);
        assert_eq!(histogram.count(0x90), 1);
        assert_eq!(histogram.count(0x40), 23);
        assert_eq!(sim.calls(), 25);
    }

    #[test]
    fn test_failures_do_not_stop_the_loop() {
        let clock = ManualClock::new();
        // nothing answers on 0x30
        let mut sim = SimTarget::new().with_targets(&[0x31]).with_clock(clock.clone());

        let config = LoopConfig::new(4).unwrap();
        let (report, _) = run_with(
            config,
            Request::RdPciConfig(PciAddress::default()),
            &mut sim,
            &clock,
        );

        assert_eq!(report.stats.iterations, 4);
        assert_eq!(report.stats.failures, 4);
        assert_eq!(sim.calls(), 4);
        assert_eq!(report.histogram.map(|h| h.total()), Some(4));
    }

    #[test]
    fn test_no_histogram_without_completion_code() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new().with_clock(clock.clone());

        let config = LoopConfig::new(3).unwrap();
        let (report, output) = run_with(config, Request::Ping, &mut sim, &clock);

        assert!(report.histogram.is_none());
        assert!(!output.contains("Completion code counts"));
        assert_eq!(output, "Succeeded\n");
    }

    #[test]
    fn test_terse_mode_reports_only_last_iteration() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new().with_clock(clock.clone());
        sim.queue_completion_codes([0x80, 0x80, 0x40]);

        let config = LoopConfig::new(3).unwrap();
        let (_, output) = run_with(
            config,
            Request::WrPkgConfig {
                index: 0,
                param: 0,
                value: 1,
            },
            &mut sim,
            &clock,
        );

        assert_eq!(
            output,
            "   cc:0x40\nCompletion code counts:\n   0x40: 1\n   0x80: 2\n"
        );
    }

    #[test]
    fn test_verbose_mode_reports_every_iteration() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new().with_clock(clock.clone());

        let config = LoopConfig::new(2).unwrap().with_verbose(true);
        let (_, output) = run_with(config, Request::Ping, &mut sim, &clock);

        assert_eq!(output, "PECI target[0x30]: Pinging ... Succeeded\nSucceeded\n");
    }

    #[test]
    fn test_single_iteration_has_no_summary() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new().with_clock(clock.clone());

        let (report, output) = run_with(
            LoopConfig::default(),
            Request::RdIaMsr {
                thread: 0,
                address: 0x1a2,
            },
            &mut sim,
            &clock,
        );

        assert_eq!(report.histogram.map(|h| h.total()), Some(1));
        assert!(!output.contains("Completion code counts"));
    }

    #[test]
    fn test_average_uses_requested_count() {
        let clock = ManualClock::new();
        // failing target, so every iteration is an error
        let mut sim = SimTarget::new()
            .with_targets(&[])
            .with_latency(Duration::from_millis(30))
            .with_clock(clock.clone());

        let config = LoopConfig::new(10).unwrap().with_timing(true);
        let (report, output) = run_with(config, Request::GetTemp, &mut sim, &clock);

        assert_eq!(report.stats.failures, 10);
        assert_eq!(report.stats.total, Duration::from_millis(300));
        assert_eq!(report.stats.average(), Some(report.stats.total / 10));
        assert!(output.contains("Total time taken = 0.300000 seconds\n"));
        assert!(output.contains("Average time taken per command = 0.030000 seconds\n"));
    }

    #[test]
    fn test_single_iteration_timing_has_no_average() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new()
            .with_latency(Duration::from_millis(5))
            .with_clock(clock.clone());

        let config = LoopConfig::default().with_timing(true);
        let (report, output) = run_with(config, Request::GetDib, &mut sim, &clock);

        assert_eq!(report.stats.average(), None);
        assert!(output.contains("Total time taken = 0.005000 seconds"));
        assert!(!output.contains("Average"));
    }

    #[test]
    fn test_verbose_timing_warns_when_looping() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new().with_clock(clock.clone());

        let config = LoopConfig::new(2)
            .unwrap()
            .with_timing(true)
            .with_verbose(true);
        let (_, output) = run_with(config, Request::Ping, &mut sim, &clock);

        assert!(output.contains(format::TIMING_WARNING));
        assert!(output.contains("Time taken in iteration 1 = "));
        assert!(output.contains("Time taken in iteration 2 = "));
    }

    #[test]
    fn test_histogram_iterates_nonzero_buckets_in_order() {
        let mut histogram = CcHistogram::new();
        assert!(histogram.is_empty());
        histogram.record(0x81);
        histogram.record(0x40);
        histogram.record(0x40);
        assert_eq!(histogram.iter().collect::<Vec<_>>(), vec![(0x40, 2), (0x81, 1)]);
        assert!(!histogram.is_empty());
    }

    /// Backend that leaves `cc` unset for raw frames
    struct RawEcho {
        response: Vec<u8>,
    }

    impl PeciTransport for RawEcho {
        fn set_device(&mut self, _name: Option<&str>) {}

        fn transact(&mut self, _target: &Target, _request: &Request) -> Outcome {
            Outcome {
                reading: Reading::Raw(self.response.clone()),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_raw_histogram_counts_first_response_byte() {
        let clock = ManualClock::new();
        let engine = ExecutionLoop::with_clock(LoopConfig::new(3).unwrap(), clock);
        let mut transport = RawEcho {
            response: vec![0x40, 0x11],
        };
        let mut out = Vec::new();

        let report = engine
            .run(
                &resolved(Request::Raw(RawCommand::new(0x30, 1, 2, &[0x01]))),
                &mut transport,
                &mut out,
            )
            .unwrap();

        let histogram = report.histogram.expect("raw with a read length reports cc");
        assert_eq!(histogram.count(0x40), 3);
        assert_eq!(histogram.count(0x00), 0);
        let output = String::from_utf8(out).unwrap();
        assert!(output.ends_with("Completion code counts:\n   0x40: 3\n"));
    }
}
