//! Human-readable rendering of requests and results
//!
//! Field values print as fixed-width hexadecimal matching their declared
//! widths; read and write data print `size * 2` digits.

use std::fmt::Write as _;
use std::time::Duration;

use crate::engine::{CcHistogram, LoopStats};
use crate::transport::{Outcome, Reading, Request, ResolvedRequest, Target};

/// Printed when per-iteration output could skew looped timing
pub const TIMING_WARNING: &str = "Warning: Request-response time measurement with verbose mode \
can affect the time between consecutive commands in looped mode!";

/// Verbose prefix naming the target
pub fn target_banner(target: &Target) -> String {
    format!("PECI target[0x{:x}]: ", target.address)
}

/// Verbose description of the request, printed once before the loop
pub fn describe(resolved: &ResolvedRequest) -> String {
    let width = data_digits(&resolved.target);
    match &resolved.request {
        Request::Ping => "Pinging ... ".to_string(),
        Request::GetDib => "GetDIB\n".to_string(),
        Request::GetTemp => "GetTemp\n".to_string(),
        Request::RdPkgConfig { index, param } => {
            format!("Pkg Read of Index {index:02x} Param {param:04x}\n")
        }
        Request::WrPkgConfig {
            index,
            param,
            value,
        } => format!("Pkg Write of Index {index:02x} Param {param:04x}: 0x{value:0width$x}\n"),
        Request::RdIaMsr { thread, address } => {
            format!("MSR Read of Thread {thread:02x} MSR {address:04x}\n")
        }
        Request::RdPciConfig(pci) => format!(
            "PCI Read of {:02x}:{:02x}:{:02x} Reg {:02x}\n",
            pci.bus, pci.device, pci.function, pci.register
        ),
        Request::RdPciConfigLocal(pci) => format!(
            "Local PCI Read of {:02x}:{:02x}:{:02x} Reg {:02x}\n",
            pci.bus, pci.device, pci.function, pci.register
        ),
        Request::WrPciConfigLocal { pci, value } => format!(
            "Local PCI Write of {:02x}:{:02x}:{:02x} Reg {:02x}: 0x{:0width$x}\n",
            pci.bus, pci.device, pci.function, pci.register, value
        ),
        Request::RdEndpointPciLocal { seg, pci } => format!(
            "Endpoint Local PCI Read of Seg:{:02x} {:02x}:{:02x}:{:02x} Reg {:02x}\n",
            seg, pci.bus, pci.device, pci.function, pci.register
        ),
        Request::WrEndpointPciLocal { seg, pci, value } => format!(
            "Endpoint Local PCI Write of Seg:{:02x} {:02x}:{:02x}:{:02x} Reg {:02x}: 0x{:0width$x}\n",
            seg, pci.bus, pci.device, pci.function, pci.register, value
        ),
        Request::RdEndpointPci { seg, pci } => format!(
            "Endpoint PCI Read of Seg:{:02x} {:02x}:{:02x}:{:02x} Reg {:02x}\n",
            seg, pci.bus, pci.device, pci.function, pci.register
        ),
        Request::WrEndpointPci { seg, pci, value } => format!(
            "Endpoint PCI Write of Seg:{:02x} {:02x}:{:02x}:{:02x} Reg {:02x}: 0x{:0width$x}\n",
            seg, pci.bus, pci.device, pci.function, pci.register, value
        ),
        Request::RdEndpointMmio(m) => format!(
            "Endpoint MMIO Read of Seg:{:02x} {:02x}:{:02x}:{:02x} AType:{:02x} Bar:{:02x} Offset:0x{:x}\n",
            m.seg, m.bus, m.device, m.function, m.addr_type, m.bar, m.offset
        ),
        Request::WrEndpointMmio { mmio: m, value } => format!(
            "Endpoint MMIO Write of Seg:{:02x} {:02x}:{:02x}:{:02x} AType:{:02x} Bar:{:02x} Offset:0x{:x}: 0x{:0width$x}\n",
            m.seg, m.bus, m.device, m.function, m.addr_type, m.bar, m.offset, value
        ),
        Request::Raw(cmd) => {
            let mut line = format!(
                "Raw command: {:02x} {:02x} {:02x} ",
                cmd.address, cmd.write_len, cmd.read_len
            );
            line.push_str(&hex_bytes(&cmd.data));
            line.push('\n');
            line
        }
    }
}

/// Result of one iteration
pub fn outcome(resolved: &ResolvedRequest, outcome: &Outcome) -> String {
    let width = data_digits(&resolved.target);
    let cc = outcome.cc.unwrap_or(0);
    let failed = !outcome.is_success();

    match &resolved.request {
        Request::Ping => {
            if failed {
                "Failed\n".to_string()
            } else {
                "Succeeded\n".to_string()
            }
        }
        Request::GetDib => match (&outcome.reading, failed) {
            (Reading::Dib(dib), false) => format!("   0x{dib:x}\n"),
            _ => format!("ERROR {}: Retrieving DIB failed\n", outcome.status),
        },
        Request::GetTemp => match (&outcome.reading, failed) {
            (Reading::Temperature(raw), false) => format!("   {}\n", temperature(*raw)),
            _ => format!("ERROR {}: Retrieving temperature failed\n", outcome.status),
        },
        Request::Raw(_) => {
            let mut text = String::new();
            if failed {
                let _ = writeln!(text, "ERROR {}: command failed", outcome.status);
            }
            let bytes = match &outcome.reading {
                Reading::Raw(bytes) => bytes.as_slice(),
                _ => &[],
            };
            let _ = writeln!(text, "   {}", hex_bytes(bytes));
            text
        }
        request if request.is_write() => {
            let mut text = String::new();
            if failed {
                let _ = writeln!(text, "ERROR {}: command failed", outcome.status);
            }
            let _ = writeln!(text, "   cc:0x{cc:02x}");
            text
        }
        _ => {
            if failed {
                format!("ERROR {}: command failed\n   cc:0x{cc:02x}\n", outcome.status)
            } else {
                let value = match outcome.reading {
                    Reading::Value(value) => value,
                    _ => 0,
                };
                format!("   cc:0x{cc:02x} 0x{value:0width$x}\n")
            }
        }
    }
}

/// Render a temperature given in signed 1/64 degree C units
pub fn temperature(raw: i16) -> String {
    let magnitude = i32::from(raw).unsigned_abs();
    format!(
        "{:04x}h ({}{}.{:02}C)",
        raw as u16,
        if raw < 0 { '-' } else { '+' },
        magnitude / 64,
        (magnitude % 64) * 100 / 64
    )
}

/// Per-iteration time, printed in verbose timing mode
pub fn iteration_time(iteration: u32, elapsed: Duration) -> String {
    format!(
        "\nTime taken in iteration {} = {:.6} s\n",
        iteration,
        elapsed.as_secs_f64()
    )
}

/// Completion-code counts, nonzero buckets only
pub fn histogram_summary(histogram: &CcHistogram) -> String {
    let mut text = String::from("Completion code counts:\n");
    for (cc, count) in histogram.iter() {
        let _ = writeln!(text, "   0x{cc:02x}: {count}");
    }
    text
}

/// Total and average time across the loop
pub fn timing_summary(stats: &LoopStats) -> String {
    let mut text = format!("Total time taken = {:.6} seconds\n", stats.total.as_secs_f64());
    if let Some(average) = stats.average() {
        let _ = writeln!(
            text,
            "Average time taken per command = {:.6} seconds",
            average.as_secs_f64()
        );
    }
    text
}

fn data_digits(target: &Target) -> usize {
    target.size as usize * 2
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("0x{b:02x} ")).collect()
}
