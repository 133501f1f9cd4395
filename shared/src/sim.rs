//! In-process simulated PECI target
//!
//! Answers every request the catalog can build with deterministic data so the
//! tools can run without hardware. Writes are remembered per address, domain
//! and location and read back by the matching read. Latency can be real
//! (`thread::sleep`) or, with the `test-util` feature, charged to a manual
//! clock.

use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::Duration;

use tracing::trace;

#[cfg(any(test, feature = "test-util"))]
use crate::clock::ManualClock;
use crate::limits;
use crate::transport::{
    MmioAddress, Outcome, PciAddress, PeciTransport, Reading, Request, Status, Target,
};

/// Completion code for a request the target handled normally
pub const CC_SUCCESS: u8 = 0x40;

/// Status for a request sent to an address nobody answers on
pub const STATUS_CPU_NOT_PRESENT: Status = Status(4);

/// Device node used when none is selected
pub const DEFAULT_DEVICE: &str = "/dev/peci-0";

const DEFAULT_TEMPERATURE: i16 = -640;
const DEFAULT_DIB: u64 = 0x0000_0000_0040_0401;

/// Register space a read or write addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Location {
    PkgConfig { index: u8, param: u16 },
    Msr { thread: u8, address: u16 },
    Pci { local: bool, pci: PciAddress },
    EndpointPci { local: bool, seg: u8, pci: PciAddress },
    Mmio(MmioAddress),
}

/// Simulated CPU targets behind one PECI bus
#[derive(Debug)]
pub struct SimTarget {
    present: Vec<u8>,
    temperature: i16,
    dib: u64,
    latency: Duration,
    #[cfg(any(test, feature = "test-util"))]
    clock: Option<ManualClock>,
    registers: HashMap<(u8, u8, Location), u64>,
    scripted_cc: VecDeque<u8>,
    device: Option<String>,
    calls: usize,
}

impl SimTarget {
    /// A single target on the default address
    pub fn new() -> Self {
        Self {
            present: vec![limits::DEFAULT_CLIENT_ADDR],
            temperature: DEFAULT_TEMPERATURE,
            dib: DEFAULT_DIB,
            latency: Duration::ZERO,
            #[cfg(any(test, feature = "test-util"))]
            clock: None,
            registers: HashMap::new(),
            scripted_cc: VecDeque::new(),
            device: None,
            calls: 0,
        }
    }

    /// Replace the set of addresses that answer
    pub fn with_targets(mut self, addresses: &[u8]) -> Self {
        self.present = addresses.to_vec();
        self
    }

    /// Time every call takes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Charge latency to this clock instead of sleeping
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_temperature(mut self, raw: i16) -> Self {
        self.temperature = raw;
        self
    }

    /// Completion codes returned, in order, by the next requests that carry one.
    /// Once drained every such request returns [`CC_SUCCESS`].
    pub fn queue_completion_codes(&mut self, codes: impl IntoIterator<Item = u8>) {
        self.scripted_cc.extend(codes);
    }

    /// Number of transactions issued so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Device node currently selected, if any
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    fn wait(&self) {
        if self.latency.is_zero() {
            return;
        }
        #[cfg(any(test, feature = "test-util"))]
        if let Some(clock) = &self.clock {
            clock.advance(self.latency);
            return;
        }
        thread::sleep(self.latency);
    }

    fn next_cc(&mut self) -> u8 {
        self.scripted_cc.pop_front().unwrap_or(CC_SUCCESS)
    }

    fn read(&mut self, target: &Target, location: Location, size: u8) -> Outcome {
        let stored = self
            .registers
            .get(&(target.address, target.domain_id, location))
            .copied()
            .unwrap_or(0);
        Outcome {
            status: Status::SUCCESS,
            cc: Some(self.next_cc()),
            reading: Reading::Value(stored & size_mask(size)),
        }
    }

    fn write(&mut self, target: &Target, location: Location, value: u64, size: u8) -> Outcome {
        self.registers.insert(
            (target.address, target.domain_id, location),
            value & size_mask(size),
        );
        Outcome {
            status: Status::SUCCESS,
            cc: Some(self.next_cc()),
            reading: Reading::None,
        }
    }
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new()
    }
}

fn size_mask(size: u8) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (u32::from(size) * 8)) - 1
    }
}

impl PeciTransport for SimTarget {
    fn set_device(&mut self, name: Option<&str>) {
        self.device = name.map(str::to_string);
    }

    fn transact(&mut self, target: &Target, request: &Request) -> Outcome {
        self.calls += 1;
        self.wait();

        let address = match request {
            Request::Raw(cmd) => cmd.address,
            _ => target.address,
        };
        trace!(
            "[SIM] {} 0x{:02x}: {:?}",
            self.device().unwrap_or(DEFAULT_DEVICE),
            address,
            request
        );

        if !self.present.contains(&address) {
            return Outcome {
                status: STATUS_CPU_NOT_PRESENT,
                cc: request.reports_cc().then_some(0),
                reading: match request {
                    Request::Raw(cmd) => Reading::Raw(vec![0; cmd.read_len as usize]),
                    _ => Reading::None,
                },
            };
        }

        let size = target.size;
        match request {
            Request::Ping => Outcome::default(),
            Request::GetDib => Outcome {
                reading: Reading::Dib(self.dib),
                ..Default::default()
            },
            Request::GetTemp => Outcome {
                reading: Reading::Temperature(self.temperature),
                ..Default::default()
            },
            &Request::RdPkgConfig { index, param } => {
                self.read(target, Location::PkgConfig { index, param }, size)
            }
            &Request::WrPkgConfig {
                index,
                param,
                value,
            } => self.write(
                target,
                Location::PkgConfig { index, param },
                u64::from(value),
                size,
            ),
            &Request::RdIaMsr { thread, address } => {
                self.read(target, Location::Msr { thread, address }, 8)
            }
            &Request::RdPciConfig(pci) => self.read(target, Location::Pci { local: false, pci }, 4),
            &Request::RdPciConfigLocal(pci) => {
                self.read(target, Location::Pci { local: true, pci }, size)
            }
            &Request::WrPciConfigLocal { pci, value } => self.write(
                target,
                Location::Pci { local: true, pci },
                u64::from(value),
                size,
            ),
            &Request::RdEndpointPciLocal { seg, pci } => self.read(
                target,
                Location::EndpointPci {
                    local: true,
                    seg,
                    pci,
                },
                size,
            ),
            &Request::WrEndpointPciLocal { seg, pci, value } => self.write(
                target,
                Location::EndpointPci {
                    local: true,
                    seg,
                    pci,
                },
                u64::from(value),
                size,
            ),
            &Request::RdEndpointPci { seg, pci } => self.read(
                target,
                Location::EndpointPci {
                    local: false,
                    seg,
                    pci,
                },
                size,
            ),
            &Request::WrEndpointPci { seg, pci, value } => self.write(
                target,
                Location::EndpointPci {
                    local: false,
                    seg,
                    pci,
                },
                u64::from(value),
                size,
            ),
            &Request::RdEndpointMmio(mmio) => self.read(target, Location::Mmio(mmio), size),
            &Request::WrEndpointMmio { mmio, value } => {
                self.write(target, Location::Mmio(mmio), value, size)
            }
            Request::Raw(cmd) => {
                let mut response = vec![0; cmd.read_len as usize];
                let cc = if response.is_empty() {
                    None
                } else {
                    let cc = self.next_cc();
                    response[0] = cc;
                    Some(cc)
                };
                Outcome {
                    status: Status::SUCCESS,
                    cc,
                    reading: Reading::Raw(response),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawCommand;

    #[test]
    fn test_write_then_read_back() {
        let mut sim = SimTarget::new();
        let target = Target::default();
        let pci = PciAddress {
            bus: 0,
            device: 0x1f,
            function: 2,
            register: 0x40,
        };

        let wrote = sim.transact(&target, &Request::WrPciConfigLocal { pci, value: 0xabcd });
        assert!(wrote.is_success());
        assert_eq!(wrote.cc, Some(CC_SUCCESS));

        let read = sim.transact(&target, &Request::RdPciConfigLocal(pci));
        assert_eq!(read.reading, Reading::Value(0xabcd));
        assert_eq!(sim.calls(), 2);
    }

    #[test]
    fn test_reads_are_masked_to_size() {
        let mut sim = SimTarget::new();
        let mut target = Target::default();
        let location = Request::WrPkgConfig {
            index: 3,
            param: 0,
            value: 0x1234_5678,
        };
        sim.transact(&target, &location);

        target.size = 1;
        let read = sim.transact(&target, &Request::RdPkgConfig { index: 3, param: 0 });
        assert_eq!(read.reading, Reading::Value(0x78));
    }

    #[test]
    fn test_domains_are_separate() {
        let mut sim = SimTarget::new();
        let domain0 = Target::default();
        let domain1 = Target {
            domain_id: 1,
            ..Target::default()
        };
        sim.transact(
            &domain1,
            &Request::WrPkgConfig {
                index: 1,
                param: 1,
                value: 7,
            },
        );
        let read = sim.transact(&domain0, &Request::RdPkgConfig { index: 1, param: 1 });
        assert_eq!(read.reading, Reading::Value(0));
    }

    #[test]
    fn test_absent_target_fails() {
        let mut sim = SimTarget::new().with_targets(&[0x31]);
        let ping = sim.transact(&Target::default(), &Request::Ping);
        assert_eq!(ping.status, STATUS_CPU_NOT_PRESENT);
        assert_eq!(ping.cc, None);

        let raw = sim.transact(
            &Target::default(),
            &Request::Raw(RawCommand::new(0x30, 1, 3, &[0x01])),
        );
        assert!(!raw.is_success());
        assert_eq!(raw.reading, Reading::Raw(vec![0, 0, 0]));
    }

    #[test]
    fn test_raw_uses_its_own_address() {
        let mut sim = SimTarget::new().with_targets(&[0x32]);
        let outcome = sim.transact(
            &Target::default(),
            &Request::Raw(RawCommand::new(0x32, 1, 2, &[0x01])),
        );
        assert!(outcome.is_success());
        assert_eq!(outcome.reading, Reading::Raw(vec![CC_SUCCESS, 0]));
    }

    #[test]
    fn test_latency_is_charged_to_manual_clock() {
        let clock = ManualClock::new();
        let mut sim = SimTarget::new()
            .with_latency(Duration::from_secs(5))
            .with_clock(clock.clone());
        sim.transact(&Target::default(), &Request::Ping);
        sim.transact(&Target::default(), &Request::Ping);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_device_selection() {
        let mut sim = SimTarget::new();
        assert_eq!(sim.device(), None);
        sim.set_device(Some("/dev/peci-1"));
        assert_eq!(sim.device(), Some("/dev/peci-1"));
        sim.set_device(None);
        assert_eq!(sim.device(), None);
    }

    #[test]
    fn test_temperature_reading() {
        let mut sim = SimTarget::new().with_temperature(96);
        let outcome = sim.transact(&Target::default(), &Request::GetTemp);
        assert_eq!(outcome.reading, Reading::Temperature(96));
    }
}
