//! Transport seam between the engine and the PECI protocol library
//!
//! The engine never encodes PECI frames itself. Every typed request is handed
//! to a [`PeciTransport`], which owns the wire format and the meaning of the
//! status and completion codes it returns.

use std::fmt;

use crate::limits;

/// Status returned by the protocol library. Zero is success; any other value
/// is passed through to the user untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addressing shared by every typed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Client address (0x30-0x37)
    pub address: u8,
    /// Domain ID (0-127)
    pub domain_id: u8,
    /// Data size in bytes for sized reads and writes
    pub size: u8,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            address: limits::DEFAULT_CLIENT_ADDR,
            domain_id: 0,
            size: limits::DEFAULT_DATA_SIZE,
        }
    }
}

/// PCI bus/device/function/register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub register: u16,
}

/// Endpoint MMIO location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MmioAddress {
    pub addr_type: u8,
    pub bar: u8,
    pub seg: u8,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub offset: u64,
}

/// A caller-built PECI frame that bypasses the typed encoders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub address: u8,
    pub write_len: u8,
    pub read_len: u8,
    /// Exactly `write_len` bytes
    pub data: Vec<u8>,
}

impl RawCommand {
    /// Build a raw command, zero-padding or truncating `payload` to `write_len`
    pub fn new(address: u8, write_len: u8, read_len: u8, payload: &[u8]) -> Self {
        let mut data = payload[..payload.len().min(write_len as usize)].to_vec();
        data.resize(write_len as usize, 0);
        Self {
            address,
            write_len,
            read_len,
            data,
        }
    }
}

/// A typed PECI request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    GetDib,
    GetTemp,
    RdPkgConfig { index: u8, param: u16 },
    WrPkgConfig { index: u8, param: u16, value: u32 },
    RdIaMsr { thread: u8, address: u16 },
    RdPciConfig(PciAddress),
    RdPciConfigLocal(PciAddress),
    WrPciConfigLocal { pci: PciAddress, value: u32 },
    RdEndpointPciLocal { seg: u8, pci: PciAddress },
    WrEndpointPciLocal { seg: u8, pci: PciAddress, value: u32 },
    RdEndpointPci { seg: u8, pci: PciAddress },
    WrEndpointPci { seg: u8, pci: PciAddress, value: u32 },
    RdEndpointMmio(MmioAddress),
    WrEndpointMmio { mmio: MmioAddress, value: u64 },
    Raw(RawCommand),
}

impl Request {
    /// Whether the target answers this request with a completion code.
    /// Raw frames carry one as the first response byte.
    pub fn reports_cc(&self) -> bool {
        match self {
            Request::Ping | Request::GetDib | Request::GetTemp => false,
            Request::Raw(cmd) => cmd.read_len > 0,
            _ => true,
        }
    }

    /// Whether this request writes to the target
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::WrPkgConfig { .. }
                | Request::WrPciConfigLocal { .. }
                | Request::WrEndpointPciLocal { .. }
                | Request::WrEndpointPci { .. }
                | Request::WrEndpointMmio { .. }
        )
    }
}

/// A request bound to its target, ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub target: Target,
    pub request: Request,
}

/// Data returned alongside the status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reading {
    #[default]
    None,
    Dib(u64),
    /// Temperature in 1/64 degree C units, relative to the throttle point
    Temperature(i16),
    Value(u64),
    Raw(Vec<u8>),
}

/// Result of one protocol call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    pub status: Status,
    pub cc: Option<u8>,
    pub reading: Reading,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The protocol library as seen by the engine.
///
/// Calls are synchronous and bounded in time; the engine never interrupts one
/// in flight.
pub trait PeciTransport {
    /// Select the device node used for subsequent calls; `None` restores the default
    fn set_device(&mut self, name: Option<&str>);

    /// Issue one request and wait for its result
    fn transact(&mut self, target: &Target, request: &Request) -> Outcome;
}

impl<T: PeciTransport + ?Sized> PeciTransport for &mut T {
    fn set_device(&mut self, name: Option<&str>) {
        (**self).set_device(name)
    }

    fn transact(&mut self, target: &Target, request: &Request) -> Outcome {
        (**self).transact(target, request)
    }
}

impl<T: PeciTransport + ?Sized> PeciTransport for Box<T> {
    fn set_device(&mut self, name: Option<&str>) {
        (**self).set_device(name)
    }

    fn transact(&mut self, target: &Target, request: &Request) -> Outcome {
        (**self).transact(target, request)
    }
}
