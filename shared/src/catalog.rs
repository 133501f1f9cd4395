//! Operation catalog
//!
//! Static table of every operation the CLI accepts. Each entry declares which
//! positional argument counts it takes, the fields those arguments bind to,
//! and a builder that turns the bound values into a typed [`Request`].

use std::fmt;

use crate::error::UsageError;
use crate::transport::{MmioAddress, PciAddress, RawCommand, Request};

/// Width of a positional field. Parsed values are truncated to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
    U64,
}

impl Width {
    pub fn bits(self) -> u32 {
        match self {
            Width::U8 => 8,
            Width::U16 => 16,
            Width::U32 => 32,
            Width::U64 => 64,
        }
    }

    /// Keep only the low bits that fit this width
    pub fn truncate(self, value: u64) -> u64 {
        match self {
            Width::U64 => value,
            _ => value & ((1u64 << self.bits()) - 1),
        }
    }
}

/// A named positional field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub width: Width,
}

impl Field {
    const fn new(name: &'static str, width: Width) -> Self {
        Self { name, width }
    }
}

/// Accepted positional argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many
    Exact(usize),
    /// Any count in `min..=max`; leading fields are optional
    Range { min: usize, max: usize },
    /// At least this many; extra tokens are collected as payload bytes
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::Range { min, max } => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
        }
    }
}

/// Turns bound field values (one per field, zero when omitted) and any
/// trailing payload bytes into a request
pub type Builder = fn(&[u64], &[u8]) -> Result<Request, UsageError>;

/// One catalog entry
pub struct OperationDescriptor {
    /// Display name, e.g. `RdPCIConfig`
    pub name: &'static str,
    /// Lower-case lookup key
    pub key: &'static str,
    /// Short label used in error messages, e.g. `PCI Read`
    pub label: &'static str,
    /// One-line help text
    pub summary: &'static str,
    pub arity: Arity,
    /// Fields in binding order; the last token always binds the last field
    pub fields: &'static [Field],
    pub build: Builder,
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

const PKG_READ: &[Field] = &[Field::new("Index", Width::U8), Field::new("Parameter", Width::U16)];

const PKG_WRITE: &[Field] = &[
    Field::new("Index", Width::U8),
    Field::new("Parameter", Width::U16),
    Field::new("Data", Width::U32),
];

const MSR_READ: &[Field] = &[Field::new("Thread", Width::U8), Field::new("Address", Width::U16)];

const PCI_READ: &[Field] = &[
    Field::new("Bus", Width::U8),
    Field::new("Dev", Width::U8),
    Field::new("Func", Width::U8),
    Field::new("Reg", Width::U16),
];

const PCI_WRITE: &[Field] = &[
    Field::new("Bus", Width::U8),
    Field::new("Dev", Width::U8),
    Field::new("Func", Width::U8),
    Field::new("Reg", Width::U16),
    Field::new("Data", Width::U32),
];

const ENDPOINT_PCI_READ: &[Field] = &[
    Field::new("Seg", Width::U8),
    Field::new("Bus", Width::U8),
    Field::new("Dev", Width::U8),
    Field::new("Func", Width::U8),
    Field::new("Reg", Width::U16),
];

const ENDPOINT_PCI_WRITE: &[Field] = &[
    Field::new("Seg", Width::U8),
    Field::new("Bus", Width::U8),
    Field::new("Dev", Width::U8),
    Field::new("Func", Width::U8),
    Field::new("Reg", Width::U16),
    Field::new("Data", Width::U32),
];

const MMIO_READ: &[Field] = &[
    Field::new("AType", Width::U8),
    Field::new("Bar", Width::U8),
    Field::new("Seg", Width::U8),
    Field::new("Bus", Width::U8),
    Field::new("Dev", Width::U8),
    Field::new("Func", Width::U8),
    Field::new("Offset", Width::U64),
];

const MMIO_WRITE: &[Field] = &[
    Field::new("AType", Width::U8),
    Field::new("Bar", Width::U8),
    Field::new("Seg", Width::U8),
    Field::new("Bus", Width::U8),
    Field::new("Dev", Width::U8),
    Field::new("Func", Width::U8),
    Field::new("Offset", Width::U64),
    Field::new("Data", Width::U64),
];

const RAW_HEADER: &[Field] = &[
    Field::new("Addr", Width::U8),
    Field::new("WrLen", Width::U8),
    Field::new("RdLen", Width::U8),
];

/// Every operation, in help-text order
pub static OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor {
        name: "Ping",
        key: "ping",
        label: "Ping",
        summary: "Ping the target",
        arity: Arity::Exact(0),
        fields: &[],
        build: |_, _| Ok(Request::Ping),
    },
    OperationDescriptor {
        name: "GetTemp",
        key: "gettemp",
        label: "GetTemp",
        summary: "Get the temperature",
        arity: Arity::Exact(0),
        fields: &[],
        build: |_, _| Ok(Request::GetTemp),
    },
    OperationDescriptor {
        name: "GetDIB",
        key: "getdib",
        label: "GetDIB",
        summary: "Get the DIB",
        arity: Arity::Exact(0),
        fields: &[],
        build: |_, _| Ok(Request::GetDib),
    },
    OperationDescriptor {
        name: "RdPkgConfig",
        key: "rdpkgconfig",
        label: "Pkg Read",
        summary: "Read Package Config <Index Parameter>",
        arity: Arity::Exact(2),
        fields: PKG_READ,
        build: |f, _| {
            Ok(Request::RdPkgConfig {
                index: f[0] as u8,
                param: f[1] as u16,
            })
        },
    },
    OperationDescriptor {
        name: "WrPkgConfig",
        key: "wrpkgconfig",
        label: "Pkg Write",
        summary: "Write Package Config <Index Parameter Data>",
        arity: Arity::Exact(3),
        fields: PKG_WRITE,
        build: |f, _| {
            Ok(Request::WrPkgConfig {
                index: f[0] as u8,
                param: f[1] as u16,
                value: f[2] as u32,
            })
        },
    },
    OperationDescriptor {
        name: "RdIAMSR",
        key: "rdiamsr",
        label: "MSR Read",
        summary: "MSR Read <Thread Address>",
        arity: Arity::Exact(2),
        fields: MSR_READ,
        build: |f, _| {
            Ok(Request::RdIaMsr {
                thread: f[0] as u8,
                address: f[1] as u16,
            })
        },
    },
    OperationDescriptor {
        name: "RdPCIConfig",
        key: "rdpciconfig",
        label: "PCI Read",
        summary: "PCI Read <[Bus Dev Func] Reg>",
        arity: Arity::Range { min: 1, max: 4 },
        fields: PCI_READ,
        build: |f, _| Ok(Request::RdPciConfig(pci(f))),
    },
    OperationDescriptor {
        name: "RdPCIConfigLocal",
        key: "rdpciconfiglocal",
        label: "Local PCI Read",
        summary: "Local PCI Read <[Bus Dev Func] Reg>",
        arity: Arity::Range { min: 1, max: 4 },
        fields: PCI_READ,
        build: |f, _| Ok(Request::RdPciConfigLocal(pci(f))),
    },
    OperationDescriptor {
        name: "WrPCIConfigLocal",
        key: "wrpciconfiglocal",
        label: "Local PCI Write",
        summary: "Local PCI Write <[Bus Dev Func] Reg Data>",
        arity: Arity::Range { min: 2, max: 5 },
        fields: PCI_WRITE,
        build: |f, _| {
            Ok(Request::WrPciConfigLocal {
                pci: pci(f),
                value: f[4] as u32,
            })
        },
    },
    OperationDescriptor {
        name: "RdEndpointConfigPCILocal",
        key: "rdendpointconfigpcilocal",
        label: "Endpoint Local PCI Read",
        summary: "Endpoint Local PCI Config Read <Seg Bus Dev Func Reg>",
        arity: Arity::Exact(5),
        fields: ENDPOINT_PCI_READ,
        build: |f, _| {
            Ok(Request::RdEndpointPciLocal {
                seg: f[0] as u8,
                pci: pci(&f[1..]),
            })
        },
    },
    OperationDescriptor {
        name: "WrEndpointConfigPCILocal",
        key: "wrendpointconfigpcilocal",
        label: "Endpoint Local PCI Write",
        summary: "Endpoint Local PCI Config Write <Seg Bus Dev Func Reg Data>",
        arity: Arity::Exact(6),
        fields: ENDPOINT_PCI_WRITE,
        build: |f, _| {
            Ok(Request::WrEndpointPciLocal {
                seg: f[0] as u8,
                pci: pci(&f[1..]),
                value: f[5] as u32,
            })
        },
    },
    OperationDescriptor {
        name: "RdEndpointConfigPCI",
        key: "rdendpointconfigpci",
        label: "Endpoint PCI Read",
        summary: "Endpoint PCI Config Read <Seg Bus Dev Func Reg>",
        arity: Arity::Exact(5),
        fields: ENDPOINT_PCI_READ,
        build: |f, _| {
            Ok(Request::RdEndpointPci {
                seg: f[0] as u8,
                pci: pci(&f[1..]),
            })
        },
    },
    OperationDescriptor {
        name: "WrEndpointConfigPCI",
        key: "wrendpointconfigpci",
        label: "Endpoint PCI Write",
        summary: "Endpoint PCI Config Write <Seg Bus Dev Func Reg Data>",
        arity: Arity::Exact(6),
        fields: ENDPOINT_PCI_WRITE,
        build: |f, _| {
            Ok(Request::WrEndpointPci {
                seg: f[0] as u8,
                pci: pci(&f[1..]),
                value: f[5] as u32,
            })
        },
    },
    OperationDescriptor {
        name: "RdEndpointConfigMMIO",
        key: "rdendpointconfigmmio",
        label: "Endpoint MMIO Read",
        summary: "Endpoint MMIO Read <AType Bar Seg Bus Dev Func Reg>",
        arity: Arity::Exact(7),
        fields: MMIO_READ,
        build: |f, _| Ok(Request::RdEndpointMmio(mmio(f))),
    },
    OperationDescriptor {
        name: "WrEndpointConfigMMIO",
        key: "wrendpointconfigmmio",
        label: "Endpoint MMIO Write",
        summary: "Endpoint MMIO Write <AType Bar Seg Bus Dev Func Reg Data>",
        arity: Arity::Exact(8),
        fields: MMIO_WRITE,
        build: |f, _| {
            Ok(Request::WrEndpointMmio {
                mmio: mmio(f),
                value: f[7],
            })
        },
    },
    OperationDescriptor {
        name: "raw",
        key: "raw",
        label: "raw command",
        summary: "Raw PECI command in bytes <Addr WrLen RdLen [Data...]>",
        arity: Arity::AtLeast(3),
        fields: RAW_HEADER,
        build: build_raw,
    },
];

fn pci(f: &[u64]) -> PciAddress {
    PciAddress {
        bus: f[0] as u8,
        device: f[1] as u8,
        function: f[2] as u8,
        register: f[3] as u16,
    }
}

fn mmio(f: &[u64]) -> MmioAddress {
    MmioAddress {
        addr_type: f[0] as u8,
        bar: f[1] as u8,
        seg: f[2] as u8,
        bus: f[3] as u8,
        device: f[4] as u8,
        function: f[5] as u8,
        offset: f[6],
    }
}

fn build_raw(f: &[u64], payload: &[u8]) -> Result<Request, UsageError> {
    let write_len = f[1] as u8;
    // payload must fit within the declared write length
    if payload.len() > write_len as usize {
        return Err(UsageError::RawWriteLength {
            write_len,
            supplied: payload.len(),
        });
    }
    Ok(Request::Raw(RawCommand::new(
        f[0] as u8,
        write_len,
        f[2] as u8,
        payload,
    )))
}

/// Look up an operation by name, ignoring case
pub fn resolve(name: &str) -> Result<&'static OperationDescriptor, UsageError> {
    let key = name.to_ascii_lowercase();
    OPERATIONS
        .iter()
        .find(|op| op.key == key)
        .ok_or(UsageError::UnknownOperation(name.to_string()))
}

/// The `Commands:` section of the usage text
pub fn help_text() -> String {
    let mut text = String::from("Commands:\n");
    for op in OPERATIONS {
        text.push_str(&format!("\t{:<28}{}\n", op.name, op.summary));
    }
    text
}
