//! Positional argument resolution
//!
//! Binds raw command-line tokens to an operation's fields. Binding is
//! right-aligned: the last token always lands in the last field, so operations
//! with optional leading qualifiers (bus, device, function) can be given just
//! the register. Omitted leading fields are zero.

use tracing::trace;

use crate::catalog::{OperationDescriptor, Width};
use crate::error::UsageError;
use crate::transport::{ResolvedRequest, Target};

/// Parse a decimal or `0x`-prefixed hexadecimal number
pub fn parse_number(token: &str) -> Option<u64> {
    let token = token.trim();
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// Parse a positional token for a field of the given width.
///
/// Tokens that do not parse bind as zero, and values wider than the field
/// keep only their low bits.
pub fn parse_field(token: &str, width: Width) -> u64 {
    parse_number(token)
        .map(|value| width.truncate(value))
        .unwrap_or(0)
}

/// Resolve positional tokens against an operation's arity and fields
pub fn resolve<S: AsRef<str>>(
    op: &OperationDescriptor,
    target: Target,
    tokens: &[S],
) -> Result<ResolvedRequest, UsageError> {
    let count = tokens.len();
    if !op.arity.accepts(count) {
        return Err(UsageError::Arity {
            operation: op.label,
            got: count,
        });
    }

    let width = op.fields.len();
    let bound = count.min(width);
    let first = width - bound;

    let mut values = vec![0u64; width];
    for (offset, token) in tokens[..bound].iter().enumerate() {
        let slot = first + offset;
        let field = &op.fields[slot];
        values[slot] = parse_field(token.as_ref(), field.width);
        trace!("{} {} = {:#x}", op.name, field.name, values[slot]);
    }

    let payload: Vec<u8> = tokens[bound..]
        .iter()
        .map(|token| parse_field(token.as_ref(), Width::U8) as u8)
        .collect();

    let request = (op.build)(&values, &payload)?;
    Ok(ResolvedRequest { target, request })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::transport::{MmioAddress, PciAddress, RawCommand, Request};

    fn resolve_named(name: &str, tokens: &[&str]) -> Result<Request, UsageError> {
        let op = catalog::resolve(name)?;
        resolve(op, Target::default(), tokens).map(|r| r.request)
    }

    #[test]
    fn test_parse_number_bases() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x2a"), Some(42));
        assert_eq!(parse_number("0X2A"), Some(42));
        assert_eq!(parse_number(" 7 "), Some(7));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("reg"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_right_aligned_binding_with_three_tokens() {
        let request = resolve_named("RdPCIConfig", &["0x1f", "3", "0x10"]).unwrap();
        assert_eq!(
            request,
            Request::RdPciConfig(PciAddress {
                bus: 0,
                device: 0x1f,
                function: 3,
                register: 0x10,
            })
        );
    }

    #[test]
    fn test_register_only() {
        let request = resolve_named("rdpciconfiglocal", &["0xfc"]).unwrap();
        assert_eq!(
            request,
            Request::RdPciConfigLocal(PciAddress {
                register: 0xfc,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_all_pci_fields() {
        let request = resolve_named("RdPCIConfig", &["1", "2", "3", "4"]).unwrap();
        assert_eq!(
            request,
            Request::RdPciConfig(PciAddress {
                bus: 1,
                device: 2,
                function: 3,
                register: 4,
            })
        );
    }

    #[test]
    fn test_local_pci_write_keeps_data_last() {
        let request = resolve_named("WrPCIConfigLocal", &["0x40", "0xdeadbeef"]).unwrap();
        assert_eq!(
            request,
            Request::WrPciConfigLocal {
                pci: PciAddress {
                    register: 0x40,
                    ..Default::default()
                },
                value: 0xdead_beef,
            }
        );
    }

    #[test]
    fn test_wrong_count_names_operation() {
        let err = resolve_named("RdPkgConfig", &["1"]).unwrap_err();
        assert_eq!(
            err,
            UsageError::Arity {
                operation: "Pkg Read",
                got: 1,
            }
        );

        let err = resolve_named("RdPCIConfig", &[] as &[&str]).unwrap_err();
        assert!(err.to_string().contains("PCI Read"));

        let err = resolve_named("Ping", &["1"]).unwrap_err();
        assert!(matches!(err, UsageError::Arity { got: 1, .. }));
    }

    #[test]
    fn test_values_truncate_to_field_width() {
        let request = resolve_named("RdPkgConfig", &["0x1ff", "0x12345"]).unwrap();
        assert_eq!(
            request,
            Request::RdPkgConfig {
                index: 0xff,
                param: 0x2345,
            }
        );
    }

    // Typos silently become zero: a user asking for register "1O" reads
    // register 0. Trailing garbage and negative values are not salvaged.
    #[test]
    fn test_unparsable_token_binds_zero() {
        let request = resolve_named("RdIAMSR", &["two", "1O"]).unwrap();
        assert_eq!(
            request,
            Request::RdIaMsr {
                thread: 0,
                address: 0,
            }
        );

        let request = resolve_named("RdPkgConfig", &["-1", "12abc"]).unwrap();
        assert_eq!(request, Request::RdPkgConfig { index: 0, param: 0 });
        assert_eq!(parse_field("-1", Width::U8), 0);
        assert_eq!(parse_field("12abc", Width::U16), 0);
    }

    #[test]
    fn test_mmio_offset_is_64_bit() {
        let request = resolve_named(
            "WrEndpointConfigMMIO",
            &["6", "0", "0", "1", "2", "3", "0x1_0000", "0xffffffffffffffff"],
        )
        .unwrap();
        // "0x1_0000" is not a number, so the offset binds zero
        assert_eq!(
            request,
            Request::WrEndpointMmio {
                mmio: MmioAddress {
                    addr_type: 6,
                    bar: 0,
                    seg: 0,
                    bus: 1,
                    device: 2,
                    function: 3,
                    offset: 0,
                },
                value: u64::MAX,
            }
        );
    }

    #[test]
    fn test_raw_collects_payload() {
        let request = resolve_named("raw", &["0x30", "5", "5", "0xa1", "0x00"]).unwrap();
        assert_eq!(
            request,
            Request::Raw(RawCommand {
                address: 0x30,
                write_len: 5,
                read_len: 5,
                data: vec![0xa1, 0x00, 0x00, 0x00, 0x00],
            })
        );
    }

    #[test]
    fn test_raw_payload_longer_than_write_length() {
        let err = resolve_named("raw", &["0x30", "1", "2", "0xa1", "0xb2"]).unwrap_err();
        assert_eq!(
            err,
            UsageError::RawWriteLength {
                write_len: 1,
                supplied: 2,
            }
        );
    }

    #[test]
    fn test_raw_needs_header() {
        let err = resolve_named("raw", &["0x30", "1"]).unwrap_err();
        assert!(matches!(err, UsageError::Arity { got: 2, .. }));
    }

    #[test]
    fn test_target_is_carried_through() {
        let op = catalog::resolve("ping").unwrap();
        let target = Target {
            address: 0x31,
            domain_id: 5,
            size: 8,
        };
        let resolved = resolve(op, target, &[] as &[String]).unwrap();
        assert_eq!(resolved.target, target);
        assert_eq!(resolved.request, Request::Ping);
    }
}
