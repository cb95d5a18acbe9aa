// [libs/netmon-targets/src/lib.rs]
//! Parses a discovery profile's target expression and expands it into a
//! finite, ordered sequence of addresses.
//!
//! Three syntactic forms are accepted: a single address, an inclusive
//! range `A-B`, and a CIDR block. Expansion is capped at [`MAX_ADDRESSES`]
//! to keep a single discovery run bounded — a caller asking for more gets
//! an error, never a silently truncated list.

use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

pub const MAX_ADDRESSES: u128 = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Single,
    Range,
    Cidr,
    Invalid,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetExpansionError {
    #[error("target expression `{0}` is not a recognized single address, range, or CIDR block")]
    Malformed(String),
    #[error("range endpoints `{0}` and `{1}` are not the same address family")]
    FamilyMismatch(String, String),
    #[error("range start `{0}` is greater than range end `{1}`")]
    DescendingRange(String, String),
    #[error("expansion would yield {0} addresses, exceeding the cap of 65536")]
    TooLarge(u128),
}

/// Classifies `s` by syntactic form only — it does not check range
/// ordering, family agreement, or expansion size. [`expand`] performs the
/// full validation and can still fail on a target this reports as valid.
pub fn detect_type(s: &str) -> TargetKind {
    let s = s.trim();
    if s.contains('/') {
        return if s.parse::<IpNet>().is_ok() { TargetKind::Cidr } else { TargetKind::Invalid };
    }
    if let Some((lhs, rhs)) = split_range(s) {
        if lhs.parse::<IpAddr>().is_ok() && rhs.parse::<IpAddr>().is_ok() {
            return TargetKind::Range;
        }
        return TargetKind::Invalid;
    }
    if s.parse::<IpAddr>().is_ok() {
        return TargetKind::Single;
    }
    TargetKind::Invalid
}

/// Expands `s` into an ascending, duplicate-free sequence of addresses.
pub fn expand(s: &str) -> Result<Vec<IpAddr>, TargetExpansionError> {
    let s = s.trim();
    match detect_type(s) {
        TargetKind::Single => Ok(vec![s.parse().expect("detect_type confirmed this parses")]),
        TargetKind::Range => expand_range(s),
        TargetKind::Cidr => expand_cidr(s),
        TargetKind::Invalid => Err(TargetExpansionError::Malformed(s.to_string())),
    }
}

/// A range separator is a literal `-` outside of the colon-delimited IPv6
/// form, so we only split on the first `-` when the string has no `:`
/// confusable with a negative/IPv6 edge case — both endpoints are
/// reparsed as full addresses regardless, so a spurious split just fails
/// to parse and falls through to `Invalid`.
fn split_range(s: &str) -> Option<(&str, &str)> {
    s.split_once('-')
}

fn expand_range(s: &str) -> Result<Vec<IpAddr>, TargetExpansionError> {
    let (lhs, rhs) = split_range(s).expect("detect_type confirmed a range separator");
    let start: IpAddr = lhs.parse().expect("detect_type confirmed this parses");
    let end: IpAddr = rhs.parse().expect("detect_type confirmed this parses");

    match (start, end) {
        (IpAddr::V4(a), IpAddr::V4(b)) => {
            let (a, b) = (u32::from(a), u32::from(b));
            if a > b {
                return Err(TargetExpansionError::DescendingRange(lhs.to_string(), rhs.to_string()));
            }
            let count = u128::from(b - a) + 1;
            check_cap(count)?;
            Ok((a..=b).map(|n| IpAddr::V4(Ipv4Addr::from(n))).collect())
        }
        (IpAddr::V6(a), IpAddr::V6(b)) => {
            let (a, b) = (u128::from(a), u128::from(b));
            if a > b {
                return Err(TargetExpansionError::DescendingRange(lhs.to_string(), rhs.to_string()));
            }
            let count = b - a + 1;
            check_cap(count)?;
            Ok((a..=b).map(|n| IpAddr::V6(Ipv6Addr::from(n))).collect())
        }
        _ => Err(TargetExpansionError::FamilyMismatch(lhs.to_string(), rhs.to_string())),
    }
}

fn expand_cidr(s: &str) -> Result<Vec<IpAddr>, TargetExpansionError> {
    let net: IpNet = s.parse().map_err(|_| TargetExpansionError::Malformed(s.to_string()))?;
    match net {
        IpNet::V4(v4) => {
            let network = u32::from(v4.network());
            let broadcast = u32::from(v4.broadcast());
            let (start, end) = if v4.prefix_len() < 31 {
                (network + 1, broadcast - 1)
            } else {
                (network, broadcast)
            };
            let count = u128::from(end - start) + 1;
            check_cap(count)?;
            Ok((start..=end).map(|n| IpAddr::V4(Ipv4Addr::from(n))).collect())
        }
        IpNet::V6(v6) => {
            let start = u128::from(v6.network());
            let end = u128::from(v6.broadcast());
            let count = end - start + 1;
            check_cap(count)?;
            Ok((start..=end).map(|n| IpAddr::V6(Ipv6Addr::from(n))).collect())
        }
    }
}

fn check_cap(count: u128) -> Result<(), TargetExpansionError> {
    if count > MAX_ADDRESSES {
        Err(TargetExpansionError::TooLarge(count))
    } else {
        Ok(())
    }
}
