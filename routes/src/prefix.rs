// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type to represent IP-version neutral network prefixes.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::errors::RouteError;

/// An IPv4 or IPv6 network prefix. The address is kept normalized: bits past
/// the prefix length are always zero, so prefixes can be used directly as
/// map keys.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Prefix {
    addr: IpAddr,
    len: u8,
}

impl Prefix {
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, RouteError> {
        let addr = match addr {
            IpAddr::V4(a) => {
                if len > 32 {
                    return Err(RouteError::InvalidPrefixLength(len));
                }
                let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
                IpAddr::V4(Ipv4Addr::from(u32::from(a) & mask))
            }
            IpAddr::V6(a) => {
                if len > 128 {
                    return Err(RouteError::InvalidPrefixLength(len));
                }
                let mask = if len == 0 { 0 } else { u128::MAX << (128 - len) };
                IpAddr::V6(Ipv6Addr::from(u128::from(a) & mask))
            }
        };
        Ok(Self { addr, len })
    }

    #[must_use]
    pub fn address(&self) -> IpAddr {
        self.addr
    }

    #[must_use]
    pub fn length(&self) -> u8 {
        self.len
    }

    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// The raw address octets, 4 for IPv4 and 16 for IPv6.
    #[must_use]
    pub fn address_octets(&self) -> Vec<u8> {
        match self.addr {
            IpAddr::V4(a) => a.octets().to_vec(),
            IpAddr::V6(a) => a.octets().to_vec(),
        }
    }
}

impl FromStr for Prefix {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || RouteError::MalformedPrefix(s.to_owned());
        let (addr, len) = s.split_once('/').ok_or_else(bad)?;
        let addr = IpAddr::from_str(addr).map_err(|_| bad())?;
        let len = u8::from_str(len).map_err(|_| bad())?;
        Prefix::new(addr, len)
    }
}

/* Prefixes serialize as their canonical "address/length" rendering so that
they can key JSON maps. */
impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Prefix::from_str(&s).map_err(DeError::custom)
    }
}
