use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// A single allowlist entry: either an exact address or a CIDR block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpEntry {
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix_len: u8 },
}

impl IpEntry {
    /// Parse an entry from its textual form (`"10.0.0.1"` or `"10.0.0.0/8"`).
    pub fn parse(text: &str) -> Result<Self, AllowlistError> {
        match text.split_once('/') {
            None => {
                let addr: IpAddr = text
                    .parse()
                    .map_err(|_| AllowlistError::InvalidAddress(text.to_owned()))?;
                Ok(Self::Exact(addr))
            }
            Some((addr_part, prefix_part)) => {
                let network: IpAddr = addr_part
                    .parse()
                    .map_err(|_| AllowlistError::InvalidAddress(text.to_owned()))?;
                let prefix_len: u8 = prefix_part
                    .parse()
                    .map_err(|_| AllowlistError::InvalidPrefix(text.to_owned()))?;
                let max = match network {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                if prefix_len > max {
                    return Err(AllowlistError::InvalidPrefix(text.to_owned()));
                }
                Ok(Self::Cidr {
                    network,
                    prefix_len,
                })
            }
        }
    }

    /// Whether the entry matches the given address. Address families never
    /// match across each other.
    #[must_use]
    pub fn matches(&self, addr: IpAddr) -> bool {
        match self {
            Self::Exact(expected) => *expected == addr,
            Self::Cidr {
                network,
                prefix_len,
            } => match (network, addr) {
                (IpAddr::V4(net), IpAddr::V4(ip)) => {
                    let bits = u32::from(*prefix_len);
                    if bits == 0 {
                        return true;
                    }
                    let mask = u32::MAX << (32 - bits);
                    (u32::from(*net) & mask) == (u32::from(ip) & mask)
                }
                (IpAddr::V6(net), IpAddr::V6(ip)) => {
                    let bits = u32::from(*prefix_len);
                    if bits == 0 {
                        return true;
                    }
                    let mask = u128::MAX << (128 - bits);
                    (u128::from(*net) & mask) == (u128::from(ip) & mask)
                }
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for IpEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(addr) => write!(f, "{addr}"),
            Self::Cidr {
                network,
                prefix_len,
            } => write!(f, "{network}/{prefix_len}"),
        }
    }
}

impl Serialize for IpEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpEntry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Set of addresses and CIDR ranges permitted to invoke a webhook rule.
///
/// An empty allowlist permits every source address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpAllowlist {
    entries: Vec<IpEntry>,
}

impl IpAllowlist {
    /// Parse an allowlist from textual entries.
    pub fn parse(entries: &[String]) -> Result<Self, AllowlistError> {
        let entries = entries
            .iter()
            .map(|e| IpEntry::parse(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Whether the allowlist is empty (i.e. allows all sources).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the given source address is permitted.
    #[must_use]
    pub fn allows(&self, addr: IpAddr) -> bool {
        self.is_empty() || self.entries.iter().any(|e| e.matches(addr))
    }
}

/// Errors from allowlist parsing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AllowlistError {
    /// The address portion could not be parsed.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),
    /// The CIDR prefix length is malformed or out of range.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),
}
