//! Node network identity.
//!
//! An [`Address`] is the key hosts are tracked by. The wire and the
//! notification ABI both carry raw inet bytes, so this module also owns the
//! conversions between a socket address and its fixed-size [`Inet`]
//! encoding.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Length of an encoded IPv4 address.
pub const INET_V4_LENGTH: usize = 4;
/// Length of an encoded IPv6 address; also the capacity of [`Inet`].
pub const INET_V6_LENGTH: usize = 16;

/// Immutable IP + port identity of a node.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct Address(SocketAddr);

impl Address {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// Compare with `other`, optionally ignoring the port.
    pub fn equals(&self, other: &Address, compare_port: bool) -> bool {
        self.ip() == other.ip() && (!compare_port || self.port() == other.port())
    }

    /// True for the "any interface" placeholders `0.0.0.0` and `::`.
    pub fn is_bind_any(&self) -> bool {
        self.ip().is_unspecified()
    }

    /// Decode a variable-length inet encoding (4 or 16 raw bytes).
    pub fn from_inet_bytes(bytes: &[u8], port: u16) -> Result<Self> {
        let ip = match bytes.len() {
            INET_V4_LENGTH => {
                let mut octets = [0u8; INET_V4_LENGTH];
                octets.copy_from_slice(bytes);
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            INET_V6_LENGTH => {
                let mut octets = [0u8; INET_V6_LENGTH];
                octets.copy_from_slice(bytes);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            len => return Err(Error::InvalidInet { len }),
        };
        Ok(Self::new(ip, port))
    }

    /// Fixed-size encoding used by external host notifications.
    pub fn to_inet(&self) -> Inet {
        let mut inet = Inet::default();
        match self.ip() {
            IpAddr::V4(v4) => {
                inet.address[..INET_V4_LENGTH].copy_from_slice(&v4.octets());
                inet.address_length = INET_V4_LENGTH as u8;
            }
            IpAddr::V6(v6) => {
                inet.address.copy_from_slice(&v6.octets());
                inet.address_length = INET_V6_LENGTH as u8;
            }
        }
        inet
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw address bytes plus the number of them in use.
#[repr(C)]
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct Inet {
    pub address: [u8; INET_V6_LENGTH],
    pub address_length: u8,
}

impl Inet {
    /// The meaningful prefix of `address`.
    pub fn as_bytes(&self) -> &[u8] {
        let len = usize::from(self.address_length).min(INET_V6_LENGTH);
        &self.address[..len]
    }
}
