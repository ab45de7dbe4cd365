use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    HostName = 12,
    RequestedIpAddress = 50,
    LeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ClientIdentifier = 61,
    End = 255,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// The decoded option region of a DHCP message: tag mapped to raw value
/// bytes.
///
/// Duplicate tags in the input keep the last value seen. Iteration is in
/// ascending tag order, so re-encoding a message is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options(BTreeMap<u8, Vec<u8>>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: OptionCode, value: Vec<u8>) {
        self.insert_raw(code as u8, value);
    }

    pub fn insert_raw(&mut self, tag: u8, value: Vec<u8>) {
        self.0.insert(tag, value);
    }

    pub fn remove(&mut self, code: OptionCode) {
        self.0.remove(&(code as u8));
    }

    pub fn get(&self, code: OptionCode) -> Option<&[u8]> {
        self.0.get(&(code as u8)).map(Vec::as_slice)
    }

    pub fn contains(&self, code: OptionCode) -> bool {
        self.0.contains_key(&(code as u8))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.0.iter().map(|(tag, value)| (*tag, value.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the option value as a `u8`, or `None` if the option is
    /// absent.
    ///
    /// A present option shorter than one byte is malformed.
    pub fn u8_value(&self, code: OptionCode) -> Result<Option<u8>> {
        self.fixed_width::<1>(code)
            .map(|bytes| bytes.map(|[value]| value))
    }

    /// Returns the option value as a network-order `u16`.
    pub fn u16_value(&self, code: OptionCode) -> Result<Option<u16>> {
        self.fixed_width::<2>(code)
            .map(|bytes| bytes.map(u16::from_be_bytes))
    }

    /// Returns the option value as a network-order `u32`.
    pub fn u32_value(&self, code: OptionCode) -> Result<Option<u32>> {
        self.fixed_width::<4>(code)
            .map(|bytes| bytes.map(u32::from_be_bytes))
    }

    /// Returns the option value as an IPv4 address.
    pub fn ipv4_value(&self, code: OptionCode) -> Result<Option<Ipv4Addr>> {
        self.u32_value(code)
            .map(|value| value.map(Ipv4Addr::from))
    }

    /// Returns the option value as a string, with invalid UTF-8 replaced
    /// and trailing NULs stripped.
    pub fn string_value(&self, code: OptionCode) -> Option<String> {
        self.get(code)
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string())
    }

    fn fixed_width<const N: usize>(&self, code: OptionCode) -> Result<Option<[u8; N]>> {
        match self.get(code) {
            None => Ok(None),
            Some(value) if value.len() < N => Err(Error::Malformed(format!(
                "option {} holds {} bytes, expected {}",
                code as u8,
                value.len(),
                N
            ))),
            Some(value) => {
                let mut bytes = [0u8; N];
                bytes.copy_from_slice(&value[..N]);
                Ok(Some(bytes))
            }
        }
    }
}
