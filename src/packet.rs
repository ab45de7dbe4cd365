use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{OptionCode, Options};

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const FIXED_HEADER_SIZE: usize = 240;
const MIN_PACKET_SIZE: usize = 300;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

/// Bit 15 of `flags`: the client (or a relay agent) wants the reply
/// broadcast.
pub const BROADCAST_FLAG: u16 = 0x8000;

/// A DHCP message.
///
/// Header fields are stored decoded; `xid`, `secs`, and `flags` are
/// network order on the wire, and the four addresses round-trip their
/// octets verbatim. Range arithmetic elsewhere works on host-order
/// `u32` values obtained via `u32::from(Ipv4Addr)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Options,
}

impl DhcpMessage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(Error::Malformed(format!(
                "packet too short: {} bytes (minimum {})",
                data.len(),
                FIXED_HEADER_SIZE
            )));
        }

        let magic_cookie = &data[236..240];
        if magic_cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::Malformed("invalid magic cookie".to_string()));
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = Self::parse_options(&data[240..])?;

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    fn parse_options(data: &[u8]) -> Result<Options> {
        let mut options = Options::new();
        let mut index = 0;

        // A region that runs out of bytes without an END tag is accepted
        // as-is; anything after END is ignored.
        while index < data.len() {
            let tag = data[index];

            if tag == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if tag == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::Malformed("option length missing".to_string()));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::Malformed("option data truncated".to_string()));
            }

            options.insert_raw(tag, data[index + 2..index + 2 + length].to_vec());

            index += 2 + length;
        }

        Ok(options)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(MIN_PACKET_SIZE);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for (tag, value) in self.options.iter() {
            if value.is_empty() {
                continue;
            }
            packet.push(tag);
            packet.push(value.len() as u8);
            packet.extend_from_slice(value);
        }

        packet.push(OptionCode::End as u8);

        // BOOTP minimum packet size.
        while packet.len() < MIN_PACKET_SIZE {
            packet.push(OptionCode::Pad as u8);
        }

        packet
    }

    /// Builds the reply skeleton for a request: header fields echoed per
    /// RFC 2131, no options set.
    ///
    /// The caller must set option 53 before the message is sent.
    pub fn reply_to(request: &DhcpMessage) -> Self {
        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: Options::new(),
        }
    }

    /// Copies a host name into `sname`, truncated and NUL-terminated.
    pub fn set_sname(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let length = bytes.len().min(self.sname.len() - 1);
        self.sname[..length].copy_from_slice(&bytes[..length]);
        self.sname[length..].fill(0);
    }

    /// The significant bytes of `chaddr` as colon-separated hex, for
    /// logging.
    pub fn hardware_address(&self) -> String {
        let length = usize::from(self.hlen).clamp(1, self.chaddr.len());
        self.chaddr[..length]
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }
}
