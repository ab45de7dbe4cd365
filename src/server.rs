use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use crate::config::{AddressRange, ServerIdentity};
use crate::error::{Error, Result};
use crate::lease::LeaseTable;
use crate::options::{MessageType, OptionCode};
use crate::packet::DhcpMessage;
use crate::processor::{client_label, process};

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const RECV_BUFFER_SIZE: usize = 65_536;

/// The server: one socket, one lease table, one subnet.
///
/// Requests are handled strictly in the order received; the loop owns
/// the lease table for the life of the process, so no locking is
/// involved anywhere.
pub struct DhcpServer {
    identity: ServerIdentity,
    range: AddressRange,
    table: LeaseTable,
    socket: UdpSocket,
}

impl DhcpServer {
    pub async fn new(identity: ServerIdentity) -> Result<Self> {
        let range = AddressRange::from_subnet(identity.addr, identity.mask)?;
        let table = LeaseTable::new(identity.addr, &range);
        let socket = Self::create_socket(identity.addr)?;

        info!(
            "DHCP server starting on {}:{}",
            identity.addr, DHCP_SERVER_PORT
        );
        info!(
            "IP pool: {} - {} ({} addresses)",
            Ipv4Addr::from(range.min()),
            Ipv4Addr::from(range.max()),
            range.size()
        );

        Ok(Self {
            identity,
            range,
            table,
            socket,
        })
    }

    fn create_socket(addr: Ipv4Addr) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Init(format!("failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Init(format!("failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Init(format!("failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Init(format!("failed to set non-blocking: {}", error)))?;

        // Bind the interface address rather than 0.0.0.0 so replies do
        // not go out with the loopback source.
        let bind_addr = SocketAddrV4::new(addr, DHCP_SERVER_PORT);
        socket
            .bind(&bind_addr.into())
            .map_err(|error| Error::Init(format!("failed to bind to {}: {}", bind_addr, error)))?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket)
            .map_err(|error| Error::Init(format!("failed to register socket: {}", error)))?;

        Ok(tokio_socket)
    }

    pub async fn run(mut self) -> Result<()> {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        info!("DHCP server ready and listening");

        loop {
            let (size, source) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) => {
                    error!("error receiving datagram: {}", error);
                    continue;
                }
            };
            self.handle_datagram(&buffer[..size], source).await;
        }
    }

    async fn handle_datagram(&mut self, data: &[u8], source: SocketAddr) {
        let request = match DhcpMessage::parse(data) {
            Ok(request) => request,
            Err(error) => {
                warn!("ignoring datagram from {}: {}", source, error);
                return;
            }
        };

        let Some(reply) = process(&request, &mut self.table, &self.range, &self.identity) else {
            return;
        };

        let encoded = reply.message.encode();
        let destination = SocketAddrV4::new(reply.destination, DHCP_CLIENT_PORT);
        let label = client_label(&request, &request.options.string_value(OptionCode::HostName));

        match self.socket.send_to(&encoded, SocketAddr::V4(destination)).await {
            Ok(_) => match reply.kind {
                MessageType::Nak => info!("NAK to {}", label),
                _ => info!("{} {} to {}", reply.kind, reply.message.yiaddr, label),
            },
            Err(error) => error!("failed to send {} to {}: {}", reply.kind, destination, error),
        }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn range(&self) -> &AddressRange {
        &self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DHCP_SERVER_PORT, 67);
        assert_eq!(DHCP_CLIENT_PORT, 68);
        assert_eq!(RECV_BUFFER_SIZE, 65_536);
    }
}
