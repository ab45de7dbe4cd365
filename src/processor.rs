//! The request-processing state machine of RFC 2131 section 4.3.
//!
//! [`process`] is a pure function from a parsed request and the lease
//! table to a reply-or-drop decision; the server loop performs all
//! socket I/O. Malformed or unexpected traffic is absorbed silently: a
//! NAK is only ever sent in answer to a well-formed REQUEST.

use std::net::Ipv4Addr;

use tracing::{error, trace, warn};

use crate::config::{AddressRange, ServerIdentity, sanitize_hostname};
use crate::error::Error;
use crate::lease::{Binding, LeaseTable};
use crate::options::{MessageType, OptionCode};
use crate::packet::{BOOTREQUEST, BROADCAST_FLAG, DhcpMessage};

/// A reply ready to serialize, with the UDP destination chosen per
/// RFC 2131 section 4.1. The destination port is always the client
/// port (68).
#[derive(Debug)]
pub struct Reply {
    pub message: DhcpMessage,
    pub kind: MessageType,
    pub destination: Ipv4Addr,
}

enum Verdict {
    Ack(u32),
    Nak,
}

/// Handles one request against the lease table, returning the reply to
/// send or `None` to drop the datagram.
pub fn process(
    request: &DhcpMessage,
    table: &mut LeaseTable,
    range: &AddressRange,
    identity: &ServerIdentity,
) -> Option<Reply> {
    if request.op != BOOTREQUEST {
        trace!("ignoring non-BOOTREQUEST message (op {})", request.op);
        return None;
    }

    let message_type = match request.options.u8_value(OptionCode::MessageType) {
        Ok(Some(value)) => match MessageType::try_from(value) {
            Ok(message_type) => message_type,
            Err(value) => {
                warn!("ignoring message: {}", Error::UnsupportedType(value));
                return None;
            }
        },
        Ok(None) => {
            warn!("ignoring message without a message type option");
            return None;
        }
        Err(error) => {
            warn!("ignoring message with malformed message type option: {}", error);
            return None;
        }
    };

    let client_hostname = request.options.string_value(OptionCode::HostName);

    // A request carrying our own host name is this machine trying to
    // lease from itself (possible if it booted via Auto-IP); answering
    // would invalidate the server address.
    if let Some(name) = &client_hostname
        && !identity.hostname.is_empty()
        && name.eq_ignore_ascii_case(&identity.hostname)
    {
        trace!("ignoring request from our own host name {:?}", name);
        return None;
    }

    let client_id = client_identifier(request);
    let previous = table
        .find_by_client_id(&client_id)
        .map(|binding| binding.addr_value);

    let mut reply = DhcpMessage::reply_to(request);
    reply.set_sname(&identity.hostname);
    reply.options.insert(
        OptionCode::LeaseTime,
        identity.lease_time_seconds.to_be_bytes().to_vec(),
    );
    reply
        .options
        .insert(OptionCode::SubnetMask, identity.mask.octets().to_vec());
    reply
        .options
        .insert(OptionCode::ServerIdentifier, identity.addr.octets().to_vec());

    match message_type {
        MessageType::Discover => {
            // RFC 2131 section 4.3.1: a known client gets its bound
            // address back, anyone else gets the next free one.
            let addr_value = match previous {
                Some(value) => {
                    table.record_offer(value);
                    value
                }
                None => match table.allocate(range) {
                    Ok(value) => value,
                    Err(_) => {
                        error!(
                            "no more addresses available for client {}",
                            client_label(request, &client_hostname)
                        );
                        return None;
                    }
                },
            };
            if previous.is_none() {
                table.insert(Binding {
                    addr_value,
                    client_id,
                    hostname: client_hostname.as_deref().map(sanitize_hostname),
                });
            }

            reply.yiaddr = Ipv4Addr::from(addr_value);
            reply
                .options
                .insert(OptionCode::MessageType, vec![MessageType::Offer as u8]);
            Some(finish(reply, request, MessageType::Offer))
        }

        MessageType::Request => {
            // RFC 2131 section 4.3.2.
            let requested_ip = match request.options.ipv4_value(OptionCode::RequestedIpAddress) {
                Ok(value) => value,
                Err(error) => {
                    warn!("ignoring REQUEST with malformed requested address: {}", error);
                    return None;
                }
            };
            let server_id = match request.options.ipv4_value(OptionCode::ServerIdentifier) {
                Ok(value) => value,
                Err(error) => {
                    warn!("ignoring REQUEST with malformed server identifier: {}", error);
                    return None;
                }
            };

            let verdict = if server_id == Some(identity.addr) {
                // SELECTING: the client is answering our OFFER.
                debug_assert!(request.ciaddr.is_unspecified());
                match previous {
                    Some(value) => Verdict::Ack(value),
                    None => Verdict::Nak,
                }
            } else {
                // INIT-REBOOT carries a requested address (some clients
                // set ciaddr too, which RFC 2131 forbids but we
                // tolerate); RENEWING/REBINDING carries only ciaddr.
                let init_reboot = requested_ip.is_some();
                let renewing = requested_ip.is_none() && !request.ciaddr.is_unspecified();
                if !init_reboot && !renewing {
                    warn!(
                        "ignoring REQUEST with neither requested address nor ciaddr from {}",
                        client_label(request, &client_hostname)
                    );
                    return None;
                }
                match previous {
                    Some(value)
                        if requested_ip.map(u32::from) == Some(value)
                            || u32::from(request.ciaddr) == value =>
                    {
                        Verdict::Ack(value)
                    }
                    _ => Verdict::Nak,
                }
            };

            match verdict {
                Verdict::Ack(addr_value) => {
                    let addr = Ipv4Addr::from(addr_value);
                    reply.ciaddr = addr;
                    reply.yiaddr = addr;
                    reply
                        .options
                        .insert(OptionCode::MessageType, vec![MessageType::Ack as u8]);
                    Some(finish(reply, request, MessageType::Ack))
                }
                Verdict::Nak => {
                    // Lease time and subnet mask are meaningless in a NAK.
                    reply.options.remove(OptionCode::LeaseTime);
                    reply.options.remove(OptionCode::SubnetMask);
                    reply
                        .options
                        .insert(OptionCode::MessageType, vec![MessageType::Nak as u8]);
                    Some(finish(reply, request, MessageType::Nak))
                }
            }
        }

        MessageType::Decline | MessageType::Release | MessageType::Inform => {
            trace!("ignoring {} (not supported)", message_type);
            None
        }

        MessageType::Offer | MessageType::Ack | MessageType::Nak => {
            warn!("ignoring unexpected server-to-client message {}", message_type);
            None
        }
    }
}

/// The client identifier in RFC 2131 precedence: option 61 if present
/// and non-empty, otherwise the full 16-byte `chaddr`.
fn client_identifier(request: &DhcpMessage) -> Vec<u8> {
    match request.options.get(OptionCode::ClientIdentifier) {
        Some(id) if !id.is_empty() => id.to_vec(),
        _ => request.chaddr.to_vec(),
    }
}

/// How a client is referred to in the log: its host name if it sent
/// one, else its hardware address.
pub fn client_label(request: &DhcpMessage, hostname: &Option<String>) -> String {
    match hostname {
        Some(name) if !name.is_empty() => sanitize_hostname(name),
        _ => request.hardware_address(),
    }
}

/// Picks the reply destination per RFC 2131 section 4.1.
fn finish(mut reply: DhcpMessage, request: &DhcpMessage, kind: MessageType) -> Reply {
    debug_assert!(reply.options.contains(OptionCode::MessageType));

    let destination = if !request.giaddr.is_unspecified() {
        // The relay agent must broadcast the reply on the client side.
        reply.flags |= BROADCAST_FLAG;
        request.giaddr
    } else if kind == MessageType::Nak {
        Ipv4Addr::BROADCAST
    } else if !request.ciaddr.is_unspecified() {
        request.ciaddr
    } else {
        // Either the client asked for broadcast via the flags bit, or a
        // unicast to its hardware address would need raw L2 access;
        // broadcast in both cases and let clients filter on xid and
        // chaddr.
        Ipv4Addr::BROADCAST
    };

    Reply {
        message: reply,
        kind,
        destination,
    }
}
