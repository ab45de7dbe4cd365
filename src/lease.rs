use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::config::AddressRange;
use crate::error::{Error, Result};

/// An address bound to a client.
///
/// `addr_value` is the host-order numeric form of the address, so range
/// arithmetic stays explicit; conversion to `Ipv4Addr` happens at the
/// wire boundary. `client_id` is the DHCP option-61 value if the client
/// sent one, otherwise the full 16-byte `chaddr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub addr_value: u32,
    pub client_id: Vec<u8>,
    pub hostname: Option<String>,
}

/// In-memory set of bindings, indexed by client identifier and by
/// address.
///
/// Bindings are added on successful DISCOVER and live until the process
/// exits; there is no expiry. The table always contains one sentinel
/// entry with an empty client identifier that reserves the server's own
/// address against allocation.
#[derive(Debug)]
pub struct LeaseTable {
    bindings: HashMap<Vec<u8>, Binding>,
    addr_to_client: HashMap<u32, Vec<u8>>,
    last_offered: u32,
}

impl LeaseTable {
    /// Creates the table with the server sentinel in place.
    ///
    /// `last_offered` starts at the top of the range so the first
    /// allocation wraps around and offers `min` first.
    pub fn new(server_addr: Ipv4Addr, range: &AddressRange) -> Self {
        let mut table = Self {
            bindings: HashMap::new(),
            addr_to_client: HashMap::new(),
            last_offered: range.max(),
        };
        table.insert(Binding {
            addr_value: u32::from(server_addr),
            client_id: Vec::new(),
            hostname: None,
        });
        table
    }

    pub fn find_by_client_id(&self, client_id: &[u8]) -> Option<&Binding> {
        self.bindings.get(client_id)
    }

    pub fn contains_addr(&self, addr_value: u32) -> bool {
        self.addr_to_client.contains_key(&addr_value)
    }

    /// Adds a binding. Neither index may already hold the new entry.
    pub fn insert(&mut self, binding: Binding) {
        debug_assert!(!self.addr_to_client.contains_key(&binding.addr_value));
        debug_assert!(!self.bindings.contains_key(&binding.client_id));

        self.addr_to_client
            .insert(binding.addr_value, binding.client_id.clone());
        self.bindings.insert(binding.client_id.clone(), binding);
    }

    /// Picks the next free address, scanning forward from just past the
    /// last offer and wrapping at the end of the range.
    ///
    /// Revisiting the starting candidate means every address is bound.
    pub fn allocate(&mut self, range: &AddressRange) -> Result<u32> {
        let first = range.next_candidate(self.last_offered + 1);
        let mut candidate = first;
        loop {
            if !self.contains_addr(candidate) {
                self.last_offered = candidate;
                return Ok(candidate);
            }
            candidate = range.next_candidate(candidate + 1);
            if candidate == first {
                return Err(Error::PoolExhausted);
            }
        }
    }

    /// Moves the cursor to an address that was re-offered to a known
    /// client without going through the allocator.
    pub fn record_offer(&mut self, addr_value: u32) {
        self.last_offered = addr_value;
    }

    pub fn last_offered(&self) -> u32 {
        self.last_offered
    }

    /// Number of bindings, including the server sentinel.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
