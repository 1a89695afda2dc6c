//! Packet router: maps a decoded message to its registered sink(s) by `(ServiceId,
//! MethodOrEventId)` and direction (spec §4.9). Two tables are consulted —
//! `locally_provided_instances` for messages destined to a local application, and
//! `remotely_required_instances` for messages a local application originates toward a peer.
//! `InstanceId` always comes from the lookup, never from the wire (spec §4.9 tie-break rule).

use crate::header::{SomeIpHeader, E_UNKNOWN_METHOD, E_UNKNOWN_SERVICE, E_WRONG_INTERFACE, MSG_TYPE_REQUEST};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub const MAJOR_VERSION_ANY: u8 = 0xFF;
pub const SERVICE_ID_ANY: u16 = 0xFFFF;
pub const INSTANCE_ID_ALL: u16 = 0xFFFF;

/// `(ServiceId, MajorVersion)` — the key a local application registers a provided instance
/// under. Looking it up with `MAJOR_VERSION_ANY` matches any registered major version for that
/// service (spec §4.9 tie-break).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ServiceKey {
    pub service_id: u16,
    pub major_version: u8,
}

/// Outcome of routing a decoded message.
pub enum RouteOutcome<P> {
    /// Deliver to the local application that provides this instance.
    Local(u16),
    /// Deliver to the peer that required this instance.
    Remote(P, u16),
    /// No registration matched. Carries the return code to use if `header` warrants an error
    /// response (method requests only — spec §4.9).
    Unroutable(u8),
}

/// Maps decoded `(ServiceId, MethodOrEventId)` to sinks. Mutated only by the reactor thread
/// that also reads it (spec §5).
pub struct PacketRouter<P: Eq + Hash + Clone> {
    locally_provided: HashMap<ServiceKey, u16>,
    /// Per-(service, major_version) set of method/event IDs known to be handled by that
    /// instance. Absent entries mean "no method-level restriction" — any method/event under a
    /// registered instance is considered known.
    known_methods: HashMap<ServiceKey, HashSet<u16>>,
    remotely_required: HashMap<(P, ServiceKey), u16>,
}

impl<P: Eq + Hash + Clone> PacketRouter<P> {
    pub fn new() -> PacketRouter<P> {
        PacketRouter {
            locally_provided: HashMap::new(),
            known_methods: HashMap::new(),
            remotely_required: HashMap::new(),
        }
    }

    pub fn register_local(&mut self, service_id: u16, major_version: u8, instance_id: u16) {
        self.locally_provided.insert(ServiceKey { service_id, major_version }, instance_id);
    }

    pub fn register_local_method(&mut self, service_id: u16, major_version: u8, method_or_event_id: u16) {
        self.known_methods
            .entry(ServiceKey { service_id, major_version })
            .or_default()
            .insert(method_or_event_id);
    }

    pub fn deregister_local(&mut self, service_id: u16, major_version: u8) {
        let key = ServiceKey { service_id, major_version };
        self.locally_provided.remove(&key);
        self.known_methods.remove(&key);
    }

    pub fn register_remote(&mut self, peer: P, service_id: u16, major_version: u8, instance_id: u16) {
        self.remotely_required.insert((peer, ServiceKey { service_id, major_version }), instance_id);
    }

    pub fn deregister_remote(&mut self, peer: &P, service_id: u16, major_version: u8) {
        self.remotely_required.remove(&(peer.clone(), ServiceKey { service_id, major_version }));
    }

    /// Routes a message that arrived from the network, destined for a local application.
    pub fn route_inbound(&self, header: &SomeIpHeader) -> RouteOutcome<P> {
        match self.lookup_local(header.service_id, MAJOR_VERSION_ANY, header.method_id) {
            Ok(instance_id) => RouteOutcome::Local(instance_id),
            Err(code) => RouteOutcome::Unroutable(code),
        }
    }

    /// Routes a message a local application originates toward `peer`.
    pub fn route_outbound(&self, peer: &P, header: &SomeIpHeader) -> RouteOutcome<P> {
        match self.lookup_remote(peer, header.service_id) {
            Some(instance_id) => RouteOutcome::Remote(peer.clone(), instance_id),
            None => RouteOutcome::Unroutable(E_UNKNOWN_SERVICE),
        }
    }

    fn lookup_local(&self, service_id: u16, major_version: u8, method_or_event_id: u16) -> Result<u16, u8> {
        let matched = self.find_service_key(&self.locally_provided, service_id, major_version);

        let Some(key) = matched else {
            return Err(if self.locally_provided.keys().any(|k| k.service_id == service_id) {
                E_WRONG_INTERFACE
            } else {
                E_UNKNOWN_SERVICE
            });
        };

        if let Some(known) = self.known_methods.get(&key) {
            if !known.contains(&method_or_event_id) {
                return Err(E_UNKNOWN_METHOD);
            }
        }

        Ok(*self.locally_provided.get(&key).expect("matched key must be present"))
    }

    fn lookup_remote(&self, peer: &P, service_id: u16) -> Option<u16> {
        self.remotely_required
            .iter()
            .find(|((p, key), _)| p == peer && key.service_id == service_id)
            .map(|(_, instance_id)| *instance_id)
    }

    fn find_service_key(
        &self,
        table: &HashMap<ServiceKey, u16>,
        service_id: u16,
        major_version: u8,
    ) -> Option<ServiceKey> {
        if major_version == MAJOR_VERSION_ANY {
            table.keys().find(|key| key.service_id == service_id).copied()
        } else {
            let key = ServiceKey { service_id, major_version };
            table.contains_key(&key).then_some(key)
        }
    }

    /// Builds the SOME/IP error response for an unroutable method request, per spec §4.9:
    /// same `RequestId`, `MessageType = 0x81`, the supplied return code, no payload. Returns
    /// `None` for non-Request message types (notifications and responses are silently dropped,
    /// spec §4.9).
    pub fn error_response(header: &SomeIpHeader, return_code: u8) -> Option<SomeIpHeader> {
        if header.message_type != MSG_TYPE_REQUEST {
            return None;
        }
        Some(header.error_response(return_code))
    }
}

impl<P: Eq + Hash + Clone> Default for PacketRouter<P> {
    fn default() -> Self {
        Self::new()
    }
}
