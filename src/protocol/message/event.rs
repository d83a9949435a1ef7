//! EVENT bodies pushed by the server after REGISTER.

use std::net::SocketAddr;

use bytes::BytesMut;

use crate::protocol::error::ProtocolResult;
use crate::protocol::types::EventType;
use crate::protocol::wire::{self, WireReader};

use super::result::SchemaChange;

/// EVENT - Unsolicited cluster notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `NEW_NODE` or `REMOVED_NODE`
    TopologyChange { change: String, address: SocketAddr },
    /// `UP` or `DOWN`
    StatusChange { change: String, address: SocketAddr },
    SchemaChange(SchemaChange),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::TopologyChange { .. } => EventType::TopologyChange,
            Event::StatusChange { .. } => EventType::StatusChange,
            Event::SchemaChange(_) => EventType::SchemaChange,
        }
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        wire::encode_string(dst, self.event_type().as_str());
        match self {
            Event::TopologyChange { change, address } | Event::StatusChange { change, address } => {
                wire::encode_string(dst, change);
                wire::encode_inet(dst, address);
            }
            Event::SchemaChange(change) => change.encode(dst),
        }
    }

    pub(super) fn size(&self) -> usize {
        wire::string_size(self.event_type().as_str())
            + match self {
                Event::TopologyChange { change, address }
                | Event::StatusChange { change, address } => {
                    wire::string_size(change) + wire::inet_size(address)
                }
                Event::SchemaChange(change) => change.size(),
            }
    }

    pub(super) fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let event_type = EventType::parse(reader.read_string()?)?;
        Ok(match event_type {
            EventType::TopologyChange => Event::TopologyChange {
                change: reader.read_string()?.to_string(),
                address: reader.read_inet()?,
            },
            EventType::StatusChange => Event::StatusChange {
                change: reader.read_string()?.to_string(),
                address: reader.read_inet()?,
            },
            EventType::SchemaChange => Event::SchemaChange(SchemaChange::decode(reader)?),
        })
    }
}
