//! The in-memory shape of a parsed protocol description.
//!
//! These are owned, run-time values: nothing here is generated or known
//! at compile time. A [`ProtocolTemplate`] is produced once per XML file by
//! [`super::parser::parse`] and then consulted by every part of the client
//! that needs to know an interface's requests, events or enums.

use std::collections::HashMap;

use waylink_core::ArgType;

/// One parsed `<protocol>` document.
#[derive(Debug, Clone)]
pub struct ProtocolTemplate {
    pub name: String,
    pub interfaces: Vec<InterfaceTemplate>,
}

impl ProtocolTemplate {
    pub fn interface(&self, name: &str) -> Option<&InterfaceTemplate> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

/// One parsed `<interface>`: its name, version, and the requests, events
/// and enums it declares. Requests and events are indexed by opcode (their
/// position in the XML), matching how they're addressed on the wire.
#[derive(Debug, Clone)]
pub struct InterfaceTemplate {
    pub name: String,
    pub version: u32,
    pub requests: Vec<MessageTemplate>,
    pub events: Vec<MessageTemplate>,
    pub enums: HashMap<String, EnumTemplate>,
    /// The interface's `<description>` text, trimmed, if the XML carried
    /// one. Not used by the wire engine itself; kept so a caller or a
    /// debug formatter can surface the protocol's own documentation.
    pub description: Option<String>,
}

impl InterfaceTemplate {
    pub fn request(&self, opcode: u16) -> Option<&MessageTemplate> {
        self.requests.get(opcode as usize)
    }

    pub fn event(&self, opcode: u16) -> Option<&MessageTemplate> {
        self.events.get(opcode as usize)
    }

    pub fn request_named(&self, name: &str) -> Option<(u16, &MessageTemplate)> {
        self.requests
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .map(|(i, m)| (i as u16, m))
    }
}

/// A `<request>` or `<event>`: its name and argument schema, in the order
/// arguments appear on the wire.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    pub name: String,
    /// `Some("destructor")` for a request that destroys its object.
    pub kind: Option<String>,
    pub args: Vec<ArgTemplate>,
    /// The request/event's `<description>` text, trimmed, if present.
    pub description: Option<String>,
}

impl MessageTemplate {
    /// The bare wire shape of each argument, for use with
    /// `waylink_core::transport::BufferedSocket::recv_message`.
    pub fn signature(&self) -> Vec<ArgType> {
        self.args.iter().map(|a| a.arg_type.wire_type()).collect()
    }

    pub fn is_destructor(&self) -> bool {
        self.kind.as_deref() == Some("destructor")
    }
}

/// One `<arg>`. This is strictly richer than [`waylink_core::ArgType`]: it
/// additionally knows which interface a `new_id`/`object` is pinned to and
/// whether `null` is an acceptable value, policy that the wire layer
/// itself has no business enforcing.
#[derive(Debug, Clone)]
pub struct ArgTemplate {
    pub name: String,
    pub arg_type: ArgKind,
}

#[derive(Debug, Clone)]
pub enum ArgKind {
    Int,
    Uint,
    /// An `int` or `uint` argument that additionally names an `<enum>` via
    /// the `enum="..."` attribute. `is_uint` preserves which of the two it
    /// was, since `enum=` never changes the wire representation but does
    /// change which `ArgValue` variant (and thus which of `ArgType::Int`/
    /// `ArgType::Uint`) a decoder should produce.
    Enum { name: String, is_uint: bool },
    Fixed,
    String { allow_null: bool },
    Object { allow_null: bool, iface: Option<String> },
    NewId { iface: Option<String> },
    AnyNewId,
    Array,
    Fd,
}

impl ArgKind {
    pub fn wire_type(&self) -> ArgType {
        match self {
            Self::Int => ArgType::Int,
            Self::Enum { is_uint, .. } => {
                if *is_uint {
                    ArgType::Uint
                } else {
                    ArgType::Int
                }
            }
            Self::Uint => ArgType::Uint,
            Self::Fixed => ArgType::Fixed,
            Self::String { .. } => ArgType::String,
            Self::Object { .. } => ArgType::Object,
            Self::NewId { iface: Some(_) } => ArgType::NewId,
            Self::NewId { iface: None } | Self::AnyNewId => ArgType::AnyNewId,
            Self::Array => ArgType::Array,
            Self::Fd => ArgType::Fd,
        }
    }
}

/// A parsed `<enum>`. Kept as name -> value pairs; the client does not
/// synthesize a Rust type per enum (there is nothing to synthesize at run
/// time), but exposes these maps so callers can decode or validate enum
/// arguments if they want to.
#[derive(Debug, Clone)]
pub struct EnumTemplate {
    pub name: String,
    pub is_bitfield: bool,
    pub items: Vec<(String, u32)>,
}

impl EnumTemplate {
    pub fn value_of(&self, item: &str) -> Option<u32> {
        self.items.iter().find(|(n, _)| n == item).map(|(_, v)| *v)
    }
}
