//! Run-time loading of Wayland protocol descriptions.
//!
//! Everything downstream of this module (the object registry, request
//! marshalling, event dispatch) works against [`ProtocolTemplate`] data
//! rather than a fixed, compiled-in set of interfaces. Loading a new
//! protocol at run time (from a vendor's XML, say) needs nothing more
//! than handing its text to [`parse`].

mod parser;
mod types;

pub use parser::parse;
pub use types::{ArgKind, ArgTemplate, EnumTemplate, InterfaceTemplate, MessageTemplate, ProtocolTemplate};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::ProtocolError;

/// A set of loaded protocols, indexed by interface name. Interfaces across
/// different protocol files share one namespace, same as upstream Wayland:
/// the base `wayland.xml` defines `wl_display`/`wl_registry`/etc, and
/// extension protocols add their own without redeclaring them.
#[derive(Debug, Default)]
pub struct ProtocolSet {
    interfaces: HashMap<String, InterfaceTemplate>,
    protocol_names: Vec<String>,
}

impl ProtocolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `xml` and merges its interfaces into this set.
    pub fn load_str(&mut self, xml: &str) -> Result<(), ProtocolError> {
        let proto = parse(xml)?;
        for iface in proto.interfaces {
            self.interfaces.insert(iface.name.clone(), iface);
        }
        self.protocol_names.push(proto.name);
        Ok(())
    }

    /// Reads and parses the XML file at `path` and merges its interfaces
    /// into this set.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), ProtocolError> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .map_err(|_| ProtocolError::NotFound(path.display().to_string()))?;
        self.load_str(&xml)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceTemplate> {
        self.interfaces.get(name)
    }

    pub fn protocol_names(&self) -> &[String] {
        &self.protocol_names
    }
}
