//! Event demultiplexing: matching an incoming frame's object id and opcode
//! back to a schema and a destination object.
//!
//! None of this is generated per-interface. Every event is routed through
//! the same path: look up the live object by id, look up its event
//! schema by opcode in its [`InterfaceTemplate`], decode the arguments
//! against that schema, then hand the event to whatever owns the object.

use waylink_core::{ArgValue, Message, MessageHeader, ObjectId};

use crate::error::ClientError;
use crate::object::LiveObject;
use crate::protocol::{ArgKind, InterfaceTemplate, MessageTemplate};
use crate::registry::ObjectRegistry;

/// What to do with a just-received, fully-decoded event.
pub(crate) enum Routed<'a> {
    /// `wl_display.error`: a fatal protocol error reported by the
    /// compositor.
    DisplayError { object_id: u32, code: u32, message: String },
    /// `wl_display.delete_id`: the named id may now be recycled.
    DeleteId(ObjectId),
    /// A `wl_registry.global` / `wl_registry.global_remove` event. Kept
    /// distinct from `Plain` since the display/registry bootstrap handles
    /// these directly rather than going through the generic object
    /// handler table.
    RegistryGlobal { name: u32, interface: String, version: u32 },
    RegistryGlobalRemove { name: u32 },
    /// Any other event: resolved against `object`'s schema, destined for
    /// its handler table.
    Plain { template: &'a MessageTemplate },
}

/// Resolves `header`'s opcode against `interface`'s event table.
///
/// Returns [`ClientError::Desync`] if the opcode is out of range, which
/// can only mean the connection has gone out of sync with the
/// compositor (a previous message was mis-sized), not that the event is
/// merely unrecognized.
pub(crate) fn resolve_event<'a>(
    interface: &'a InterfaceTemplate,
    header: &MessageHeader,
) -> Result<&'a MessageTemplate, ClientError> {
    interface.event(header.opcode).ok_or_else(|| {
        ClientError::Desync(format!(
            "{} has no event with opcode {}, connection is desynchronized",
            interface.name, header.opcode
        ))
    })
}

/// Classifies a decoded event and, for `new_id` arguments addressed to an
/// interface named in the schema, registers the new server object in
/// `registry` before the event reaches any handler.
pub(crate) fn route<'a>(
    registry: &mut ObjectRegistry,
    protocols: &crate::protocol::ProtocolSet,
    display_id: ObjectId,
    registry_id: ObjectId,
    interface: &'a InterfaceTemplate,
    template: &'a MessageTemplate,
    event: &Message,
) -> Result<Routed<'a>, ClientError> {
    if event.header.object_id == display_id {
        match template.name.as_str() {
            "error" => {
                let object_id = match event.args.first() {
                    Some(ArgValue::Object(Some(id))) => id.as_u32(),
                    _ => 0,
                };
                let code = match event.args.get(1) {
                    Some(ArgValue::Uint(c)) => *c,
                    _ => 0,
                };
                let message = match event.args.get(2) {
                    Some(ArgValue::String(s)) => s.to_string_lossy().into_owned(),
                    _ => String::new(),
                };
                return Ok(Routed::DisplayError { object_id, code, message });
            }
            "delete_id" => {
                let id = match event.args.first() {
                    Some(ArgValue::Uint(v)) => *v,
                    _ => 0,
                };
                let id = std::num::NonZeroU32::new(id)
                    .map(ObjectId)
                    .ok_or_else(|| ClientError::Desync("delete_id with null id".into()))?;
                return Ok(Routed::DeleteId(id));
            }
            _ => {}
        }
    }

    if event.header.object_id == registry_id {
        match template.name.as_str() {
            "global" => {
                let name = match event.args.first() {
                    Some(ArgValue::Uint(v)) => *v,
                    _ => 0,
                };
                let interface = match event.args.get(1) {
                    Some(ArgValue::String(s)) => s.to_string_lossy().into_owned(),
                    _ => String::new(),
                };
                let version = match event.args.get(2) {
                    Some(ArgValue::Uint(v)) => *v,
                    _ => 0,
                };
                return Ok(Routed::RegistryGlobal { name, interface, version });
            }
            "global_remove" => {
                let name = match event.args.first() {
                    Some(ArgValue::Uint(v)) => *v,
                    _ => 0,
                };
                return Ok(Routed::RegistryGlobalRemove { name });
            }
            _ => {}
        }
    }

    for (arg, schema) in event.args.iter().zip(&template.args) {
        if let (ArgValue::NewId(id), ArgKind::NewId { iface: Some(iface_name) }) = (arg, &schema.arg_type) {
            if let Some(child_iface) = protocols.interface(iface_name) {
                registry.register_server_object(*id, std::rc::Rc::new(child_iface.clone()), child_iface.version);
            }
        }
    }

    Ok(Routed::Plain { template })
}

pub(crate) fn deliver(object: &mut LiveObject, event: &Message, is_destructor: bool) {
    object.dispatch(event);
    if is_destructor {
        object.mark_dead();
    }
}
