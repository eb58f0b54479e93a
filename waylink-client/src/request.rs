//! Marshalling a request into a wire [`Message`].
//!
//! A request is identified by name rather than a compiled-in opcode,
//! since nothing about an interface is known until its protocol XML has
//! been loaded. [`marshal`] resolves the name against the object's
//! [`InterfaceTemplate`], checks the caller supplied exactly the
//! arguments the schema calls for, and produces a ready-to-send
//! [`Message`].

use waylink_core::{ArgValue, Message, MessageHeader, ObjectId};

use crate::error::ClientError;
use crate::object::LiveObject;
use crate::protocol::ArgKind;

/// Builds the wire message for sending `request_name` to `object`,
/// carrying `args` in declared order.
///
/// # Errors
///
/// Returns [`ClientError::UnknownMessage`] if `object`'s interface has no
/// request by that name, and [`ClientError::ArgumentArity`] if the number
/// of supplied arguments doesn't match the schema. Argument *types* are
/// trusted to match what the caller read from the schema; this function
/// does not re-validate `Int` vs `Uint` vs `Fixed`, since [`ArgValue`]
/// already carries that distinction and a mismatch would be a caller bug,
/// not a wire-level concern.
pub fn marshal(object: &LiveObject, request_name: &str, args: Vec<ArgValue>) -> Result<Message, ClientError> {
    let (opcode, template) =
        object
            .interface
            .request_named(request_name)
            .ok_or_else(|| ClientError::UnknownMessage {
                interface: object.interface.name.clone(),
                kind: "request",
                name: request_name.to_string(),
            })?;

    if template.args.len() != args.len() {
        return Err(ClientError::ArgumentArity {
            interface: object.interface.name.clone(),
            message: request_name.to_string(),
            expected: template.args.len(),
            got: args.len(),
        });
    }

    for (schema, value) in template.args.iter().zip(&args) {
        if schema.arg_type.wire_type() != value.arg_type() {
            return Err(ClientError::ArgumentArity {
                interface: object.interface.name.clone(),
                message: request_name.to_string(),
                expected: template.args.len(),
                got: args.len(),
            });
        }
        let is_null = matches!(value, ArgValue::Object(None));
        let allows_null = matches!(schema.arg_type, ArgKind::Object { allow_null: true, .. });
        if is_null && !allows_null {
            return Err(ClientError::ArgumentArity {
                interface: object.interface.name.clone(),
                message: request_name.to_string(),
                expected: template.args.len(),
                got: args.len(),
            });
        }
    }

    let size = waylink_core::MessageHeader::SIZE + args.iter().map(ArgValue::wire_size).sum::<usize>();

    Ok(Message {
        header: MessageHeader {
            object_id: object.id,
            size: size as u16,
            opcode,
        },
        args,
    })
}

/// Builds a `new_id`-producing request: identical to [`marshal`] but
/// returns the freshly allocated id alongside the message, since the
/// caller must both send the message and hand the id to whatever type
/// represents the new object.
pub fn marshal_with_new_id(
    object: &LiveObject,
    request_name: &str,
    new_id: ObjectId,
    mut args_before_new_id: Vec<ArgValue>,
    args_after_new_id: Vec<ArgValue>,
) -> Result<Message, ClientError> {
    args_before_new_id.push(ArgValue::NewId(new_id));
    args_before_new_id.extend(args_after_new_id);
    marshal(object, request_name, args_before_new_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InterfaceTemplate, MessageTemplate};
    use std::collections::HashMap;
    use std::rc::Rc;

    fn iface_with_sync() -> Rc<InterfaceTemplate> {
        Rc::new(InterfaceTemplate {
            name: "wl_display".into(),
            version: 1,
            requests: vec![MessageTemplate {
                name: "sync".into(),
                kind: None,
                args: vec![crate::protocol::ArgTemplate {
                    name: "callback".into(),
                    arg_type: ArgKind::NewId { iface: Some("wl_callback".into()) },
                }],
                description: None,
            }],
            events: vec![],
            enums: HashMap::new(),
            description: None,
        })
    }

    #[test]
    fn rejects_unknown_request_name() {
        let obj = LiveObject::new(waylink_core::ObjectId::DISPLAY, iface_with_sync(), 1);
        let err = marshal(&obj, "bogus", vec![]);
        assert!(matches!(err, Err(ClientError::UnknownMessage { .. })));
    }

    #[test]
    fn rejects_wrong_arity() {
        let obj = LiveObject::new(waylink_core::ObjectId::DISPLAY, iface_with_sync(), 1);
        let err = marshal(&obj, "sync", vec![]);
        assert!(matches!(err, Err(ClientError::ArgumentArity { .. })));
    }

    #[test]
    fn builds_correct_header() {
        let obj = LiveObject::new(waylink_core::ObjectId::DISPLAY, iface_with_sync(), 1);
        let cb_id = ObjectId::MAX_CLIENT;
        let msg = marshal(&obj, "sync", vec![ArgValue::NewId(cb_id)]).unwrap();
        assert_eq!(msg.header.object_id, waylink_core::ObjectId::DISPLAY);
        assert_eq!(msg.header.opcode, 0);
        assert_eq!(msg.header.size as usize, waylink_core::MessageHeader::SIZE + 4);
    }
}
