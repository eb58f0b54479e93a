//! Recursive-descent parser over a `<protocol>` XML document.
//!
//! Unlike a build-time code generator, a malformed document here is not a
//! developer mistake caught at `cargo build`: it's data a caller handed
//! us at run time, possibly from an untrusted or just-misconfigured
//! source. Every failure is therefore a [`ProtocolError`], never a panic:
//! a broken protocol file must not be able to take down a connection that
//! is otherwise healthy.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ProtocolError;
use crate::protocol::types::{
    ArgKind, ArgTemplate, EnumTemplate, InterfaceTemplate, MessageTemplate, ProtocolTemplate,
};

pub fn parse(xml: &str) -> Result<ProtocolTemplate, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut p = Parser { reader };
    p.parse_document()
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

fn malformed(offset: usize, message: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedXml {
        offset,
        message: message.into(),
    }
}

fn attr_str(tag: &BytesStart<'_>, name: &str, offset: usize) -> Result<Option<String>, ProtocolError> {
    match tag
        .try_get_attribute(name)
        .map_err(|e| malformed(offset, e.to_string()))?
    {
        Some(attr) => Ok(Some(
            attr.unescape_value()
                .map_err(|e| malformed(offset, e.to_string()))?
                .into_owned(),
        )),
        None => Ok(None),
    }
}

fn require_attr(tag: &BytesStart<'_>, name: &str, offset: usize) -> Result<String, ProtocolError> {
    attr_str(tag, name, offset)?.ok_or_else(|| malformed(offset, format!("missing `{name}` attribute")))
}

impl<'a> Parser<'a> {
    fn offset(&self) -> usize {
        self.reader.buffer_position() as usize
    }

    fn next_event(&mut self) -> Result<Event<'a>, ProtocolError> {
        self.reader
            .read_event()
            .map_err(|e| malformed(self.offset(), e.to_string()))
    }

    fn parse_document(&mut self) -> Result<ProtocolTemplate, ProtocolError> {
        loop {
            match self.next_event()? {
                Event::Eof => return Err(malformed(self.offset(), "unexpected end of file, expected <protocol>")),
                Event::Start(start) if start.name().as_ref() == b"protocol" => {
                    return self.parse_protocol(&start)
                }
                Event::Start(start) => {
                    return Err(malformed(
                        self.offset(),
                        format!("unexpected top-level tag `{}`", tag_name(&start)),
                    ))
                }
                _ => continue,
            }
        }
    }

    fn parse_protocol(&mut self, tag: &BytesStart<'a>) -> Result<ProtocolTemplate, ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let mut interfaces = Vec::new();

        loop {
            match self.next_event()? {
                Event::Eof => return Err(malformed(self.offset(), "unexpected EOF inside <protocol>")),
                Event::End(end) if end.name() == tag.name() => break,
                Event::Start(start) if start.name().as_ref() == b"interface" => {
                    interfaces.push(self.parse_interface(&start)?);
                }
                Event::Start(start) if start.name().as_ref() == b"description" => {
                    self.parse_description(&start)?;
                }
                Event::Start(start) if start.name().as_ref() == b"copyright" => {
                    self.skip_to_end(&start)?;
                }
                Event::Start(start) => {
                    return Err(malformed(
                        self.offset(),
                        format!("unexpected tag `{}` inside <protocol>", tag_name(&start)),
                    ))
                }
                _ => continue,
            }
        }

        if interfaces.is_empty() {
            return Err(ProtocolError::Schema {
                interface: name.clone(),
                message: "protocol declares no interfaces".into(),
            });
        }

        Ok(ProtocolTemplate { name, interfaces })
    }

    fn parse_interface(&mut self, tag: &BytesStart<'a>) -> Result<InterfaceTemplate, ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let version: u32 = require_attr(tag, "version", offset)?
            .parse()
            .map_err(|_| malformed(offset, format!("interface `{name}` has a non-numeric version")))?;

        let mut requests = Vec::new();
        let mut events = Vec::new();
        let mut enums = HashMap::new();
        let mut description = None;

        loop {
            match self.next_event()? {
                Event::Eof => {
                    return Err(malformed(self.offset(), format!("unexpected EOF inside interface `{name}`")))
                }
                Event::End(end) if end.name() == tag.name() => break,
                Event::Start(start) if start.name().as_ref() == b"request" => {
                    requests.push(self.parse_message(&start, &name)?);
                }
                Event::Start(start) if start.name().as_ref() == b"event" => {
                    events.push(self.parse_message(&start, &name)?);
                }
                Event::Start(start) if start.name().as_ref() == b"enum" => {
                    let e = self.parse_enum(&start)?;
                    enums.insert(e.name.clone(), e);
                }
                Event::Empty(empty) if empty.name().as_ref() == b"enum" => {
                    let e = self.parse_enum_empty(&empty)?;
                    enums.insert(e.name.clone(), e);
                }
                Event::Start(start) if start.name().as_ref() == b"description" => {
                    description = self.parse_description(&start)?;
                }
                Event::Empty(_) => continue,
                Event::Start(start) => {
                    return Err(malformed(
                        self.offset(),
                        format!("unexpected tag `{}` inside interface `{name}`", tag_name(&start)),
                    ))
                }
                _ => continue,
            }
        }

        Ok(InterfaceTemplate {
            name,
            version,
            requests,
            events,
            enums,
            description,
        })
    }

    fn parse_message(&mut self, tag: &BytesStart<'a>, interface: &str) -> Result<MessageTemplate, ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let kind = attr_str(tag, "type", offset)?;
        let mut args = Vec::new();
        let mut description = None;

        loop {
            match self.next_event()? {
                Event::Eof => {
                    return Err(malformed(
                        self.offset(),
                        format!("unexpected EOF inside `{interface}`.`{name}`"),
                    ))
                }
                Event::End(end) if end.name() == tag.name() => break,
                Event::Empty(empty) if empty.name().as_ref() == b"arg" => {
                    args.push(self.parse_arg(&empty, interface, &name)?);
                }
                Event::Start(start) if start.name().as_ref() == b"description" => {
                    description = self.parse_description(&start)?;
                }
                Event::Empty(_) => continue,
                Event::Start(start) => {
                    return Err(malformed(
                        self.offset(),
                        format!("unexpected tag `{}` inside `{interface}`.`{name}`", tag_name(&start)),
                    ))
                }
                _ => continue,
            }
        }

        Ok(MessageTemplate { name, kind, args, description })
    }

    fn parse_arg(
        &mut self,
        tag: &BytesStart<'a>,
        interface: &str,
        message: &str,
    ) -> Result<ArgTemplate, ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let ty = require_attr(tag, "type", offset)?;
        let allow_null = attr_str(tag, "allow-null", offset)?.as_deref() == Some("true");
        let iface = attr_str(tag, "interface", offset)?;
        let enum_name = attr_str(tag, "enum", offset)?;

        let arg_type = match ty.as_str() {
            "int" => ArgKind::Int,
            "uint" => ArgKind::Uint,
            "fixed" => ArgKind::Fixed,
            "string" => ArgKind::String { allow_null },
            "array" => ArgKind::Array,
            "fd" => ArgKind::Fd,
            "object" => ArgKind::Object { allow_null, iface },
            "new_id" if iface.is_some() => ArgKind::NewId { iface },
            "new_id" => ArgKind::AnyNewId,
            other => {
                return Err(ProtocolError::Schema {
                    interface: interface.to_string(),
                    message: format!("`{message}`.`{name}` has unknown argument type `{other}`"),
                })
            }
        };

        let arg_type = match (arg_type, enum_name) {
            (ArgKind::Int, Some(name)) => ArgKind::Enum { name, is_uint: false },
            (ArgKind::Uint, Some(name)) => ArgKind::Enum { name, is_uint: true },
            (other, _) => other,
        };

        Ok(ArgTemplate { name, arg_type })
    }

    fn parse_enum(&mut self, tag: &BytesStart<'a>) -> Result<EnumTemplate, ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let is_bitfield = attr_str(tag, "bitfield", offset)?.as_deref() == Some("true");
        let mut items = Vec::new();

        loop {
            match self.next_event()? {
                Event::Eof => return Err(malformed(self.offset(), format!("unexpected EOF inside enum `{name}`"))),
                Event::End(end) if end.name() == tag.name() => break,
                Event::Empty(empty) if empty.name().as_ref() == b"entry" => {
                    items.push(self.parse_entry(&empty)?);
                }
                Event::Start(start) if start.name().as_ref() == b"entry" => {
                    let entry = self.parse_entry(&start)?;
                    self.skip_to_end(&start)?;
                    items.push(entry);
                }
                Event::Start(start) if start.name().as_ref() == b"description" => {
                    self.skip_to_end(&start)?;
                }
                _ => continue,
            }
        }

        // Per the schema, entries are kept sorted ascending by value rather
        // than in declaration order.
        items.sort_by_key(|(_, v)| *v);

        Ok(EnumTemplate {
            name,
            is_bitfield,
            items,
        })
    }

    fn parse_enum_empty(&mut self, tag: &BytesStart<'a>) -> Result<EnumTemplate, ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let is_bitfield = attr_str(tag, "bitfield", offset)?.as_deref() == Some("true");
        // A self-closing `<enum/>` never carries entries, so there is
        // nothing to sort; kept as a `Vec` (not sorted again) for
        // consistency with `parse_enum`.
        Ok(EnumTemplate {
            name,
            is_bitfield,
            items: Vec::new(),
        })
    }

    fn parse_entry(&mut self, tag: &BytesStart<'a>) -> Result<(String, u32), ProtocolError> {
        let offset = self.offset();
        let name = require_attr(tag, "name", offset)?;
        let raw = require_attr(tag, "value", offset)?;
        let value = if let Some(hex) = raw.strip_prefix("0x") {
            u32::from_str_radix(hex, 16)
        } else {
            raw.parse()
        }
        .map_err(|_| malformed(offset, format!("enum entry `{name}` has a non-numeric value `{raw}`")))?;
        Ok((name, value))
    }

    /// Reads a `<description>` element's text content, trimmed, discarding
    /// its `summary` attribute (callers that want a one-line summary read
    /// it straight off the owning `<arg>`/`<interface>` tag instead).
    fn parse_description(&mut self, tag: &BytesStart<'a>) -> Result<Option<String>, ProtocolError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Eof => return Err(malformed(self.offset(), "unexpected EOF inside <description>")),
                Event::End(end) if end.name() == tag.name() => break,
                Event::Text(t) => {
                    text.push_str(&t.unescape().map_err(|e| malformed(self.offset(), e.to_string()))?);
                }
                _ => continue,
            }
        }
        let trimmed = text.trim();
        Ok(if trimmed.is_empty() { None } else { Some(trimmed.to_string()) })
    }

    /// Skips everything up to and including the matching end tag of
    /// `tag`, discarding nested content (used for `<description>` and
    /// `<copyright>`, whose text we have no use for).
    fn skip_to_end(&mut self, tag: &BytesStart<'a>) -> Result<(), ProtocolError> {
        let mut depth = 0usize;
        loop {
            match self.next_event()? {
                Event::Eof => return Err(malformed(self.offset(), "unexpected EOF while skipping a tag")),
                Event::Start(start) if start.name() == tag.name() => depth += 1,
                Event::End(end) if end.name() == tag.name() => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                _ => continue,
            }
        }
    }
}

fn tag_name(tag: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WL_DISPLAY_FRAGMENT: &str = r#"
<protocol name="wayland">
  <interface name="wl_display" version="1">
    <request name="sync">
      <arg name="callback" type="new_id" interface="wl_callback"/>
    </request>
    <request name="get_registry">
      <arg name="registry" type="new_id" interface="wl_registry"/>
    </request>
    <event name="error">
      <arg name="object_id" type="object"/>
      <arg name="code" type="uint"/>
      <arg name="message" type="string"/>
    </event>
    <event name="delete_id">
      <arg name="id" type="uint"/>
    </event>
  </interface>
  <interface name="wl_registry" version="1">
    <request name="bind">
      <arg name="name" type="uint"/>
      <arg name="id" type="new_id"/>
    </request>
    <event name="global">
      <arg name="name" type="uint"/>
      <arg name="interface" type="string"/>
      <arg name="version" type="uint"/>
    </event>
    <event name="global_remove">
      <arg name="name" type="uint"/>
    </event>
  </interface>
</protocol>
"#;

    #[test]
    fn parses_display_and_registry() {
        let proto = parse(WL_DISPLAY_FRAGMENT).unwrap();
        assert_eq!(proto.name, "wayland");
        let display = proto.interface("wl_display").unwrap();
        assert_eq!(display.version, 1);
        assert_eq!(display.request(0).unwrap().name, "sync");
        assert_eq!(display.request(1).unwrap().name, "get_registry");
        assert_eq!(display.event(0).unwrap().name, "error");
        assert_eq!(display.event(1).unwrap().name, "delete_id");

        let registry = proto.interface("wl_registry").unwrap();
        let (opcode, bind) = registry.request_named("bind").unwrap();
        assert_eq!(opcode, 0);
        assert_eq!(bind.args.len(), 2);
    }

    #[test]
    fn generic_new_id_has_no_pinned_interface() {
        let proto = parse(WL_DISPLAY_FRAGMENT).unwrap();
        let registry = proto.interface("wl_registry").unwrap();
        let (_, bind) = registry.request_named("bind").unwrap();
        assert!(matches!(bind.args[1].arg_type, ArgKind::AnyNewId));
    }

    #[test]
    fn uint_enum_arg_keeps_uint_wire_type() {
        let xml = r#"<protocol name="x">
          <interface name="wl_pointer" version="1">
            <enum name="axis">
              <entry name="vertical_scroll" value="0"/>
            </enum>
            <event name="axis">
              <arg name="axis" type="uint" enum="axis"/>
            </event>
          </interface>
        </protocol>"#;
        let proto = parse(xml).unwrap();
        let iface = proto.interface("wl_pointer").unwrap();
        let axis_event = iface.event(0).unwrap();
        match &axis_event.args[0].arg_type {
            ArgKind::Enum { name, is_uint } => {
                assert_eq!(name, "axis");
                assert!(is_uint);
            }
            other => panic!("expected Enum, got {other:?}"),
        }
        assert_eq!(axis_event.args[0].arg_type.wire_type(), waylink_core::ArgType::Uint);
    }

    #[test]
    fn enum_entries_are_sorted_ascending_by_value_not_declaration_order() {
        let xml = r#"<protocol name="x">
          <interface name="wl_output" version="1">
            <enum name="transform">
              <entry name="flipped_180" value="6"/>
              <entry name="normal" value="0"/>
              <entry name="90" value="1"/>
              <entry name="flipped" value="4"/>
            </enum>
          </interface>
        </protocol>"#;
        let proto = parse(xml).unwrap();
        let iface = proto.interface("wl_output").unwrap();
        let values: Vec<u32> = iface.enums["transform"].items.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 1, 4, 6]);
    }

    #[test]
    fn rejects_malformed_xml_without_panicking() {
        let err = parse("<protocol name=\"x\"><interface name=\"y\"></protocol>");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_missing_name_attribute() {
        let err = parse("<protocol><interface name=\"y\" version=\"1\"></interface></protocol>");
        assert!(matches!(err, Err(ProtocolError::MalformedXml { .. })));
    }

    #[test]
    fn rejects_unknown_argument_type() {
        let xml = r#"<protocol name="x">
          <interface name="y" version="1">
            <request name="r"><arg name="a" type="bogus"/></request>
          </interface>
        </protocol>"#;
        assert!(matches!(parse(xml), Err(ProtocolError::Schema { .. })));
    }
}
