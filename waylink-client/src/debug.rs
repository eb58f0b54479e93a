//! Wire tracing, gated by the `WAYLAND_DEBUG` environment variable.
//!
//! Set `WAYLAND_DEBUG=1` to have every outgoing request and incoming event
//! logged at `trace` level through the [`log`] crate, in the same
//! `interface@id.message(args)` shape `WAYLAND_DEBUG=1` produces for the
//! reference client.

use std::fmt::{self, Write as _};

use waylink_core::{ArgValue, Message, ObjectId};

use crate::protocol::{ArgKind, InterfaceTemplate, MessageTemplate};

pub(crate) fn wire_debug_enabled() -> bool {
    std::env::var_os("WAYLAND_DEBUG").is_some()
}

pub(crate) fn trace_message(
    is_event: bool,
    object_id: ObjectId,
    interface: &InterfaceTemplate,
    template: &MessageTemplate,
    message: &Message,
) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    log::trace!(
        "{} {}",
        if is_event { "->" } else { "<-" },
        Formatted {
            object_id,
            interface,
            template,
            message,
        }
    );
}

struct Formatted<'a> {
    object_id: ObjectId,
    interface: &'a InterfaceTemplate,
    template: &'a MessageTemplate,
    message: &'a Message,
}

impl fmt::Display for Formatted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}.{}(", self.interface.name, self.object_id, self.template.name)?;
        for (i, (arg, schema)) in self.message.args.iter().zip(&self.template.args).enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write_arg(f, arg, &schema.arg_type)?;
        }
        f.write_char(')')
    }
}

fn write_arg(f: &mut fmt::Formatter<'_>, arg: &ArgValue, kind: &ArgKind) -> fmt::Result {
    match arg {
        ArgValue::Int(x) => write!(f, "{x}"),
        ArgValue::Uint(x) => write!(f, "{x}"),
        ArgValue::Fixed(x) => write!(f, "{}", x.as_f64()),
        ArgValue::Object(Some(id)) => write!(f, "{id}"),
        ArgValue::Object(None) => f.write_str("null"),
        ArgValue::NewId(id) => {
            let iface = match kind {
                ArgKind::NewId { iface: Some(i) } => i.as_str(),
                _ => "?",
            };
            write!(f, "new id {iface}@{id}")
        }
        ArgValue::AnyNewId(iface, version, id) => {
            write!(f, "new id {}@{id}v{version}", iface.to_string_lossy())
        }
        ArgValue::String(s) => write!(f, "{:?}", s.to_string_lossy()),
        ArgValue::Array(a) => write!(f, "<array[{}]>", a.len()),
        ArgValue::Fd(fd) => write!(f, "fd {}", std::os::fd::AsRawFd::as_raw_fd(fd)),
    }
}
