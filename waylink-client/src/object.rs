//! Live objects and their event handlers.
//!
//! A [`LiveObject`] pairs an allocated [`ObjectId`] with the
//! [`InterfaceTemplate`] it was bound to, plus the handlers registered for
//! its events. Unlike a generated proxy type, nothing here is
//! interface-specific at compile time: dispatch looks up a message's
//! schema through the template, not through a `&'static` table baked in
//! by a macro.

use std::fmt;
use std::rc::Rc;

use waylink_core::{ArgValue, Message, ObjectId};

use crate::protocol::InterfaceTemplate;

/// A token identifying a previously registered event handler, returned by
/// [`LiveObject::add_handler`] so it can later be passed to
/// [`LiveObject::remove_handler`].
///
/// Closures aren't `PartialEq`, so there is no way to ask "is this the
/// handler I added" except by comparing a token handed out at
/// registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type EventHandler = Box<dyn FnMut(ObjectId, &Message, &InterfaceTemplate)>;

struct Handler {
    id: HandlerId,
    callback: EventHandler,
}

/// A client-side handle to a live Wayland object.
pub struct LiveObject {
    pub id: ObjectId,
    pub interface: Rc<InterfaceTemplate>,
    pub version: u32,
    alive: bool,
    handlers: Vec<Handler>,
    next_handler_id: u64,
}

impl fmt::Debug for LiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}v{}", self.interface.name, self.id, self.version)
    }
}

impl LiveObject {
    pub(crate) fn new(id: ObjectId, interface: Rc<InterfaceTemplate>, version: u32) -> Self {
        Self {
            id,
            interface,
            version,
            alive: true,
            handlers: Vec::new(),
            next_handler_id: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Registers an event handler, returning a token that can be used to
    /// remove it later. Multiple handlers may be registered on the same
    /// object; all of them are invoked, synchronously, in registration
    /// order, for every event. A handler that doesn't care about a
    /// particular event simply ignores it.
    pub fn add_handler(&mut self, callback: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers.push(Handler { id, callback });
        id
    }

    /// Removes a previously registered handler. Returns `false` if `id`
    /// does not (or no longer) refers to a registered handler.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id != id);
        self.handlers.len() != before
    }

    /// Invokes every registered handler with `event`, in registration
    /// order. A handler that never installed any listeners sees no calls;
    /// a handler that panics unwinds out of dispatch; handlers are
    /// trusted application code, not untrusted input.
    pub(crate) fn dispatch(&mut self, event: &Message) {
        for handler in &mut self.handlers {
            (handler.callback)(self.id, event, &self.interface);
        }
    }
}

/// Reads the argument at `index` out of a decoded event as an object id,
/// or `None` if it is null or out of range. A small convenience used by
/// the display/registry bootstrap and by hand-written handlers.
pub fn arg_as_object(event: &Message, index: usize) -> Option<ObjectId> {
    match event.args.get(index) {
        Some(ArgValue::Object(id)) => *id,
        Some(ArgValue::NewId(id)) => Some(*id),
        _ => None,
    }
}

pub fn arg_as_uint(event: &Message, index: usize) -> Option<u32> {
    match event.args.get(index) {
        Some(ArgValue::Uint(v)) => Some(*v),
        _ => None,
    }
}

pub fn arg_as_string(event: &Message, index: usize) -> Option<&std::ffi::CStr> {
    match event.args.get(index) {
        Some(ArgValue::String(s)) => Some(s.as_c_str()),
        _ => None,
    }
}
