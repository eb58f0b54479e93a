//! The client entry point: connects to a compositor, bootstraps
//! `wl_display`/`wl_registry`, and dispatches events.

use std::collections::VecDeque;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use waylink_core::transport::{PeekHeaderError, RecvMessageError};
use waylink_core::{ArgValue, IoMode, Message, ObjectId};

use crate::connection::{self, Socket};
use crate::debug;
use crate::dispatch::{self, Routed};
use crate::error::{ClientError, ConnectError};
use crate::object::{EventHandler, HandlerId};
use crate::protocol::ProtocolSet;
use crate::registry::{GlobalEntry, ObjectRegistry};
use crate::request;

/// How long [`Client::sync`] waits for the compositor to answer before
/// giving up. A healthy compositor answers `wl_display.sync` within a
/// handful of milliseconds; five seconds is generous enough to absorb a
/// loaded system without leaving a caller blocked forever on a wedged
/// connection.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected Wayland client.
///
/// Owns the socket, the live-object registry, and every protocol schema
/// loaded into it. Nothing about a specific interface is known until its
/// XML has been handed to [`Client::connect`] (or merged in afterwards via
/// direct access to a caller-built [`ProtocolSet`]); `wl_display` and
/// `wl_registry` are the only two interfaces this client treats
/// specially, and only because the protocol itself singles them out as
/// the bootstrap path.
pub struct Client {
    socket: Socket,
    registry: ObjectRegistry,
    protocols: ProtocolSet,
    registry_id: ObjectId,
    outgoing: VecDeque<Message>,
    pending_events: VecDeque<Message>,
    debug: bool,
    /// Set once a [`ClientError::ServerError`] or [`ClientError::Desync`]
    /// has been observed. Per the protocol, both are terminal for the
    /// connection: the wire state can no longer be trusted, so every
    /// public entry point that would touch the socket refuses instead of
    /// pretending the connection still works.
    fatal: bool,
}

impl AsRawFd for Client {
    /// The underlying socket's file descriptor, for an external reactor
    /// (epoll, a `tokio::io::unix::AsyncFd`, a GLib main loop source...)
    /// to poll for readability. This crate runs no I/O of its own accord;
    /// callers decide when [`Client::recv_events`] and [`Client::flush`]
    /// run.
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl Client {
    /// Connects to the compositor named by `$WAYLAND_DISPLAY` (resolved
    /// against `$XDG_RUNTIME_DIR` if relative), loading `protocol_paths` as
    /// the set of protocol descriptions available to this connection, and
    /// performs the `wl_display`/`wl_registry` handshake. One of
    /// `protocol_paths` must describe the base `wayland` protocol (at
    /// least `wl_display`, `wl_registry` and `wl_callback`); additional
    /// paths may name vendor protocol extensions the caller wants to speak
    /// alongside it.
    pub fn connect<P: AsRef<Path>>(protocol_paths: &[P]) -> Result<Self, ConnectError> {
        let mut protocols = ProtocolSet::new();
        for path in protocol_paths {
            protocols.load_file(path)?;
        }
        Self::connect_with_protocols(protocols)
    }

    /// As [`Client::connect`], but takes the base protocol's XML text
    /// directly rather than a filesystem path. Useful for embedding a
    /// fixed copy of `wayland.xml` in a binary, or in tests that build a
    /// protocol fragment in-memory.
    pub fn connect_with_xml(base_protocol_xml: &str) -> Result<Self, ConnectError> {
        let mut protocols = ProtocolSet::new();
        protocols.load_str(base_protocol_xml)?;
        Self::connect_with_protocols(protocols)
    }

    /// As [`Client::connect`], but takes a [`ProtocolSet`] the caller has
    /// already assembled (e.g. from several XML files merged together).
    pub fn connect_with_protocols(protocols: ProtocolSet) -> Result<Self, ConnectError> {
        let display_interface = protocols
            .interface("wl_display")
            .ok_or_else(|| ConnectError::Protocol(crate::error::ProtocolError::Schema {
                interface: "wl_display".into(),
                message: "base protocol set is missing wl_display".into(),
            }))?
            .clone();
        let registry_interface = protocols
            .interface("wl_registry")
            .ok_or_else(|| ConnectError::Protocol(crate::error::ProtocolError::Schema {
                interface: "wl_registry".into(),
                message: "base protocol set is missing wl_registry".into(),
            }))?
            .clone();

        let socket = connection::connect()?;
        let mut registry = ObjectRegistry::new();
        let display_interface = Rc::new(display_interface);
        let registry_interface = Rc::new(registry_interface);

        registry.insert_fixed(ObjectId::DISPLAY, display_interface.clone(), display_interface.version);

        let registry_id = registry
            .alloc_client_object(registry_interface.clone(), registry_interface.version)
            .map_err(|_| {
                ConnectError::Io(std::io::Error::new(std::io::ErrorKind::Other, "no object ids available"))
            })?;

        let mut client = Self {
            socket,
            registry,
            protocols,
            registry_id,
            outgoing: VecDeque::new(),
            pending_events: VecDeque::new(),
            debug: debug::wire_debug_enabled(),
            fatal: false,
        };

        let get_registry = {
            let display_obj = client.registry.get(ObjectId::DISPLAY).expect("display just inserted");
            request::marshal(display_obj, "get_registry", vec![ArgValue::NewId(registry_id)])?
        };
        client.queue(get_registry);
        client.flush(IoMode::Blocking)?;

        Ok(client)
    }

    /// The table of globals advertised so far. Until at least one
    /// [`Client::dispatch_events`] or [`Client::sync`] call has run after
    /// connecting, this is empty; `wl_registry.global` events arrive
    /// asynchronously like any other event.
    pub fn globals(&self) -> &[GlobalEntry] {
        self.registry.globals()
    }

    pub fn protocols(&self) -> &ProtocolSet {
        &self.protocols
    }

    /// Allocates a new client object bound to `interface`'s schema,
    /// without sending anything. Used by [`Client::bind`] and by callers
    /// building up a multi-argument request that itself carries a
    /// `new_id`.
    pub fn allocate_object(&mut self, interface: &str, version: u32) -> Result<ObjectId, ClientError> {
        self.check_fatal()?;
        let template = self
            .protocols
            .interface(interface)
            .ok_or_else(|| ClientError::UnknownMessage {
                interface: interface.to_string(),
                kind: "interface",
                name: interface.to_string(),
            })?
            .clone();
        self.registry
            .alloc_client_object(Rc::new(template), version)
            .map_err(|_| ClientError::Desync("object ids exhausted".into()))
    }

    /// Binds the global named `interface` (the first one advertised, if
    /// more than one instance exists) at `version`, returning the new
    /// object's id.
    pub fn bind(&mut self, interface: &str, version: u32) -> Result<ObjectId, ClientError> {
        let global = self
            .registry
            .find_global(interface)
            .ok_or_else(|| ClientError::UnknownMessage {
                interface: interface.to_string(),
                kind: "global",
                name: interface.to_string(),
            })?
            .clone();
        let bound_version = version.min(global.version);
        let id = self.allocate_object(interface, bound_version)?;

        let msg = {
            let registry_obj = self.registry.get(self.registry_id).expect("registry is never removed");
            request::marshal(
                registry_obj,
                "bind",
                vec![
                    ArgValue::Uint(global.name),
                    ArgValue::AnyNewId(
                        std::ffi::CString::new(interface).expect("interface name has no interior NUL"),
                        bound_version,
                        id,
                    ),
                ],
            )?
        };
        self.queue(msg);
        Ok(id)
    }

    /// Sends `request_name` to `object_id` with `args`, queuing it for the
    /// next [`Client::flush`].
    pub fn request(&mut self, object_id: ObjectId, request_name: &str, args: Vec<ArgValue>) -> Result<(), ClientError> {
        self.check_fatal()?;
        let object = self
            .registry
            .get(object_id)
            .ok_or(ClientError::UnknownObject(object_id.as_u32()))?;
        let msg = request::marshal(object, request_name, args)?;
        self.queue(msg);
        Ok(())
    }

    /// Registers an event handler for `object_id`. Returns `None` if no
    /// live object has that id.
    pub fn add_handler(&mut self, object_id: ObjectId, handler: EventHandler) -> Option<HandlerId> {
        self.registry.get_mut(object_id).map(|obj| obj.add_handler(handler))
    }

    pub fn remove_handler(&mut self, object_id: ObjectId, handler_id: HandlerId) -> bool {
        self.registry
            .get_mut(object_id)
            .is_some_and(|obj| obj.remove_handler(handler_id))
    }

    fn queue(&mut self, msg: Message) {
        self.outgoing.push_back(msg);
    }

    /// Returns [`ClientError::ConnectionClosed`] once the connection has
    /// been marked fatal (a `wl_display.error` or a desync was observed).
    /// Called at the top of every public entry point that would otherwise
    /// touch the socket or the registry as if the connection were still
    /// healthy.
    fn check_fatal(&self) -> Result<(), ClientError> {
        if self.fatal {
            Err(ClientError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Sends every queued request. In [`IoMode::Blocking`] mode this may
    /// block; in [`IoMode::NonBlocking`] mode a partial flush leaves the
    /// rest queued for next time.
    pub fn flush(&mut self, mode: IoMode) -> Result<(), ClientError> {
        self.check_fatal()?;
        while let Some(msg) = self.outgoing.pop_front() {
            if self.debug {
                if let Some(obj) = self.registry.get(msg.header.object_id) {
                    if let Some(template) = obj.interface.request(msg.header.opcode) {
                        debug::trace_message(false, msg.header.object_id, &obj.interface, template, &msg);
                    }
                }
            }
            if let Err(e) = self.socket.write_message(msg, mode) {
                self.outgoing.push_front(e.msg);
                return Err(ClientError::Io(e.err));
            }
        }
        self.socket.flush(mode).map_err(ClientError::Io)
    }

    /// Reads and queues events from the socket without dispatching them.
    /// In [`IoMode::Blocking`] mode, blocks until at least one event has
    /// arrived; in [`IoMode::NonBlocking`] mode, reads until the socket
    /// would block, returning immediately if nothing was available.
    pub fn recv_events(&mut self, mode: IoMode) -> Result<(), ClientError> {
        self.check_fatal()?;
        match self.recv_one(mode) {
            Ok(msg) => self.pending_events.push_back(msg),
            Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(self.mark_fatal_if_terminal(e)),
        }
        loop {
            match self.recv_one(IoMode::NonBlocking) {
                Ok(msg) => self.pending_events.push_back(msg),
                Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(self.mark_fatal_if_terminal(e)),
            }
        }
    }

    /// Marks the connection fatal if `err` is one of the terminal kinds
    /// (a desynchronized wire state or a compositor-reported protocol
    /// error) and returns it unchanged, so callers can both record and
    /// propagate in one step.
    fn mark_fatal_if_terminal(&mut self, err: ClientError) -> ClientError {
        if matches!(err, ClientError::Desync(_) | ClientError::ServerError { .. }) {
            self.fatal = true;
        }
        err
    }

    fn recv_one(&mut self, mode: IoMode) -> Result<Message, ClientError> {
        let header = self.socket.peek_message_header(mode).map_err(|e| match e {
            PeekHeaderError::Io(io) => ClientError::Io(io),
            PeekHeaderError::NullObject => ClientError::Desync(e.to_string()),
        })?;

        // An inbound frame addressed to an id the registry has no record
        // of is a desynchronized wire state, not a local usage mistake:
        // the compositor and this client now disagree about what object
        // that id names, and nothing later in the stream can be trusted
        // to realign on its own.
        let object = self.registry.get(header.object_id).ok_or_else(|| {
            ClientError::Desync(format!(
                "inbound frame addressed to unknown object id {}",
                header.object_id
            ))
        })?;
        let interface = object.interface.clone();
        let template = dispatch::resolve_event(&interface, &header)?.clone();
        let signature = template.signature();

        let msg = self.socket.recv_message(header, &signature, mode).map_err(|e| match e {
            RecvMessageError::Io(io) => ClientError::Io(io),
            other => ClientError::Desync(other.to_string()),
        })?;

        if self.debug {
            debug::trace_message(true, header.object_id, &interface, &template, &msg);
        }

        Ok(msg)
    }

    /// Dispatches every queued event (received by a prior
    /// [`Client::recv_events`] call) to its object's handlers, in FIFO
    /// order. `wl_display.error` aborts dispatch and is surfaced as
    /// [`ClientError::ServerError`]; `wl_display.delete_id` and
    /// `wl_registry.global`/`global_remove` are handled internally and
    /// never reach a handler.
    pub fn dispatch_events(&mut self) -> Result<(), ClientError> {
        self.check_fatal()?;
        match self.dispatch_events_inner() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.mark_fatal_if_terminal(e)),
        }
    }

    fn dispatch_events_inner(&mut self) -> Result<(), ClientError> {
        while let Some(event) = self.pending_events.pop_front() {
            let object = self.registry.get(event.header.object_id).ok_or_else(|| {
                ClientError::Desync(format!(
                    "inbound event addressed to unknown object id {}",
                    event.header.object_id
                ))
            })?;
            let interface = object.interface.clone();
            let template = dispatch::resolve_event(&interface, &event.header)?.clone();

            let routed = dispatch::route(
                &mut self.registry,
                &self.protocols,
                ObjectId::DISPLAY,
                self.registry_id,
                &interface,
                &template,
                &event,
            )?;

            match routed {
                Routed::DisplayError { object_id, code, message } => {
                    return Err(ClientError::ServerError { object_id, code, message })
                }
                Routed::DeleteId(id) => self.registry.delete_id(id),
                Routed::RegistryGlobal { name, interface, version } => {
                    self.registry.add_global(GlobalEntry {
                        name,
                        interface: std::ffi::CString::new(interface).unwrap_or_default(),
                        version,
                    });
                }
                Routed::RegistryGlobalRemove { name } => self.registry.remove_global(name),
                Routed::Plain { template } => {
                    let is_destructor = template.is_destructor();
                    if let Some(obj) = self.registry.get_mut(event.header.object_id) {
                        dispatch::deliver(obj, &event, is_destructor);
                    }
                }
            }
        }
        Ok(())
    }

    /// Flushes pending requests, then blocks until the compositor has
    /// processed everything sent before this call, implemented with
    /// `wl_display.sync`, whose callback fires only after every earlier
    /// request has been handled. Any events received while waiting are
    /// queued exactly as [`Client::recv_events`] would queue them, so a
    /// caller doesn't lose events that arrive alongside the sync
    /// callback.
    ///
    /// Bounded to [`SYNC_TIMEOUT`]: a compositor that never answers
    /// (wedged, or the socket is half-open) must not hang the caller
    /// forever.
    pub fn sync(&mut self) -> Result<(), ClientError> {
        self.check_fatal()?;
        let callback_id = self.allocate_object("wl_callback", 1)?;
        {
            let display_obj = self.registry.get(ObjectId::DISPLAY).expect("display is never removed");
            let msg = request::marshal(display_obj, "sync", vec![ArgValue::NewId(callback_id)])?;
            self.queue(msg);
        }
        self.flush(IoMode::Blocking)?;

        let deadline = Instant::now() + SYNC_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::SyncTimeout);
            }
            if !self.wait_readable(remaining)? {
                return Err(ClientError::SyncTimeout);
            }

            let msg = match self.recv_one(IoMode::NonBlocking) {
                Ok(msg) => msg,
                Err(e) => return Err(self.mark_fatal_if_terminal(e)),
            };

            if msg.header.object_id == callback_id {
                self.registry.delete_id(callback_id);
                return Ok(());
            }
            self.pending_events.push_back(msg);
        }
    }

    /// Blocks until the socket is readable or `timeout` elapses, returning
    /// whether data is ready. Used by [`Client::sync`] to bound the wait
    /// for the compositor's reply without relying on `recv`'s own blocking
    /// mode, which has no timeout of its own.
    fn wait_readable(&self, timeout: Duration) -> Result<bool, ClientError> {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
        use std::os::fd::{AsFd, BorrowedFd};

        let fd: BorrowedFd = self.socket.transport().as_fd();
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let timeout_ms: u16 = timeout.as_millis().min(u16::MAX as u128) as u16;
        let n = poll(&mut fds, PollTimeout::from(timeout_ms)).map_err(|e| ClientError::Io(e.into()))?;
        Ok(n > 0)
    }
}
