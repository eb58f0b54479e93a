//! A Wayland client library that loads its protocol schema from XML at
//! run time instead of generating Rust bindings for it at build time.
//!
//! The usual Wayland client crate pins every interface, request, event and
//! opcode into the type system via a proc macro reading `.xml` protocol
//! files at compile time. This crate makes the opposite choice: an
//! [`InterfaceTemplate`](protocol::InterfaceTemplate) is ordinary data,
//! loaded by [`protocol::ProtocolSet`] whenever the caller hands it XML,
//! and every request/event is addressed by name against that data rather
//! than by a compiled-in opcode constant. This lets a process load
//! protocol extensions it never linked against, useful for anything that
//! introspects a compositor's capabilities, or that needs to speak
//! protocols not known when the binary was built.
//!
//! The trade a caller makes for that flexibility is the usual one for
//! run-time reflection over compile-time codegen: a request's arguments
//! are checked against the schema when sent, not when the calling code is
//! compiled.
//!
//! [`display::Client`] is the entry point: [`display::Client::connect`]
//! takes one or more protocol description paths (one of which must name
//! the base `wayland` protocol), resolves `$WAYLAND_DISPLAY`, performs the
//! `wl_display`/`wl_registry` bootstrap, and returns a client ready to
//! [`display::Client::bind`] globals, send requests, and dispatch events.

mod connection;
mod debug;
mod dispatch;
pub mod display;
pub mod error;
pub mod object;
pub mod protocol;
pub mod registry;
pub mod request;

pub use display::Client;
pub use error::{ClientError, ConnectError, ProtocolError, RegistryError};
pub use object::{EventHandler, HandlerId};
pub use registry::GlobalEntry;

pub use waylink_core::{ArgType, ArgValue, Fixed, IoMode, Message, MessageHeader, ObjectId};
