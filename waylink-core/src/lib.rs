//! Protocol-agnostic Wayland wire types.
//!
//! Nothing in this crate knows about interfaces, requests or events by
//! name; that knowledge lives in `waylink-client`, which loads it from XML
//! at run time. This crate only knows how the eight primitive argument
//! types and the message header are laid out on the wire, and how to move
//! bytes (and file descriptors) across a transport.

use std::ffi::CString;
use std::fmt;
use std::num::NonZeroU32;
use std::os::fd::OwnedFd;

pub mod ring_buffer;
pub mod transport;
pub mod wire;

/// The "mode" of an IO operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// The call may block but will never return `WouldBlock`.
    Blocking,
    /// The call never blocks; `WouldBlock` is returned if it cannot
    /// complete immediately.
    NonBlocking,
}

/// A Wayland object ID.
///
/// Uniquely identifies a live object at a given point in time. IDs are
/// reused once the server acknowledges their destruction with
/// `wl_display.delete_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub NonZeroU32);

impl ObjectId {
    /// `wl_display` is always object 1.
    pub const DISPLAY: Self = Self(unsafe { NonZeroU32::new_unchecked(1) });
    /// Highest id the client may allocate.
    pub const MAX_CLIENT: Self = Self(unsafe { NonZeroU32::new_unchecked(0xFEFFFFFF) });
    /// Lowest id the server may allocate.
    pub const MIN_SERVER: Self = Self(unsafe { NonZeroU32::new_unchecked(0xFF000000) });

    pub fn as_u32(self) -> u32 {
        self.0.get()
    }

    pub fn created_by_server(self) -> bool {
        self >= Self::MIN_SERVER
    }

    pub fn created_by_client(self) -> bool {
        self <= Self::MAX_CLIENT
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed 24.8 fixed-point number, as used by `wl_fixed_t`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fixed(pub i32);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(256);
    pub const MINUS_ONE: Self = Self(-256);

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 256.0
    }

    pub fn as_f32(self) -> f32 {
        self.0 as f32 / 256.0
    }

    pub fn as_int(self) -> i32 {
        self.0 / 256
    }

    pub fn is_int(self) -> bool {
        self.0 & 0xff == 0
    }
}

impl From<i32> for Fixed {
    fn from(value: i32) -> Self {
        Self(value * 256)
    }
}

impl From<f64> for Fixed {
    fn from(value: f64) -> Self {
        // `(integer_part << 8) | fractional_byte` with
        // `fractional_byte = floor((value mod 1.0) * 256)`, expressed as a
        // single multiply-then-round since the two formulations agree for
        // all representable values.
        Self((value * 256.0).round() as i32)
    }
}

impl From<f32> for Fixed {
    fn from(value: f32) -> Self {
        Self::from(value as f64)
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_f64().fmt(f)
    }
}

/// The wire shape of an argument, independent of any interface's schema.
///
/// This is deliberately smaller than a full Wayland `ArgType`: it knows
/// nothing about which interface a `NewId`/`Object` argument is pinned to,
/// or whether `null` is allowed; that policy lives in
/// `waylink_client::protocol::ArgTemplate` and is enforced one layer up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Uint,
    Fixed,
    Object,
    NewId,
    /// The generic `new_id` used by `wl_registry.bind`: encoded inline as
    /// `(interface name, version, id)`.
    AnyNewId,
    String,
    Array,
    Fd,
}

/// A decoded (or to-be-encoded) argument value.
#[derive(Debug)]
pub enum ArgValue {
    Int(i32),
    Uint(u32),
    Fixed(Fixed),
    /// `None` is the null object (wire value 0).
    Object(Option<ObjectId>),
    NewId(ObjectId),
    AnyNewId(CString, u32, ObjectId),
    String(CString),
    Array(Vec<u8>),
    Fd(OwnedFd),
}

impl ArgValue {
    /// The size of this argument on the wire, in bytes. `Fd` occupies no
    /// space in the byte stream; it travels as ancillary data.
    pub fn wire_size(&self) -> usize {
        match self {
            Self::Int(_) | Self::Uint(_) | Self::Fixed(_) | Self::Object(_) | Self::NewId(_) => 4,
            Self::AnyNewId(iface, _, _) => 4 + pad4(iface.to_bytes_with_nul().len()) + 8,
            Self::String(s) => 4 + pad4(s.to_bytes_with_nul().len()),
            Self::Array(a) => 4 + pad4(a.len()),
            Self::Fd(_) => 0,
        }
    }

    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::Int(_) => ArgType::Int,
            Self::Uint(_) => ArgType::Uint,
            Self::Fixed(_) => ArgType::Fixed,
            Self::Object(_) => ArgType::Object,
            Self::NewId(_) => ArgType::NewId,
            Self::AnyNewId(..) => ArgType::AnyNewId,
            Self::String(_) => ArgType::String,
            Self::Array(_) => ArgType::Array,
            Self::Fd(_) => ArgType::Fd,
        }
    }
}

/// Round `len` up to the next multiple of 4.
pub(crate) fn pad4(len: usize) -> usize {
    len.next_multiple_of(4)
}

/// The 8-byte header present on every Wayland message.
#[derive(Debug, Clone, Copy)]
pub struct MessageHeader {
    pub object_id: ObjectId,
    /// Total frame size, including this header.
    pub size: u16,
    pub opcode: u16,
}

impl MessageHeader {
    pub const SIZE: usize = 8;
}

/// A fully decoded (or about-to-be-encoded) Wayland message.
#[derive(Debug)]
pub struct Message {
    pub header: MessageHeader,
    pub args: Vec<ArgValue>,
}
