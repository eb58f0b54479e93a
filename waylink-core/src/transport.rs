//! Buffered, message-oriented framing on top of a byte-and-fd transport.

use std::collections::VecDeque;
use std::ffi::CString;
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::ring_buffer::RingBuffer;
use crate::{ArgType, ArgValue, Fixed, IoMode, Message, MessageHeader, ObjectId};

pub mod unix;

pub const BYTES_OUT_LEN: usize = 4096;
pub const BYTES_IN_LEN: usize = BYTES_OUT_LEN * 2;
pub const FDS_OUT_LEN: usize = 28;
pub const FDS_IN_LEN: usize = FDS_OUT_LEN * 2;

/// An abstraction over the byte-and-fd transport a [`BufferedSocket`] rides
/// on. The only implementation shipped here is [`unix::UnixStream`]'s, but
/// keeping this generic lets callers substitute a mock for tests.
pub trait Transport {
    fn pollable_fd(&self) -> RawFd;

    fn send(&mut self, bytes: &[IoSlice], fds: &[OwnedFd], mode: IoMode) -> io::Result<usize>;

    fn recv(
        &mut self,
        bytes: &mut [IoSliceMut],
        fds: &mut VecDeque<OwnedFd>,
        mode: IoMode,
    ) -> io::Result<usize>;
}

/// A buffered Wayland socket: marshals [`Message`]s onto (and off of) a
/// [`Transport`], batching small writes and reads through fixed-size ring
/// buffers rather than issuing one syscall per message.
pub struct BufferedSocket<T> {
    socket: T,
    bytes_in: RingBuffer,
    bytes_out: RingBuffer,
    fds_in: VecDeque<OwnedFd>,
    fds_out: VecDeque<OwnedFd>,
}

/// Failed to hand a message to the transport. The message is returned so
/// the caller can decide whether to retry or drop the connection.
pub struct SendMessageError {
    pub msg: Message,
    pub err: io::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvMessageError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("message has too many file descriptors")]
    TooManyFds,
    #[error("message is too large")]
    TooManyBytes,
    #[error("message contains an unexpected null object id or new_id")]
    UnexpectedNull,
    #[error("message contains a string with an internal null byte")]
    NullInString,
    #[error("message claims a file descriptor argument but none arrived")]
    MissingFd,
}

#[derive(Debug, thiserror::Error)]
pub enum PeekHeaderError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("message header has a null object id")]
    NullObject,
}

impl<T: Transport> AsRawFd for BufferedSocket<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.pollable_fd()
    }
}

impl<T: Transport> From<T> for BufferedSocket<T> {
    fn from(socket: T) -> Self {
        Self {
            socket,
            bytes_in: RingBuffer::new(BYTES_IN_LEN),
            bytes_out: RingBuffer::new(BYTES_OUT_LEN),
            fds_in: VecDeque::new(),
            fds_out: VecDeque::new(),
        }
    }
}

impl<T: Transport> BufferedSocket<T> {
    /// Queues a message for sending, flushing the buffer first if it
    /// doesn't have room. On failure ownership of the message is handed
    /// back so the caller can decide what to do with it.
    ///
    /// # Panics
    ///
    /// Panics if the message is larger than [`BYTES_OUT_LEN`] or carries
    /// more than [`FDS_OUT_LEN`] file descriptors, both far beyond
    /// anything a real protocol message needs.
    pub fn write_message(&mut self, msg: Message, mode: IoMode) -> Result<(), SendMessageError> {
        let size = MessageHeader::SIZE + msg.args.iter().map(ArgValue::wire_size).sum::<usize>();
        let fds_cnt = msg
            .args
            .iter()
            .filter(|a| matches!(a, ArgValue::Fd(_)))
            .count();

        assert!(size <= BYTES_OUT_LEN, "message exceeds the output buffer");
        assert!(fds_cnt <= FDS_OUT_LEN, "message carries too many file descriptors");

        if size > self.bytes_out.writable_len() || fds_cnt + self.fds_out.len() > FDS_OUT_LEN {
            if let Err(err) = self.flush(mode) {
                return Err(SendMessageError { msg, err });
            }
        }

        self.bytes_out.write_u32(msg.header.object_id.as_u32());
        self.bytes_out
            .write_u32((size as u32) << 16 | msg.header.opcode as u32);

        let mut msg = msg;
        for arg in msg.args.drain(..) {
            match arg {
                ArgValue::Uint(x) => self.bytes_out.write_u32(x),
                ArgValue::Int(x) => self.bytes_out.write_i32(x),
                ArgValue::Fixed(Fixed(x)) => self.bytes_out.write_i32(x),
                ArgValue::Object(id) => self.bytes_out.write_u32(id.map_or(0, ObjectId::as_u32)),
                ArgValue::NewId(id) => self.bytes_out.write_u32(id.as_u32()),
                ArgValue::AnyNewId(iface, version, id) => {
                    self.send_array(iface.to_bytes_with_nul());
                    self.bytes_out.write_u32(version);
                    self.bytes_out.write_u32(id.as_u32());
                }
                ArgValue::String(s) => self.send_array(s.to_bytes_with_nul()),
                ArgValue::Array(a) => self.send_array(&a),
                ArgValue::Fd(fd) => self.fds_out.push_back(fd),
            }
        }

        Ok(())
    }

    /// Peeks the next message's header without consuming it from the
    /// buffer. Filling the buffer may block (or, in non-blocking mode,
    /// return `WouldBlock`) if fewer than [`MessageHeader::SIZE`] bytes
    /// have arrived.
    pub fn peek_message_header(&mut self, mode: IoMode) -> Result<MessageHeader, PeekHeaderError> {
        while self.bytes_in.readable_len() < MessageHeader::SIZE {
            self.fill_incoming_buf(mode)?;
        }

        let mut raw = [0u8; MessageHeader::SIZE];
        self.bytes_in.peek_bytes(&mut raw);
        let object_id = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        let size_and_opcode = u32::from_le_bytes(raw[4..8].try_into().unwrap());

        Ok(MessageHeader {
            object_id: std::num::NonZeroU32::new(object_id)
                .map(ObjectId)
                .ok_or(PeekHeaderError::NullObject)?,
            size: ((size_and_opcode & 0xFFFF_0000) >> 16) as u16,
            opcode: (size_and_opcode & 0x0000_FFFF) as u16,
        })
    }

    /// Receives the full body of the message whose header was just peeked.
    /// `signature` must be the argument shape the caller resolved for
    /// `header.opcode` from its protocol schema; this crate has no notion
    /// of interfaces or opcodes of its own.
    pub fn recv_message(
        &mut self,
        header: MessageHeader,
        signature: &[ArgType],
        mode: IoMode,
    ) -> Result<Message, RecvMessageError> {
        let fds_cnt = signature.iter().filter(|t| **t == ArgType::Fd).count();
        if header.size as usize > BYTES_IN_LEN {
            return Err(RecvMessageError::TooManyBytes);
        }
        if fds_cnt > FDS_IN_LEN {
            return Err(RecvMessageError::TooManyFds);
        }
        while header.size as usize > self.bytes_in.readable_len() || fds_cnt > self.fds_in.len() {
            self.fill_incoming_buf(mode)?;
        }

        self.bytes_in.move_tail(MessageHeader::SIZE);

        let mut args = Vec::with_capacity(signature.len());
        for arg_type in signature {
            args.push(match arg_type {
                ArgType::Int => ArgValue::Int(self.bytes_in.read_i32()),
                ArgType::Uint => ArgValue::Uint(self.bytes_in.read_u32()),
                ArgType::Fixed => ArgValue::Fixed(Fixed(self.bytes_in.read_i32())),
                ArgType::Object => ArgValue::Object(self.bytes_in.read_id()),
                ArgType::NewId => ArgValue::NewId(
                    self.bytes_in
                        .read_id()
                        .ok_or(RecvMessageError::UnexpectedNull)?,
                ),
                ArgType::AnyNewId => {
                    let iface = self.recv_string()?;
                    let version = self.bytes_in.read_u32();
                    let id = self
                        .bytes_in
                        .read_id()
                        .ok_or(RecvMessageError::UnexpectedNull)?;
                    ArgValue::AnyNewId(iface, version, id)
                }
                ArgType::String => ArgValue::String(self.recv_string()?),
                ArgType::Array => ArgValue::Array(self.recv_array()),
                ArgType::Fd => ArgValue::Fd(self.fds_in.pop_front().ok_or(RecvMessageError::MissingFd)?),
            });
        }

        Ok(Message { header, args })
    }

    /// Pushes any buffered outgoing bytes and file descriptors to the
    /// transport. A no-op if nothing is pending.
    pub fn flush(&mut self, mode: IoMode) -> io::Result<()> {
        while !self.bytes_out.is_empty() {
            let mut iov_buf = [IoSlice::new(&[]), IoSlice::new(&[])];
            let iov = self.bytes_out.get_readable_iov(&mut iov_buf);

            let sent = self.socket.send(iov, self.fds_out.make_contiguous(), mode)?;

            self.bytes_out.move_tail(sent);
            self.fds_out.clear();
        }

        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.socket
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.socket
    }

    fn fill_incoming_buf(&mut self, mode: IoMode) -> io::Result<()> {
        if self.bytes_in.is_full() {
            return Ok(());
        }

        let mut iov_buf = [IoSliceMut::new(&mut []), IoSliceMut::new(&mut [])];
        let iov = self.bytes_in.get_writeable_iov(&mut iov_buf);

        let read = self.socket.recv(iov, &mut self.fds_in, mode)?;
        self.bytes_in.move_head(read);

        Ok(())
    }

    fn send_array(&mut self, bytes: &[u8]) {
        let len = bytes.len() as u32;
        self.bytes_out.write_u32(len);
        self.bytes_out.write_bytes(bytes);
        let padding = (4 - (len % 4)) % 4;
        self.bytes_out.write_bytes(&[0, 0, 0][..padding as usize]);
    }

    fn recv_array(&mut self) -> Vec<u8> {
        let len = self.bytes_in.read_u32() as usize;
        let mut buf = vec![0; len];
        self.bytes_in.read_bytes(&mut buf);
        let padding = (4 - (len % 4)) % 4;
        self.bytes_in.move_tail(padding);
        buf
    }

    fn recv_string(&mut self) -> Result<CString, RecvMessageError> {
        let len = self.bytes_in.read_u32();
        if len == 0 {
            return Err(RecvMessageError::UnexpectedNull);
        }
        let mut buf = vec![0; len as usize];
        self.bytes_in.read_bytes(&mut buf);
        let padding = (4 - (len % 4)) % 4;
        self.bytes_in.move_tail(padding as usize);
        CString::from_vec_with_nul(buf).map_err(|_| RecvMessageError::NullInString)
    }
}
