//! [`Transport`] implementation for Unix domain stream sockets, the only
//! transport a Wayland compositor socket ever actually is.

use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::sys::socket::{self, ControlMessage, ControlMessageOwned, MsgFlags};

use super::{Transport, FDS_IN_LEN};
use crate::IoMode;

impl Transport for UnixStream {
    fn pollable_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn send(&mut self, bytes: &[IoSlice], fds: &[OwnedFd], mode: IoMode) -> io::Result<usize> {
        let mut flags = MsgFlags::MSG_NOSIGNAL;
        if mode == IoMode::NonBlocking {
            flags |= MsgFlags::MSG_DONTWAIT;
        }

        // nix's ScmRights takes &[RawFd]; only build a control message when
        // there is something to send.
        let borrowed: Vec<RawFd> = fds.iter().map(AsRawFd::as_raw_fd).collect();
        let sent = if borrowed.is_empty() {
            socket::sendmsg::<()>(self.as_raw_fd(), bytes, &[], flags, None)
        } else {
            let scm = [ControlMessage::ScmRights(&borrowed)];
            socket::sendmsg::<()>(self.as_raw_fd(), bytes, &scm, flags, None)
        }
        .map_err(io::Error::from)?;

        Ok(sent)
    }

    fn recv(
        &mut self,
        bytes: &mut [IoSliceMut],
        fds: &mut VecDeque<OwnedFd>,
        mode: IoMode,
    ) -> io::Result<usize> {
        let mut cmsg_space = nix::cmsg_space!([RawFd; FDS_IN_LEN]);

        let mut flags = MsgFlags::MSG_CMSG_CLOEXEC | MsgFlags::MSG_NOSIGNAL;
        if mode == IoMode::NonBlocking {
            flags |= MsgFlags::MSG_DONTWAIT;
        }

        let msg = socket::recvmsg::<()>(self.as_raw_fd(), bytes, Some(&mut cmsg_space), flags)
            .map_err(io::Error::from)?;

        for cmsg in msg.cmsgs().map_err(io::Error::from)? {
            if let ControlMessageOwned::ScmRights(raw_fds) = cmsg {
                for raw in raw_fds {
                    fds.push_back(unsafe { OwnedFd::from_raw_fd(raw) });
                }
            }
        }

        let read = msg.bytes;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "server disconnected"));
        }

        Ok(read)
    }
}
