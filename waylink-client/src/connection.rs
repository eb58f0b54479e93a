//! Resolving `$XDG_RUNTIME_DIR`/`$WAYLAND_DISPLAY` and opening the socket.

use std::env;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use waylink_core::transport::BufferedSocket;

use crate::error::ConnectError;

pub(crate) type Socket = BufferedSocket<UnixStream>;

/// Default `$WAYLAND_DISPLAY` socket name, used when the variable is unset.
pub const DEFAULT_WAYLAND_DISPLAY: &str = "wayland-0";
/// Default `$XDG_RUNTIME_DIR`, used when the variable is unset.
pub const DEFAULT_XDG_RUNTIME_DIR: &str = "/run/user/1000";

/// Resolves the compositor socket path from the environment.
///
/// `$WAYLAND_DISPLAY` may be an absolute path (used as-is) or a bare
/// socket name resolved relative to `$XDG_RUNTIME_DIR`, matching the
/// reference client's behavior. Both variables fall back to their
/// documented defaults (`wayland-0`, `/run/user/1000`) when unset, rather
/// than erroring, since a bare-metal session without a login manager setting
/// `XDG_RUNTIME_DIR` is still expected to find the socket at the
/// conventional path.
pub fn socket_path() -> PathBuf {
    let display = env::var_os("WAYLAND_DISPLAY").unwrap_or_else(|| DEFAULT_WAYLAND_DISPLAY.into());
    let display_path = PathBuf::from(&display);
    if display_path.is_absolute() {
        return display_path;
    }

    let runtime_dir = env::var_os("XDG_RUNTIME_DIR").unwrap_or_else(|| DEFAULT_XDG_RUNTIME_DIR.into());
    let mut path = PathBuf::from(runtime_dir);
    path.push(display_path);
    path
}

pub(crate) fn connect() -> Result<Socket, ConnectError> {
    let path = socket_path();
    let stream = UnixStream::connect(&path)?;
    Ok(BufferedSocket::from(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    // SAFETY (test-only): std::env::set_var/remove_var are unsafe in this
    // toolchain because they are not thread-safe; these tests run serially
    // under `cargo test`'s per-process env and don't race with anything
    // else touching these two variables.
    fn with_env<R>(display: Option<&str>, runtime_dir: Option<&str>, f: impl FnOnce() -> R) -> R {
        let saved_display: Option<OsString> = env::var_os("WAYLAND_DISPLAY");
        let saved_runtime: Option<OsString> = env::var_os("XDG_RUNTIME_DIR");
        unsafe {
            match display {
                Some(v) => env::set_var("WAYLAND_DISPLAY", v),
                None => env::remove_var("WAYLAND_DISPLAY"),
            }
            match runtime_dir {
                Some(v) => env::set_var("XDG_RUNTIME_DIR", v),
                None => env::remove_var("XDG_RUNTIME_DIR"),
            }
        }
        let result = f();
        unsafe {
            match saved_display {
                Some(v) => env::set_var("WAYLAND_DISPLAY", v),
                None => env::remove_var("WAYLAND_DISPLAY"),
            }
            match saved_runtime {
                Some(v) => env::set_var("XDG_RUNTIME_DIR", v),
                None => env::remove_var("XDG_RUNTIME_DIR"),
            }
        }
        result
    }

    #[test]
    fn resolves_relative_display_against_runtime_dir() {
        with_env(Some("wayland-0"), Some("/run/user/1000"), || {
            assert_eq!(socket_path(), PathBuf::from("/run/user/1000/wayland-0"));
        });
    }

    #[test]
    fn absolute_display_is_used_as_is() {
        with_env(Some("/tmp/wayland-9"), Some("/run/user/1000"), || {
            assert_eq!(socket_path(), PathBuf::from("/tmp/wayland-9"));
        });
    }

    #[test]
    fn missing_env_vars_fall_back_to_documented_defaults() {
        with_env(None, None, || {
            assert_eq!(
                socket_path(),
                PathBuf::from(DEFAULT_XDG_RUNTIME_DIR).join(DEFAULT_WAYLAND_DISPLAY)
            );
        });
    }
}
