//! Readiness and watchdog notification to the host init system via
//! the systemd `sd_notify` wire protocol: a `SOCK_DGRAM` datagram of
//! `READY=1` / `WATCHDOG=1` sent to `$NOTIFY_SOCKET`. No external
//! `sd-notify` crate: the protocol is three lines of code and nothing
//! else in this family pulls in a dependency for it.
//!
//! An absent or unreachable socket is treated as success -- this is
//! a no-op on any host that isn't running under systemd.

#[cfg(target_os = "linux")]
fn notify_path(socket_path: &str, state: &str) {
  use std::os::unix::net::UnixDatagram;

  let Ok(socket) = UnixDatagram::unbound() else {
    return;
  };
  let _ = socket.send_to(state.as_bytes(), socket_path);
}

pub fn notify(state: &str) {
  #[cfg(target_os = "linux")]
  {
    if let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") {
      notify_path(&socket_path, state);
    }
  }
  #[cfg(not(target_os = "linux"))]
  {
    let _ = state;
  }
}

pub fn ready() {
  notify("READY=1");
}

pub fn watchdog() {
  notify("WATCHDOG=1");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn notify_without_socket_env_does_not_panic() {
    ready();
    watchdog();
  }

  #[test]
  #[cfg(target_os = "linux")]
  fn notify_path_delivers_to_a_real_socket() {
    use std::os::unix::net::UnixDatagram;

    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("notify.sock");
    let receiver = UnixDatagram::bind(&socket_path).unwrap();
    receiver
      .set_read_timeout(Some(std::time::Duration::from_secs(1)))
      .unwrap();

    notify_path(socket_path.to_str().unwrap(), "READY=1");

    let mut buf = [0u8; 16];
    let (n, _) = receiver.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"READY=1");
  }
}
