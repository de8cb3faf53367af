//! Socket hook applied to accepted connections.
//!
//! Runs once per connection before any protocol bytes flow: binds the
//! socket to the configured network interface (multi-homed collectors
//! that must only see telemetry on one interface) and logs the socket
//! configuration for diagnostics.

use socket2::SockRef;
use std::io;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub struct SocketMutator {
    device: Option<String>,
}

impl SocketMutator {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    /// Best-effort bind-to-device. A failure is logged and the
    /// connection proceeds unmutated.
    pub fn apply(&self, stream: &TcpStream) -> bool {
        let Some(device) = &self.device else {
            return true;
        };

        let socket = SockRef::from(stream);
        match bind_device(&socket, device) {
            Ok(()) => {
                debug!(device, "socket bound to device");
                true
            }
            Err(error) => {
                warn!(device, %error, "bind-to-device failed; connection proceeds unmutated");
                false
            }
        }
    }

    /// Log the accepted socket's configuration. Diagnostics only.
    pub fn inspect(&self, stream: &TcpStream) {
        let socket = SockRef::from(stream);
        debug!(
            recv_buffer = ?socket.recv_buffer_size().ok(),
            send_buffer = ?socket.send_buffer_size().ok(),
            keepalive = ?socket.keepalive().ok(),
            nodelay = ?socket.nodelay().ok(),
            "accepted socket options"
        );
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
fn bind_device(socket: &SockRef<'_>, device: &str) -> io::Result<()> {
    socket.bind_device(Some(device.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
fn bind_device(_socket: &SockRef<'_>, _device: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_BINDTODEVICE is not available on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn socket_pair() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        client.await.unwrap();
        accepted
    }

    #[tokio::test]
    async fn no_device_is_a_no_op() {
        let stream = socket_pair().await;
        let mutator = SocketMutator::new(None);
        assert!(mutator.apply(&stream));
        mutator.inspect(&stream);
    }

    #[tokio::test]
    async fn failure_is_reported_not_fatal() {
        let stream = socket_pair().await;
        // Either unsupported or refused by the OS; never a panic.
        let mutator = SocketMutator::new(Some("no-such-device0".to_string()));
        assert!(!mutator.apply(&stream));
    }
}
