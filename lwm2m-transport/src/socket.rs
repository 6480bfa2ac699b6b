//! Multicast-aware datagram socket
//!
//! [`DatagramSocket`] wraps a tokio UDP socket created through `socket2`
//! so the multicast options can be driven directly. Unicast sends are a
//! plain `send_to`; multicast sends go through
//! [`send_multicast`](crate::multicast::send_multicast) under a per-socket
//! lock so the save/set/send/restore sequence is never interleaved.

use crate::address::to_sock_addr;
use crate::error::{Lwm2mError, Lwm2mResult};
use crate::link::{LinkProvider, SystemLinks};
use crate::multicast::{send_multicast, MulticastInterface, MulticastIo};
use async_trait::async_trait;
use log::{debug, warn};
use socket2::{Domain, InterfaceIndexOrAddress, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::Interest;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Maximum UDP payload size
pub const MAX_UDP_PAYLOAD_SIZE: usize = 65507;

/// Address family of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFamily {
    Ipv4,
    Ipv6,
}

/// Lifecycle state of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Open,
}

/// Readiness callback
///
/// Returning `false` removes the callback.
pub type ReadinessCallback = Box<dyn FnMut(&DatagramSocket) -> bool + Send + 'static>;

struct Inner {
    io: UdpSocket,
    open: AtomicBool,
    links: Arc<dyn LinkProvider>,
    multicast: Mutex<()>,
    on_read: StdMutex<Option<JoinHandle<()>>>,
    on_write: StdMutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn shutdown(&self) {
        self.open.store(false, Ordering::Release);
        for slot in [&self.on_read, &self.on_write] {
            if let Ok(mut watcher) = slot.lock() {
                if let Some(handle) = watcher.take() {
                    handle.abort();
                }
            }
        }
    }
}

/// Shared by every user handle; the socket shuts down when the last one drops
struct Handle {
    inner: Arc<Inner>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

/// UDP socket with transparent per-interface multicast delivery
///
/// Cloning yields another handle to the same socket. Dropping the last
/// handle closes it, the same as [`close`](Self::close).
#[derive(Clone)]
pub struct DatagramSocket {
    handle: Arc<Handle>,
}

impl DatagramSocket {
    /// Create an unbound socket using the system's network links
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(family: SocketFamily) -> Lwm2mResult<Self> {
        Self::with_links(family, Arc::new(SystemLinks))
    }

    /// Create an unbound socket with a custom link provider
    ///
    /// # Errors
    ///
    /// Returns `Transport` carrying the platform error if the socket cannot
    /// be created or registered with the runtime.
    pub fn with_links(family: SocketFamily, links: Arc<dyn LinkProvider>) -> Lwm2mResult<Self> {
        let domain = match family {
            SocketFamily::Ipv4 => Domain::IPV4,
            SocketFamily::Ipv6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        let std_socket: std::net::UdpSocket = socket.into();
        let io = UdpSocket::from_std(std_socket)?;

        let inner = Arc::new(Inner {
            io,
            open: AtomicBool::new(true),
            links,
            multicast: Mutex::new(()),
            on_read: StdMutex::new(None),
            on_write: StdMutex::new(None),
        });
        Ok(Self {
            handle: Arc::new(Handle { inner }),
        })
    }

    pub fn state(&self) -> SocketState {
        if self.handle.inner.open.load(Ordering::Acquire) {
            SocketState::Open
        } else {
            SocketState::Closed
        }
    }

    fn ensure_open(&self) -> Lwm2mResult<()> {
        match self.state() {
            SocketState::Open => Ok(()),
            SocketState::Closed => Err(Lwm2mError::InvalidState("socket is closed".to_string())),
        }
    }

    /// Bind the socket to a local address
    pub fn bind(&self, addr: SocketAddr) -> Lwm2mResult<()> {
        self.ensure_open()?;
        SockRef::from(&self.handle.inner.io).bind(&to_sock_addr(&addr))?;
        debug!("Socket bound to {}", addr);
        Ok(())
    }

    /// Allow several sockets to bind the same address; call before `bind`
    pub fn set_reuse_address(&self, reuse: bool) -> Lwm2mResult<()> {
        self.ensure_open()?;
        SockRef::from(&self.handle.inner.io).set_reuse_address(reuse)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Lwm2mResult<SocketAddr> {
        Ok(self.handle.inner.io.local_addr()?)
    }

    /// Join a multicast group on the interface with the given index
    ///
    /// An index of 0 lets the kernel pick the interface.
    ///
    /// # Errors
    ///
    /// Returns `Transport` with the platform error code if the membership
    /// option is rejected.
    pub fn join_group(&self, interface_index: u32, group: IpAddr) -> Lwm2mResult<()> {
        self.ensure_open()?;
        let sock = SockRef::from(&self.handle.inner.io);
        match group {
            IpAddr::V4(v4) => {
                sock.join_multicast_v4_n(&v4, &InterfaceIndexOrAddress::Index(interface_index))?
            }
            IpAddr::V6(v6) => sock.join_multicast_v6(&v6, interface_index)?,
        }
        debug!("Joined multicast group {} on interface {}", group, interface_index);
        Ok(())
    }

    /// Send one datagram
    ///
    /// Multicast destinations are delivered on every eligible link.
    ///
    /// # Errors
    ///
    /// Returns `NoRoute` if a multicast send reached no link, `Transport`
    /// for unicast send failures and `InvalidState` on a closed socket.
    pub async fn send_msg(&self, buf: &[u8], dest: SocketAddr) -> Lwm2mResult<usize> {
        self.ensure_open()?;
        if dest.ip().is_multicast() {
            let _guard = self.handle.inner.multicast.lock().await;
            let links = self.handle.inner.links.available_links()?;
            send_multicast(&*self.handle.inner, &links, buf, dest).await
        } else {
            Ok(self.handle.inner.io.send_to(buf, dest).await?)
        }
    }

    /// Receive one datagram, waiting until one arrives
    pub async fn recv_msg(&self, buf: &mut [u8]) -> Lwm2mResult<(usize, SocketAddr)> {
        self.ensure_open()?;
        Ok(self.handle.inner.io.recv_from(buf).await?)
    }

    /// Receive one datagram if one is queued
    ///
    /// Returns `Ok(None)` when nothing is pending, which also re-arms read
    /// readiness.
    pub fn try_recv_msg(&self, buf: &mut [u8]) -> Lwm2mResult<Option<(usize, SocketAddr)>> {
        self.ensure_open()?;
        match self.handle.inner.io.try_recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Install or remove the read readiness callback
    pub fn set_on_read(&self, callback: Option<ReadinessCallback>) -> Lwm2mResult<()> {
        self.install_watcher(Interest::READABLE, &self.handle.inner.on_read, callback)
    }

    /// Install or remove the write readiness callback
    pub fn set_on_write(&self, callback: Option<ReadinessCallback>) -> Lwm2mResult<()> {
        self.install_watcher(Interest::WRITABLE, &self.handle.inner.on_write, callback)
    }

    fn install_watcher(
        &self,
        interest: Interest,
        slot: &StdMutex<Option<JoinHandle<()>>>,
        callback: Option<ReadinessCallback>,
    ) -> Lwm2mResult<()> {
        self.ensure_open()?;
        let mut watcher = slot
            .lock()
            .map_err(|_| Lwm2mError::InvalidState("readiness slot poisoned".to_string()))?;
        if let Some(previous) = watcher.take() {
            previous.abort();
        }

        let Some(mut callback) = callback else {
            return Ok(());
        };
        // Only the shared state is held across the wait, so dropping every
        // user handle still reaches Handle::drop and aborts this task.
        let inner = Arc::clone(&self.handle.inner);
        let weak = Arc::downgrade(&self.handle);
        *watcher = Some(tokio::spawn(async move {
            loop {
                if let Err(e) = inner.io.ready(interest).await {
                    warn!("Readiness wait failed: {}", e);
                    break;
                }
                let Some(handle) = weak.upgrade() else {
                    break;
                };
                let socket = DatagramSocket { handle };
                if !callback(&socket) {
                    debug!("Readiness callback for {:?} removed itself", interest);
                    break;
                }
                drop(socket);
                tokio::task::yield_now().await;
            }
        }));
        Ok(())
    }

    /// Close the socket and drop its readiness callbacks
    ///
    /// Every later operation fails with `InvalidState`.
    pub fn close(&self) {
        self.handle.inner.shutdown();
    }
}

#[async_trait]
impl MulticastIo for Inner {
    fn multicast_interface(&self, ipv6: bool) -> io::Result<MulticastInterface> {
        let sock = SockRef::from(&self.io);
        if ipv6 {
            sock.multicast_if_v6().map(MulticastInterface::V6)
        } else {
            sock.multicast_if_v4().map(MulticastInterface::V4)
        }
    }

    fn set_multicast_interface(&self, interface: MulticastInterface) -> io::Result<()> {
        let sock = SockRef::from(&self.io);
        match interface {
            MulticastInterface::V4(addr) => sock.set_multicast_if_v4(&addr),
            MulticastInterface::V6(index) => sock.set_multicast_if_v6(index),
        }
    }

    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.io.send_to(buf, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{MockLinkProvider, NetworkLink};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn loopback_socket(links: Arc<dyn LinkProvider>) -> DatagramSocket {
        let socket = DatagramSocket::with_links(SocketFamily::Ipv4, links).unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        socket
    }

    fn no_links() -> Arc<dyn LinkProvider> {
        let mut links = MockLinkProvider::new();
        links.expect_available_links().returning(|| Ok(Vec::new()));
        Arc::new(links)
    }

    #[tokio::test]
    async fn test_unicast_send_and_receive() {
        let a = loopback_socket(no_links());
        let b = loopback_socket(no_links());
        let dest = b.local_addr().unwrap();

        assert_eq!(a.send_msg(b"hello", dest).await.unwrap(), 5);
        let mut buf = [0u8; 16];
        let (n, from) = b.recv_msg(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_multicast_with_only_loopback_is_no_route() {
        let mut links = MockLinkProvider::new();
        links.expect_available_links().times(1).returning(|| {
            Ok(vec![NetworkLink {
                index: 1,
                name: "lo".to_string(),
                running: true,
                loopback: true,
                multicast: true,
                addrs: vec!["127.0.0.1".parse().unwrap()],
            }])
        });
        let socket = loopback_socket(Arc::new(links));

        let result = socket.send_msg(b"x", "224.0.1.187:5683".parse().unwrap()).await;
        assert!(matches!(result, Err(Lwm2mError::NoRoute)));
    }

    #[tokio::test]
    async fn test_multicast_link_enumeration_failure_propagates() {
        let mut links = MockLinkProvider::new();
        links
            .expect_available_links()
            .returning(|| Err(Lwm2mError::Transport(io::Error::from_raw_os_error(libc::EPERM))));
        let socket = loopback_socket(Arc::new(links));

        let err = socket
            .send_msg(b"x", "224.0.1.187:5683".parse().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.os_error(), Some(libc::EPERM));
    }

    #[tokio::test]
    async fn test_join_non_multicast_group_fails() {
        let socket = loopback_socket(no_links());
        let err = socket.join_group(0, "127.0.0.1".parse().unwrap()).unwrap_err();
        assert!(err.os_error().is_some());
    }

    #[tokio::test]
    async fn test_read_callback_removes_itself() {
        let receiver = loopback_socket(no_links());
        let sender = loopback_socket(no_links());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        assert_ok!(receiver.set_on_read(Some(Box::new(move |socket: &DatagramSocket| {
            let mut buf = [0u8; 32];
            while let Ok(Some((n, _))) = socket.try_recv_msg(&mut buf) {
                let _ = tx.send(buf[..n].to_vec());
            }
            false
        }))));

        sender
            .send_msg(b"first", receiver.local_addr().unwrap())
            .await
            .unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(got.unwrap(), b"first".to_vec());

        sender
            .send_msg(b"second", receiver.local_addr().unwrap())
            .await
            .unwrap();
        // The callback is gone, so the channel closes without another message
        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_dropped_socket_releases_port() {
        let socket = loopback_socket(no_links());
        let addr = socket.local_addr().unwrap();
        assert_ok!(socket.set_on_read(Some(Box::new(|_: &DatagramSocket| true))));
        assert_ok!(socket.set_on_write(Some(Box::new(|_: &DatagramSocket| true))));
        drop(socket);

        // Let the runtime reap the aborted watcher tasks
        tokio::time::sleep(Duration::from_millis(200)).await;
        let rebound = DatagramSocket::with_links(SocketFamily::Ipv4, no_links()).unwrap();
        assert_ok!(rebound.bind(addr));
    }

    #[tokio::test]
    async fn test_clone_keeps_socket_open() {
        let socket = loopback_socket(no_links());
        let other = socket.clone();
        drop(socket);
        assert_eq!(other.state(), SocketState::Open);
        let dest = other.local_addr().unwrap();
        assert_ok!(other.send_msg(b"x", dest).await);
    }

    #[tokio::test]
    async fn test_closed_socket_rejects_io() {
        let socket = loopback_socket(no_links());
        let dest = socket.local_addr().unwrap();
        socket.close();
        assert_eq!(socket.state(), SocketState::Closed);
        assert_err!(socket.send_msg(b"x", dest).await);
        assert_err!(socket.set_on_write(None));
    }
}
