//! The socket façade: the one surface user code actually calls, sitting on
//! top of [`super::tcp::TcpLayer`] the way a userspace `Socket` type sits
//! atop a `Base -> Ethernet -> Ipv4 -> Tcp` layer chain. Here that chain
//! collapses into [`super::stack::LayerKind`] plus the
//! [`super::stack::NetDevice`] contract; `Socket` only has to know it's
//! built on `Tcp` over `Socket`'s own kind.
//!
//! Every method here returns a raw [`SocketCode`] rather than a `Result`,
//! matching this crate's convention (see `error.rs`) that the
//! outermost socket surface marshals errors as signed return codes.

use alloc::vec::Vec;

use super::packet::{Ipv4Addr, Port};
use super::stack::{LayerKind, NetDevice, Rng};
use super::tcp::{TcpEvent, TcpLayer, TcpState};
use crate::error::{
    SocketCode, RETURN_ALREADY_ESTABLISHED, RETURN_CONNECTION_CLOSED, RETURN_SUCCESS,
};

/// Default interface name a `Socket` binds to when none is assigned
/// explicitly.
pub const DEFAULT_INTERFACE: &str = "en0";

pub struct Socket<'a, D: NetDevice, R: Rng> {
    interface: &'static str,
    kind: LayerKind,
    tcp: TcpLayer<'a, D, R>,
}

impl<'a, D: NetDevice, R: Rng> Socket<'a, D, R> {
    pub fn new(device: &'a D, rng: R, my_port: Port) -> Self {
        Self {
            interface: DEFAULT_INTERFACE,
            kind: LayerKind::Socket,
            tcp: TcpLayer::new(device, rng, my_port),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Rebinds this socket to a named network interface instead of
    /// [`DEFAULT_INTERFACE`]. Purely a label in this crate — the actual
    /// device the socket drives is whatever [`super::stack::NetDevice`] was
    /// passed to [`Socket::new`]; `assign_interface` exists so callers can
    /// track which of several interfaces a socket logically belongs to.
    pub fn assign_interface(&mut self, name: &'static str) {
        self.interface = name;
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Called once the peer address/port are known, before the first
    /// `connect`/`listen`. Resolving the peer's link-layer address belongs
    /// below `NetDevice`, out of this crate's scope, so this is a no-op
    /// hook a consumer wiring a real `NetDevice` can shadow by resolving
    /// the peer's MAC before calling `bind_peer` in the first place.
    fn on_bind_peer(&self, _peer_ip: Ipv4Addr, _peer_port: Port) {}

    pub fn bind_peer(&mut self, peer_ip: Ipv4Addr, peer_port: Port) {
        self.on_bind_peer(peer_ip, peer_port);
        self.tcp.bind_peer(peer_ip, peer_port);
    }

    pub fn connect(&mut self) -> SocketCode {
        if self.tcp.state() == TcpState::Established {
            return RETURN_ALREADY_ESTABLISHED;
        }
        match self.tcp.connect() {
            Ok(()) => RETURN_SUCCESS,
            Err(e) => e.as_socket_code(),
        }
    }

    pub fn listen(&mut self) -> SocketCode {
        if self.tcp.state() == TcpState::Established {
            return RETURN_ALREADY_ESTABLISHED;
        }
        match self.tcp.listen() {
            Ok(()) => RETURN_SUCCESS,
            Err(e) => e.as_socket_code(),
        }
    }

    /// Writes `data` as one segment and waits for its ACK. Returns the
    /// number of bytes acknowledged on success.
    pub fn write(&mut self, data: &[u8]) -> SocketCode {
        match self.tcp.transmit_sub(data) {
            Ok(n) => n as SocketCode,
            Err(e) => e.as_socket_code(),
        }
    }

    /// Reads one inbound segment into `buf`. Returns the number of bytes
    /// copied, [`RETURN_CONNECTION_CLOSED`] if the peer sent FIN (the
    /// socket has already torn itself down at that point), or a negative
    /// error code.
    pub fn read(&mut self, buf: &mut [u8]) -> SocketCode {
        match self.tcp.receive_sub() {
            Ok(TcpEvent::Data(data)) => {
                if data.len() > buf.len() {
                    return crate::error::ERROR_OUT_OF_BUFFER;
                }
                buf[..data.len()].copy_from_slice(&data);
                data.len() as SocketCode
            }
            Ok(TcpEvent::PeerClosed) => RETURN_CONNECTION_CLOSED,
            Err(e) => e.as_socket_code(),
        }
    }

    /// Reads one inbound segment, returning it as an owned buffer rather
    /// than copying into a caller-supplied slice.
    pub fn read_owned(&mut self) -> Result<Vec<u8>, crate::error::SchedError> {
        match self.tcp.receive_sub()? {
            TcpEvent::Data(data) => Ok(data),
            TcpEvent::PeerClosed => Ok(Vec::new()),
        }
    }

    /// Idempotent graceful close: calling this on an already-`Closed`
    /// socket (whether it got there via `Shutup` or via the peer's FIN) is
    /// a no-op success rather than an error.
    pub fn close(&mut self) -> SocketCode {
        if self.tcp.state() == TcpState::Closed {
            return RETURN_SUCCESS;
        }
        match self.tcp.shutup() {
            Ok(()) => RETURN_SUCCESS,
            Err(e) => e.as_socket_code(),
        }
    }

    pub fn state(&self) -> TcpState {
        self.tcp.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::TcpFlags;
    use crate::net::stack::CounterRng;
    use alloc::collections::VecDeque;
    use core::cell::RefCell;

    struct LoopbackDevice {
        ip: Ipv4Addr,
        inbox: RefCell<VecDeque<(Ipv4Addr, Vec<u8>)>>,
    }

    impl LoopbackDevice {
        fn new(ip: Ipv4Addr) -> Self {
            Self {
                ip,
                inbox: RefCell::new(VecDeque::new()),
            }
        }
    }

    impl NetDevice for LoopbackDevice {
        fn local_ip(&self) -> Ipv4Addr {
            self.ip
        }
        fn send(&self, _dst: Ipv4Addr, _protocol: u8, _segment: &[u8]) -> Result<(), crate::error::SchedError> {
            Ok(())
        }
        fn recv(&self, _protocol: u8) -> Option<(Ipv4Addr, Vec<u8>)> {
            self.inbox.borrow_mut().pop_front()
        }
    }

    fn deliver(dev: &LoopbackDevice, from: Ipv4Addr, segment: Vec<u8>) {
        dev.inbox.borrow_mut().push_back((from, segment));
    }

    fn raw_segment(from_port: u16, to_port: u16, seq: u32, ack: u32, flags: TcpFlags, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
        use crate::net::packet::{tcp_checksum, TcpHeader};
        let mut header = TcpHeader {
            sport: from_port,
            dport: to_port,
            seq,
            ack,
            flags,
            window: 0xffff,
            checksum: 0,
        };
        let mut segment = Vec::new();
        segment.extend_from_slice(&header.to_bytes());
        segment.extend_from_slice(payload);
        header.checksum = tcp_checksum(src, dst, &segment);
        segment[16..18].copy_from_slice(&header.checksum.to_be_bytes());
        segment
    }

    #[test]
    fn connect_reports_already_established_once_established() {
        let client_ip = Ipv4Addr::new(10, 0, 0, 1);
        let server_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(client_ip);
        let mut sock = Socket::new(&dev, CounterRng(7), Port(5000));
        assert_eq!(sock.interface(), DEFAULT_INTERFACE);
        sock.bind_peer(server_ip, Port(80));

        let _ = sock.connect();
        let isn = sock.tcp.seq();
        deliver(&dev, server_ip, raw_segment(80, 5000, 77, isn.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK, server_ip, client_ip, &[]));
        assert_eq!(sock.connect(), RETURN_SUCCESS);
        assert_eq!(sock.connect(), RETURN_ALREADY_ESTABLISHED);
    }

    #[test]
    fn close_is_idempotent_before_any_connection() {
        let dev = LoopbackDevice::new(Ipv4Addr::new(10, 0, 0, 1));
        let mut sock = Socket::new(&dev, CounterRng(1), Port(5000));
        assert_eq!(sock.close(), RETURN_SUCCESS);
        assert_eq!(sock.close(), RETURN_SUCCESS);
    }

    #[test]
    fn read_reports_connection_closed_on_peer_fin() {
        let a_ip = Ipv4Addr::new(10, 0, 0, 1);
        let b_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(a_ip);
        let mut sock = Socket::new(&dev, CounterRng(3), Port(5000));
        sock.bind_peer(b_ip, Port(80));

        let _ = sock.connect();
        let isn = sock.tcp.seq();
        deliver(&dev, b_ip, raw_segment(80, 5000, 900, isn.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK, b_ip, a_ip, &[]));
        assert_eq!(sock.connect(), RETURN_SUCCESS);

        let x = sock.tcp.seq();
        let y = sock.tcp.ack();
        deliver(&dev, b_ip, raw_segment(80, 5000, y, x, TcpFlags::FIN | TcpFlags::ACK, b_ip, a_ip, &[]));
        let mut buf = [0u8; 16];
        assert_eq!(sock.read(&mut buf), RETURN_CONNECTION_CLOSED);
        assert_eq!(sock.close(), RETURN_SUCCESS, "already closed by the peer's FIN");
    }
}
