//! The TCP state machine: active/passive open, data transfer with
//! per-segment ACK, and graceful close.
//!
//! Every public method here takes the connection exactly one step further
//! along its current state and is safe to call again if it returns a
//! transient error ([`SchedError::NoRxPacket`]/[`SchedError::NoAck`]):
//! re-entry picks up from whatever state the previous call left behind
//! rather than restarting the handshake, mirroring `tcp.cc`'s "only
//! transmit when `_state != AckWait`" re-entry rule generalized to every
//! multi-step operation here.

use alloc::vec::Vec;

use super::packet::{tcp_checksum, Ipv4Addr, Port, TcpFlags, TcpHeader, TCP_HEADER_LEN};
use super::stack::{NetDevice, Rng, TCP_PROTOCOL};
use crate::error::SchedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    AckWait,
}

/// What [`TcpLayer::receive_sub`] handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum TcpEvent {
    Data(Vec<u8>),
    PeerClosed,
}

/// Connection state plus the narrow [`NetDevice`]/[`Rng`] collaborators
/// needed to drive it. One `TcpLayer` models one connection (or one
/// not-yet-connected listener).
pub struct TcpLayer<'a, D: NetDevice, R: Rng> {
    device: &'a D,
    rng: R,
    my_ip: Ipv4Addr,
    my_port: Port,
    peer_ip: Ipv4Addr,
    peer_port: Port,
    state: TcpState,
    /// The flag mask currently expected on an inbound segment (also the
    /// mask most recently transmitted) — the connection's "session type".
    session_type: TcpFlags,
    seq: u32,
    ack: u32,
    last_sent_len: u32,
    mss: u16,
}

impl<'a, D: NetDevice, R: Rng> TcpLayer<'a, D, R> {
    pub fn new(device: &'a D, rng: R, my_port: Port) -> Self {
        Self {
            device,
            rng,
            my_ip: device.local_ip(),
            my_port,
            peer_ip: Ipv4Addr::UNSPECIFIED,
            peer_port: Port::ANY,
            state: TcpState::Closed,
            session_type: TcpFlags::empty(),
            seq: 0,
            ack: 0,
            last_sent_len: 0,
            mss: crate::config::TCP_MSS,
        }
    }

    pub fn bind_peer(&mut self, peer_ip: Ipv4Addr, peer_port: Port) {
        self.peer_ip = peer_ip;
        self.peer_port = peer_port;
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn ack(&self) -> u32 {
        self.ack
    }

    pub fn mss(&self) -> u16 {
        self.mss
    }

    /// Drop when destined for a different port than ours, or (once a peer
    /// is bound) sourced from a different port than theirs, or carrying a
    /// flag-set that doesn't match what we currently expect — unless FIN is
    /// set, which is always accepted.
    fn filter_packet(&self, header: &TcpHeader) -> bool {
        if header.dport != self.my_port.0 {
            return false;
        }
        if !self.peer_port.is_any() && header.sport != self.peer_port.0 {
            return false;
        }
        if header.flags.contains(TcpFlags::FIN) {
            return true;
        }
        (header.flags & super::packet::SESSION_MASK) == (self.session_type & super::packet::SESSION_MASK)
    }

    fn receive_one(&self) -> Option<(TcpHeader, Vec<u8>)> {
        let (src_ip, bytes) = self.device.recv(TCP_PROTOCOL)?;
        if !self.peer_ip_matches(src_ip) {
            return None;
        }
        let header = TcpHeader::from_bytes(&bytes)?;
        if !self.filter_packet(&header) {
            return None;
        }
        let body = bytes.get(TCP_HEADER_LEN..).unwrap_or(&[]).to_vec();
        Some((header, body))
    }

    fn peer_ip_matches(&self, src_ip: Ipv4Addr) -> bool {
        self.peer_ip == Ipv4Addr::UNSPECIFIED || self.peer_ip == src_ip
    }

    /// Builds, checksums, and hands a segment to the device. Fails closed
    /// (no state change made by the caller's match arm survives) when the
    /// peer port is still unbound — there's no destination to address a
    /// segment to yet.
    fn transmit_segment(&self, seq: u32, ack: u32, flags: TcpFlags, payload: &[u8]) -> Result<(), SchedError> {
        if self.peer_port.is_any() {
            return Err(SchedError::Unexpected);
        }
        let mut header = TcpHeader {
            sport: self.my_port.0,
            dport: self.peer_port.0,
            seq,
            ack,
            flags,
            window: 0xffff,
            checksum: 0,
        };
        let mut segment = Vec::with_capacity(TCP_HEADER_LEN + payload.len());
        segment.extend_from_slice(&header.to_bytes());
        segment.extend_from_slice(payload);
        header.checksum = tcp_checksum(self.my_ip, self.peer_ip, &segment);
        segment[16..18].copy_from_slice(&header.checksum.to_be_bytes());
        self.device
            .send(self.peer_ip, TCP_PROTOCOL, &segment)
            .map_err(|_| SchedError::TxFailure)
    }

    /// Active open. `Closed -> SynSent -> Established`.
    pub fn connect(&mut self) -> Result<(), SchedError> {
        if self.state == TcpState::Closed {
            let isn = self.rng.next_u32();
            self.transmit_segment(isn, 0, TcpFlags::SYN, &[])?;
            self.seq = isn;
            self.ack = 0;
            self.state = TcpState::SynSent;
        }
        if self.state != TcpState::SynSent {
            return Err(SchedError::Unexpected);
        }
        self.session_type = TcpFlags::SYN | TcpFlags::ACK;
        let Some((header, _)) = self.receive_one() else {
            return Err(SchedError::NoRxPacket);
        };
        if !header.flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
            return Err(SchedError::Unexpected);
        }
        if header.ack != self.seq.wrapping_add(1) {
            return Err(SchedError::AckFailure);
        }
        self.ack = header.seq.wrapping_add(1);
        self.seq = self.seq.wrapping_add(1);
        self.transmit_segment(self.seq, self.ack, TcpFlags::ACK, &[])?;
        self.session_type = TcpFlags::ACK;
        self.state = TcpState::Established;
        Ok(())
    }

    /// Passive open. `Closed -> Listen -> SynSent -> Established`.
    pub fn listen(&mut self) -> Result<(), SchedError> {
        if self.state == TcpState::Closed {
            self.session_type = TcpFlags::SYN;
            let Some((header, _)) = self.receive_one() else {
                return Err(SchedError::NoRxPacket);
            };
            if !header.flags.contains(TcpFlags::SYN) {
                return Err(SchedError::Unexpected);
            }
            if self.peer_port.is_any() {
                self.peer_port = Port(header.sport);
            }
            self.ack = header.seq.wrapping_add(1);
            self.state = TcpState::Listen;
        }
        if self.state == TcpState::Listen {
            let isn = self.rng.next_u32();
            self.transmit_segment(isn, self.ack, TcpFlags::SYN | TcpFlags::ACK, &[])?;
            self.seq = isn;
            self.state = TcpState::SynSent;
        }
        if self.state != TcpState::SynSent {
            return Err(SchedError::Unexpected);
        }
        self.session_type = TcpFlags::ACK;
        let Some((header, _)) = self.receive_one() else {
            return Err(SchedError::NoRxPacket);
        };
        if header.seq != self.ack || header.ack != self.seq.wrapping_add(1) {
            return Err(SchedError::AckFailure);
        }
        self.seq = self.seq.wrapping_add(1);
        self.state = TcpState::Established;
        Ok(())
    }

    /// Sends one data segment and waits for its ACK.
    /// `Established -> AckWait -> Established`. Returns the number of bytes
    /// the peer acknowledged.
    pub fn transmit_sub(&mut self, data: &[u8]) -> Result<usize, SchedError> {
        if self.state == TcpState::Established {
            self.transmit_segment(self.seq, self.ack, TcpFlags::ACK | TcpFlags::PSH, data)?;
            self.last_sent_len = data.len() as u32;
            self.state = TcpState::AckWait;
        }
        if self.state != TcpState::AckWait {
            return Err(SchedError::Unexpected);
        }
        self.session_type = TcpFlags::ACK;
        let Some((header, _)) = self.receive_one() else {
            return Err(SchedError::NoRxPacket);
        };
        if header.seq != self.ack || header.ack != self.seq.wrapping_add(self.last_sent_len) {
            return Err(SchedError::NoAck);
        }
        self.seq = self.seq.wrapping_add(self.last_sent_len);
        self.state = TcpState::Established;
        Ok(self.last_sent_len as usize)
    }

    /// Polls for one inbound segment while `Established`. A plain data
    /// segment is ACKed immediately and returned; a FIN detected here hands
    /// off to [`Self::close_ack`] instead (`Established -> CloseWait ->
    /// LastAck -> Closed`).
    pub fn receive_sub(&mut self) -> Result<TcpEvent, SchedError> {
        if self.state != TcpState::Established {
            return Err(SchedError::Unexpected);
        }
        self.session_type = TcpFlags::ACK;
        let Some((header, body)) = self.receive_one() else {
            return Err(SchedError::NoRxPacket);
        };
        if header.flags.contains(TcpFlags::FIN) && self.session_type.contains(TcpFlags::ACK) {
            self.ack = header.seq.wrapping_add(1);
            self.seq = header.ack;
            // The final ACK of the close handshake is best-effort: whether
            // or not it verifies, the connection is gone locally and the
            // caller needs to see `PeerClosed`, not a transient tx/ack error.
            let _ = self.close_ack();
            return Ok(TcpEvent::PeerClosed);
        }
        if body.is_empty() {
            return Err(SchedError::NoRxPacket);
        }
        self.ack = header.seq.wrapping_add(body.len() as u32);
        self.transmit_segment(self.seq, self.ack, TcpFlags::ACK, &[])?;
        Ok(TcpEvent::Data(body))
    }

    /// Peer-initiated close: ACK the FIN, send our own FIN+ACK, wait for
    /// the final ACK, then reset to `Closed` regardless of whether that
    /// last ACK ever arrives — the connection is gone locally either way,
    /// and with no retransmission timer there's nothing to wait on (the
    /// caller sees the error; the state machine doesn't hang waiting for a
    /// peer that's already torn down).
    fn close_ack(&mut self) -> Result<(), SchedError> {
        self.state = TcpState::CloseWait;
        self.transmit_segment(self.seq, self.ack, TcpFlags::ACK, &[])?;
        self.state = TcpState::LastAck;
        self.transmit_segment(self.seq, self.ack, TcpFlags::FIN | TcpFlags::ACK, &[])?;
        self.session_type = TcpFlags::ACK;
        let result = match self.receive_one() {
            Some((header, _)) if header.flags.contains(TcpFlags::ACK) && header.ack == self.seq.wrapping_add(1) => Ok(()),
            Some(_) => Err(SchedError::AckFailure),
            None => Err(SchedError::NoAck),
        };
        self.state = TcpState::Closed;
        self.seq = 0;
        self.ack = 0;
        result
    }

    /// Active close. `Established -> FinWait1 -> FinWait2 -> Closed`.
    pub fn shutup(&mut self) -> Result<(), SchedError> {
        if self.state == TcpState::Established {
            self.transmit_segment(self.seq, self.ack, TcpFlags::FIN | TcpFlags::ACK, &[])?;
            self.state = TcpState::FinWait1;
        }
        if self.state == TcpState::FinWait1 {
            self.session_type = TcpFlags::ACK;
            let Some((header, _)) = self.receive_one() else {
                return Err(SchedError::NoRxPacket);
            };
            if header.seq != self.ack || header.ack != self.seq.wrapping_add(1) {
                return Err(SchedError::AckFailure);
            }
            self.seq = self.seq.wrapping_add(1);
            self.state = TcpState::FinWait2;
        }
        if self.state != TcpState::FinWait2 {
            return Err(SchedError::Unexpected);
        }
        self.session_type = TcpFlags::FIN | TcpFlags::ACK;
        let Some((header, _)) = self.receive_one() else {
            return Err(SchedError::NoRxPacket);
        };
        if !header.flags.contains(TcpFlags::FIN) || header.seq != self.ack || header.ack != self.seq {
            return Err(SchedError::Unexpected);
        }
        let final_ack = header.seq.wrapping_add(1);
        self.transmit_segment(self.seq, final_ack, TcpFlags::ACK, &[])?;
        self.state = TcpState::Closed;
        self.seq = 0;
        self.ack = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::stack::CounterRng;
    use alloc::collections::VecDeque;
    use core::cell::RefCell;

    /// A loopback `NetDevice` double: whatever is `send`, the peer's
    /// `recv` sees, and vice versa — wired manually per test so each side
    /// can drain the other's outbox on demand (no background thread).
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
        fn send(&self, _dst: Ipv4Addr, _protocol: u8, segment: &[u8]) -> Result<(), SchedError> {
            // Tests pull from a peer's `sent` list explicitly instead of
            // pushing straight into the other side's inbox here, so each
            // step of the handshake can be inspected.
            let _ = segment;
            Ok(())
        }
        fn recv(&self, _protocol: u8) -> Option<(Ipv4Addr, Vec<u8>)> {
            self.inbox.borrow_mut().pop_front()
        }
    }

    fn deliver(dev: &LoopbackDevice, from: Ipv4Addr, segment: Vec<u8>) {
        dev.inbox.borrow_mut().push_back((from, segment));
    }

    /// Builds the segment a `TcpLayer` would send for `(seq, ack, flags,
    /// payload)` between `from`/`to`, for feeding straight into a peer's
    /// `LoopbackDevice` inbox without running a second full `TcpLayer`.
    fn raw_segment(from_port: u16, to_port: u16, seq: u32, ack: u32, flags: TcpFlags, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
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
    fn active_open_reaches_established() {
        let client_ip = Ipv4Addr::new(10, 0, 0, 1);
        let server_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(client_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(100), Port(5000));
        tcp.bind_peer(server_ip, Port(80));

        // Before the peer has replied, connect() transmits SYN and then
        // reports the transient "nothing to read yet" error.
        assert_eq!(tcp.connect(), Err(SchedError::NoRxPacket));
        assert_eq!(tcp.state(), TcpState::SynSent);
        let isn = tcp.seq();

        let server_isn = 9000u32;
        let syn_ack = raw_segment(80, 5000, server_isn, isn.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK, server_ip, client_ip, &[]);
        deliver(&dev, server_ip, syn_ack);

        assert_eq!(tcp.connect(), Ok(()));
        assert_eq!(tcp.state(), TcpState::Established);
        assert_eq!(tcp.seq(), isn.wrapping_add(1));
        assert_eq!(tcp.ack(), server_isn.wrapping_add(1));
    }

    #[test]
    fn active_open_rejects_tampered_ack() {
        let client_ip = Ipv4Addr::new(10, 0, 0, 1);
        let server_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(client_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(1), Port(5000));
        tcp.bind_peer(server_ip, Port(80));
        let _ = tcp.connect();
        let isn = tcp.seq();

        let bad_syn_ack = raw_segment(80, 5000, 42, isn, TcpFlags::SYN | TcpFlags::ACK, server_ip, client_ip, &[]);
        deliver(&dev, server_ip, bad_syn_ack);
        assert_eq!(tcp.connect(), Err(SchedError::AckFailure));
        assert_eq!(tcp.state(), TcpState::SynSent, "a failed handshake does not advance state");
    }

    #[test]
    fn passive_open_reaches_established() {
        let server_ip = Ipv4Addr::new(10, 0, 0, 2);
        let client_ip = Ipv4Addr::new(10, 0, 0, 1);
        let dev = LoopbackDevice::new(server_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(500), Port(80));

        let client_isn = 1000u32;
        deliver(&dev, client_ip, raw_segment(5000, 80, client_isn, 0, TcpFlags::SYN, client_ip, server_ip, &[]));
        assert_eq!(tcp.listen(), Err(SchedError::NoRxPacket));
        assert_eq!(tcp.state(), TcpState::SynSent);
        let server_isn = tcp.seq();

        deliver(
            &dev,
            client_ip,
            raw_segment(5000, 80, client_isn.wrapping_add(1), server_isn.wrapping_add(1), TcpFlags::ACK, client_ip, server_ip, &[]),
        );
        assert_eq!(tcp.listen(), Ok(()));
        assert_eq!(tcp.state(), TcpState::Established);
    }

    #[test]
    fn transmit_sub_advances_seq_on_matching_ack() {
        let a_ip = Ipv4Addr::new(10, 0, 0, 1);
        let b_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(a_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(1), Port(5000));
        tcp.bind_peer(b_ip, Port(80));
        establish(&mut tcp, &dev, a_ip, b_ip, 200);

        let seq_before = tcp.seq();
        let payload = b"hello";
        assert_eq!(tcp.transmit_sub(payload), Err(SchedError::NoRxPacket));
        assert_eq!(tcp.state(), TcpState::AckWait);

        deliver(
            &dev,
            b_ip,
            raw_segment(80, 5000, tcp.ack(), seq_before.wrapping_add(payload.len() as u32), TcpFlags::ACK, b_ip, a_ip, &[]),
        );
        assert_eq!(tcp.transmit_sub(payload), Ok(payload.len()));
        assert_eq!(tcp.state(), TcpState::Established);
        assert_eq!(tcp.seq(), seq_before.wrapping_add(payload.len() as u32));
    }

    #[test]
    fn transmit_sub_reports_no_ack_without_retransmitting() {
        let a_ip = Ipv4Addr::new(10, 0, 0, 1);
        let b_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(a_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(1), Port(5000));
        tcp.bind_peer(b_ip, Port(80));
        establish(&mut tcp, &dev, a_ip, b_ip, 200);

        assert_eq!(tcp.transmit_sub(b"x"), Err(SchedError::NoRxPacket));
        assert_eq!(tcp.transmit_sub(b"x"), Err(SchedError::NoRxPacket), "no packet arrived yet, state stays AckWait");
        assert_eq!(tcp.state(), TcpState::AckWait);
    }

    #[test]
    fn shutup_completes_graceful_close() {
        let a_ip = Ipv4Addr::new(10, 0, 0, 1);
        let b_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(a_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(1), Port(5000));
        tcp.bind_peer(b_ip, Port(80));
        establish(&mut tcp, &dev, a_ip, b_ip, 200);

        let x = tcp.seq();
        let y = tcp.ack();

        assert_eq!(tcp.shutup(), Err(SchedError::NoRxPacket));
        assert_eq!(tcp.state(), TcpState::FinWait1);

        deliver(&dev, b_ip, raw_segment(80, 5000, y, x.wrapping_add(1), TcpFlags::ACK, b_ip, a_ip, &[]));
        assert_eq!(tcp.shutup(), Err(SchedError::NoRxPacket));
        assert_eq!(tcp.state(), TcpState::FinWait2);

        deliver(&dev, b_ip, raw_segment(80, 5000, y, x.wrapping_add(1), TcpFlags::FIN | TcpFlags::ACK, b_ip, a_ip, &[]));
        assert_eq!(tcp.shutup(), Ok(()));
        assert_eq!(tcp.state(), TcpState::Closed);
        assert_eq!(tcp.seq(), 0);
        assert_eq!(tcp.ack(), 0);
    }

    #[test]
    fn receive_sub_peer_fin_closes_connection() {
        let a_ip = Ipv4Addr::new(10, 0, 0, 1);
        let b_ip = Ipv4Addr::new(10, 0, 0, 2);
        let dev = LoopbackDevice::new(a_ip);
        let mut tcp = TcpLayer::new(&dev, CounterRng(1), Port(5000));
        tcp.bind_peer(b_ip, Port(80));
        establish(&mut tcp, &dev, a_ip, b_ip, 200);

        let x = tcp.seq();
        let y = tcp.ack();
        deliver(&dev, b_ip, raw_segment(80, 5000, y, x, TcpFlags::FIN | TcpFlags::ACK, b_ip, a_ip, &[]));

        match tcp.receive_sub() {
            Ok(TcpEvent::PeerClosed) => {}
            other => panic!("expected PeerClosed, got {other:?}"),
        }
        assert_eq!(tcp.state(), TcpState::Closed);
    }

    /// Drives `tcp` (bound to `a_ip`/port 5000) through a full active open
    /// against a synthetic peer at `b_ip`/port 80, without a second
    /// `TcpLayer` on the other end. The client ISN is read back from `tcp`
    /// itself after the first `connect()` rather than hardcoded, since it
    /// comes from whatever `Rng` the caller seeded `tcp` with.
    fn establish(tcp: &mut TcpLayer<LoopbackDevice, CounterRng>, dev: &LoopbackDevice, a_ip: Ipv4Addr, b_ip: Ipv4Addr, server_isn: u32) {
        let _ = tcp.connect();
        let client_isn = tcp.seq();
        deliver(
            dev,
            b_ip,
            raw_segment(80, 5000, server_isn, client_isn.wrapping_add(1), TcpFlags::SYN | TcpFlags::ACK, b_ip, a_ip, &[]),
        );
        assert_eq!(tcp.connect(), Ok(()));
        debug_assert_eq!(tcp.state(), TcpState::Established);
        let _ = a_ip;
    }
}
