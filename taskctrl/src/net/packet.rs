//! TCP wire format: header layout, flags, and the IPv4-pseudo-header
//! checksum.
//!
//! Bit-exact layout (network byte order), 20 bytes with no options:
//!
//! ```text
//!  0              1              2              3
//!  +--------------+--------------+--------------+--------------+
//!  |            sport            |            dport            |
//!  +--------------+--------------+--------------+--------------+
//!  |                        sequence number                    |
//!  +--------------+--------------+--------------+--------------+
//!  |                     acknowledgement number                |
//!  +--------------+--------------+--------------+--------------+
//!  | hlen | rsvd  |  CWR ECE URG ACK PSH RST SYN FIN |  window  |
//!  +--------------+--------------+--------------+--------------+
//!  |           checksum          |        urgent pointer       |
//!  +--------------+--------------+--------------+--------------+
//! ```

use bitflags::bitflags;

pub const TCP_HEADER_LEN: usize = 20;

/// An IPv4 address, network-byte-order octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    pub const UNSPECIFIED: Ipv4Addr = Ipv4Addr([0, 0, 0, 0]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }
}

/// A TCP port. `ANY` (0) matches any peer port in
/// [`super::tcp::TcpLayer::filter_packet`] — the "peer port unbound"
/// wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port(pub u16);

impl Port {
    pub const ANY: Port = Port(0);

    pub fn is_any(self) -> bool {
        self.0 == 0
    }
}

bitflags! {
    /// The eight single-bit TCP flags, byte 13 of the header (LSB = FIN).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u8 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
        const ECE = 0b0100_0000;
        const CWR = 0b1000_0000;
    }
}

/// The session-type mask [`super::tcp::TcpLayer::filter_packet`] checks
/// against — only FIN/SYN/RST/ACK participate in the four-bit session
/// mask; the rest (PSH/URG/ECE/CWR) never gate a state transition.
pub const SESSION_MASK: TcpFlags = TcpFlags::FIN
    .union(TcpFlags::SYN)
    .union(TcpFlags::RST)
    .union(TcpFlags::ACK);

/// A decoded/encoded TCP segment header. The payload that follows is kept
/// alongside it by callers rather than inside this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub sport: u16,
    pub dport: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
}

impl TcpHeader {
    pub fn to_bytes(self) -> [u8; TCP_HEADER_LEN] {
        let mut buf = [0u8; TCP_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.sport.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dport.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack.to_be_bytes());
        buf[12] = ((TCP_HEADER_LEN / 4) as u8) << 4;
        buf[13] = self.flags.bits();
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        buf[18..20].copy_from_slice(&0u16.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < TCP_HEADER_LEN {
            return None;
        }
        Some(Self {
            sport: u16::from_be_bytes([buf[0], buf[1]]),
            dport: u16::from_be_bytes([buf[2], buf[3]]),
            seq: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ack: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            flags: TcpFlags::from_bits_truncate(buf[13]),
            window: u16::from_be_bytes([buf[14], buf[15]]),
            checksum: u16::from_be_bytes([buf[16], buf[17]]),
        })
    }
}

/// Folds a running 32-bit ones'-complement sum down to 16 bits.
fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

fn sum_be_words(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u32;
    }
    sum
}

/// Computes the ones'-complement checksum over the IPv4 pseudo-header
/// (source ip, dest ip, zero, protocol = 6, tcp length) followed by the
/// TCP header+body. The header's own checksum field must be zero in
/// `segment` before calling this, the same way a caller zeroes it before
/// filling it in.
pub fn tcp_checksum(src: Ipv4Addr, dst: Ipv4Addr, segment: &[u8]) -> u16 {
    const TCP_PROTOCOL: u8 = 6;
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.0);
    pseudo[4..8].copy_from_slice(&dst.0);
    pseudo[9] = TCP_PROTOCOL;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    let sum = sum_be_words(&pseudo) + sum_be_words(segment);
    !fold(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn header_round_trips_through_bytes() {
        let h = TcpHeader {
            sport: 12345,
            dport: 80,
            seq: 0xdead_beef,
            ack: 0x1234_5678,
            flags: TcpFlags::SYN | TcpFlags::ACK,
            window: 0xffff,
            checksum: 0,
        };
        let bytes = h.to_bytes();
        let back = TcpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(back.sport, h.sport);
        assert_eq!(back.dport, h.dport);
        assert_eq!(back.seq, h.seq);
        assert_eq!(back.ack, h.ack);
        assert_eq!(back.flags, h.flags);
        assert_eq!(back.window, h.window);
    }

    #[test]
    fn flag_byte_orders_fin_as_lsb() {
        let h = TcpHeader {
            sport: 0,
            dport: 0,
            seq: 0,
            ack: 0,
            flags: TcpFlags::FIN,
            window: 0,
            checksum: 0,
        };
        assert_eq!(h.to_bytes()[13], 0b0000_0001);
    }

    #[test]
    fn checksum_of_self_verifies_to_zero() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let mut h = TcpHeader {
            sport: 1000,
            dport: 80,
            seq: 1,
            ack: 2,
            flags: TcpFlags::ACK,
            window: 0xffff,
            checksum: 0,
        };
        let segment: Vec<u8> = h.to_bytes().to_vec();
        h.checksum = tcp_checksum(src, dst, &segment);
        let verify_segment = h.to_bytes();
        // Re-verifying: sum of header-with-checksum-filled plus pseudo
        // header, ones-complemented, must fold to zero.
        let full_sum = {
            let mut pseudo = [0u8; 12];
            pseudo[0..4].copy_from_slice(&src.0);
            pseudo[4..8].copy_from_slice(&dst.0);
            pseudo[9] = 6;
            pseudo[10..12].copy_from_slice(&(verify_segment.len() as u16).to_be_bytes());
            fold(sum_be_words(&pseudo) + sum_be_words(&verify_segment))
        };
        assert_eq!(full_sum, 0xffff, "ones-complement verify sum must be all-ones");
    }
}
