//! Protocol stack scaffolding: the narrow interface [`TcpLayer`] needs from
//! whatever sits underneath it.
//!
//! The packet buffer allocator and the Ethernet/IP layers underneath TCP
//! are out of scope here — external collaborators referenced only by their
//! contract. [`NetDevice`] is that contract: a bound network interface
//! that can hand a fully-formed IPv4 payload down to Ethernet/IP for
//! transmission and poll for the next inbound one addressed to this host,
//! with `protocol` already demultiplexed. [`crate::net::tcp::TcpLayer`] is
//! written entirely against this trait; a real kernel plugs in its
//! Ethernet/IPv4 layers, tests plug in a loopback double.
//!
//! [`LayerKind`] is a tagged enum standing in for a virtual-dispatch layer
//! chain: the socket façade uses it purely for bookkeeping (which concrete
//! stage a constructed stack is currently at) since there's exactly one
//! concrete chain this crate builds (`Tcp` over an opaque `NetDevice`), not
//! an open set of interchangeable layers to dispatch across.

use alloc::vec::Vec;

use super::packet::Ipv4Addr;
use crate::error::SchedError;

/// Which stage of the bottom-up chain a layer occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Base,
    Ethernet,
    Ipv4,
    Tcp,
    Socket,
}

/// The IPv4-and-below collaborator a [`super::tcp::TcpLayer`] is built on.
///
/// `protocol` is always 6 (TCP) for the calls this crate makes; the trait
/// takes it explicitly so a single `NetDevice` impl could in principle
/// demultiplex more than one upper protocol.
pub trait NetDevice: Send + Sync {
    /// This host's bound IPv4 address (0.0.0.0 before the interface is up).
    fn local_ip(&self) -> Ipv4Addr;

    /// Hands a fully-prepared TCP segment (header + body) down to be
    /// wrapped in IPv4/Ethernet and sent to `dst`.
    fn send(&self, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> Result<(), SchedError>;

    /// Polls (non-blocking) for the next inbound segment of `protocol`
    /// addressed to this host. `None` means nothing is queued right now —
    /// not an error; the caller decides whether to poll again.
    fn recv(&self, protocol: u8) -> Option<(Ipv4Addr, Vec<u8>)>;
}

/// Initial-sequence-number source. A pluggable trait rather than a
/// dependency on an RNG crate, since a kernel-side caller supplies one
/// seeded from its own entropy and tests want a deterministic one (see
/// [`CounterRng`]).
pub trait Rng: Send + Sync {
    fn next_u32(&mut self) -> u32;
}

/// An `Rng` that returns a fixed sequence, useful for deterministic tests
/// and documented in DESIGN.md as the default when a consumer hasn't
/// wired in an entropy source.
pub struct CounterRng(pub u32);

impl Rng for CounterRng {
    fn next_u32(&mut self) -> u32 {
        let v = self.0;
        self.0 = self.0.wrapping_add(1);
        v
    }
}

pub const TCP_PROTOCOL: u8 = 6;
