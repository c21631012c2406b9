//! A hand-rolled TCP client/server built on a narrow `NetDevice` contract
//! for everything below it.

pub mod packet;
pub mod socket;
pub mod stack;
pub mod tcp;

pub use packet::{Ipv4Addr, Port, TcpFlags, TcpHeader};
pub use socket::{Socket, DEFAULT_INTERFACE};
pub use stack::{CounterRng, LayerKind, NetDevice, Rng, TCP_PROTOCOL};
pub use tcp::{TcpEvent, TcpLayer, TcpState};
