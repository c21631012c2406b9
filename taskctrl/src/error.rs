//! Socket return codes and the scheduler's own error type.
//!
//! The TCP/socket layer returns a signed code rather than a `Result` at its
//! outermost FFI-shaped surface (`Socket::read`/`write`/...), since that
//! surface is what a polling userspace shim or a syscall boundary
//! ultimately marshals across. Every other layer inside this crate uses
//! `Result<T, SchedError>`.

pub type SocketCode = i64;

pub const RETURN_SUCCESS: SocketCode = 0;
pub const RETURN_ALREADY_ESTABLISHED: SocketCode = 1;
pub const RETURN_CONNECTION_CLOSED: SocketCode = 2;

pub const ERROR_UNKNOWN: SocketCode = -0x1;
pub const ERROR_NO_DEVICE: SocketCode = -0x100;
pub const ERROR_NO_DEVICE_SPACE: SocketCode = -0x101;
pub const ERROR_ALLOC_FAILURE: SocketCode = -0x102;
pub const ERROR_OUT_OF_BUFFER: SocketCode = -0x103;
pub const ERROR_TX_FAILURE: SocketCode = -0x104;
pub const ERROR_NO_RX_PACKET: SocketCode = -0x105;
pub const ERROR_ACK_FAILURE: SocketCode = -0x106;
pub const ERROR_NO_ACK: SocketCode = -0x1000;
pub const ERROR_UNEXPECTED: SocketCode = -0x10000;

/// Error type used by every in-crate API that isn't a raw socket code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// No device/interface is bound yet.
    NoDevice,
    /// The protocol stack ran out of layer slots.
    NoDeviceSpace,
    /// A packet/layer allocation failed.
    AllocFailure,
    /// The caller's buffer was smaller than the available data.
    OutOfBuffer,
    /// Transmitting the packet failed at the device layer.
    TxFailure,
    /// No packet was available to receive.
    NoRxPacket,
    /// A peer ACK never arrived (or was invalid) within the expected window.
    NoAck,
    /// A received segment's ack/seq field didn't match what the state
    /// machine expected, distinct from [`SchedError::NoAck`]'s "nothing
    /// arrived at all".
    AckFailure,
    /// The TCP state machine received a segment it can't make sense of in
    /// its current state.
    Unexpected,
}

impl SchedError {
    pub const fn as_socket_code(self) -> SocketCode {
        match self {
            SchedError::NoDevice => ERROR_NO_DEVICE,
            SchedError::NoDeviceSpace => ERROR_NO_DEVICE_SPACE,
            SchedError::AllocFailure => ERROR_ALLOC_FAILURE,
            SchedError::OutOfBuffer => ERROR_OUT_OF_BUFFER,
            SchedError::TxFailure => ERROR_TX_FAILURE,
            SchedError::NoRxPacket => ERROR_NO_RX_PACKET,
            SchedError::NoAck => ERROR_NO_ACK,
            SchedError::AckFailure => ERROR_ACK_FAILURE,
            SchedError::Unexpected => ERROR_UNEXPECTED,
        }
    }
}

impl core::fmt::Display for SchedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            SchedError::NoDevice => "no device bound",
            SchedError::NoDeviceSpace => "no space left in the protocol stack",
            SchedError::AllocFailure => "allocation failure",
            SchedError::OutOfBuffer => "caller buffer too small",
            SchedError::TxFailure => "packet transmit failed",
            SchedError::NoRxPacket => "no packet available",
            SchedError::NoAck => "peer did not acknowledge in time",
            SchedError::AckFailure => "peer ack did not match expected seq/ack",
            SchedError::Unexpected => "unexpected protocol state",
        };
        f.write_str(msg)
    }
}
