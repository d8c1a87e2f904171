//! Unified error type for pad2mqtt.
//!
//! We avoid `alloc` - all variants carry only fixed-size data. On-target
//! builds derive `defmt::Format` for efficient logging.
//!
//! Protocol-level parse failures (malformed pong timestamps, bad color
//! triples, out-of-range key indices) are deliberately NOT represented
//! here: those are dropped silently at the router per the wire-protocol
//! contract and must never surface as errors.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Wireless link
    /// The link layer refused or failed the association attempt.
    LinkConnectFailed,

    // Broker session
    /// TCP connect or MQTT CONNECT/CONNACK handshake failed.
    ConnectFailed,

    /// Broker rejected or dropped a SUBSCRIBE.
    SubscribeFailed,

    /// A publish could not be written to the transport.
    PublishFailed,

    /// Reading from the transport failed mid-packet.
    ReceiveFailed,

    /// The peer sent bytes that do not parse as MQTT 3.1.1.
    ProtocolViolation,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,

    /// Operation timed out.
    Timeout,
}
