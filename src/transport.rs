//! Boundaries to the wireless link and the broker transport.
//!
//! The library never talks to a radio or a socket directly; the embedded
//! binary supplies implementations of these traits (cyw43 + embassy-net)
//! and host tests supply mocks. All fallible operations report failure
//! through [`Error`] values - nothing here panics or retries on its own;
//! retry policy belongs to the connectivity state machine.

use crate::error::Error;
use heapless::{String, Vec};

/// Capacity for inbound topic names. Topics are `<root>/<suffix>` with a
/// short root and at most `<index>/<verb>` suffixes.
pub const TOPIC_CAPACITY: usize = 64;

/// Capacity for inbound payloads. The longest well-formed payload is an
/// `r,g,b` triple with stray spaces.
pub const PAYLOAD_CAPACITY: usize = 64;

/// One message delivered by the broker, owned so it outlives the
/// transport's receive buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String<TOPIC_CAPACITY>,
    pub payload: Vec<u8, PAYLOAD_CAPACITY>,
}

impl InboundMessage {
    /// Build from borrowed parts, failing when either exceeds the fixed
    /// capacities (oversized messages are dropped by the transport).
    pub fn from_parts(topic: &str, payload: &[u8]) -> Option<Self> {
        Some(Self {
            topic: String::try_from(topic).ok()?,
            payload: Vec::from_slice(payload).ok()?,
        })
    }
}

/// Association state of the wireless link, polled rather than
/// event-driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    Ready,
    Pending,
    Failed,
}

/// The wireless (station-mode) link.
#[allow(async_fn_in_trait)]
pub trait WirelessLink {
    /// Power up the radio.
    async fn activate(&mut self);

    /// Begin association with the configured network.
    async fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Error>;

    /// Current association state.
    async fn status(&mut self) -> LinkStatus;
}

/// The publish/subscribe broker session.
///
/// `poll_inbound` hands over at most one queued message per call and
/// never blocks waiting for one; the button/message loop drains it once
/// per tick.
#[allow(async_fn_in_trait)]
pub trait BrokerTransport {
    async fn connect(&mut self) -> Result<(), Error>;
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error>;
    async fn subscribe(&mut self, pattern: &str) -> Result<(), Error>;
    async fn poll_inbound(&mut self) -> Result<Option<InboundMessage>, Error>;
}
