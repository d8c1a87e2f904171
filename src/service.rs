//! Shared device context, the broker session wrapper, and the tick
//! bodies of the cooperative loops.
//!
//! The embedded binary wraps a [`Device`] in a mutex and runs one task
//! per loop; each task locks, runs a tick body to completion, unlocks
//! and sleeps. Nothing in here sleeps on its own, which is what keeps
//! the loops from stalling each other.

use core::fmt::Write;
use core::future::Future;

use crate::config::{RESET_COMBO, TOPIC_ROOT};
use crate::error::Error;
use crate::keypad::{Keypad, KeypadDriver};
use crate::link::Connectivity;
use crate::router;
use crate::transport::{BrokerTransport, InboundMessage, LinkStatus, WirelessLink, TOPIC_CAPACITY};
use heapless::String;

/// Upper bound for outbound payloads: 16 comma-joined indices or one
/// decimal timestamp.
const OUTBOUND_CAPACITY: usize = 64;

/// The broker session: client identity, the topic namespace root and
/// exclusive ownership of the connection handle. Every publish in the
/// system goes through here.
pub struct Session<T: BrokerTransport> {
    transport: T,
    root: &'static str,
}

impl<T: BrokerTransport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            root: TOPIC_ROOT,
        }
    }

    pub fn root(&self) -> &'static str {
        self.root
    }

    /// Connect and subscribe to the full namespace (`<root>/#`).
    pub async fn open(&mut self) -> Result<(), Error> {
        self.transport.connect().await?;
        let mut pattern: String<TOPIC_CAPACITY> = String::new();
        write!(pattern, "{}/#", self.root).map_err(|_| Error::BufferOverflow)?;
        self.transport.subscribe(&pattern).await
    }

    /// Publish a heartbeat request carrying the current timestamp.
    pub async fn publish_heartbeat(&mut self, now: u64) -> Result<(), Error> {
        let mut topic: String<TOPIC_CAPACITY> = String::new();
        write!(topic, "{}/ping", self.root).map_err(|_| Error::BufferOverflow)?;
        let mut payload: String<OUTBOUND_CAPACITY> = String::new();
        write!(payload, "{}", now).map_err(|_| Error::BufferOverflow)?;
        self.transport.publish(&topic, payload.as_bytes()).await
    }

    /// Publish a press event: comma-joined indices, ascending.
    pub async fn publish_keypress(&mut self, pressed: &[usize]) -> Result<(), Error> {
        let mut topic: String<TOPIC_CAPACITY> = String::new();
        write!(topic, "{}/keypressed", self.root).map_err(|_| Error::BufferOverflow)?;
        let mut payload: String<OUTBOUND_CAPACITY> = String::new();
        for (position, index) in pressed.iter().enumerate() {
            if position > 0 {
                payload.push(',').map_err(|_| Error::BufferOverflow)?;
            }
            write!(payload, "{}", index).map_err(|_| Error::BufferOverflow)?;
        }
        self.transport.publish(&topic, payload.as_bytes()).await
    }

    pub async fn poll_inbound(&mut self) -> Result<Option<InboundMessage>, Error> {
        self.transport.poll_inbound().await
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Shared mutable orchestration state, passed by reference to all three
/// loops so the state machine stays testable in isolation.
pub struct Device<D: KeypadDriver, T: BrokerTransport> {
    pub keypad: Keypad<D>,
    pub link: Connectivity,
    pub session: Session<T>,
}

impl<D: KeypadDriver, T: BrokerTransport> Device<D, T> {
    pub fn new(keypad: Keypad<D>, session: Session<T>) -> Self {
        Self {
            keypad,
            link: Connectivity::new(),
            session,
        }
    }
}

/// What a tick body asks of its task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    Continue,
    /// Hard device restart, right now. In-flight network state is
    /// abandoned.
    Restart,
}

/// The operator escape hatch: exactly the two designated corner keys in
/// one edge sample, either order, nothing else pressed.
pub fn is_reset_combo(pressed: &[usize]) -> bool {
    pressed.len() == 2 && RESET_COMBO.iter().all(|key| pressed.contains(key))
}

/// Startup half one: bring the wireless link up and hold until it
/// reports ready, re-issuing the association on failure. `pause` is the
/// fixed-interval yield between polls (a timed sleep on target, a no-op
/// in tests). Never gives up - the device sits in `Starting` until the
/// link recovers.
pub async fn wait_for_link<L, F, Fut>(link: &mut L, ssid: &str, password: &str, mut pause: F)
where
    L: WirelessLink,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    link.activate().await;
    loop {
        if link.connect(ssid, password).await.is_err() {
            pause().await;
            continue;
        }
        loop {
            match link.status().await {
                LinkStatus::Ready => return,
                LinkStatus::Pending => pause().await,
                LinkStatus::Failed => {
                    pause().await;
                    break;
                }
            }
        }
    }
}

/// One startup attempt: open the broker session and, on success, enter
/// `Running` with the heartbeat baseline set to `now`. The connectivity
/// task calls this in a retry loop with no backoff.
pub async fn open_session<D: KeypadDriver, T: BrokerTransport>(
    device: &mut Device<D, T>,
    now: u64,
) -> bool {
    if device.session.open().await.is_ok() {
        device.link.begin_running(now);
        return true;
    }
    false
}

/// Body of the button/message loop (~100 ms).
pub async fn poll_buttons_tick<D: KeypadDriver, T: BrokerTransport>(
    device: &mut Device<D, T>,
) -> TickOutcome {
    let pressed = device.keypad.sample_pressed_keys();
    if !pressed.is_empty() {
        if is_reset_combo(&pressed) {
            return TickOutcome::Restart;
        }
        if device.link.is_running()
            && device.session.publish_keypress(&pressed).await.is_err()
        {
            device.link.note_transport_failure();
        }
    }

    if device.link.is_running() {
        match device.session.poll_inbound().await {
            Ok(Some(message)) => {
                let root = device.session.root();
                router::route(
                    &message.topic,
                    &message.payload,
                    root,
                    &mut device.keypad,
                    &mut device.link,
                );
            }
            Ok(None) => {}
            Err(_) => device.link.note_transport_failure(),
        }
    }

    TickOutcome::Continue
}

/// First half of the heartbeat cycle: publish the ping. The task then
/// sleeps out the pong window before evaluating liveness.
pub async fn heartbeat_send<D: KeypadDriver, T: BrokerTransport>(
    device: &mut Device<D, T>,
    now: u64,
) {
    if device.link.is_running() && device.session.publish_heartbeat(now).await.is_err() {
        device.link.note_transport_failure();
    }
}

/// Explicit way out of `Down`: reopen the session and resubscribe. The
/// heartbeat baseline is left alone - only a real pong refreshes it.
pub async fn try_reconnect<D: KeypadDriver, T: BrokerTransport>(device: &mut Device<D, T>) {
    if device.link.is_down() && device.session.open().await.is_ok() {
        device.link.resume_running();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkState, Liveness};
    use crate::testing::{MockDriver, MockTransport};
    use embassy_futures::block_on;

    fn device() -> Device<MockDriver, MockTransport> {
        Device::new(
            Keypad::new(MockDriver::new(16)),
            Session::new(MockTransport::new()),
        )
    }

    fn running_device() -> Device<MockDriver, MockTransport> {
        let mut dev = device();
        assert!(block_on(open_session(&mut dev, 1_000)));
        dev
    }

    #[test]
    fn open_session_connects_subscribes_and_baselines() {
        let mut dev = device();
        assert!(block_on(open_session(&mut dev, 1_000)));
        assert_eq!(dev.link.state(), LinkState::Running);
        assert_eq!(dev.link.last_pong(), 1_000);
        let transport = dev.session.transport_mut();
        assert_eq!(transport.connects, 1);
        assert_eq!(transport.subscriptions, vec!["keypad/#".to_string()]);
    }

    #[test]
    fn failed_open_leaves_state_alone() {
        let mut dev = device();
        dev.session.transport_mut().fail_connect = true;
        assert!(!block_on(open_session(&mut dev, 1_000)));
        assert_eq!(dev.link.state(), LinkState::Starting);
    }

    #[test]
    fn press_publishes_comma_joined_indices() {
        let mut dev = running_device();
        dev.keypad.driver_mut().buttons = 0b1000_0000_0101;
        assert_eq!(block_on(poll_buttons_tick(&mut dev)), TickOutcome::Continue);
        let (topic, payload) = dev.session.transport_mut().published.pop().unwrap();
        assert_eq!(topic, "keypad/keypressed");
        assert_eq!(payload, b"0,2,11");
    }

    #[test]
    fn no_press_publishes_nothing() {
        let mut dev = running_device();
        block_on(poll_buttons_tick(&mut dev));
        assert!(dev.session.transport_mut().published.is_empty());
    }

    #[test]
    fn presses_are_swallowed_while_not_running() {
        let mut dev = device();
        dev.keypad.driver_mut().buttons = 0b1;
        block_on(poll_buttons_tick(&mut dev));
        assert!(dev.session.transport_mut().published.is_empty());
    }

    #[test]
    fn publish_failure_degrades_to_down() {
        let mut dev = running_device();
        dev.session.transport_mut().fail_publish = true;
        dev.keypad.driver_mut().buttons = 0b10;
        block_on(poll_buttons_tick(&mut dev));
        assert_eq!(dev.link.state(), LinkState::Down);
    }

    #[test]
    fn reset_combo_requests_restart_before_anything_else() {
        let mut dev = running_device();
        dev.session.transport_mut().fail_publish = true;
        dev.keypad.driver_mut().buttons = (1 << 12) | (1 << 15);
        assert_eq!(block_on(poll_buttons_tick(&mut dev)), TickOutcome::Restart);
        // The combo never reaches the broker and never degrades state.
        assert_eq!(dev.link.state(), LinkState::Running);
        assert!(dev.session.transport_mut().published.is_empty());
    }

    #[test]
    fn reset_combo_needs_exactly_the_two_corner_keys() {
        assert!(is_reset_combo(&[12, 15]));
        assert!(is_reset_combo(&[15, 12]));
        assert!(!is_reset_combo(&[12]));
        assert!(!is_reset_combo(&[12, 14]));
        assert!(!is_reset_combo(&[3, 12, 15]));
    }

    #[test]
    fn inbound_message_reaches_the_router() {
        let mut dev = running_device();
        dev.session
            .transport_mut()
            .queue_inbound("keypad/6/on", b"10,20,30");
        block_on(poll_buttons_tick(&mut dev));
        assert_eq!(dev.keypad.key(6).unwrap().color(), (10, 20, 30));
    }

    #[test]
    fn inbound_is_not_polled_while_down() {
        let mut dev = running_device();
        dev.link.note_transport_failure();
        dev.session
            .transport_mut()
            .queue_inbound("keypad/6/on", b"");
        block_on(poll_buttons_tick(&mut dev));
        assert_eq!(dev.session.transport_mut().inbound.len(), 1);
    }

    #[test]
    fn poll_failure_degrades_to_down() {
        let mut dev = running_device();
        dev.session.transport_mut().fail_poll = true;
        block_on(poll_buttons_tick(&mut dev));
        assert_eq!(dev.link.state(), LinkState::Down);
    }

    #[test]
    fn heartbeat_publishes_the_timestamp() {
        let mut dev = running_device();
        block_on(heartbeat_send(&mut dev, 4_321));
        let (topic, payload) = dev.session.transport_mut().published.pop().unwrap();
        assert_eq!(topic, "keypad/ping");
        assert_eq!(payload, b"4321");
    }

    #[test]
    fn heartbeat_is_silent_while_down() {
        let mut dev = running_device();
        dev.link.note_transport_failure();
        block_on(heartbeat_send(&mut dev, 4_321));
        assert!(dev.session.transport_mut().published.is_empty());
    }

    #[test]
    fn heartbeat_publish_failure_degrades() {
        let mut dev = running_device();
        dev.session.transport_mut().fail_publish = true;
        block_on(heartbeat_send(&mut dev, 4_321));
        assert_eq!(dev.link.state(), LinkState::Down);
    }

    #[test]
    fn reconnect_resumes_running_without_touching_baseline() {
        let mut dev = running_device();
        dev.link.note_transport_failure();
        block_on(try_reconnect(&mut dev));
        assert_eq!(dev.link.state(), LinkState::Running);
        assert_eq!(dev.link.last_pong(), 1_000);
        assert_eq!(dev.session.transport_mut().connects, 2);
    }

    #[test]
    fn failed_reconnect_stays_down_for_the_next_cycle() {
        let mut dev = running_device();
        dev.link.note_transport_failure();
        dev.session.transport_mut().fail_connect = true;
        block_on(try_reconnect(&mut dev));
        assert_eq!(dev.link.state(), LinkState::Down);
    }

    #[test]
    fn reconnect_is_a_noop_while_running() {
        let mut dev = running_device();
        block_on(try_reconnect(&mut dev));
        assert_eq!(dev.session.transport_mut().connects, 1);
    }

    #[test]
    fn link_wait_holds_until_ready() {
        use crate::testing::MockLink;

        let mut link = MockLink::new(&[
            LinkStatus::Pending,
            LinkStatus::Pending,
            LinkStatus::Ready,
        ]);
        block_on(wait_for_link(&mut link, "net", "pw", || async {}));
        assert!(link.activated);
        assert_eq!(link.connects, 1);
    }

    #[test]
    fn link_wait_reassociates_after_failure() {
        use crate::testing::MockLink;

        let mut link = MockLink::new(&[
            LinkStatus::Failed,
            LinkStatus::Pending,
            LinkStatus::Ready,
        ]);
        block_on(wait_for_link(&mut link, "net", "pw", || async {}));
        assert_eq!(link.connects, 2);
    }

    #[test]
    fn pong_recovery_and_reconnect_race_either_way() {
        // Path 1: evidence of life beats the reconnect.
        let mut dev = running_device();
        dev.link.note_transport_failure();
        dev.session
            .transport_mut()
            .queue_inbound("keypad/pong", b"2000");
        // Message sits queued until the link is running again, so the
        // heartbeat evaluation is what notices the fresh pong.
        dev.link.note_pong(2_000);
        assert_eq!(dev.link.evaluate(2_030), Liveness::Recovered);

        // Path 2: the explicit reconnect wins when no pong arrives.
        let mut dev = running_device();
        dev.link.note_transport_failure();
        block_on(try_reconnect(&mut dev));
        assert!(dev.link.is_running());
    }
}
