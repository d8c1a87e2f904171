//! Application-wide constants and compile-time configuration.
//!
//! Network credentials, timing parameters, protocol constants and the
//! keypad geometry live here so they can be tuned in one place.

// WiFi

/// Station-mode network name.
pub const WIFI_SSID: &str = "pad2mqtt-net";

/// WPA2 passphrase.
pub const WIFI_PASSWORD: &str = "changeme";

/// Interval between wireless-link status polls while waiting for
/// association (seconds).
pub const LINK_POLL_SECS: u64 = 1;

// MQTT broker

/// Broker IPv4 address.
pub const BROKER_ADDR: (u8, u8, u8, u8) = (192, 168, 1, 10);

/// Broker port (plain TCP).
pub const BROKER_PORT: u16 = 1883;

/// Client identifier presented in CONNECT.
pub const MQTT_CLIENT_ID: &str = "pad2mqtt";

/// Optional CONNECT credentials; `None` connects anonymously.
pub const MQTT_CREDENTIALS: Option<(&str, &str)> = None;

/// CONNECT keep-alive (seconds). The application-level heartbeat
/// publishes well inside this window, so no PINGREQ traffic is needed.
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;

/// Root of the device's topic namespace. Everything the device sends or
/// receives lives under `<TOPIC_ROOT>/...`; the session subscribes to
/// `<TOPIC_ROOT>/#`.
pub const TOPIC_ROOT: &str = "keypad";

// Keypad geometry

/// Number of physical keys (4x4 pad).
pub const KEY_COUNT: usize = 16;

/// The two corner keys that force an immediate restart when pressed
/// together (operator escape hatch).
pub const RESET_COMBO: [usize; 2] = [12, 15];

// Scheduler timing

/// Status/animation tick period (milliseconds).
pub const STATUS_TICK_MS: u64 = 100;

/// Button-poll/message tick period (milliseconds).
pub const BUTTON_TICK_MS: u64 = 100;

/// Heartbeat cycle period (seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// How long to wait for a pong after publishing a ping before
/// evaluating liveness (seconds).
pub const PONG_WAIT_SECS: u64 = 5;

// Liveness thresholds
//
// Three tiers: a high bar to leave `Running` (tolerates a single missed
// pong), a lower bar to re-enter it (any recent evidence of life), and a
// fatal bar that bounds the time to a hard restart on a dead link.

/// Degrade `Running` -> `Down` when no pong for this long (seconds).
pub const DEGRADE_AFTER_SECS: u64 = 90;

/// Recover `Down` -> `Running` when a pong is younger than this (seconds).
pub const RECOVER_WITHIN_SECS: u64 = 60;

/// Hard-restart the device when `Down` and no pong for this long (seconds).
pub const RESTART_AFTER_SECS: u64 = 300;

// Display

/// Global brightness applied when the link is healthy and the pad is
/// under remote control.
pub const RUNNING_BRIGHTNESS: f32 = 0.5;
