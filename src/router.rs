//! Message router - turns inbound (topic, payload) pairs into keypad
//! mutations or heartbeat bookkeeping.
//!
//! Everything here is deliberately forgiving: a message that does not
//! parse is dropped without touching any state, and a status command
//! with a malformed color payload still applies its status change.
//! Nothing in this module can fail the caller.

use crate::keypad::{Keypad, KeypadDriver};
use crate::link::Connectivity;
use heapless::String;

/// Dispatch one inbound message.
///
/// `topic` must live under `root`; anything else is dropped. Recognized
/// suffixes:
/// - `ping` - our own heartbeat echoed back, no action
/// - `pong` - integer timestamp, updates liveness bookkeeping
/// - `<index>/on`, `<index>/blink`, `<index>/off` - key commands with an
///   optional `r,g,b` payload on `on`/`blink`
pub fn route<D: KeypadDriver>(
    topic: &str,
    payload: &[u8],
    root: &str,
    keypad: &mut Keypad<D>,
    link: &mut Connectivity,
) {
    let Some(suffix) = topic
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return;
    };

    match suffix {
        "ping" => return,
        "pong" => {
            if let Some(timestamp) = parse_timestamp(payload) {
                link.note_pong(timestamp);
            }
            return;
        }
        _ => {}
    }

    // Key commands: `<index>/<verb>`, extra segments tolerated.
    let mut segments = suffix.split('/');
    let Some(index) = segments.next().and_then(parse_index) else {
        return;
    };
    if index >= keypad.key_count() {
        return;
    }

    match segments.next() {
        Some("on") => {
            apply_color(keypad, index, payload);
            keypad.illuminate(index);
        }
        Some("blink") => {
            apply_color(keypad, index, payload);
            keypad.blink(index);
        }
        Some("off") => keypad.extinguish(index),
        _ => {}
    }
}

/// Recolor before a status change when the payload holds a well-formed
/// triple; otherwise leave the stored color untouched.
fn apply_color<D: KeypadDriver>(keypad: &mut Keypad<D>, index: usize, payload: &[u8]) {
    if let Some((r, g, b)) = parse_color(payload) {
        keypad.set_color(index, r, g, b);
    }
}

/// Pong payloads are plain ASCII decimal timestamps.
fn parse_timestamp(payload: &[u8]) -> Option<u64> {
    let text = core::str::from_utf8(payload).ok()?;
    parse_digits(text)
}

/// Topic indices are unsigned decimals; signs are not accepted.
fn parse_index(segment: &str) -> Option<usize> {
    parse_digits(segment).and_then(|value| usize::try_from(value).ok())
}

/// An `r,g,b` triple of non-negative integers. Embedded spaces are
/// stripped ("10, 20, 30" is fine); signs and fractions are not
/// accepted. Oversized values are passed through for `set_color` to
/// clamp - "1000" lights at full intensity rather than being rejected.
fn parse_color(payload: &[u8]) -> Option<(i32, i32, i32)> {
    let text = core::str::from_utf8(payload).ok()?;
    let mut compact: String<32> = String::new();
    for c in text.chars() {
        if c != ' ' {
            compact.push(c).ok()?;
        }
    }

    let mut channels = compact.split(',');
    let r = parse_channel(channels.next()?)?;
    let g = parse_channel(channels.next()?)?;
    let b = parse_channel(channels.next()?)?;
    if channels.next().is_some() {
        return None;
    }
    Some((r, g, b))
}

fn parse_channel(component: &str) -> Option<i32> {
    let value = parse_digits(component)?;
    Some(i32::try_from(value).unwrap_or(i32::MAX))
}

/// Strict unsigned decimal: non-empty, ASCII digits only. `u64` overflow
/// counts as malformed.
fn parse_digits(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
