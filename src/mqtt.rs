//! Minimal MQTT 3.1.1 wire codec.
//!
//! Exactly the client subset this device speaks: CONNECT/CONNACK,
//! SUBSCRIBE/SUBACK, QoS 0 PUBLISH in both directions, DISCONNECT.
//! Encoders write into caller-provided buffers and fail with
//! [`Error::BufferOverflow`] instead of panicking; the decoder borrows
//! topic and payload straight out of the receive buffer.
//!
//! Packet layout reminder (fixed header):
//! ```text
//! Byte 0:  packet type (high nibble) + flags (low nibble)
//! Byte 1+: remaining length, 7 bits per byte, bit 7 = continuation
//! ```

use crate::error::Error;

/// Protocol level byte for MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 0x04;

// Fixed-header type bytes (including mandatory flag bits).
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

// CONNECT flag bits.
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// SUBACK return code signalling a rejected subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Largest value encodable in the 4-byte remaining-length varint.
const MAX_REMAINING_LEN: usize = 268_435_455;

/// Bounds-checked cursor over an output buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn byte(&mut self, value: u8) -> Result<(), Error> {
        if self.pos >= self.buf.len() {
            return Err(Error::BufferOverflow);
        }
        self.buf[self.pos] = value;
        self.pos += 1;
        Ok(())
    }

    fn bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        let end = self.pos.checked_add(data.len()).ok_or(Error::BufferOverflow)?;
        if end > self.buf.len() {
            return Err(Error::BufferOverflow);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn u16(&mut self, value: u16) -> Result<(), Error> {
        self.byte((value >> 8) as u8)?;
        self.byte((value & 0xFF) as u8)
    }

    /// Length-prefixed UTF-8 string, as used throughout MQTT.
    fn str(&mut self, value: &str) -> Result<(), Error> {
        if value.len() > u16::MAX as usize {
            return Err(Error::BufferOverflow);
        }
        self.u16(value.len() as u16)?;
        self.bytes(value.as_bytes())
    }

    fn remaining_len(&mut self, mut value: usize) -> Result<(), Error> {
        if value > MAX_REMAINING_LEN {
            return Err(Error::BufferOverflow);
        }
        loop {
            let mut digit = (value % 128) as u8;
            value /= 128;
            if value > 0 {
                digit |= 0x80;
            }
            self.byte(digit)?;
            if value == 0 {
                return Ok(());
            }
        }
    }
}

/// Encode a CONNECT packet (clean session, optional credentials).
/// Returns the number of bytes written.
pub fn encode_connect(
    client_id: &str,
    credentials: Option<(&str, &str)>,
    keep_alive_secs: u16,
    buf: &mut [u8],
) -> Result<usize, Error> {
    let mut flags = FLAG_CLEAN_SESSION;
    let mut remaining = 10 + 2 + client_id.len();
    if let Some((username, password)) = credentials {
        flags |= FLAG_USERNAME | FLAG_PASSWORD;
        remaining += 2 + username.len() + 2 + password.len();
    }

    let mut w = Writer::new(buf);
    w.byte(CONNECT)?;
    w.remaining_len(remaining)?;
    w.str("MQTT")?;
    w.byte(PROTOCOL_LEVEL)?;
    w.byte(flags)?;
    w.u16(keep_alive_secs)?;
    w.str(client_id)?;
    if let Some((username, password)) = credentials {
        w.str(username)?;
        w.str(password)?;
    }
    Ok(w.pos)
}

/// Encode a QoS 0 PUBLISH. Returns the number of bytes written.
pub fn encode_publish(topic: &str, payload: &[u8], buf: &mut [u8]) -> Result<usize, Error> {
    let remaining = 2 + topic.len() + payload.len();
    let mut w = Writer::new(buf);
    w.byte(PUBLISH)?;
    w.remaining_len(remaining)?;
    w.str(topic)?;
    w.bytes(payload)?;
    Ok(w.pos)
}

/// Encode a single-filter SUBSCRIBE at QoS 0.
/// Returns the number of bytes written.
pub fn encode_subscribe(packet_id: u16, filter: &str, buf: &mut [u8]) -> Result<usize, Error> {
    let remaining = 2 + 2 + filter.len() + 1;
    let mut w = Writer::new(buf);
    w.byte(SUBSCRIBE)?;
    w.remaining_len(remaining)?;
    w.u16(packet_id)?;
    w.str(filter)?;
    w.byte(0x00)?; // requested QoS
    Ok(w.pos)
}

/// Encode a DISCONNECT. Returns the number of bytes written.
pub fn encode_disconnect(buf: &mut [u8]) -> Result<usize, Error> {
    let mut w = Writer::new(buf);
    w.byte(DISCONNECT)?;
    w.byte(0x00)?;
    Ok(w.pos)
}

/// One decoded inbound packet, borrowing from the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    SubAck {
        packet_id: u16,
        return_code: u8,
    },
    Publish {
        topic: &'a str,
        payload: &'a [u8],
    },
    PingResp,
    /// Anything this client does not act on (PUBACK for foreign QoS 1
    /// traffic and the like). Carries the high-nibble packet type.
    Other {
        packet_type: u8,
    },
}

/// Decode the first packet in `buf`.
///
/// `Ok(None)` means the buffer holds only a packet prefix - read more
/// bytes and try again. On success the consumed byte count is returned
/// alongside the packet so the caller can advance its buffer.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet<'_>, usize)>, Error> {
    if buf.len() < 2 {
        return Ok(None);
    }

    // Remaining-length varint, at most 4 bytes.
    let mut remaining: usize = 0;
    let mut header_len = 1;
    loop {
        if header_len > 4 {
            return Err(Error::ProtocolViolation);
        }
        let Some(&digit) = buf.get(header_len) else {
            return Ok(None);
        };
        remaining |= ((digit & 0x7F) as usize) << (7 * (header_len - 1));
        header_len += 1;
        if digit & 0x80 == 0 {
            break;
        }
    }

    let total = 1 + (header_len - 1) + remaining;
    if buf.len() < total {
        return Ok(None);
    }
    let body = &buf[header_len..total];
    let first = buf[0];

    let packet = match first & 0xF0 {
        CONNACK => {
            if body.len() < 2 {
                return Err(Error::ProtocolViolation);
            }
            Packet::ConnAck {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            }
        }
        SUBACK => {
            if body.len() < 3 {
                return Err(Error::ProtocolViolation);
            }
            Packet::SubAck {
                packet_id: u16::from_be_bytes([body[0], body[1]]),
                return_code: body[2],
            }
        }
        PUBLISH => {
            if body.len() < 2 {
                return Err(Error::ProtocolViolation);
            }
            let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
            let mut offset = 2 + topic_len;
            if body.len() < offset {
                return Err(Error::ProtocolViolation);
            }
            let topic = core::str::from_utf8(&body[2..2 + topic_len])
                .map_err(|_| Error::ProtocolViolation)?;
            // A packet id follows the topic for QoS 1/2 deliveries. We
            // subscribe at QoS 0 but tolerate a broker that upgrades.
            let qos = (first >> 1) & 0x03;
            if qos > 0 {
                offset += 2;
                if body.len() < offset {
                    return Err(Error::ProtocolViolation);
                }
            }
            Packet::Publish {
                topic,
                payload: &body[offset..],
            }
        }
        PINGRESP => Packet::PingResp,
        other => Packet::Other {
            packet_type: other >> 4,
        },
    };

    Ok(Some((packet, total)))
}
