//! Broker transport over an embassy-net TCP socket.
//!
//! Drives the MQTT 3.1.1 codec in `pad2mqtt::mqtt`: CONNECT/CONNACK on
//! session open, one SUBSCRIBE/SUBACK for the namespace wildcard, QoS 0
//! publishes, and a non-blocking inbound poll that hands over at most
//! one PUBLISH per call.
//!
//! The single socket is owned here and reused across reconnects; the
//! connectivity state machine decides when to call `connect` again.

use embassy_net::tcp::TcpSocket;
use embassy_net::{Ipv4Address, Stack};
use embassy_time::{with_timeout, Duration};
use embedded_io_async::{ReadReady, Write};

use pad2mqtt::config;
use pad2mqtt::error::Error;
use pad2mqtt::mqtt::{self, Packet, SUBACK_FAILURE};
use pad2mqtt::transport::{BrokerTransport, InboundMessage};

/// Window for the TCP handshake and for each MQTT ack.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Dead-peer detection on writes.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// Assembly buffer for partial inbound packets.
const ASSEMBLY_CAPACITY: usize = 1024;

/// Scratch space for outbound packets.
const OUTBOUND_CAPACITY: usize = 512;

/// Owned result of decoding one inbound packet.
enum Event {
    ConnAck { return_code: u8 },
    SubAck { return_code: u8 },
    Message(InboundMessage),
    Ignored,
}

pub struct TcpBroker<'a> {
    socket: TcpSocket<'a>,
    packet_id: u16,
    assembly: [u8; ASSEMBLY_CAPACITY],
    assembled: usize,
    /// A PUBLISH that arrived while waiting for an ack; handed over on
    /// the next poll.
    pending: Option<InboundMessage>,
}

impl<'a> TcpBroker<'a> {
    pub fn new(stack: Stack<'a>, rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8]) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        Self {
            socket,
            packet_id: 0,
            assembly: [0; ASSEMBLY_CAPACITY],
            assembled: 0,
            pending: None,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        self.socket
            .write_all(data)
            .await
            .map_err(|_| Error::PublishFailed)?;
        self.socket.flush().await.map_err(|_| Error::PublishFailed)
    }

    /// Append whatever the socket has ready to the assembly buffer.
    async fn fill(&mut self) -> Result<(), Error> {
        if self.assembled >= self.assembly.len() {
            // A packet larger than the assembly buffer can never
            // complete; drop the stream state and let the state machine
            // reconnect.
            self.assembled = 0;
            return Err(Error::ReceiveFailed);
        }
        let read = self
            .socket
            .read(&mut self.assembly[self.assembled..])
            .await
            .map_err(|_| Error::ReceiveFailed)?;
        if read == 0 {
            return Err(Error::ReceiveFailed);
        }
        self.assembled += read;
        Ok(())
    }

    /// Decode one packet out of the assembly buffer, if a whole one has
    /// arrived.
    fn consume_packet(&mut self) -> Result<Option<Event>, Error> {
        let (event, consumed) = match mqtt::decode(&self.assembly[..self.assembled])? {
            None => return Ok(None),
            Some((packet, consumed)) => {
                let event = match packet {
                    Packet::ConnAck { return_code, .. } => Event::ConnAck { return_code },
                    Packet::SubAck { return_code, .. } => Event::SubAck { return_code },
                    Packet::Publish { topic, payload } => {
                        match InboundMessage::from_parts(topic, payload) {
                            Some(message) => Event::Message(message),
                            // Oversized topic or payload: drop it.
                            None => Event::Ignored,
                        }
                    }
                    _ => Event::Ignored,
                };
                (event, consumed)
            }
        };
        self.assembly.copy_within(consumed..self.assembled, 0);
        self.assembled -= consumed;
        Ok(Some(event))
    }

    /// Read until the expected ack arrives, stashing any PUBLISH that
    /// gets delivered in between (retained messages arrive right after
    /// the subscribe).
    async fn await_ack(&mut self, expect_connack: bool) -> Result<(), Error> {
        let failure = if expect_connack {
            Error::ConnectFailed
        } else {
            Error::SubscribeFailed
        };
        let wait = async {
            loop {
                while let Some(event) = self.consume_packet()? {
                    match event {
                        Event::ConnAck { return_code } if expect_connack => {
                            return if return_code == 0 { Ok(()) } else { Err(failure) };
                        }
                        Event::SubAck { return_code } if !expect_connack => {
                            return if return_code != SUBACK_FAILURE {
                                Ok(())
                            } else {
                                Err(failure)
                            };
                        }
                        Event::Message(message) => self.pending = Some(message),
                        _ => {}
                    }
                }
                self.fill().await?;
            }
        };
        with_timeout(HANDSHAKE_TIMEOUT, wait)
            .await
            .map_err(|_| Error::Timeout)?
    }
}

impl BrokerTransport for TcpBroker<'_> {
    async fn connect(&mut self) -> Result<(), Error> {
        // Tear down whatever is left of a previous session.
        self.socket.abort();
        let _ = self.socket.flush().await;
        self.assembled = 0;
        self.pending = None;

        let (a, b, c, d) = config::BROKER_ADDR;
        let endpoint = (Ipv4Address::new(a, b, c, d), config::BROKER_PORT);
        with_timeout(HANDSHAKE_TIMEOUT, self.socket.connect(endpoint))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::ConnectFailed)?;

        let mut packet = [0u8; OUTBOUND_CAPACITY];
        let len = mqtt::encode_connect(
            config::MQTT_CLIENT_ID,
            config::MQTT_CREDENTIALS,
            config::MQTT_KEEP_ALIVE_SECS,
            &mut packet,
        )?;
        self.write_all(&packet[..len])
            .await
            .map_err(|_| Error::ConnectFailed)?;
        self.await_ack(true).await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error> {
        let mut packet = [0u8; OUTBOUND_CAPACITY];
        let len = mqtt::encode_publish(topic, payload, &mut packet)?;
        self.write_all(&packet[..len]).await
    }

    async fn subscribe(&mut self, pattern: &str) -> Result<(), Error> {
        self.packet_id = self.packet_id.wrapping_add(1).max(1);
        let mut packet = [0u8; OUTBOUND_CAPACITY];
        let len = mqtt::encode_subscribe(self.packet_id, pattern, &mut packet)?;
        self.write_all(&packet[..len])
            .await
            .map_err(|_| Error::SubscribeFailed)?;
        self.await_ack(false).await
    }

    async fn poll_inbound(&mut self) -> Result<Option<InboundMessage>, Error> {
        if let Some(message) = self.pending.take() {
            return Ok(Some(message));
        }
        loop {
            if let Some(event) = self.consume_packet()? {
                match event {
                    Event::Message(message) => return Ok(Some(message)),
                    // Stray acks and pings outside a handshake.
                    _ => continue,
                }
            }
            // Only a partial packet (or nothing) is buffered; pull more
            // bytes if some are already waiting, otherwise report quiet.
            let ready = self
                .socket
                .read_ready()
                .map_err(|_| Error::ReceiveFailed)?;
            if !ready {
                return Ok(None);
            }
            self.fill().await?;
        }
    }
}
