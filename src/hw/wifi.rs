//! CYW43439 implementation of the wireless-link boundary.
//!
//! Association goes through the cyw43 control channel; readiness is the
//! combination of link-up and a DHCP lease on the embassy-net stack, so
//! the connectivity task only starts the broker session once the device
//! can actually open sockets.

use cyw43::{Control, JoinOptions, PowerManagementMode};
use embassy_net::Stack;

use pad2mqtt::error::Error;
use pad2mqtt::transport::{LinkStatus, WirelessLink};

pub struct Cyw43Link {
    control: Control<'static>,
    stack: Stack<'static>,
}

impl Cyw43Link {
    pub fn new(control: Control<'static>, stack: Stack<'static>) -> Self {
        Self { control, stack }
    }
}

impl WirelessLink for Cyw43Link {
    async fn activate(&mut self) {
        // Keep the radio awake: power-save mode adds seconds of latency
        // to broker traffic and the pad is mains powered.
        self.control
            .set_power_management(PowerManagementMode::None)
            .await;
    }

    async fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Error> {
        self.control
            .join(ssid, JoinOptions::new(password.as_bytes()))
            .await
            .map_err(|_| Error::LinkConnectFailed)
    }

    async fn status(&mut self) -> LinkStatus {
        if self.stack.is_link_up() && self.stack.is_config_up() {
            LinkStatus::Ready
        } else {
            LinkStatus::Pending
        }
    }
}
