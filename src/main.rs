//! pad2mqtt - embedded entry point (Raspberry Pi Pico W).
//!
//! Brings up the CYW43439 WiFi chip, an embassy-net TCP stack and the
//! keypad hardware, then runs the three cooperative loops as embassy
//! tasks sharing one [`Device`] behind a mutex:
//!
//! - status/animation tick (~100 ms)
//! - button-poll/publish tick (~100 ms)
//! - connectivity/heartbeat cycle (25 s + 5 s pong window)
//!
//! Every tick body locks the context, runs to completion and unlocks
//! before its timed sleep, so no loop ever observes a half-updated
//! context and none can stall the others.

#![no_std]
#![no_main]

mod hw;

use defmt::{info, unwrap, warn};
use defmt_rtt as _;
use panic_probe as _;

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use embassy_rp::{i2c, spi};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use static_cell::StaticCell;

use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};

use pad2mqtt::config;
use pad2mqtt::keypad::Keypad;
use pad2mqtt::link::Liveness;
use pad2mqtt::service::{self, Device, Session, TickOutcome};
use pad2mqtt::status::StatusDisplay;

use hw::broker::TcpBroker;
use hw::keypad::PicoRgbKeypad;
use hw::wifi::Cyw43Link;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

/// The shared orchestration context. Concrete aliases keep the task
/// signatures monomorphic (embassy tasks cannot be generic).
type SharedDevice = Mutex<CriticalSectionRawMutex, Device<PicoRgbKeypad, TcpBroker<'static>>>;

static DEVICE: StaticCell<SharedDevice> = StaticCell::new();
static CYW43_STATE: StaticCell<cyw43::State> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static BROKER_RX: StaticCell<[u8; 2048]> = StaticCell::new();
static BROKER_TX: StaticCell<[u8; 1024]> = StaticCell::new();

/// Seconds since boot - the device clock used for heartbeat payloads
/// and liveness arithmetic.
fn now_secs() -> u64 {
    Instant::now().as_secs()
}

/// Unconditional hard restart. In-flight network state is abandoned.
fn restart() -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Status/animation loop.
#[embassy_executor::task]
async fn status_task(device: &'static SharedDevice) -> ! {
    let mut display = StatusDisplay::new();
    loop {
        {
            let mut dev = device.lock().await;
            let state = dev.link.state();
            display.tick(state, &mut dev.keypad);
        }
        Timer::after(Duration::from_millis(config::STATUS_TICK_MS)).await;
    }
}

/// Button-poll/publish loop.
#[embassy_executor::task]
async fn button_task(device: &'static SharedDevice) -> ! {
    loop {
        {
            let mut dev = device.lock().await;
            if service::poll_buttons_tick(&mut dev).await == TickOutcome::Restart {
                info!("reset combination pressed, restarting");
                restart();
            }
        }
        Timer::after(Duration::from_millis(config::BUTTON_TICK_MS)).await;
    }
}

/// Connectivity loop: link wait, first session, then the heartbeat
/// cycle with reconnects for as long as the process lives.
#[embassy_executor::task]
async fn connectivity_task(device: &'static SharedDevice, mut link: Cyw43Link) -> ! {
    info!("waiting for WiFi association...");
    service::wait_for_link(&mut link, config::WIFI_SSID, config::WIFI_PASSWORD, || {
        Timer::after(Duration::from_secs(config::LINK_POLL_SECS))
    })
    .await;
    info!("WiFi up, opening broker session");

    // First session: retry with no backoff (the TCP handshake inside
    // each attempt provides the pacing and the yield points).
    loop {
        let mut dev = device.lock().await;
        if service::open_session(&mut dev, now_secs()).await {
            break;
        }
        warn!("broker connect failed, retrying");
    }
    info!("broker session established");

    loop {
        Timer::after(Duration::from_secs(config::HEARTBEAT_INTERVAL_SECS)).await;
        {
            let mut dev = device.lock().await;
            service::heartbeat_send(&mut dev, now_secs()).await;
        }
        Timer::after(Duration::from_secs(config::PONG_WAIT_SECS)).await;
        {
            let mut dev = device.lock().await;
            match dev.link.evaluate(now_secs()) {
                Liveness::Degraded => warn!("no pong within the window, broker marked down"),
                Liveness::Recovered => info!("pong received, broker up again"),
                Liveness::RestartRequired => {
                    warn!("no pong for {} s while down, restarting", config::RESTART_AFTER_SECS);
                    restart();
                }
                Liveness::Stable => {}
            }
            let was_down = dev.link.is_down();
            service::try_reconnect(&mut dev).await;
            if was_down && dev.link.is_running() {
                info!("broker session reestablished");
            }
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("pad2mqtt starting");

    // CYW43439 bring-up. Firmware blobs are fetched separately; see
    // firmware/README.md.
    let fw = include_bytes!("../firmware/43439A0.bin");
    let clm = include_bytes!("../firmware/43439A0_clm.bin");

    let pwr = Output::new(p.PIN_23, Level::Low);
    let cs = Output::new(p.PIN_25, Level::High);
    let mut pio = Pio::new(p.PIO0, Irqs);
    let wifi_spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        p.PIN_24,
        p.PIN_29,
        p.DMA_CH0,
    );

    let state = CYW43_STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, wifi_spi, fw).await;
    unwrap!(spawner.spawn(cyw43_task(runner)));
    control.init(clm).await;

    // embassy-net stack with DHCP. The seed only randomizes local ports.
    let net_config = embassy_net::Config::dhcpv4(Default::default());
    let resources = STACK_RESOURCES.init(StackResources::new());
    let (stack, net_runner) = embassy_net::new(net_device, net_config, resources, 0x70616432);
    unwrap!(spawner.spawn(net_task(net_runner)));

    // Keypad base: APA102 LED chain on SPI0, TCA9555 button expander on
    // I2C0 (Pimoroni pinout).
    let mut led_spi_config = spi::Config::default();
    led_spi_config.frequency = 4_000_000;
    let led_spi = spi::Spi::new_blocking_txonly(p.SPI0, p.PIN_18, p.PIN_19, led_spi_config);
    let led_cs = Output::new(p.PIN_17, Level::High);
    let buttons_i2c = i2c::I2c::new_blocking(p.I2C0, p.PIN_5, p.PIN_4, i2c::Config::default());
    let keypad = Keypad::new(PicoRgbKeypad::new(led_spi, led_cs, buttons_i2c));

    let broker = TcpBroker::new(
        stack,
        BROKER_RX.init([0; 2048]),
        BROKER_TX.init([0; 1024]),
    );

    let device: &'static SharedDevice =
        DEVICE.init(Mutex::new(Device::new(keypad, Session::new(broker))));
    let wifi_link = Cyw43Link::new(control, stack);

    unwrap!(spawner.spawn(status_task(device)));
    unwrap!(spawner.spawn(button_task(device)));
    unwrap!(spawner.spawn(connectivity_task(device, wifi_link)));
}
