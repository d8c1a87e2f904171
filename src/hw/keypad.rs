//! Keypad base driver: 16 APA102 LEDs on a SPI chain plus a TCA9555
//! button expander on I2C.
//!
//! APA102 frame layout:
//! ```text
//! Start frame: 4 x 0x00
//! Per LED:     0xE0 | brightness(5 bit), blue, green, red
//! End frame:   4 x 0xFF
//! ```
//!
//! `illuminate` only stages a pixel; `refresh` pushes the whole frame,
//! which is what makes batched updates a single visible change.

use defmt::warn;
use embassy_rp::gpio::Output;
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::{I2C0, SPI0};
use embassy_rp::spi::{self, Spi};

use pad2mqtt::keypad::KeypadDriver;

/// Number of keys on the pad.
const KEYS: usize = 16;

/// TCA9555 I2C address.
const TCA9555_ADDR: u8 = 0x20;

/// TCA9555 input port 0 register; a 2-byte read returns both ports.
const TCA9555_INPUT_REG: u8 = 0x00;

pub struct PicoRgbKeypad {
    spi: Spi<'static, SPI0, spi::Blocking>,
    cs: Output<'static>,
    i2c: I2c<'static, I2C0, i2c::Blocking>,
    pixels: [(u8, u8, u8); KEYS],
    /// APA102 5-bit global brightness field.
    brightness: u8,
    /// Last good button read, reported again when the expander NAKs so
    /// a transient I2C glitch never fabricates a press edge.
    last_buttons: u32,
}

impl PicoRgbKeypad {
    pub fn new(
        spi: Spi<'static, SPI0, spi::Blocking>,
        cs: Output<'static>,
        i2c: I2c<'static, I2C0, i2c::Blocking>,
    ) -> Self {
        Self {
            spi,
            cs,
            i2c,
            pixels: [(0, 0, 0); KEYS],
            brightness: 31,
            last_buttons: 0,
        }
    }
}

impl KeypadDriver for PicoRgbKeypad {
    fn key_count(&self) -> usize {
        KEYS
    }

    fn illuminate(&mut self, index: usize, red: u8, green: u8, blue: u8) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = (red, green, blue);
        }
    }

    fn set_global_brightness(&mut self, level: f32) {
        self.brightness = (level.clamp(0.0, 1.0) * 31.0 + 0.5) as u8;
    }

    fn refresh(&mut self) {
        let mut frame = [0u8; 4 + KEYS * 4 + 4];
        let mut offset = 4;
        for (red, green, blue) in self.pixels {
            frame[offset] = 0xE0 | self.brightness;
            frame[offset + 1] = blue;
            frame[offset + 2] = green;
            frame[offset + 3] = red;
            offset += 4;
        }
        frame[offset..].fill(0xFF);

        self.cs.set_low();
        if self.spi.blocking_write(&frame).is_err() {
            warn!("LED frame write failed");
        }
        self.cs.set_high();
    }

    fn read_button_bitmask(&mut self) -> u32 {
        let mut raw = [0u8; 2];
        match self
            .i2c
            .blocking_write_read(TCA9555_ADDR, &[TCA9555_INPUT_REG], &mut raw)
        {
            Ok(()) => {
                // Buttons pull their expander pin low when pressed.
                let inputs = u16::from_le_bytes(raw);
                self.last_buttons = (!inputs) as u32 & 0xFFFF;
                self.last_buttons
            }
            Err(_) => {
                warn!("button expander read failed");
                self.last_buttons
            }
        }
    }
}
