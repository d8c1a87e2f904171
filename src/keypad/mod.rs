//! Keypad aggregate - owns the ordered key collection, the hardware
//! driver, global brightness, batched-render suppression and
//! edge-triggered press sampling.
//!
//! Every mutation that changes what a key shows renders through the
//! driver immediately, unless a batch operation has suppressed rendering;
//! batches finish with exactly one `refresh()` so a whole-pad update is a
//! single visible change instead of N flickering ones.

pub mod key;

pub use key::{Key, KeyStatus, BLINK_CURVE};

use crate::config::KEY_COUNT;
use heapless::Vec;

/// Boundary to the LED/button hardware.
///
/// Calls are synchronous and fast (a buffered SPI/I2C transaction at
/// most). `illuminate` stages a pixel; `refresh` pushes the staged frame
/// out to the LEDs.
pub trait KeypadDriver {
    fn key_count(&self) -> usize;
    fn illuminate(&mut self, index: usize, red: u8, green: u8, blue: u8);
    fn set_global_brightness(&mut self, level: f32);
    fn refresh(&mut self);
    fn read_button_bitmask(&mut self) -> u32;
}

/// Number of raw bitmask samples retained for press-edge detection.
const SAMPLE_HISTORY: usize = 3;

/// The keypad: driver plus per-key light state.
pub struct Keypad<D: KeypadDriver> {
    driver: D,
    keys: Vec<Key, KEY_COUNT>,
    brightness: f32,
    suppress_render: bool,
    // Raw button samples, most recent first. Only the first entry is
    // compared when sampling; the older two are retained history.
    history: [u32; SAMPLE_HISTORY],
}

impl<D: KeypadDriver> Keypad<D> {
    /// Build the aggregate with one `Key` per physical key and push an
    /// all-dark frame so the pad starts blank.
    pub fn new(driver: D) -> Self {
        let mut pad = Self {
            driver,
            keys: Vec::new(),
            brightness: 0.5,
            suppress_render: false,
            history: [0; SAMPLE_HISTORY],
        };
        let count = pad.driver.key_count().min(KEY_COUNT);
        for _ in 0..count {
            let _ = pad.keys.push(Key::new());
        }
        pad.driver.refresh();
        pad
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Set one key's stored color. Pure state change - the new color
    /// becomes visible on the next illuminate/blink render.
    pub fn set_color(&mut self, index: usize, red: i32, green: i32, blue: i32) {
        if let Some(key) = self.keys.get_mut(index) {
            key.set_color(red, green, blue);
        }
    }

    /// Light one key with its stored color.
    pub fn illuminate(&mut self, index: usize) {
        let Some(key) = self.keys.get_mut(index) else {
            return;
        };
        key.mark_lit();
        let (r, g, b) = key.color();
        self.driver.illuminate(index, r, g, b);
        self.render();
    }

    /// Darken one key, keeping its stored color for later.
    pub fn extinguish(&mut self, index: usize) {
        let Some(key) = self.keys.get_mut(index) else {
            return;
        };
        key.mark_unlit();
        self.driver.illuminate(index, 0, 0, 0);
        self.render();
    }

    /// Start one key blinking from the dark end of the curve.
    pub fn blink(&mut self, index: usize) {
        let Some(key) = self.keys.get_mut(index) else {
            return;
        };
        key.begin_blink();
        self.driver.illuminate(index, 0, 0, 0);
        self.render();
    }

    /// Lit keys go dark; anything else lights up.
    pub fn toggle(&mut self, index: usize) {
        match self.keys.get(index).map(Key::status) {
            Some(KeyStatus::Lit) => self.extinguish(index),
            Some(_) => self.illuminate(index),
            None => {}
        }
    }

    /// Advance every blinking key one curve step and render it. Lit and
    /// unlit keys are untouched.
    pub fn tick_animations(&mut self) {
        for index in 0..self.keys.len() {
            if let Some((r, g, b)) = self.keys[index].advance_blink() {
                self.driver.illuminate(index, r, g, b);
                self.render();
            }
        }
    }

    /// Set every key's stored color in one batch, with a single trailing
    /// refresh.
    pub fn set_all_color(&mut self, red: i32, green: i32, blue: i32) {
        for key in self.keys.iter_mut() {
            key.set_color(red, green, blue);
        }
        self.render();
    }

    /// Light every key - one hardware refresh regardless of key count.
    pub fn illuminate_all(&mut self) {
        let restore = self.suppress_render;
        self.suppress_render = true;
        for index in 0..self.keys.len() {
            self.illuminate(index);
        }
        self.suppress_render = restore;
        self.render();
    }

    /// Darken every key - one hardware refresh regardless of key count.
    pub fn extinguish_all(&mut self) {
        let restore = self.suppress_render;
        self.suppress_render = true;
        for index in 0..self.keys.len() {
            self.extinguish(index);
        }
        self.suppress_render = restore;
        self.render();
    }

    /// Global LED brightness in `[0, 1]`, independent of per-key color.
    pub fn set_brightness(&mut self, level: f32) {
        let level = level.clamp(0.0, 1.0);
        self.brightness = level;
        self.driver.set_global_brightness(level);
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Force a hardware refresh, e.g. after a caller-managed batch.
    pub fn refresh(&mut self) {
        self.driver.refresh();
    }

    /// Edge-triggered press sampling.
    ///
    /// Reads the raw bitmask once. If it matches the most recent sample
    /// the result is empty - identical polls never repeat an event.
    /// Otherwise the history shifts (oldest sample dropped) and the
    /// indices of all set bits are returned in ascending order.
    pub fn sample_pressed_keys(&mut self) -> Vec<usize, KEY_COUNT> {
        let mut pressed = Vec::new();
        let sample = self.driver.read_button_bitmask();
        if sample == self.history[0] {
            return pressed;
        }
        self.history[2] = self.history[1];
        self.history[1] = self.history[0];
        self.history[0] = sample;
        for index in 0..self.keys.len() {
            if (sample >> index) & 1 == 1 {
                let _ = pressed.push(index);
            }
        }
        pressed
    }

    fn render(&mut self) {
        if !self.suppress_render {
            self.driver.refresh();
        }
    }
}
