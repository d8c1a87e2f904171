//! Whole-pad visualization of the connectivity state.
//!
//! While the device is starting or the broker is down, the entire pad
//! pulses (green or red respectively) through the shared brightness
//! curve. Once running, the pad drops to a fixed mid brightness and
//! clears so the keys are free for remote commands. Per-key blink
//! animations tick every cycle regardless of state.

use crate::config::RUNNING_BRIGHTNESS;
use crate::keypad::{Keypad, KeypadDriver, BLINK_CURVE};
use crate::link::LinkState;

/// State carried between animation ticks.
pub struct StatusDisplay {
    previous: Option<LinkState>,
    pulse_step: usize,
}

impl StatusDisplay {
    pub const fn new() -> Self {
        Self {
            previous: None,
            pulse_step: 0,
        }
    }

    /// One ~100 ms animation tick. Never blocks and never touches the
    /// network.
    pub fn tick<D: KeypadDriver>(&mut self, state: LinkState, keypad: &mut Keypad<D>) {
        if self.previous != Some(state) {
            match state {
                LinkState::Starting => {
                    keypad.set_all_color(0, 255, 0);
                    keypad.illuminate_all();
                }
                LinkState::Down => {
                    keypad.set_all_color(255, 0, 0);
                    keypad.illuminate_all();
                }
                LinkState::Running => {
                    keypad.set_brightness(RUNNING_BRIGHTNESS);
                    keypad.extinguish_all();
                }
            }
            self.pulse_step = 0;
            self.previous = Some(state);
        } else if matches!(state, LinkState::Starting | LinkState::Down) {
            self.pulse_step = (self.pulse_step + 1) % BLINK_CURVE.len();
            keypad.set_brightness(BLINK_CURVE[self.pulse_step]);
            keypad.illuminate_all();
        }

        keypad.tick_animations();
    }
}

impl Default for StatusDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::KeyStatus;
    use crate::testing::MockDriver;

    fn pad() -> Keypad<MockDriver> {
        Keypad::new(MockDriver::new(16))
    }

    #[test]
    fn starting_paints_the_pad_green() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Starting, &mut pad);
        for index in 0..pad.key_count() {
            assert_eq!(pad.key(index).unwrap().color(), (0, 255, 0));
            assert_eq!(pad.key(index).unwrap().status(), KeyStatus::Lit);
        }
    }

    #[test]
    fn down_paints_the_pad_red() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Down, &mut pad);
        assert_eq!(pad.key(0).unwrap().color(), (255, 0, 0));
    }

    #[test]
    fn running_clears_the_pad_at_mid_brightness() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Starting, &mut pad);
        display.tick(LinkState::Running, &mut pad);
        assert_eq!(pad.brightness(), RUNNING_BRIGHTNESS);
        for index in 0..pad.key_count() {
            assert_eq!(pad.key(index).unwrap().status(), KeyStatus::Unlit);
        }
    }

    #[test]
    fn unchanged_state_advances_the_pulse() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Starting, &mut pad);
        display.tick(LinkState::Starting, &mut pad);
        assert_eq!(pad.brightness(), BLINK_CURVE[1]);
        display.tick(LinkState::Starting, &mut pad);
        assert_eq!(pad.brightness(), BLINK_CURVE[2]);
    }

    #[test]
    fn pulse_wraps_after_a_full_curve() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Down, &mut pad);
        for _ in 0..BLINK_CURVE.len() {
            display.tick(LinkState::Down, &mut pad);
        }
        assert_eq!(pad.brightness(), BLINK_CURVE[0]);
    }

    #[test]
    fn state_change_resets_the_pulse() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Starting, &mut pad);
        display.tick(LinkState::Starting, &mut pad);
        display.tick(LinkState::Down, &mut pad);
        display.tick(LinkState::Down, &mut pad);
        assert_eq!(pad.brightness(), BLINK_CURVE[1]);
    }

    #[test]
    fn running_does_not_pulse() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Running, &mut pad);
        let refreshes = pad.driver().refreshes;
        display.tick(LinkState::Running, &mut pad);
        display.tick(LinkState::Running, &mut pad);
        assert_eq!(pad.driver().refreshes, refreshes);
        assert_eq!(pad.brightness(), RUNNING_BRIGHTNESS);
    }

    #[test]
    fn remote_blink_keeps_ticking_while_running() {
        let mut display = StatusDisplay::new();
        let mut pad = pad();
        display.tick(LinkState::Running, &mut pad);
        pad.set_color(2, 100, 0, 0);
        pad.blink(2);
        display.tick(LinkState::Running, &mut pad);
        // One curve step in: 100 * 0.2 = 20.
        assert_eq!(pad.driver().pixels[2], (20, 0, 0));
    }
}
