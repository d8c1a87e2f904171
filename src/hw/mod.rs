//! Hardware and network implementations of the library's boundary
//! traits, for the Pico W + Pimoroni RGB keypad base.

pub mod broker;
pub mod keypad;
pub mod wifi;
