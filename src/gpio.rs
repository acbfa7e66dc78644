//! # General Purpose I/Os
//!
//! Only what analog capture needs: switching a set of pins on one port into
//! analog mode with a chosen pull configuration.

use bitflags::bitflags;

/// GPIO port carrying ADC inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
}

impl Port {
    pub const ALL: [Port; 3] = [Port::A, Port::B, Port::C];

    pub fn index(self) -> usize {
        match self {
            Port::A => 0,
            Port::B => 1,
            Port::C => 2,
        }
    }
}

bitflags! {
    /// Set of pins on one port
    pub struct Pins: u16 {
        const P0 = 1 << 0;
        const P1 = 1 << 1;
        const P2 = 1 << 2;
        const P3 = 1 << 3;
        const P4 = 1 << 4;
        const P5 = 1 << 5;
        const P6 = 1 << 6;
        const P7 = 1 << 7;
        const P8 = 1 << 8;
        const P9 = 1 << 9;
        const P10 = 1 << 10;
        const P11 = 1 << 11;
        const P12 = 1 << 12;
        const P13 = 1 << 13;
        const P14 = 1 << 14;
        const P15 = 1 << 15;
    }
}

impl Pins {
    pub fn pin(n: u8) -> Self {
        Pins::from_bits_truncate(1 << (n & 0xf))
    }
}

/// Internal pull-up / pull-down resistor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

impl From<Pull> for u32 {
    fn from(val: Pull) -> Self {
        match val {
            Pull::None => 0b00,
            Pull::Up => 0b01,
            Pull::Down => 0b10,
        }
    }
}

/// `MODER` value for analog mode
pub const MODE_ANALOG: u32 = 0b11;

/// Apply a 2-bit-per-pin `value` to every pin of `pins` in a `MODER`/`PUPDR` style word
pub fn two_bit_fields(register: u32, pins: Pins, value: u32) -> u32 {
    (0..16)
        .filter(|n| pins.bits() & (1 << n) != 0)
        .fold(register, |r, n| (r & !(0b11 << (2 * n))) | ((value & 0b11) << (2 * n)))
}

/// Port mode and pull configuration
pub trait PinControl {
    /// Put `pins` of `port` into analog mode with the given pull
    fn set_analog(&mut self, port: Port, pins: Pins, pull: Pull);
}
