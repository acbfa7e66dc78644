//! Register traits implemented on the device PAC
//!
//! Registers are driven through raw `bits()` reads and writes, with the field
//! layout taken from the bitflags types of each peripheral module.

use crate::adc::{
    AdcCommonRegisters, AdcInstance, AdcRegisters, Ccr, Cr1, Cr2, Parts, Sr,
};
use crate::dma::{
    DmaInstance, PeripheralAddress, StreamCr, StreamFlags, StreamId, StreamRegisters,
};
use crate::gpio::{two_bit_fields, PinControl, Pins, Port, Pull, MODE_ANALOG};
use crate::pac;
use crate::rcc::{Ahb1Enable, Apb2Enable, ClockControl};
use crate::time::Hertz;

pub mod adc;
pub mod dma;

pub use self::adc::{Adc, AdcCommon};
pub use self::dma::{DmaExt, Stream, Streams};

/// RCC clock gates
pub struct Rcc {
    rb: pac::RCC,
}

impl Rcc {
    pub fn new(rb: pac::RCC) -> Self {
        Rcc { rb }
    }

    pub fn free(self) -> pac::RCC {
        self.rb
    }
}

impl ClockControl for Rcc {
    fn enable_ahb1(&mut self, bits: Ahb1Enable) {
        self.rb
            .ahb1enr()
            .modify(|r, w| unsafe { w.bits(r.bits() | bits.bits()) });
        // Stall the pipeline until the clock is actually running
        cortex_m::asm::dsb();
    }

    fn enable_apb2(&mut self, bits: Apb2Enable) {
        self.rb
            .apb2enr()
            .modify(|r, w| unsafe { w.bits(r.bits() | bits.bits()) });
        cortex_m::asm::dsb();
    }
}

/// Mode and pull registers of the ports carrying ADC inputs
pub struct Gpio {
    a: pac::GPIOA,
    b: pac::GPIOB,
    c: pac::GPIOC,
}

impl Gpio {
    pub fn new(a: pac::GPIOA, b: pac::GPIOB, c: pac::GPIOC) -> Self {
        Gpio { a, b, c }
    }

    pub fn free(self) -> (pac::GPIOA, pac::GPIOB, pac::GPIOC) {
        (self.a, self.b, self.c)
    }
}

macro_rules! set_analog {
    ($rb:expr, $pins:expr, $pull:expr) => {{
        $rb.moder()
            .modify(|r, w| unsafe { w.bits(two_bit_fields(r.bits(), $pins, MODE_ANALOG)) });
        $rb.pupdr()
            .modify(|r, w| unsafe { w.bits(two_bit_fields(r.bits(), $pins, $pull)) });
    }};
}

impl PinControl for Gpio {
    fn set_analog(&mut self, port: Port, pins: Pins, pull: Pull) {
        let pull: u32 = pull.into();
        match port {
            Port::A => set_analog!(self.a, pins, pull),
            Port::B => set_analog!(self.b, pins, pull),
            Port::C => set_analog!(self.c, pins, pull),
        }
    }
}

/// ADC1, the common registers and ADC1's DMA2 stream
pub fn adc1_parts(
    adc: pac::ADC1,
    common: pac::ADC_COMMON,
    stream: Stream<pac::DMA2, 0>,
    sysclk: Hertz,
) -> Parts<Adc<pac::ADC1>, AdcCommon, Stream<pac::DMA2, 0>> {
    Parts {
        adc: Adc::adc1(adc, sysclk),
        common: AdcCommon::new(common),
        stream,
    }
}
