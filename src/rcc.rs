//! # Reset & Control Clock
//!
//! Clock gating for the peripherals used by analog capture. Clock tree
//! (PLL, bus prescalers) bring-up is left to the application.

use bitflags::bitflags;

use crate::adc::{AdcConfig, AdcInstance};
use crate::dma::DmaInstance;
use crate::gpio::{PinControl, Pins, Port, Pull};

bitflags! {
    /// AHB1 peripheral clock enable register (`RCC_AHB1ENR`)
    pub struct Ahb1Enable: u32 {
        const GPIOA = 1 << 0;
        const GPIOB = 1 << 1;
        const GPIOC = 1 << 2;
        const DMA1 = 1 << 21;
        const DMA2 = 1 << 22;
    }
}

bitflags! {
    /// APB2 peripheral clock enable register (`RCC_APB2ENR`)
    pub struct Apb2Enable: u32 {
        const ADC1 = 1 << 8;
        const ADC2 = 1 << 9;
        const ADC3 = 1 << 10;
    }
}

/// Bus clock gates
pub trait ClockControl {
    /// Set the given `AHB1ENR` bits, leaving the others untouched
    fn enable_ahb1(&mut self, bits: Ahb1Enable);
    /// Set the given `APB2ENR` bits, leaving the others untouched
    fn enable_apb2(&mut self, bits: Apb2Enable);
}

/// Clock gate of a peripheral
pub trait Enable {
    type Bits;
    fn enable_bits(&self) -> Self::Bits;
}

impl Enable for Port {
    type Bits = Ahb1Enable;
    fn enable_bits(&self) -> Ahb1Enable {
        match self {
            Port::A => Ahb1Enable::GPIOA,
            Port::B => Ahb1Enable::GPIOB,
            Port::C => Ahb1Enable::GPIOC,
        }
    }
}

impl Enable for DmaInstance {
    type Bits = Ahb1Enable;
    fn enable_bits(&self) -> Ahb1Enable {
        match self {
            DmaInstance::Dma1 => Ahb1Enable::DMA1,
            DmaInstance::Dma2 => Ahb1Enable::DMA2,
        }
    }
}

impl Enable for AdcInstance {
    type Bits = Apb2Enable;
    fn enable_bits(&self) -> Apb2Enable {
        match self {
            AdcInstance::Adc1 => Apb2Enable::ADC1,
            AdcInstance::Adc2 => Apb2Enable::ADC2,
            AdcInstance::Adc3 => Apb2Enable::ADC3,
        }
    }
}

/// What has to be clocked and which pins go analog before the ADC is configured
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enablement {
    pub adc: AdcInstance,
    pub dma: DmaInstance,
    /// Analog pins per port, indexed by [`Port::index`]
    pub analog: [Pins; 3],
    pub pull: Pull,
}

impl Enablement {
    /// Everything `config` samples from, with pins left floating
    pub fn for_config(config: &AdcConfig) -> Self {
        let mut analog = [Pins::empty(); 3];
        for (port, pin) in config.channels().iter().filter_map(|c| c.pin()) {
            analog[port.index()] |= Pins::pin(pin);
        }
        Enablement {
            adc: config.adc(),
            dma: config.dma().dma,
            analog,
            pull: Pull::None,
        }
    }

    /// Ports with at least one analog pin
    pub fn ports(&self) -> impl Iterator<Item = (Port, Pins)> + '_ {
        Port::ALL
            .iter()
            .map(move |&port| (port, self.analog[port.index()]))
            .filter(|(_, pins)| !pins.is_empty())
    }
}

/// Clock the GPIO ports, DMA controller and ADC, then put the pins into analog mode
///
/// Only ever sets bits, so running it again is harmless.
pub fn enable<R, G>(rcc: &mut R, gpio: &mut G, enablement: &Enablement)
where
    R: ClockControl,
    G: PinControl,
{
    let ahb1 = enablement
        .ports()
        .fold(enablement.dma.enable_bits(), |bits, (port, _)| {
            bits | port.enable_bits()
        });
    rcc.enable_ahb1(ahb1);
    rcc.enable_apb2(enablement.adc.enable_bits());

    for (port, pins) in enablement.ports() {
        #[cfg(feature = "defmt")]
        defmt::trace!("GPIO{} pins {=u16:#x} -> analog", port, pins.bits());
        gpio.set_analog(port, pins, enablement.pull);
    }
}
