//! Reference capture: PB0 and PB1 sampled into a 16-word buffer by DMA2 stream 0

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m::{asm, singleton};

use cortex_m_rt::entry;
use stm32f4xx_adc_dma::{
    adc::{AdcConfig, AdcDma, AdcInstance},
    dma::SampleBuffer,
    pac,
    pacext::{self, Gpio, Rcc},
    prelude::*,
};

#[entry]
fn main() -> ! {
    // Aquire peripherals
    let p = pac::Peripherals::take().unwrap();

    // Runs from the 16 MHz HSI; clock tree setup is up to the application
    let sysclk = 16.MHz();

    let buf = singleton!(: [u16; 16] = [0; 16]).unwrap();
    let buffer = SampleBuffer::new(buf);

    let config =
        AdcConfig::reference(AdcInstance::Adc1.data_register(), buffer.destination()).unwrap();
    let parts = pacext::adc1_parts(p.ADC1, p.ADC_COMMON, p.DMA2.split().s0, sysclk);

    let mut rcc = Rcc::new(p.RCC);
    let mut gpio = Gpio::new(p.GPIOA, p.GPIOB, p.GPIOC);
    let mut capture = AdcDma::setup(parts, &mut rcc, &mut gpio, config, buffer).unwrap();

    let mut samples = [0u16; 2];
    for _ in 0..8 {
        capture.trigger();
        nb::block!(capture.poll_scan()).unwrap();
        capture.read_latest(&mut samples).unwrap();
    }

    let [_pb0, _pb1] = capture.read_pair();
    let (_parts, _buffer) = capture.release().unwrap();
    asm::bkpt();

    loop {}
}
