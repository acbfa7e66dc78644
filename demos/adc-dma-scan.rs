//! Four-channel scan including the internal temperature sensor and VREFINT,
//! read back frame by frame with the checked reader

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m::{asm, singleton};

use cortex_m_rt::entry;
use stm32f4xx_adc_dma::{
    adc::{AdcConfig, AdcDma, AdcInstance, Channel, Prescaler, SampleTime},
    dma::{PollBudget, SampleBuffer},
    pac,
    pacext::{self, Gpio, Rcc},
    prelude::*,
};

#[entry]
fn main() -> ! {
    let p = pac::Peripherals::take().unwrap();

    let sysclk = 16.MHz();
    // APB2 runs undivided from the HSI here
    let pclk2 = sysclk;

    let buf = singleton!(: [u16; 32] = [0; 32]).unwrap();
    let buffer = SampleBuffer::new(buf);

    let adc = AdcInstance::Adc1;
    let channels = [
        Channel::new(0).unwrap(),
        Channel::new(1).unwrap(),
        Channel::TEMPERATURE,
        Channel::VREFINT,
    ];
    // Eight scans per ring cycle
    let stream = adc
        .dma_stream(adc.data_register(), buffer.destination(), 32)
        .unwrap();
    let config = AdcConfig::new(adc, &channels, stream)
        .unwrap()
        // the temperature sensor needs at least 10 us of sampling
        .sample_time(SampleTime::T_480)
        .prescaler(Prescaler::fastest_for(pclk2));

    let parts = pacext::adc1_parts(p.ADC1, p.ADC_COMMON, p.DMA2.split().s0, sysclk);
    let mut rcc = Rcc::new(p.RCC);
    let mut gpio = Gpio::new(p.GPIOA, p.GPIOB, p.GPIOC);
    let mut capture = AdcDma::setup_with_budget(
        parts,
        &mut rcc,
        &mut gpio,
        config,
        buffer,
        PollBudget::new(10_000),
    )
    .unwrap();

    let mut frame = [0u16; 4];
    let mut vrefint_sum = 0u32;
    for _ in 0..64 {
        capture.trigger();
        nb::block!(capture.poll_scan()).unwrap();
        capture.read_consistent(&mut frame).unwrap();
        vrefint_sum += frame[3] as u32;
    }
    let _vrefint = vrefint_sum / 64;

    asm::bkpt();

    loop {}
}
