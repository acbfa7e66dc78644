//! # Circular DMA capture for the STM32F4 ADC
//!
//! Configures an ADC and its DMA2 stream so that every software trigger
//! converts a regular sequence of analog inputs and the results land, without
//! CPU involvement, in a fixed buffer that wraps after a configurable number
//! of words.
//!
//! Peripheral access goes through small register traits
//! ([`adc::AdcRegisters`], [`adc::AdcCommonRegisters`],
//! [`dma::StreamRegisters`], [`rcc::ClockControl`], [`gpio::PinControl`]).
//! [`pacext`] implements them for the device PAC; with the `sim` feature the
//! [`sim`] module implements them in software so the whole pipeline runs on
//! the host.
//!
//! # Usage
//!
//! Select the microcontroller with one of the chip features:
//!
//! - stm32f401
//! - stm32f405
//! - stm32f407
//! - stm32f411
//! - stm32f427
//! - stm32f429
//! - stm32f446
//!
//! ```toml
//! [dependencies.stm32f4xx-adc-dma]
//! version = "0.1.0"
//! features = ["stm32f405"]
//! ```
//!
//! ## Usage example
//!
//! Samples PB0 and PB1 into a 16-word buffer, three scans per ring cycle.
//!
//! ```rust,ignore
//! use stm32f4xx_adc_dma::{
//!     adc::{AdcConfig, AdcDma, AdcInstance},
//!     dma::SampleBuffer,
//!     pac,
//!     pacext::{self, Gpio, Rcc},
//!     prelude::*,
//! };
//!
//! let dp = pac::Peripherals::take().unwrap();
//! let buffer = SampleBuffer::new(cortex_m::singleton!(: [u16; 16] = [0; 16]).unwrap());
//! let config = AdcConfig::reference(AdcInstance::Adc1.data_register(), buffer.destination())?;
//!
//! let parts = pacext::adc1_parts(dp.ADC1, dp.ADC_COMMON, dp.DMA2.split().s0, 168.MHz());
//! let mut capture = AdcDma::setup(
//!     parts,
//!     &mut Rcc::new(dp.RCC),
//!     &mut Gpio::new(dp.GPIOA, dp.GPIOB, dp.GPIOC),
//!     config,
//!     buffer,
//! )?;
//!
//! loop {
//!     capture.trigger();
//!     nb::block!(capture.poll_scan())?;
//!     let [pb0, pb1] = capture.read_pair();
//! }
//! ```
//!
//! # More examples
//!
//! See the `demos` folder.

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "stm32f401")]
pub use stm32f4::stm32f401 as pac;

#[cfg(feature = "stm32f405")]
pub use stm32f4::stm32f405 as pac;

#[cfg(feature = "stm32f407")]
pub use stm32f4::stm32f407 as pac;

#[cfg(feature = "stm32f411")]
pub use stm32f4::stm32f411 as pac;

#[cfg(feature = "stm32f427")]
pub use stm32f4::stm32f427 as pac;

#[cfg(feature = "stm32f429")]
pub use stm32f4::stm32f429 as pac;

#[cfg(feature = "stm32f446")]
pub use stm32f4::stm32f446 as pac;

#[cfg(feature = "device-selected")]
pub use crate::pac as device;

pub mod adc;
pub mod dma;
pub mod error;
pub mod gpio;
#[cfg(feature = "device-selected")]
pub mod pacext;
pub mod prelude;
pub mod rcc;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod time;

pub use crate::error::{ConfigError, Error};
