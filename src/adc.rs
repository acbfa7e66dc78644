//! # API for the Analog to Digital converter
//!
//! Configures an ADC for DMA-driven scans of a regular sequence: every
//! software trigger converts the whole sequence once, and each result is
//! handed to the DMA stream bound to the converter.

use bitflags::bitflags;
use heapless::Vec;

use crate::dma::{
    ChannelSelect, Destination, DmaInstance, DmaStreamConfig, PeripheralAddress, PollBudget,
    StreamId, StreamRegisters,
};
use crate::error::{ConfigError, Error};
use crate::gpio::Port;
use crate::time::Hertz;

pub mod dma;

pub use self::dma::{AdcDma, Parts, ReleaseError, SetupError};

/// Longest regular sequence a single discontinuous group can cover
pub const MAX_CHANNELS: usize = 8;

/// Highest ADC clock at VDDA >= 2.4 V
pub const ADC_CLOCK_MAX: Hertz = Hertz::MHz(36);

/// ADC instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcInstance {
    Adc1,
    Adc2,
    Adc3,
}

impl AdcInstance {
    /// Address of the regular data register (`ADC_DR`)
    pub const fn data_register(self) -> PeripheralAddress {
        let base = match self {
            AdcInstance::Adc1 => 0x4001_2000,
            AdcInstance::Adc2 => 0x4001_2100,
            AdcInstance::Adc3 => 0x4001_2200,
        };
        PeripheralAddress::new(base + 0x4C)
    }

    /// DMA2 stream and request line serving this converter
    pub fn dma_request(self) -> (DmaInstance, StreamId, ChannelSelect) {
        let (stream, channel) = match self {
            AdcInstance::Adc1 => (StreamId::Stream0, 0),
            AdcInstance::Adc2 => (StreamId::Stream2, 1),
            AdcInstance::Adc3 => (StreamId::Stream1, 2),
        };
        (DmaInstance::Dma2, stream, ChannelSelect::new_unchecked(channel))
    }

    /// Whether `stream` on `dma` can carry this converter's requests on `channel`
    ///
    /// Each ADC is wired to two DMA2 streams, on the same request line.
    pub fn serves(self, dma: DmaInstance, stream: StreamId, channel: ChannelSelect) -> bool {
        let (streams, line) = match self {
            AdcInstance::Adc1 => ([StreamId::Stream0, StreamId::Stream4], 0),
            AdcInstance::Adc2 => ([StreamId::Stream2, StreamId::Stream3], 1),
            AdcInstance::Adc3 => ([StreamId::Stream0, StreamId::Stream1], 2),
        };
        dma == DmaInstance::Dma2 && streams.contains(&stream) && channel.bits() == line
    }

    /// Circular stream description on this converter's DMA request
    pub fn dma_stream(
        self,
        source: PeripheralAddress,
        destination: Destination,
        transfer_count: u16,
    ) -> Result<DmaStreamConfig, ConfigError> {
        let (dma, stream, channel) = self.dma_request();
        DmaStreamConfig::new(dma, stream, channel, source, destination, transfer_count)
    }
}

/// Analog input (`ADCx_INn`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel(u8);

impl Channel {
    /// Temperature sensor on STM32F40x/F41x
    ///
    /// F42x/F43x and the F401/F411/F446 route the sensor to IN18, shared with
    /// [`Channel::VBAT`].
    pub const TEMPERATURE: Channel = Channel(16);
    /// Internal reference voltage
    pub const VREFINT: Channel = Channel(17);
    /// Backup battery voltage divided by 2 (or by 4 on F42x/F43x)
    pub const VBAT: Channel = Channel(18);

    pub fn new(n: u8) -> Result<Self, ConfigError> {
        if n <= 18 {
            Ok(Channel(n))
        } else {
            Err(ConfigError::InvalidChannel(n))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

macro_rules! adc_pins {
    ($($chan:literal => ($port:ident, $pin:literal),)+) => {
        impl Channel {
            /// GPIO pin carrying this input, `None` for internal channels
            pub fn pin(self) -> Option<(Port, u8)> {
                match self.0 {
                    $($chan => Some((Port::$port, $pin)),)+
                    _ => None,
                }
            }
        }
    };
}

adc_pins! {
    0 => (A, 0),
    1 => (A, 1),
    2 => (A, 2),
    3 => (A, 3),
    4 => (A, 4),
    5 => (A, 5),
    6 => (A, 6),
    7 => (A, 7),
    8 => (B, 0),
    9 => (B, 1),
    10 => (C, 0),
    11 => (C, 1),
    12 => (C, 2),
    13 => (C, 3),
    14 => (C, 4),
    15 => (C, 5),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(non_camel_case_types)]
/// ADC sampling time
///
/// Options for the sampling time, in ADC clock cycles.
pub enum SampleTime {
    /// 3 cycles sampling time
    T_3,
    /// 15 cycles sampling time
    T_15,
    /// 28 cycles sampling time
    T_28,
    /// 56 cycles sampling time
    T_56,
    /// 84 cycles sampling time
    T_84,
    /// 112 cycles sampling time
    T_112,
    /// 144 cycles sampling time
    T_144,
    /// 480 cycles sampling time
    T_480,
}

impl Default for SampleTime {
    /// Get the default sample time (currently 3 cycles)
    fn default() -> Self {
        SampleTime::T_3
    }
}

impl From<SampleTime> for u8 {
    fn from(val: SampleTime) -> Self {
        use SampleTime::*;
        match val {
            T_3 => 0,
            T_15 => 1,
            T_28 => 2,
            T_56 => 3,
            T_84 => 4,
            T_112 => 5,
            T_144 => 6,
            T_480 => 7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// ADC data register alignment
pub enum Align {
    /// Right alignment of output data
    Right,
    /// Left alignment of output data
    Left,
}

impl Default for Align {
    /// Default: right alignment
    fn default() -> Self {
        Align::Right
    }
}

impl From<Align> for bool {
    fn from(val: Align) -> Self {
        match val {
            Align::Right => false,
            Align::Left => true,
        }
    }
}

/// ADC clock prescaler (`ADCPRE`), dividing PCLK2
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    #[default]
    Div2,
    Div4,
    Div6,
    Div8,
}

impl Prescaler {
    const ALL: [Prescaler; 4] = [
        Prescaler::Div2,
        Prescaler::Div4,
        Prescaler::Div6,
        Prescaler::Div8,
    ];

    pub fn divisor(self) -> u32 {
        match self {
            Prescaler::Div2 => 2,
            Prescaler::Div4 => 4,
            Prescaler::Div6 => 6,
            Prescaler::Div8 => 8,
        }
    }

    /// ADC clock produced from `pclk2`
    pub fn adc_clock(self, pclk2: Hertz) -> Hertz {
        pclk2 / self.divisor()
    }

    /// Smallest divider keeping the ADC clock within [`ADC_CLOCK_MAX`]
    ///
    /// Falls back to `Div8` when even that is too fast.
    pub fn fastest_for(pclk2: Hertz) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.adc_clock(pclk2) <= ADC_CLOCK_MAX)
            .unwrap_or(Prescaler::Div8)
    }
}

impl From<Prescaler> for u32 {
    fn from(val: Prescaler) -> Self {
        match val {
            Prescaler::Div2 => 0b00,
            Prescaler::Div4 => 0b01,
            Prescaler::Div6 => 0b10,
            Prescaler::Div8 => 0b11,
        }
    }
}

/// Dual/triple ADC mode (`MULTI`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MultiMode {
    /// All ADCs run on their own
    #[default]
    Independent,
}

impl From<MultiMode> for u32 {
    fn from(val: MultiMode) -> Self {
        match val {
            MultiMode::Independent => 0b00000,
        }
    }
}

bitflags! {
    /// ADC status register (`ADC_SR`)
    pub struct Sr: u32 {
        const AWD = 1 << 0;
        /// Regular channel end of conversion
        const EOC = 1 << 1;
        const JEOC = 1 << 2;
        const JSTRT = 1 << 3;
        /// Regular channel start
        const STRT = 1 << 4;
        /// Overrun
        const OVR = 1 << 5;
    }
}

bitflags! {
    /// ADC control register 1 (`ADC_CR1`)
    pub struct Cr1: u32 {
        const AWDCH = 0b11111;
        const EOCIE = 1 << 5;
        const AWDIE = 1 << 6;
        const JEOCIE = 1 << 7;
        const SCAN = 1 << 8;
        const AWDSGL = 1 << 9;
        const JAUTO = 1 << 10;
        /// Discontinuous mode on regular channels
        const DISCEN = 1 << 11;
        const JDISCEN = 1 << 12;
        /// Discontinuous mode group size minus one
        const DISCNUM = 0b111 << 13;
        const JAWDEN = 1 << 22;
        const AWDEN = 1 << 23;
        const RES = 0b11 << 24;
        const OVRIE = 1 << 26;
    }
}

impl Cr1 {
    /// Group size in discontinuous mode, `1..=8`
    pub fn with_discontinuous_count(self, n: usize) -> Self {
        let num = (n.clamp(1, MAX_CHANNELS) as u32 - 1) << 13;
        Cr1::from_bits_truncate((self.bits() & !Cr1::DISCNUM.bits()) | num)
    }

    pub fn discontinuous_count(self) -> usize {
        ((self.bits() & Cr1::DISCNUM.bits()) >> 13) as usize + 1
    }
}

bitflags! {
    /// ADC control register 2 (`ADC_CR2`)
    pub struct Cr2: u32 {
        /// A/D converter on
        const ADON = 1 << 0;
        /// Continuous conversion
        const CONT = 1 << 1;
        /// DMA mode
        const DMA = 1 << 8;
        /// Keep issuing DMA requests after the last transfer
        const DDS = 1 << 9;
        const EOCS = 1 << 10;
        const ALIGN = 1 << 11;
        const JEXTSEL = 0b1111 << 16;
        const JEXTEN = 0b11 << 20;
        const JSWSTART = 1 << 22;
        const EXTSEL = 0b1111 << 24;
        const EXTEN = 0b11 << 28;
        /// Start conversion of regular channels
        const SWSTART = 1 << 30;
    }
}

impl Cr2 {
    pub fn with_align(self, align: Align) -> Self {
        if align.into() {
            self | Cr2::ALIGN
        } else {
            self - Cr2::ALIGN
        }
    }
}

bitflags! {
    /// ADC common control register (`ADC_CCR`)
    pub struct Ccr: u32 {
        const MULTI = 0b11111;
        const DELAY = 0b1111 << 8;
        const DDS = 1 << 13;
        const DMA = 0b11 << 14;
        const ADCPRE = 0b11 << 16;
        /// VBAT channel enable
        const VBATE = 1 << 22;
        /// Temperature sensor and VREFINT enable
        const TSVREFE = 1 << 23;
    }
}

impl Ccr {
    pub fn with_prescaler(self, prescaler: Prescaler) -> Self {
        let pre: u32 = prescaler.into();
        Ccr::from_bits_truncate((self.bits() & !Ccr::ADCPRE.bits()) | (pre << 16))
    }

    pub fn with_multi(self, mode: MultiMode) -> Self {
        let multi: u32 = mode.into();
        Ccr::from_bits_truncate((self.bits() & !Ccr::MULTI.bits()) | multi)
    }
}

/// Register-level access to one ADC
pub trait AdcRegisters {
    fn instance(&self) -> AdcInstance;

    fn status(&self) -> Sr;

    /// Clear the given status flags (`rc_w0`)
    fn clear_status(&mut self, flags: Sr);

    fn cr1(&self) -> Cr1;

    fn modify_cr1<F>(&mut self, f: F)
    where
        F: FnOnce(Cr1) -> Cr1;

    fn cr2(&self) -> Cr2;

    fn modify_cr2<F>(&mut self, f: F)
    where
        F: FnOnce(Cr2) -> Cr2;

    /// Write `SMPR1` and `SMPR2`
    fn write_sample_times(&mut self, smpr1: u32, smpr2: u32);

    /// Write `SQR1`, `SQR2` and `SQR3`
    fn write_regular_sequence(&mut self, sqr1: u32, sqr2: u32, sqr3: u32);

    /// Where the DMA stream reads conversion results from
    fn data_register(&self) -> PeripheralAddress;

    /// Wait out the stabilisation time after `ADON` is set
    fn stabilize(&mut self) {}
}

/// Registers shared by all ADCs
pub trait AdcCommonRegisters {
    fn ccr(&self) -> Ccr;

    fn modify_ccr<F>(&mut self, f: F)
    where
        F: FnOnce(Ccr) -> Ccr;
}

/// Channels, timing and DMA binding of one capture pipeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdcConfig {
    adc: AdcInstance,
    channels: Vec<Channel, MAX_CHANNELS>,
    pub sample_time: SampleTime,
    pub align: Align,
    pub prescaler: Prescaler,
    dma: DmaStreamConfig,
}

impl AdcConfig {
    /// Sample `channels` in order, one DMA word per channel and scan
    ///
    /// The stream must be one wired to `adc` (see [`AdcInstance::serves`]) and
    /// its transfer count must hold a whole number of scans.
    pub fn new(
        adc: AdcInstance,
        channels: &[Channel],
        dma: DmaStreamConfig,
    ) -> Result<Self, ConfigError> {
        if !adc.serves(dma.dma, dma.stream, dma.channel) {
            return Err(ConfigError::PeripheralMismatch);
        }
        if channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        let channels =
            Vec::from_slice(channels).map_err(|_| ConfigError::TooManyChannels)?;
        if dma.transfer_count as usize % channels.len() != 0 {
            return Err(ConfigError::TransferCountNotMultiple {
                channels: channels.len(),
                transfer_count: dma.transfer_count,
            });
        }
        Ok(AdcConfig {
            adc,
            channels,
            sample_time: SampleTime::default(),
            align: Align::default(),
            prescaler: Prescaler::default(),
            dma,
        })
    }

    /// ADC1 sampling IN8 (PB0) and IN9 (PB1) through DMA2 stream 0, three scans per cycle
    pub fn reference(
        source: PeripheralAddress,
        destination: Destination,
    ) -> Result<Self, ConfigError> {
        let adc = AdcInstance::Adc1;
        let dma = adc.dma_stream(source, destination, 6)?;
        AdcConfig::new(adc, &[Channel(8), Channel(9)], dma)
    }

    pub fn sample_time(mut self, sample_time: SampleTime) -> Self {
        self.sample_time = sample_time;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn prescaler(mut self, prescaler: Prescaler) -> Self {
        self.prescaler = prescaler;
        self
    }

    pub fn adc(&self) -> AdcInstance {
        self.adc
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn dma(&self) -> &DmaStreamConfig {
        &self.dma
    }

    /// Whole scans held by one circular cycle
    pub fn frames(&self) -> usize {
        self.dma.transfer_count as usize / self.channels.len()
    }
}

/// `SQR1`, `SQR2` and `SQR3` for a regular sequence of up to 16 channels
pub fn regular_sequence(channels: &[Channel]) -> [u32; 3] {
    let pack = |skip: usize, take: usize| {
        channels
            .iter()
            .skip(skip)
            .take(take)
            .enumerate()
            .fold(0u32, |s, (i, c)| s | ((c.number() as u32) << (i * 5)))
    };
    let len = channels.len().clamp(1, 16) as u32;
    [pack(12, 4) | ((len - 1) << 20), pack(6, 6), pack(0, 6)]
}

/// `SMPR1` and `SMPR2` with `sample_time` on every channel
pub fn sample_times(sample_time: SampleTime) -> [u32; 2] {
    let t: u8 = sample_time.into();
    let fill = |fields: u32| (0..fields).fold(0u32, |s, i| s | ((t as u32) << (i * 3)));
    // SMPR1 holds IN10..=IN18, SMPR2 holds IN0..=IN9
    [fill(9), fill(10)]
}

pub fn power_down<A: AdcRegisters>(adc: &mut A) {
    adc.modify_cr2(|cr2| cr2 - Cr2::ADON);
}

pub fn power_up<A: AdcRegisters>(adc: &mut A) {
    adc.modify_cr2(|cr2| cr2 | Cr2::ADON);
    adc.stabilize();
}

/// Start a conversion of the regular group
pub fn start_regular<A: AdcRegisters>(adc: &mut A) {
    adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);
}

/// Power the converter off and set the common clock prescaler
pub fn prepare<A, C>(adc: &mut A, common: &mut C, config: &AdcConfig)
where
    A: AdcRegisters,
    C: AdcCommonRegisters,
{
    power_down(adc);
    common.modify_ccr(|ccr| ccr.with_prescaler(config.prescaler));
}

/// Program the ADC for DMA scans of `config`'s sequence, then arm its stream
pub fn configure<A, C, S>(
    adc: &mut A,
    common: &mut C,
    stream: &mut S,
    config: &AdcConfig,
    budget: PollBudget,
) -> Result<(), Error>
where
    A: AdcRegisters,
    C: AdcCommonRegisters,
    S: StreamRegisters,
{
    let n = config.channel_count();

    #[cfg(feature = "defmt")]
    defmt::debug!("configuring {} for a {}-channel scan", config.adc(), n);

    let [sqr1, sqr2, sqr3] = regular_sequence(config.channels());
    adc.write_regular_sequence(sqr1, sqr2, sqr3);

    // One trigger converts exactly one group spanning the whole sequence
    adc.modify_cr2(|cr2| cr2 - Cr2::CONT);
    adc.modify_cr1(|cr1| cr1.with_discontinuous_count(n) | Cr1::DISCEN);

    adc.modify_cr1(|cr1| cr1 - (Cr1::AWDEN | Cr1::JAWDEN));
    adc.modify_cr1(|cr1| cr1 | Cr1::SCAN);
    adc.modify_cr2(|cr2| cr2.with_align(config.align));

    let [smpr1, smpr2] = sample_times(config.sample_time);
    adc.write_sample_times(smpr1, smpr2);

    adc.modify_cr2(|cr2| cr2 | Cr2::DDS);
    adc.modify_cr2(|cr2| cr2 | Cr2::DMA);

    common.modify_ccr(|ccr| ccr.with_multi(MultiMode::Independent));
    common.modify_ccr(|ccr| ccr | Ccr::TSVREFE);
    common.modify_ccr(|ccr| ccr | Ccr::VBATE);

    #[cfg(feature = "defmt")]
    defmt::trace!(
        "ADC CR1 = {=u32:#x}, CR2 = {=u32:#x}",
        adc.cr1().bits(),
        adc.cr2().bits()
    );

    power_up(adc);

    crate::dma::configure(stream, config.dma(), budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::SampleBuffer;
    use crate::sim::{SimEvent, Simulator};
    use crate::time::RateExtU32;

    use proptest::prelude::*;
    use std::boxed::Box;

    fn buffer() -> SampleBuffer<&'static mut [u16; 16]> {
        SampleBuffer::new(Box::leak(Box::new([0u16; 16])))
    }

    fn channels(ns: &[u8]) -> std::vec::Vec<Channel> {
        ns.iter().map(|&n| Channel::new(n).unwrap()).collect()
    }

    #[test]
    fn reference_configuration() {
        let buf = buffer();
        let config =
            AdcConfig::reference(AdcInstance::Adc1.data_register(), buf.destination()).unwrap();

        assert_eq!(config.adc(), AdcInstance::Adc1);
        assert_eq!(config.channels(), &channels(&[8, 9])[..]);
        assert_eq!(config.sample_time, SampleTime::T_3);
        assert_eq!(config.align, Align::Right);
        assert_eq!(config.prescaler, Prescaler::Div2);
        assert_eq!(config.frames(), 3);

        let dma = config.dma();
        assert_eq!(dma.dma, DmaInstance::Dma2);
        assert_eq!(dma.stream, StreamId::Stream0);
        assert_eq!(dma.channel.bits(), 0);
        assert_eq!(dma.transfer_count, 6);
        assert_eq!(dma.destination.capacity(), 16);
        assert_eq!(dma.source.address(), 0x4001_204C);
    }

    #[test]
    fn validation() {
        let buf = buffer();
        let src = AdcInstance::Adc1.data_register();
        let dma6 = AdcInstance::Adc1.dma_stream(src, buf.destination(), 6).unwrap();

        assert_eq!(
            AdcConfig::new(AdcInstance::Adc1, &[], dma6),
            Err(ConfigError::NoChannels)
        );
        assert_eq!(
            AdcConfig::new(AdcInstance::Adc1, &channels(&[0, 1, 2, 3, 4, 5, 6, 7, 8]), dma6),
            Err(ConfigError::TooManyChannels)
        );
        assert_eq!(
            AdcConfig::new(AdcInstance::Adc1, &channels(&[0, 1, 2, 3]), dma6),
            Err(ConfigError::TransferCountNotMultiple {
                channels: 4,
                transfer_count: 6
            })
        );
        assert_eq!(Channel::new(19), Err(ConfigError::InvalidChannel(19)));

        // transfer count == channel count is the single-frame case
        let dma2 = AdcInstance::Adc1.dma_stream(src, buf.destination(), 2).unwrap();
        let single = AdcConfig::new(AdcInstance::Adc1, &channels(&[8, 9]), dma2).unwrap();
        assert_eq!(single.frames(), 1);
    }

    #[test]
    fn stream_must_carry_the_converter_requests() {
        let buf = buffer();
        let src = AdcInstance::Adc1.data_register();
        let ch0 = ChannelSelect::new(0).unwrap();
        let stream = |dma, id, ch| DmaStreamConfig::new(dma, id, ch, src, buf.destination(), 6).unwrap();
        let pair = channels(&[8, 9]);

        assert_eq!(
            AdcConfig::new(AdcInstance::Adc1, &pair, stream(DmaInstance::Dma1, StreamId::Stream0, ch0)),
            Err(ConfigError::PeripheralMismatch)
        );
        assert_eq!(
            AdcConfig::new(
                AdcInstance::Adc1,
                &pair,
                stream(DmaInstance::Dma2, StreamId::Stream0, ChannelSelect::new(1).unwrap())
            ),
            Err(ConfigError::PeripheralMismatch)
        );
        assert_eq!(
            AdcConfig::new(AdcInstance::Adc1, &pair, stream(DmaInstance::Dma2, StreamId::Stream1, ch0)),
            Err(ConfigError::PeripheralMismatch)
        );
        assert!(
            AdcConfig::new(AdcInstance::Adc1, &pair, stream(DmaInstance::Dma2, StreamId::Stream4, ch0))
                .is_ok()
        );

        for adc in [AdcInstance::Adc1, AdcInstance::Adc2, AdcInstance::Adc3] {
            let (dma, id, ch) = adc.dma_request();
            assert!(adc.serves(dma, id, ch));
        }
    }

    #[test]
    fn pin_map() {
        assert_eq!(Channel::new(0).unwrap().pin(), Some((Port::A, 0)));
        assert_eq!(Channel::new(8).unwrap().pin(), Some((Port::B, 0)));
        assert_eq!(Channel::new(9).unwrap().pin(), Some((Port::B, 1)));
        assert_eq!(Channel::new(15).unwrap().pin(), Some((Port::C, 5)));
        assert_eq!(Channel::TEMPERATURE.pin(), None);
        assert_eq!(Channel::VBAT.pin(), None);
    }

    #[test]
    fn reference_sequence_registers() {
        let [sqr1, sqr2, sqr3] = regular_sequence(&channels(&[8, 9]));
        assert_eq!(sqr3, 8 | (9 << 5));
        assert_eq!(sqr2, 0);
        assert_eq!(sqr1, 1 << 20);
    }

    #[test]
    fn sample_time_fills_every_field() {
        let [smpr1, smpr2] = sample_times(SampleTime::T_480);
        assert_eq!(smpr1, 0o777_777_777);
        assert_eq!(smpr2, 0o7_777_777_777);
        assert_eq!(sample_times(SampleTime::T_3), [0, 0]);
    }

    #[test]
    fn prescaler_selection() {
        assert_eq!(Prescaler::fastest_for(84.MHz()), Prescaler::Div4);
        assert_eq!(Prescaler::fastest_for(72.MHz()), Prescaler::Div2);
        assert_eq!(Prescaler::fastest_for(90.MHz()), Prescaler::Div4);
        assert_eq!(Prescaler::fastest_for(180.MHz()), Prescaler::Div6);
        assert_eq!(Prescaler::fastest_for(400.MHz()), Prescaler::Div8);
        assert_eq!(Prescaler::Div4.adc_clock(84.MHz()), 21.MHz::<1, 1>());
    }

    #[test]
    fn common_register_fields() {
        let ccr = Ccr::all().with_prescaler(Prescaler::Div6).with_multi(MultiMode::Independent);
        assert_eq!((ccr.bits() >> 16) & 0b11, 0b10);
        assert_eq!(ccr.bits() & 0b11111, 0);
        assert_eq!(Cr1::empty().with_discontinuous_count(2).discontinuous_count(), 2);
        assert_eq!(Cr1::empty().with_discontinuous_count(8).bits(), 0b111 << 13);
    }

    #[test]
    fn configure_programs_scan_with_dma() {
        let sim = Simulator::new();
        let buf = buffer();
        let config =
            AdcConfig::reference(AdcInstance::Adc1.data_register(), buf.destination()).unwrap();
        let mut parts = sim.parts();

        prepare(&mut parts.adc, &mut parts.common, &config);
        configure(
            &mut parts.adc,
            &mut parts.common,
            &mut parts.stream,
            &config,
            PollBudget::default(),
        )
        .unwrap();

        let cr1 = parts.adc.cr1();
        assert!(cr1.contains(Cr1::SCAN | Cr1::DISCEN));
        assert!(!cr1.intersects(Cr1::AWDEN | Cr1::JAWDEN));
        assert_eq!(cr1.discontinuous_count(), 2);

        let cr2 = parts.adc.cr2();
        assert!(cr2.contains(Cr2::ADON | Cr2::DMA | Cr2::DDS));
        assert!(!cr2.intersects(Cr2::CONT | Cr2::ALIGN));

        let ccr = parts.common.ccr();
        assert!(ccr.contains(Ccr::TSVREFE | Ccr::VBATE));
        assert_eq!(ccr.bits() & Ccr::ADCPRE.bits(), 0);
        assert_eq!(ccr.bits() & Ccr::MULTI.bits(), 0);

        let snap = sim.snapshot();
        assert_eq!(snap.sqr, [1 << 20, 0, 8 | (9 << 5)]);
        assert_eq!(snap.smpr, [0, 0]);
        assert!(parts.stream.is_enabled());
    }

    #[test]
    fn converter_is_powered_before_the_stream_is_armed() {
        let sim = Simulator::new();
        let buf = buffer();
        let config =
            AdcConfig::reference(AdcInstance::Adc1.data_register(), buf.destination()).unwrap();
        let mut parts = sim.parts();

        // second run starts from a powered, armed pipeline
        for _ in 0..2 {
            sim.clear_events();
            prepare(&mut parts.adc, &mut parts.common, &config);
            configure(
                &mut parts.adc,
                &mut parts.common,
                &mut parts.stream,
                &config,
                PollBudget::default(),
            )
            .unwrap();
        }

        let log = sim.events();
        let off = log.iter().position(|e| *e == SimEvent::AdcPowerOff).unwrap();
        let on = log.iter().position(|e| *e == SimEvent::AdcPowerOn).unwrap();
        let armed = log.iter().position(|e| *e == SimEvent::StreamEnabled).unwrap();
        assert!(off < on && on < armed);
    }

    proptest! {
        #[test]
        fn sequence_packs_every_channel(ns in prop::collection::vec(0u8..=18, 1..=16)) {
            let chans = channels(&ns);
            let [sqr1, sqr2, sqr3] = regular_sequence(&chans);
            let regs = [sqr3, sqr2, sqr1];
            for (i, c) in chans.iter().enumerate() {
                let field = (regs[i / 6] >> ((i % 6) * 5)) & 0b11111;
                prop_assert_eq!(field, c.number() as u32);
            }
            prop_assert_eq!((sqr1 >> 20) & 0xf, ns.len() as u32 - 1);
        }
    }
}
