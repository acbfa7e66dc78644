//! # Direct Memory Access
//!
//! The STM32F4 has two DMA controllers with eight streams each. Every stream
//! picks one of eight request lines (`CHSEL`) and moves words between a
//! peripheral register and memory. This module brings one stream into a
//! circular, peripheral-to-memory transfer, following the configuration
//! sequence of the reference manual (RM0090, "Stream configuration
//! procedure").

use core::sync::atomic::{compiler_fence, Ordering};

use bitflags::bitflags;

use crate::error::{ConfigError, Error};

pub mod ring;

pub use ring::SampleBuffer;

/// DMA controller instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaInstance {
    Dma1,
    Dma2,
}

/// Stream index within a DMA controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StreamId {
    Stream0 = 0,
    Stream1 = 1,
    Stream2 = 2,
    Stream3 = 3,
    Stream4 = 4,
    Stream5 = 5,
    Stream6 = 6,
    Stream7 = 7,
}

impl StreamId {
    pub const ALL: [StreamId; 8] = [
        StreamId::Stream0,
        StreamId::Stream1,
        StreamId::Stream2,
        StreamId::Stream3,
        StreamId::Stream4,
        StreamId::Stream5,
        StreamId::Stream6,
        StreamId::Stream7,
    ];

    pub fn new(number: u8) -> Result<Self, ConfigError> {
        Self::ALL
            .get(number as usize)
            .copied()
            .ok_or(ConfigError::InvalidStream(number))
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// Bit offset of this stream's flags inside `LISR`/`HISR` (and the clear registers)
    pub fn flag_offset(self) -> u32 {
        match self.number() % 4 {
            0 => 0,
            1 => 6,
            2 => 16,
            _ => 22,
        }
    }

    /// Streams 4..=7 report through `HISR`/`HIFCR`
    pub fn uses_high_flags(self) -> bool {
        self.number() >= 4
    }
}

/// Request line selected with `CHSEL`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSelect(u8);

impl ChannelSelect {
    pub fn new(channel: u8) -> Result<Self, ConfigError> {
        if channel < 8 {
            Ok(ChannelSelect(channel))
        } else {
            Err(ConfigError::InvalidChannelSelect(channel))
        }
    }

    pub(crate) const fn new_unchecked(channel: u8) -> Self {
        ChannelSelect(channel & 0b111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Software priority of a stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl From<Priority> for u32 {
    fn from(val: Priority) -> Self {
        match val {
            Priority::Low => 0b00,
            Priority::Medium => 0b01,
            Priority::High => 0b10,
            Priority::VeryHigh => 0b11,
        }
    }
}

/// Transfer direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    PeripheralToMemory,
    MemoryToPeripheral,
    MemoryToMemory,
}

impl From<Direction> for u32 {
    fn from(val: Direction) -> Self {
        match val {
            Direction::PeripheralToMemory => 0b00,
            Direction::MemoryToPeripheral => 0b01,
            Direction::MemoryToMemory => 0b10,
        }
    }
}

/// Peripheral or memory word width
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Size {
    Byte,
    HalfWord,
    Word,
}

impl From<Size> for u32 {
    fn from(val: Size) -> Self {
        match val {
            Size::Byte => 0b00,
            Size::HalfWord => 0b01,
            Size::Word => 0b10,
        }
    }
}

bitflags! {
    /// Stream x configuration register (`DMA_SxCR`)
    pub struct StreamCr: u32 {
        /// Stream enable / flag stream ready when read low
        const EN = 1 << 0;
        const DMEIE = 1 << 1;
        const TEIE = 1 << 2;
        const HTIE = 1 << 3;
        const TCIE = 1 << 4;
        /// Peripheral flow controller
        const PFCTRL = 1 << 5;
        const DIR = 0b11 << 6;
        /// Circular mode
        const CIRC = 1 << 8;
        /// Peripheral increment mode
        const PINC = 1 << 9;
        /// Memory increment mode
        const MINC = 1 << 10;
        const PSIZE = 0b11 << 11;
        const MSIZE = 0b11 << 13;
        const PINCOS = 1 << 15;
        const PL = 0b11 << 16;
        /// Double buffer mode
        const DBM = 1 << 18;
        const CT = 1 << 19;
        const PBURST = 0b11 << 21;
        const MBURST = 0b11 << 23;
        const CHSEL = 0b111 << 25;
    }
}

impl StreamCr {
    fn with_field(self, field: StreamCr, shift: u32, value: u32) -> Self {
        StreamCr::from_bits_truncate((self.bits() & !field.bits()) | ((value << shift) & field.bits()))
    }

    fn field(self, field: StreamCr, shift: u32) -> u32 {
        (self.bits() & field.bits()) >> shift
    }

    pub fn with_channel(self, channel: ChannelSelect) -> Self {
        self.with_field(StreamCr::CHSEL, 25, channel.bits() as u32)
    }

    pub fn with_priority(self, priority: Priority) -> Self {
        self.with_field(StreamCr::PL, 16, priority.into())
    }

    pub fn with_direction(self, direction: Direction) -> Self {
        self.with_field(StreamCr::DIR, 6, direction.into())
    }

    pub fn with_memory_size(self, size: Size) -> Self {
        self.with_field(StreamCr::MSIZE, 13, size.into())
    }

    pub fn with_peripheral_size(self, size: Size) -> Self {
        self.with_field(StreamCr::PSIZE, 11, size.into())
    }

    pub fn channel(self) -> u8 {
        self.field(StreamCr::CHSEL, 25) as u8
    }

    pub fn priority(self) -> u32 {
        self.field(StreamCr::PL, 16)
    }

    pub fn direction(self) -> u32 {
        self.field(StreamCr::DIR, 6)
    }

    pub fn memory_size(self) -> u32 {
        self.field(StreamCr::MSIZE, 13)
    }

    pub fn peripheral_size(self) -> u32 {
        self.field(StreamCr::PSIZE, 11)
    }
}

bitflags! {
    /// Per-stream status flags, normalised to stream 0's position in `LISR`
    pub struct StreamFlags: u32 {
        /// FIFO error
        const FEIF = 1 << 0;
        /// Direct mode error
        const DMEIF = 1 << 2;
        /// Transfer error
        const TEIF = 1 << 3;
        /// Half transfer
        const HTIF = 1 << 4;
        /// Transfer complete
        const TCIF = 1 << 5;
    }
}

/// Register-level access to a single DMA stream
///
/// Implemented for the device PAC in [`pacext`](crate::pacext) and by the
/// software model in [`sim`](crate::sim).
pub trait StreamRegisters {
    /// Controller the stream belongs to
    fn controller(&self) -> DmaInstance;

    /// Which stream these registers belong to
    fn id(&self) -> StreamId;

    /// Current value of the configuration register
    fn control(&self) -> StreamCr;

    /// Read-modify-write of the configuration register
    fn modify_control<F>(&mut self, f: F)
    where
        F: FnOnce(StreamCr) -> StreamCr;

    /// Set the peripheral address (`PAR`)
    fn set_peripheral_address(&mut self, address: usize);

    /// Set the memory 0 address (`M0AR`)
    fn set_memory_address(&mut self, address: usize);

    /// Set the number of data items (`NDTR`)
    fn set_number_of_transfers(&mut self, count: u16);

    /// Items left before the stream wraps (circular) or stops
    fn number_of_transfers(&self) -> u16;

    /// Put the configuration, counter, address and FIFO registers back to their reset values
    fn reset(&mut self);

    /// Status flags of this stream
    fn flags(&self) -> StreamFlags;

    /// Clear status flags of this stream
    fn clear_flags(&mut self, flags: StreamFlags);

    /// Returns `true` while the stream is enabled
    fn is_enabled(&self) -> bool {
        self.control().contains(StreamCr::EN)
    }
}

/// Address of a peripheral data register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralAddress(usize);

impl PeripheralAddress {
    pub const fn new(address: usize) -> Self {
        PeripheralAddress(address)
    }

    pub fn address(self) -> usize {
        self.0
    }
}

/// Start and capacity (in 16-bit words) of a DMA-owned memory region
///
/// Only obtainable from a [`SampleBuffer`], so a configured stream always
/// points at memory the pipeline owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Destination {
    address: usize,
    capacity: usize,
}

impl Destination {
    pub(crate) fn new(address: usize, capacity: usize) -> Self {
        Destination { address, capacity }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One-shot description of a circular peripheral-to-memory stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaStreamConfig {
    pub dma: DmaInstance,
    pub stream: StreamId,
    pub channel: ChannelSelect,
    pub priority: Priority,
    pub source: PeripheralAddress,
    pub destination: Destination,
    /// 16-bit words per circular cycle
    pub transfer_count: u16,
}

impl DmaStreamConfig {
    /// Describe a stream, checking that the destination can hold one full cycle
    pub fn new(
        dma: DmaInstance,
        stream: StreamId,
        channel: ChannelSelect,
        source: PeripheralAddress,
        destination: Destination,
        transfer_count: u16,
    ) -> Result<Self, ConfigError> {
        if transfer_count == 0 {
            return Err(ConfigError::TransferCountZero);
        }
        if destination.capacity() < transfer_count as usize {
            return Err(ConfigError::BufferTooSmall {
                capacity: destination.capacity(),
                transfer_count,
            });
        }
        Ok(DmaStreamConfig {
            dma,
            stream,
            channel,
            priority: Priority::default(),
            source,
            destination,
            transfer_count,
        })
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Upper bound on status polls before a peripheral is declared unresponsive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollBudget {
    iterations: u32,
}

impl PollBudget {
    pub const fn new(iterations: u32) -> Self {
        PollBudget { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Spin until `ready` returns `true`; `false` once the budget is spent
    pub fn poll<F>(self, mut ready: F) -> bool
    where
        F: FnMut() -> bool,
    {
        for _ in 0..self.iterations {
            if ready() {
                return true;
            }
            core::hint::spin_loop();
        }
        ready()
    }
}

impl Default for PollBudget {
    /// Comfortably longer than the slowest in-flight beat at any bus clock
    fn default() -> Self {
        PollBudget::new(100_000)
    }
}

/// Request a stream to stop and wait until its enable bit reads back low
///
/// Clearing `EN` only takes effect once the current transfer has finished, so
/// nothing else about the stream may be touched before this returns `Ok`.
pub fn disable<S: StreamRegisters>(stream: &mut S, budget: PollBudget) -> Result<(), Error> {
    stream.modify_control(|cr| cr - StreamCr::EN);
    if budget.poll(|| !stream.is_enabled()) {
        Ok(())
    } else {
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "DMA stream {} still enabled after {} polls",
            stream.id().number(),
            budget.iterations()
        );
        Err(Error::PeripheralTimeout { stream: stream.id() })
    }
}

/// Bring `stream` into circular peripheral-to-memory transfer as described by `config`
///
/// The stream may still be running from a previous configuration.
pub fn configure<S: StreamRegisters>(
    stream: &mut S,
    config: &DmaStreamConfig,
    budget: PollBudget,
) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    defmt::debug!(
        "configuring DMA stream {}: {} words, channel {}",
        config.stream.number(),
        config.transfer_count,
        config.channel.bits()
    );

    // 1. Stop the stream. Its configuration bits are write protected while
    //    EN reads high, so the reset only happens once it has been released.
    disable(stream, budget)?;
    stream.reset();
    stream.clear_flags(StreamFlags::all());

    // 2. Peripheral port and memory addresses
    stream.set_peripheral_address(config.source.address());
    stream.set_memory_address(config.destination.address());

    // 3. Total number of items per cycle
    stream.set_number_of_transfers(config.transfer_count);

    // 4. Request line
    stream.modify_control(|cr| cr.with_channel(config.channel));

    // 5. Priority
    stream.modify_control(|cr| cr.with_priority(config.priority));

    // 6. Direction and address increments
    stream.modify_control(|cr| {
        (cr.with_direction(Direction::PeripheralToMemory) - StreamCr::PINC) | StreamCr::MINC
    });

    // 7. Data widths
    stream.modify_control(|cr| {
        cr.with_memory_size(Size::HalfWord)
            .with_peripheral_size(Size::HalfWord)
    });

    // 8. Circular mode
    stream.modify_control(|cr| cr | StreamCr::CIRC);

    #[cfg(feature = "defmt")]
    defmt::trace!("DMA stream CR = {=u32:#x}", stream.control().bits());

    compiler_fence(Ordering::Release);

    // 9. Go
    stream.modify_control(|cr| cr | StreamCr::EN);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::AdcInstance;
    use crate::sim::{SimEvent, Simulator};

    use std::boxed::Box;

    fn config_for(buffer: &SampleBuffer<&'static mut [u16; 16]>, count: u16) -> DmaStreamConfig {
        DmaStreamConfig::new(
            DmaInstance::Dma2,
            StreamId::Stream0,
            ChannelSelect::new(0).unwrap(),
            AdcInstance::Adc1.data_register(),
            buffer.destination(),
            count,
        )
        .unwrap()
    }

    fn buffer() -> SampleBuffer<&'static mut [u16; 16]> {
        SampleBuffer::new(Box::leak(Box::new([0u16; 16])))
    }

    #[test]
    fn stream_fields_round_trip() {
        let cr = StreamCr::empty()
            .with_channel(ChannelSelect::new(5).unwrap())
            .with_priority(Priority::VeryHigh)
            .with_memory_size(Size::HalfWord)
            .with_peripheral_size(Size::Word);
        assert_eq!(cr.channel(), 5);
        assert_eq!(cr.priority(), 0b11);
        assert_eq!(cr.memory_size(), 0b01);
        assert_eq!(cr.peripheral_size(), 0b10);
        assert_eq!(cr.bits(), (5 << 25) | (0b11 << 16) | (0b01 << 13) | (0b10 << 11));
    }

    #[test]
    fn flag_offsets_follow_the_reference_manual() {
        let offsets: [u32; 8] = StreamId::ALL.map(|s| s.flag_offset());
        assert_eq!(offsets, [0, 6, 16, 22, 0, 6, 16, 22]);
        assert!(!StreamId::Stream3.uses_high_flags());
        assert!(StreamId::Stream4.uses_high_flags());
    }

    #[test]
    fn rejects_out_of_range_identifiers() {
        assert_eq!(StreamId::new(8), Err(ConfigError::InvalidStream(8)));
        assert_eq!(ChannelSelect::new(8), Err(ConfigError::InvalidChannelSelect(8)));
        assert_eq!(StreamId::new(3), Ok(StreamId::Stream3));
    }

    #[test]
    fn transfer_count_must_fit_destination() {
        let buf = buffer();
        let dst = buf.destination();
        let src = AdcInstance::Adc1.data_register();
        let ch = ChannelSelect::new(0).unwrap();
        assert_eq!(
            DmaStreamConfig::new(DmaInstance::Dma2, StreamId::Stream0, ch, src, dst, 17),
            Err(ConfigError::BufferTooSmall {
                capacity: 16,
                transfer_count: 17
            })
        );
        assert_eq!(
            DmaStreamConfig::new(DmaInstance::Dma2, StreamId::Stream0, ch, src, dst, 0),
            Err(ConfigError::TransferCountZero)
        );
        assert!(DmaStreamConfig::new(DmaInstance::Dma2, StreamId::Stream0, ch, src, dst, 16).is_ok());
    }

    #[test]
    fn configures_circular_peripheral_to_memory() {
        let sim = Simulator::new();
        let buf = buffer();
        let config = config_for(&buf, 6);
        let mut stream = sim.stream();

        configure(&mut stream, &config, PollBudget::default()).unwrap();

        let cr = stream.control();
        assert!(cr.contains(StreamCr::EN | StreamCr::CIRC | StreamCr::MINC));
        assert!(!cr.contains(StreamCr::PINC));
        assert_eq!(cr.direction(), 0b00);
        assert_eq!(cr.memory_size(), 0b01);
        assert_eq!(cr.peripheral_size(), 0b01);
        assert_eq!(cr.priority(), 0b01);
        assert_eq!(cr.channel(), 0);
        assert_eq!(stream.number_of_transfers(), 6);

        let snap = sim.snapshot();
        assert_eq!(snap.stream_par, AdcInstance::Adc1.data_register().address());
        assert_eq!(snap.stream_m0ar, buf.destination().address());
    }

    #[test]
    fn waits_for_a_running_stream_to_release() {
        let sim = Simulator::new();
        let buf = buffer();
        let config = config_for(&buf, 6);
        let mut stream = sim.stream();
        configure(&mut stream, &config, PollBudget::default()).unwrap();

        // The stream finishes an in-flight beat before EN reads low
        sim.set_disable_latency(25);
        configure(&mut stream, &config, PollBudget::default()).unwrap();

        assert_eq!(sim.rejected_writes(), 0);
        assert!(stream.is_enabled());
        let log = sim.events();
        let disabled = log
            .iter()
            .rposition(|e| *e == SimEvent::StreamReleased)
            .unwrap();
        let reset = log.iter().rposition(|e| *e == SimEvent::StreamReset).unwrap();
        assert!(disabled < reset);
    }

    #[test]
    fn wedged_stream_times_out() {
        let sim = Simulator::new();
        let buf = buffer();
        let config = config_for(&buf, 6);
        let mut stream = sim.stream();
        configure(&mut stream, &config, PollBudget::default()).unwrap();

        sim.wedge_stream();
        assert_eq!(
            configure(&mut stream, &config, PollBudget::new(50)),
            Err(Error::PeripheralTimeout {
                stream: StreamId::Stream0
            })
        );
        // Nothing was reprogrammed behind the live transfer
        assert_eq!(sim.rejected_writes(), 0);
        assert_eq!(stream.number_of_transfers(), 6);
    }

    #[test]
    fn budget_counts_polls() {
        let mut calls = 0;
        assert!(!PollBudget::new(10).poll(|| {
            calls += 1;
            false
        }));
        assert_eq!(calls, 11);

        let mut calls = 0;
        assert!(PollBudget::new(10).poll(|| {
            calls += 1;
            calls == 3
        }));
        assert_eq!(calls, 3);
    }
}
