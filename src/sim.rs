//! Software model of the capture peripherals
//!
//! Models the parts of ADC, ADC common, one DMA stream, RCC and GPIO that the
//! capture pipeline touches, closely enough to run the full configuration
//! sequence and circular transfers on the host:
//!
//! - `SWSTART` converts one discontinuous group of the programmed sequence
//!   and hands each result to the stream, which writes it to the programmed
//!   memory address and counts `NDTR` down, reloading it in circular mode.
//! - Writes to a stream's configuration while `EN` reads set are dropped and
//!   counted, as the hardware write-protects them.
//! - A disable request can take a number of polls to be honoured, or never be
//!   honoured at all.
//! - Beats only land in memory handed over with [`Simulator::attach`]. Any
//!   other address ends the transfer with `TEIF`, like a bus error.
//!
//! All handles borrow one [`Simulator`] and share its state.

use core::cell::RefCell;
use core::ptr;

use heapless::Vec;

use crate::adc::{
    dma::Parts, AdcCommonRegisters, AdcInstance, AdcRegisters, Ccr, Channel, Cr1, Cr2, Sr,
};
use crate::dma::{
    Destination, DmaInstance, PeripheralAddress, SampleBuffer, StreamCr, StreamFlags, StreamId,
    StreamRegisters,
};
use crate::gpio::{two_bit_fields, PinControl, Pins, Port, Pull, MODE_ANALOG};
use crate::rcc::{Ahb1Enable, Apb2Enable, ClockControl};

/// Events kept by the log
pub const EVENT_LOG: usize = 256;

/// Sample buffers a simulator can hold at once
pub const REGIONS: usize = 4;

const QUEUE: usize = 32;
const FCR_RESET: u32 = 0x21;

/// When conversions happen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Timing {
    /// A trigger converts its whole group before returning
    #[default]
    Immediate,
    /// Conversions are queued; one completes each time software reads `NDTR`
    Stepped,
}

/// Observable milestones, in the order they happened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimEvent {
    AdcPowerOn,
    AdcPowerOff,
    ConversionStarted,
    StreamDisableRequested,
    StreamReleased,
    StreamReset,
    StreamEnabled,
    StreamWrapped,
    RejectedWrite,
    BusError,
}

/// Register contents, minus status flags and data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub ahb1enr: u32,
    pub apb2enr: u32,
    pub moder: [u32; 3],
    pub pupdr: [u32; 3],
    pub adc_cr1: u32,
    pub adc_cr2: u32,
    /// `SQR1`, `SQR2`, `SQR3`
    pub sqr: [u32; 3],
    /// `SMPR1`, `SMPR2`
    pub smpr: [u32; 2],
    pub ccr: u32,
    pub stream_cr: u32,
    pub stream_ndtr: u16,
    pub stream_par: usize,
    pub stream_m0ar: usize,
    pub stream_fcr: u32,
}

struct State {
    regs: Snapshot,
    adc_sr: u32,
    adc_dr: u16,
    stream_flags: u32,
    readings: [u16; 19],
    timing: Timing,
    queue: Vec<u8, QUEUE>,
    disc_position: usize,
    dma_halted: bool,
    ndtr_reload: u16,
    next_index: usize,
    disable_latency: u32,
    disable_countdown: Option<u32>,
    wedged: bool,
    rejected: u32,
    regions: Vec<Destination, REGIONS>,
    bus_errors: u32,
    log: Vec<SimEvent, EVENT_LOG>,
}

impl State {
    fn new() -> Self {
        State {
            regs: Snapshot {
                stream_fcr: FCR_RESET,
                ..Snapshot::default()
            },
            adc_sr: 0,
            adc_dr: 0,
            stream_flags: 0,
            readings: [0; 19],
            timing: Timing::default(),
            queue: Vec::new(),
            disc_position: 0,
            dma_halted: false,
            ndtr_reload: 0,
            next_index: 0,
            disable_latency: 0,
            disable_countdown: None,
            wedged: false,
            rejected: 0,
            regions: Vec::new(),
            bus_errors: 0,
            log: Vec::new(),
        }
    }

    fn event(&mut self, event: SimEvent) {
        // a full log just stops recording
        self.log.push(event).ok();
    }

    fn reject(&mut self) {
        self.rejected += 1;
        self.event(SimEvent::RejectedWrite);
    }

    fn stream_cr(&self) -> StreamCr {
        StreamCr::from_bits_truncate(self.regs.stream_cr)
    }

    fn stream_enabled(&self) -> bool {
        self.stream_cr().contains(StreamCr::EN)
    }

    /// Stream configuration registers only accept writes while disabled
    fn stream_writable(&mut self) -> bool {
        if self.stream_enabled() {
            self.reject();
            false
        } else {
            true
        }
    }

    fn release_stream(&mut self) {
        self.regs.stream_cr &= !StreamCr::EN.bits();
        self.disable_countdown = None;
        self.event(SimEvent::StreamReleased);
    }

    fn request_disable(&mut self) {
        self.event(SimEvent::StreamDisableRequested);
        if self.disable_countdown.is_some() {
            return;
        }
        if self.disable_latency == 0 && !self.wedged {
            self.release_stream();
        } else {
            self.disable_countdown = Some(self.disable_latency.max(1));
        }
    }

    fn poll_disable(&mut self) {
        if self.wedged {
            return;
        }
        if let Some(n) = self.disable_countdown {
            if n <= 1 {
                self.release_stream();
            } else {
                self.disable_countdown = Some(n - 1);
            }
        }
    }

    /// Whether a half-word at `address` lies inside an attached buffer
    fn writable(&self, address: usize) -> bool {
        address % 2 == 0
            && self.regions.iter().any(|r| {
                address >= r.address() && address + 2 <= r.address() + 2 * r.capacity()
            })
    }

    fn bus_error(&mut self) {
        self.bus_errors += 1;
        self.stream_flags |= StreamFlags::TEIF.bits();
        self.regs.stream_cr &= !StreamCr::EN.bits();
        self.event(SimEvent::BusError);
    }

    fn step(&mut self) {
        if !self.queue.is_empty() {
            let channel = self.queue.remove(0);
            self.convert(channel);
        }
    }

    /// One peripheral-to-memory beat; `false` if the stream did not take the word
    fn dma_transfer(&mut self, word: u16) -> bool {
        let cr = self.stream_cr();
        let source = AdcInstance::Adc1.data_register().address();
        if !cr.contains(StreamCr::EN)
            || self.disable_countdown.is_some()
            || cr.direction() != 0
            || self.regs.stream_par != source
            || self.regs.stream_ndtr == 0
        {
            return false;
        }

        let address = self.regs.stream_m0ar.wrapping_add(2 * self.next_index);
        if !self.writable(address) {
            self.bus_error();
            return false;
        }
        // NOTE(unsafe) `address` is an aligned half-word inside a buffer
        // registered through `attach`, which only accepts `'static` storage.
        unsafe { ptr::write_volatile(address as *mut u16, word) };
        if cr.contains(StreamCr::MINC) {
            self.next_index += 1;
        }

        self.regs.stream_ndtr -= 1;
        if self.regs.stream_ndtr == self.ndtr_reload / 2 {
            self.stream_flags |= StreamFlags::HTIF.bits();
        }
        if self.regs.stream_ndtr == 0 {
            self.stream_flags |= StreamFlags::TCIF.bits();
            if cr.contains(StreamCr::CIRC) {
                self.regs.stream_ndtr = self.ndtr_reload;
                self.next_index = 0;
                self.event(SimEvent::StreamWrapped);
            } else {
                self.regs.stream_cr &= !StreamCr::EN.bits();
                if !Cr2::from_bits_truncate(self.regs.adc_cr2).contains(Cr2::DDS) {
                    self.dma_halted = true;
                }
            }
        }
        true
    }

    fn convert(&mut self, channel: u8) {
        let cr2 = Cr2::from_bits_truncate(self.regs.adc_cr2);
        let raw = self.readings[channel as usize] & 0x0FFF;
        let value = if cr2.contains(Cr2::ALIGN) { raw << 4 } else { raw };

        self.adc_dr = value;
        self.adc_sr |= Sr::EOC.bits();
        if cr2.contains(Cr2::DMA) {
            if !self.dma_halted && self.dma_transfer(value) {
                // reading DR through DMA clears EOC
                self.adc_sr &= !Sr::EOC.bits();
            } else {
                self.adc_sr |= Sr::OVR.bits();
            }
        }
    }

    fn sequence(&self) -> Vec<u8, 16> {
        let len = ((self.regs.sqr[0] >> 20) & 0xf) as usize + 1;
        (0..len)
            .map(|i| {
                let reg = match i / 6 {
                    0 => self.regs.sqr[2],
                    1 => self.regs.sqr[1],
                    _ => self.regs.sqr[0],
                };
                ((reg >> ((i % 6) * 5)) & 0b11111) as u8
            })
            .collect()
    }

    fn start_regular(&mut self) {
        let cr1 = Cr1::from_bits_truncate(self.regs.adc_cr1);
        let sequence = self.sequence();
        let group: Vec<u8, 16> = if !cr1.contains(Cr1::SCAN) {
            sequence.iter().take(1).copied().collect()
        } else if cr1.contains(Cr1::DISCEN) {
            let start = self.disc_position.min(sequence.len() - 1);
            let end = (start + cr1.discontinuous_count()).min(sequence.len());
            self.disc_position = if end == sequence.len() { 0 } else { end };
            sequence[start..end].iter().copied().collect()
        } else {
            sequence
        };

        self.adc_sr |= Sr::STRT.bits();
        self.event(SimEvent::ConversionStarted);
        for channel in group {
            match self.timing {
                Timing::Immediate => self.convert(channel),
                Timing::Stepped => {
                    // a full queue drops the trigger like a busy converter
                    self.queue.push(channel).ok();
                }
            }
        }
    }
}

/// Host-side stand-in for the capture peripherals
pub struct Simulator {
    state: RefCell<State>,
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Simulator {
            state: RefCell::new(State::new()),
        }
    }

    /// ADC1, the common registers and DMA2 stream 0
    pub fn parts(&self) -> Parts<SimAdc<'_>, SimCommon<'_>, SimStream<'_>> {
        Parts {
            adc: SimAdc { state: &self.state },
            common: SimCommon { state: &self.state },
            stream: self.stream(),
        }
    }

    pub fn stream(&self) -> SimStream<'_> {
        SimStream { state: &self.state }
    }

    pub fn rcc(&self) -> SimRcc<'_> {
        SimRcc { state: &self.state }
    }

    pub fn gpio(&self) -> SimGpio<'_> {
        SimGpio { state: &self.state }
    }

    /// Let the stream write into `buffer`
    ///
    /// Returns `false` when [`REGIONS`] buffers are already attached.
    pub fn attach<const N: usize>(&self, buffer: &SampleBuffer<&'static mut [u16; N]>) -> bool {
        let destination = buffer.destination();
        let mut s = self.state.borrow_mut();
        s.regions.contains(&destination) || s.regions.push(destination).is_ok()
    }

    pub fn set_timing(&self, timing: Timing) {
        self.state.borrow_mut().timing = timing;
    }

    /// Raw value the converter returns for `channel`
    pub fn set_reading(&self, channel: Channel, value: u16) {
        self.state.borrow_mut().readings[channel.number() as usize] = value;
    }

    /// Polls of the stream's enable bit before a disable request is honoured
    pub fn set_disable_latency(&self, polls: u32) {
        self.state.borrow_mut().disable_latency = polls;
    }

    /// Never honour a disable request again
    pub fn wedge_stream(&self) {
        self.state.borrow_mut().wedged = true;
    }

    /// Honour disable requests again, a pending one included
    pub fn unwedge_stream(&self) {
        self.state.borrow_mut().wedged = false;
    }

    /// Transfer error: the stream flags `TEIF` and disables itself
    pub fn inject_transfer_error(&self) {
        let mut s = self.state.borrow_mut();
        s.stream_flags |= StreamFlags::TEIF.bits();
        s.regs.stream_cr &= !StreamCr::EN.bits();
    }

    /// Configuration writes dropped because the stream was enabled
    pub fn rejected_writes(&self) -> u32 {
        self.state.borrow().rejected
    }

    /// Beats aimed outside every attached buffer
    pub fn bus_errors(&self) -> u32 {
        self.state.borrow().bus_errors
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().regs
    }

    pub fn events(&self) -> Vec<SimEvent, EVENT_LOG> {
        self.state.borrow().log.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().log.clear();
    }

    /// Conversions queued in [`Timing::Stepped`] mode
    pub fn pending_conversions(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Complete every queued conversion
    pub fn settle(&self) {
        let mut s = self.state.borrow_mut();
        while !s.queue.is_empty() {
            s.step();
        }
    }
}

/// ADC1 registers
pub struct SimAdc<'a> {
    state: &'a RefCell<State>,
}

impl AdcRegisters for SimAdc<'_> {
    fn instance(&self) -> AdcInstance {
        AdcInstance::Adc1
    }

    fn status(&self) -> Sr {
        Sr::from_bits_truncate(self.state.borrow().adc_sr)
    }

    fn clear_status(&mut self, flags: Sr) {
        self.state.borrow_mut().adc_sr &= !flags.bits();
    }

    fn cr1(&self) -> Cr1 {
        Cr1::from_bits_truncate(self.state.borrow().regs.adc_cr1)
    }

    fn modify_cr1<F>(&mut self, f: F)
    where
        F: FnOnce(Cr1) -> Cr1,
    {
        let mut s = self.state.borrow_mut();
        s.regs.adc_cr1 = f(Cr1::from_bits_truncate(s.regs.adc_cr1)).bits();
    }

    fn cr2(&self) -> Cr2 {
        Cr2::from_bits_truncate(self.state.borrow().regs.adc_cr2)
    }

    fn modify_cr2<F>(&mut self, f: F)
    where
        F: FnOnce(Cr2) -> Cr2,
    {
        let mut s = self.state.borrow_mut();
        let old = Cr2::from_bits_truncate(s.regs.adc_cr2);
        let new = f(old);
        s.regs.adc_cr2 = (new - Cr2::SWSTART).bits();

        match (old.contains(Cr2::ADON), new.contains(Cr2::ADON)) {
            (false, true) => s.event(SimEvent::AdcPowerOn),
            (true, false) => s.event(SimEvent::AdcPowerOff),
            _ => {}
        }
        if !new.contains(Cr2::DMA) {
            s.dma_halted = false;
        }
        if new.contains(Cr2::SWSTART) && new.contains(Cr2::ADON) {
            s.start_regular();
        }
    }

    fn write_sample_times(&mut self, smpr1: u32, smpr2: u32) {
        self.state.borrow_mut().regs.smpr = [smpr1, smpr2];
    }

    fn write_regular_sequence(&mut self, sqr1: u32, sqr2: u32, sqr3: u32) {
        let mut s = self.state.borrow_mut();
        s.regs.sqr = [sqr1, sqr2, sqr3];
        s.disc_position = 0;
    }

    fn data_register(&self) -> PeripheralAddress {
        AdcInstance::Adc1.data_register()
    }
}

/// ADC common registers
pub struct SimCommon<'a> {
    state: &'a RefCell<State>,
}

impl AdcCommonRegisters for SimCommon<'_> {
    fn ccr(&self) -> Ccr {
        Ccr::from_bits_truncate(self.state.borrow().regs.ccr)
    }

    fn modify_ccr<F>(&mut self, f: F)
    where
        F: FnOnce(Ccr) -> Ccr,
    {
        let mut s = self.state.borrow_mut();
        s.regs.ccr = f(Ccr::from_bits_truncate(s.regs.ccr)).bits();
    }
}

/// DMA2 stream 0
pub struct SimStream<'a> {
    state: &'a RefCell<State>,
}

impl StreamRegisters for SimStream<'_> {
    fn controller(&self) -> DmaInstance {
        DmaInstance::Dma2
    }

    fn id(&self) -> StreamId {
        StreamId::Stream0
    }

    fn control(&self) -> StreamCr {
        let mut s = self.state.borrow_mut();
        s.poll_disable();
        s.stream_cr()
    }

    fn modify_control<F>(&mut self, f: F)
    where
        F: FnOnce(StreamCr) -> StreamCr,
    {
        let mut s = self.state.borrow_mut();
        let old = s.stream_cr();
        let new = f(old);

        if old.contains(StreamCr::EN) {
            if !(new ^ old).difference(StreamCr::EN).is_empty() {
                s.reject();
            }
            if !new.contains(StreamCr::EN) {
                s.request_disable();
            }
            return;
        }

        s.regs.stream_cr = new.bits();
        if new.contains(StreamCr::EN) {
            s.ndtr_reload = s.regs.stream_ndtr;
            s.next_index = 0;
            s.event(SimEvent::StreamEnabled);
        }
    }

    fn set_peripheral_address(&mut self, address: usize) {
        let mut s = self.state.borrow_mut();
        if s.stream_writable() {
            s.regs.stream_par = address;
        }
    }

    fn set_memory_address(&mut self, address: usize) {
        let mut s = self.state.borrow_mut();
        if s.stream_writable() {
            s.regs.stream_m0ar = address;
        }
    }

    fn set_number_of_transfers(&mut self, count: u16) {
        let mut s = self.state.borrow_mut();
        if s.stream_writable() {
            s.regs.stream_ndtr = count;
        }
    }

    fn number_of_transfers(&self) -> u16 {
        let mut s = self.state.borrow_mut();
        if s.timing == Timing::Stepped {
            s.step();
        }
        s.regs.stream_ndtr
    }

    fn reset(&mut self) {
        let mut s = self.state.borrow_mut();
        if s.stream_writable() {
            s.regs.stream_cr = 0;
            s.regs.stream_ndtr = 0;
            s.regs.stream_par = 0;
            s.regs.stream_m0ar = 0;
            s.regs.stream_fcr = FCR_RESET;
            s.event(SimEvent::StreamReset);
        }
    }

    fn flags(&self) -> StreamFlags {
        StreamFlags::from_bits_truncate(self.state.borrow().stream_flags)
    }

    fn clear_flags(&mut self, flags: StreamFlags) {
        self.state.borrow_mut().stream_flags &= !flags.bits();
    }
}

/// RCC clock gates
pub struct SimRcc<'a> {
    state: &'a RefCell<State>,
}

impl ClockControl for SimRcc<'_> {
    fn enable_ahb1(&mut self, bits: Ahb1Enable) {
        self.state.borrow_mut().regs.ahb1enr |= bits.bits();
    }

    fn enable_apb2(&mut self, bits: Apb2Enable) {
        self.state.borrow_mut().regs.apb2enr |= bits.bits();
    }
}

/// GPIOA..GPIOC mode and pull registers
pub struct SimGpio<'a> {
    state: &'a RefCell<State>,
}

impl PinControl for SimGpio<'_> {
    fn set_analog(&mut self, port: Port, pins: Pins, pull: Pull) {
        let mut s = self.state.borrow_mut();
        let i = port.index();
        s.regs.moder[i] = two_bit_fields(s.regs.moder[i], pins, MODE_ANALOG);
        s.regs.pupdr[i] = two_bit_fields(s.regs.pupdr[i], pins, pull.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::SampleBuffer;

    use std::boxed::Box;

    #[test]
    fn enabled_stream_is_write_protected() {
        let sim = Simulator::new();
        let mut stream = sim.stream();
        stream.set_number_of_transfers(4);
        stream.modify_control(|cr| cr | StreamCr::EN);

        stream.set_number_of_transfers(8);
        stream.set_memory_address(0x2000_0000);
        stream.modify_control(|cr| cr | StreamCr::CIRC);
        stream.reset();

        assert_eq!(sim.rejected_writes(), 4);
        assert_eq!(stream.number_of_transfers(), 4);
        assert!(!stream.control().contains(StreamCr::CIRC));
        assert!(stream.is_enabled());
    }

    #[test]
    fn disable_honoured_after_latency() {
        let sim = Simulator::new();
        let mut stream = sim.stream();
        stream.modify_control(|cr| cr | StreamCr::EN);
        sim.set_disable_latency(3);

        stream.modify_control(|cr| cr - StreamCr::EN);
        assert!(stream.is_enabled());
        assert!(stream.is_enabled());
        assert!(!stream.is_enabled());
        assert_eq!(sim.rejected_writes(), 0);
    }

    #[test]
    fn triggers_are_ignored_while_powered_down() {
        let sim = Simulator::new();
        let mut adc = sim.parts().adc;
        adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);
        assert!(adc.status().is_empty());
        assert!(!adc.cr2().contains(Cr2::SWSTART));
    }

    #[test]
    fn circular_stream_reloads_and_flags_completion() {
        let sim = Simulator::new();
        let buf = SampleBuffer::new(Box::leak(Box::new([0u16; 16])));
        assert!(sim.attach(&buf));
        let Parts {
            mut adc,
            mut stream,
            ..
        } = sim.parts();
        sim.set_reading(Channel::new(8).unwrap(), 0x123);

        adc.write_regular_sequence(0, 0, 8);
        adc.modify_cr2(|cr2| cr2 | Cr2::ADON | Cr2::DMA | Cr2::DDS);
        stream.set_peripheral_address(AdcInstance::Adc1.data_register().address());
        stream.set_memory_address(buf.destination().address());
        stream.set_number_of_transfers(2);
        stream.modify_control(|cr| cr | StreamCr::MINC | StreamCr::CIRC | StreamCr::EN);

        adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);
        assert_eq!(stream.number_of_transfers(), 1);
        assert!(stream.flags().contains(StreamFlags::HTIF));
        adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);
        assert_eq!(stream.number_of_transfers(), 2);
        assert!(stream.flags().contains(StreamFlags::TCIF));
        assert_eq!(buf.get(0), Some(0x123));
        assert_eq!(buf.get(1), Some(0x123));
        assert!(!adc.status().contains(Sr::OVR));
        assert!(sim.events().contains(&SimEvent::StreamWrapped));
    }

    #[test]
    fn stepped_conversions_run_on_counter_reads() {
        let sim = Simulator::new();
        sim.set_timing(Timing::Stepped);
        let mut adc = sim.parts().adc;
        adc.write_regular_sequence(1 << 20, 0, 8 | (9 << 5));
        adc.modify_cr1(|cr1| cr1 | Cr1::SCAN);
        adc.modify_cr2(|cr2| cr2 | Cr2::ADON);
        adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);
        assert_eq!(sim.pending_conversions(), 2);

        sim.stream().number_of_transfers();
        assert_eq!(sim.pending_conversions(), 1);
        sim.settle();
        assert_eq!(sim.pending_conversions(), 0);
    }

    #[test]
    fn beats_outside_attached_buffers_are_refused() {
        let sim = Simulator::new();
        let attached = SampleBuffer::new(Box::leak(Box::new([0u16; 4])));
        assert!(sim.attach(&attached));
        let foreign: &'static mut [u16; 4] = Box::leak(Box::new([0xAAAA; 4]));
        let foreign_address = foreign.as_ptr() as usize;

        let Parts {
            mut adc,
            mut stream,
            ..
        } = sim.parts();
        sim.set_reading(Channel::new(8).unwrap(), 0x123);
        adc.write_regular_sequence(0, 0, 8);
        adc.modify_cr2(|cr2| cr2 | Cr2::ADON | Cr2::DMA | Cr2::DDS);
        stream.set_peripheral_address(AdcInstance::Adc1.data_register().address());
        stream.set_memory_address(foreign_address);
        stream.set_number_of_transfers(4);
        stream.modify_control(|cr| cr | StreamCr::MINC | StreamCr::CIRC | StreamCr::EN);

        adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);

        assert_eq!(*foreign, [0xAAAA; 4]);
        assert_eq!(sim.bus_errors(), 1);
        assert!(stream.flags().contains(StreamFlags::TEIF));
        assert!(!stream.is_enabled());
        assert!(adc.status().contains(Sr::OVR));
    }

    #[test]
    fn counter_cannot_run_past_an_attached_buffer() {
        let sim = Simulator::new();
        let buf = SampleBuffer::new(Box::leak(Box::new([0u16; 2])));
        assert!(sim.attach(&buf));
        let Parts {
            mut adc,
            mut stream,
            ..
        } = sim.parts();
        adc.write_regular_sequence(0, 0, 8);
        adc.modify_cr2(|cr2| cr2 | Cr2::ADON | Cr2::DMA | Cr2::DDS);
        stream.set_peripheral_address(AdcInstance::Adc1.data_register().address());
        stream.set_memory_address(buf.destination().address());
        stream.set_number_of_transfers(3);
        stream.modify_control(|cr| cr | StreamCr::MINC | StreamCr::EN);

        for _ in 0..3 {
            adc.modify_cr2(|cr2| cr2 | Cr2::SWSTART);
        }
        assert_eq!(sim.bus_errors(), 1);
        assert_eq!(stream.number_of_transfers(), 1);
    }

    #[test]
    fn unwedged_stream_finishes_its_disable() {
        let sim = Simulator::new();
        let mut stream = sim.stream();
        stream.modify_control(|cr| cr | StreamCr::EN);
        sim.wedge_stream();

        stream.modify_control(|cr| cr - StreamCr::EN);
        assert!(stream.is_enabled());
        assert!(stream.is_enabled());

        sim.unwedge_stream();
        assert!(!stream.is_enabled());
    }
}
