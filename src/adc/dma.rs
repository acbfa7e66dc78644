//! Circular DMA capture of a regular sequence
//!
//! [`AdcDma`] owns the ADC, the ADC common registers, the DMA stream and the
//! sample buffer. Once set up, every [`trigger`](AdcDma::trigger) converts the
//! configured sequence once and the stream deposits the results into the
//! buffer, wrapping after `transfer_count` words.

use core::fmt;

use super::*;

use crate::dma::{SampleBuffer, StreamFlags};
use crate::gpio::PinControl;
use crate::rcc::{self, ClockControl, Enablement};

/// Checked reads give up after this many overlapping DMA writes
pub const CONSISTENT_READ_ATTEMPTS: usize = 3;

/// Register blocks driven by one capture pipeline
pub struct Parts<ADC, COMMON, STREAM> {
    pub adc: ADC,
    pub common: COMMON,
    pub stream: STREAM,
}

/// A failed setup, with everything that was handed in
pub struct SetupError<ADC, COMMON, STREAM, B> {
    pub error: Error,
    pub parts: Parts<ADC, COMMON, STREAM>,
    pub buffer: SampleBuffer<B>,
}

impl<ADC, COMMON, STREAM, B> fmt::Debug for SetupError<ADC, COMMON, STREAM, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<ADC, COMMON, STREAM, B> From<SetupError<ADC, COMMON, STREAM, B>> for Error {
    fn from(e: SetupError<ADC, COMMON, STREAM, B>) -> Self {
        e.error
    }
}

/// A failed release; the capture is still running
pub struct ReleaseError<ADC, COMMON, STREAM, B> {
    pub error: Error,
    pub capture: AdcDma<ADC, COMMON, STREAM, B>,
}

impl<ADC, COMMON, STREAM, B> fmt::Debug for ReleaseError<ADC, COMMON, STREAM, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<ADC, COMMON, STREAM, B> From<ReleaseError<ADC, COMMON, STREAM, B>> for Error {
    fn from(e: ReleaseError<ADC, COMMON, STREAM, B>) -> Self {
        e.error
    }
}

/// ADC regular sequence sampled into a circular DMA buffer
pub struct AdcDma<ADC, COMMON, STREAM, B> {
    parts: Parts<ADC, COMMON, STREAM>,
    buffer: SampleBuffer<B>,
    config: AdcConfig,
    budget: PollBudget,
    /// Counter span of the scan started by the last trigger, until it lands
    pending: Option<Pending>,
}

#[derive(Clone, Copy)]
struct Pending {
    start: u16,
    end: u16,
    wrapped: bool,
}

impl<ADC, COMMON, STREAM, B> AdcDma<ADC, COMMON, STREAM, B>
where
    ADC: AdcRegisters,
    COMMON: AdcCommonRegisters,
    STREAM: StreamRegisters,
{
    /// Clock and route the inputs, configure the ADC and arm the stream
    ///
    /// On failure the parts and the buffer come back with the error.
    pub fn setup<R, G>(
        parts: Parts<ADC, COMMON, STREAM>,
        rcc: &mut R,
        gpio: &mut G,
        config: AdcConfig,
        buffer: SampleBuffer<B>,
    ) -> Result<Self, SetupError<ADC, COMMON, STREAM, B>>
    where
        R: ClockControl,
        G: PinControl,
    {
        Self::setup_with_budget(parts, rcc, gpio, config, buffer, PollBudget::default())
    }

    /// [`setup`](Self::setup) with an explicit bound on the stream disable poll
    pub fn setup_with_budget<R, G>(
        parts: Parts<ADC, COMMON, STREAM>,
        rcc: &mut R,
        gpio: &mut G,
        config: AdcConfig,
        buffer: SampleBuffer<B>,
        budget: PollBudget,
    ) -> Result<Self, SetupError<ADC, COMMON, STREAM, B>>
    where
        R: ClockControl,
        G: PinControl,
    {
        let dma = config.dma();
        let mismatch = if parts.adc.instance() != config.adc()
            || parts.stream.controller() != dma.dma
            || parts.stream.id() != dma.stream
        {
            Some(ConfigError::PeripheralMismatch)
        } else if parts.adc.data_register() != dma.source {
            Some(ConfigError::SourceMismatch)
        } else if buffer.destination() != dma.destination {
            Some(ConfigError::DestinationMismatch)
        } else {
            None
        };
        if let Some(e) = mismatch {
            return Err(SetupError {
                error: e.into(),
                parts,
                buffer,
            });
        }

        let mut this = AdcDma {
            parts,
            buffer,
            config,
            budget,
            pending: None,
        };
        match this.bring_up(rcc, gpio) {
            Ok(()) => Ok(this),
            Err(error) => {
                this.buffer.disarm();
                Err(SetupError {
                    error,
                    parts: this.parts,
                    buffer: this.buffer,
                })
            }
        }
    }

    fn bring_up<R, G>(&mut self, rcc: &mut R, gpio: &mut G) -> Result<(), Error>
    where
        R: ClockControl,
        G: PinControl,
    {
        let Parts {
            adc,
            common,
            stream,
        } = &mut self.parts;

        rcc::enable(rcc, gpio, &Enablement::for_config(&self.config));
        prepare(adc, common, &self.config);
        self.buffer.arm(self.config.dma().transfer_count)?;
        configure(adc, common, stream, &self.config, self.budget)?;
        adc.clear_status(Sr::OVR | Sr::EOC | Sr::STRT);
        self.pending = None;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "capture armed: {} channels, {} frames",
            self.config.channel_count(),
            self.config.frames()
        );
        Ok(())
    }

    /// Run the whole setup sequence again on the same configuration
    ///
    /// Leaves the peripherals in the same state as a single setup.
    pub fn reconfigure<R, G>(&mut self, rcc: &mut R, gpio: &mut G) -> Result<(), Error>
    where
        R: ClockControl,
        G: PinControl,
    {
        self.bring_up(rcc, gpio)
    }

    /// Start one conversion of the regular sequence and return immediately
    pub fn trigger(&mut self) {
        self.take_wrap();
        let start = self.parts.stream.number_of_transfers();
        self.pending = Some(Pending {
            start,
            end: self.counter_after(start, self.config.channel_count()),
            wrapped: false,
        });
        start_regular(&mut self.parts.adc);
    }

    /// Completion of the scan started by the last [`trigger`](Self::trigger)
    ///
    /// `Ok` when no scan is in flight.
    pub fn poll_scan(&mut self) -> nb::Result<(), Error> {
        if self.parts.adc.status().contains(Sr::OVR) {
            self.pending = None;
            #[cfg(feature = "defmt")]
            defmt::warn!("ADC overrun");
            return Err(nb::Error::Other(Error::Overrun));
        }
        let Some(mut pending) = self.pending else {
            return Ok(());
        };
        pending.wrapped |= self.take_wrap();
        let remaining = self.parts.stream.number_of_transfers();
        // A single-frame ring comes back to the same counter value, the
        // transfer-complete flag tells a finished scan from a pending one.
        let done = remaining == pending.end && (pending.end != pending.start || pending.wrapped);
        if done {
            self.pending = None;
            Ok(())
        } else {
            self.pending = Some(pending);
            Err(nb::Error::WouldBlock)
        }
    }

    /// Copy buffer slots `0..channel_count` into `out`
    ///
    /// The copy is not synchronised with the stream and may mix two scans.
    pub fn read_latest(&self, out: &mut [u16]) -> Result<(), Error> {
        self.check_len(out)?;
        self.buffer.copy_wrapping(0, out)
    }

    /// Buffer slots 0 and 1, whatever the channel count
    pub fn read_pair(&self) -> [u16; 2] {
        [
            self.buffer.get(0).unwrap_or(0),
            self.buffer.get(1).unwrap_or(0),
        ]
    }

    /// Copy the most recently completed scan into `out`
    ///
    /// Unsynchronised like [`read_latest`](Self::read_latest).
    pub fn read_newest(&self, out: &mut [u16]) -> Result<(), Error> {
        self.check_len(out)?;
        let remaining = self.parts.stream.number_of_transfers();
        self.buffer.copy_wrapping(self.newest_frame(remaining), out)
    }

    /// Copy the most recently completed scan, retrying while the stream writes underneath
    ///
    /// Fails with [`Error::TornRead`] when every attempt overlapped a transfer.
    pub fn read_consistent(&mut self, out: &mut [u16]) -> Result<(), Error> {
        self.check_len(out)?;
        for _ in 0..CONSISTENT_READ_ATTEMPTS {
            self.take_wrap();
            let before = self.parts.stream.number_of_transfers();
            self.buffer.copy_wrapping(self.newest_frame(before), out)?;
            let after = self.parts.stream.number_of_transfers();
            if !self.take_wrap() && before == after {
                return Ok(());
            }
        }
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "no quiet window in {} read attempts",
            CONSISTENT_READ_ATTEMPTS
        );
        Err(Error::TornRead)
    }

    /// Stop the stream, power the ADC down and hand everything back
    ///
    /// If the stream does not stop, the capture comes back with the error and
    /// can be released again later.
    #[allow(clippy::type_complexity)]
    pub fn release(
        mut self,
    ) -> Result<(Parts<ADC, COMMON, STREAM>, SampleBuffer<B>), ReleaseError<ADC, COMMON, STREAM, B>>
    {
        if let Err(error) = crate::dma::disable(&mut self.parts.stream, self.budget) {
            return Err(ReleaseError {
                error,
                capture: self,
            });
        }
        let AdcDma {
            mut parts,
            mut buffer,
            ..
        } = self;
        parts.adc.modify_cr2(|cr2| cr2 - (Cr2::DMA | Cr2::DDS));
        power_down(&mut parts.adc);
        buffer.disarm();
        Ok((parts, buffer))
    }

    pub fn config(&self) -> &AdcConfig {
        &self.config
    }

    pub fn buffer(&self) -> &SampleBuffer<B> {
        &self.buffer
    }

    /// Words left before the stream wraps
    pub fn remaining_transfers(&self) -> u16 {
        self.parts.stream.number_of_transfers()
    }

    fn check_len(&self, out: &[u16]) -> Result<(), Error> {
        let expected = self.config.channel_count();
        if out.len() == expected {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                expected,
                actual: out.len(),
            })
        }
    }

    /// Clear a pending transfer-complete flag, reporting whether it was set
    fn take_wrap(&mut self) -> bool {
        let set = self.parts.stream.flags().contains(StreamFlags::TCIF);
        if set {
            self.parts.stream.clear_flags(StreamFlags::TCIF);
            if let Some(pending) = self.pending.as_mut() {
                pending.wrapped = true;
            }
        }
        set
    }

    fn transfer_count(&self) -> usize {
        self.config.dma().transfer_count as usize
    }

    /// Write position within the cycle for a given counter value
    fn position(&self, remaining: u16) -> usize {
        let total = self.transfer_count();
        (total - (remaining as usize).min(total)) % total
    }

    fn counter_after(&self, remaining: u16, words: usize) -> u16 {
        let total = self.transfer_count();
        let position = (self.position(remaining) + words) % total;
        (total - position) as u16
    }

    /// First slot of the newest fully written frame
    fn newest_frame(&self, remaining: u16) -> usize {
        let n = self.config.channel_count();
        let frames = self.config.frames();
        let complete = self.position(remaining) / n;
        ((complete + frames - 1) % frames) * n
    }
}
