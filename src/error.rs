//! # Errors

use crate::dma::StreamId;

/// Errors reported by the capture pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The stream enable bit did not read back as cleared within the poll budget
    PeripheralTimeout { stream: StreamId },
    /// Every attempt of a checked read overlapped a DMA write
    TornRead,
    /// The ADC flagged an overrun while a scan was in flight
    Overrun,
    /// The output slice does not match the configured channel count
    LengthMismatch { expected: usize, actual: usize },
    /// The sample buffer is not bound to a running stream
    NotArmed,
    /// The configuration was rejected
    Config(ConfigError),
}

/// Reasons a configuration is rejected at construction time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The regular sequence is empty
    NoChannels,
    /// The regular sequence holds more than [`MAX_CHANNELS`](crate::adc::MAX_CHANNELS) entries
    TooManyChannels,
    /// Channel number outside 0..=18
    InvalidChannel(u8),
    /// Stream index outside 0..=7
    InvalidStream(u8),
    /// Request line outside 0..=7
    InvalidChannelSelect(u8),
    /// The DMA transfer count is zero
    TransferCountZero,
    /// Each scan deposits one word per channel, so the ring must hold whole scans
    TransferCountNotMultiple { channels: usize, transfer_count: u16 },
    /// The destination cannot hold one full cycle of transfers
    BufferTooSmall { capacity: usize, transfer_count: u16 },
    /// The stream would read from a register other than the ADC's data register
    SourceMismatch,
    /// The stream would write somewhere other than the pipeline's sample buffer
    DestinationMismatch,
    /// The configuration names a different ADC or DMA stream than the one supplied
    PeripheralMismatch,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}
