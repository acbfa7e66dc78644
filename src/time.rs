//! Time units
//!
//! Rates are [`fugit`] types. [`RateExtU32`] adds `.Hz()`, `.kHz()` and
//! `.MHz()` to `u32`.
//!
//! ```rust
//! use stm32f4xx_adc_dma::time::{Hertz, RateExtU32};
//!
//! let pclk2: Hertz = 84.MHz();
//! assert_eq!(pclk2, Hertz::kHz(84_000));
//! ```

pub use fugit::{
    HertzU32 as Hertz, KilohertzU32 as KiloHertz, MegahertzU32 as MegaHertz, RateExtU32,
};

/// CPU cycles spanning at least `us` microseconds at `sysclk`
pub fn cycles_for_us(sysclk: Hertz, us: u32) -> u32 {
    (sysclk.raw() / 1_000_000).max(1) * us
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microsecond_cycles() {
        assert_eq!(cycles_for_us(168.MHz(), 3), 504);
        assert_eq!(cycles_for_us(16.MHz(), 1), 16);
        assert_eq!(cycles_for_us(500.kHz(), 2), 2);
    }
}
