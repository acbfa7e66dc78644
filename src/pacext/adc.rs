use super::*;

use crate::time::cycles_for_us;

/// Worst-case power-up time (`tSTAB`) over the family
const T_STAB_US: u32 = 3;

/// ADC register block
pub struct Adc<ADC> {
    rb: ADC,
    stab_cycles: u32,
}

impl<ADC> Adc<ADC> {
    pub fn free(self) -> ADC {
        self.rb
    }
}

macro_rules! adc {
    ($($ADC:ident: ($adc:ident, $instance:ident),)+) => {
        $(
            impl Adc<pac::$ADC> {
                /// Wrap the registers; `sysclk` sizes the power-up delay
                pub fn $adc(rb: pac::$ADC, sysclk: Hertz) -> Self {
                    Adc {
                        rb,
                        stab_cycles: cycles_for_us(sysclk, T_STAB_US),
                    }
                }
            }

            impl AdcRegisters for Adc<pac::$ADC> {
                fn instance(&self) -> AdcInstance {
                    AdcInstance::$instance
                }

                fn status(&self) -> Sr {
                    Sr::from_bits_truncate(self.rb.sr().read().bits())
                }

                fn clear_status(&mut self, flags: Sr) {
                    // rc_w0: ones leave the other flags alone
                    self.rb.sr().write(|w| unsafe { w.bits(!flags.bits()) });
                }

                fn cr1(&self) -> Cr1 {
                    Cr1::from_bits_truncate(self.rb.cr1().read().bits())
                }

                fn modify_cr1<F>(&mut self, f: F)
                where
                    F: FnOnce(Cr1) -> Cr1,
                {
                    self.rb
                        .cr1()
                        .modify(|r, w| unsafe { w.bits(f(Cr1::from_bits_truncate(r.bits())).bits()) });
                }

                fn cr2(&self) -> Cr2 {
                    Cr2::from_bits_truncate(self.rb.cr2().read().bits())
                }

                fn modify_cr2<F>(&mut self, f: F)
                where
                    F: FnOnce(Cr2) -> Cr2,
                {
                    self.rb
                        .cr2()
                        .modify(|r, w| unsafe { w.bits(f(Cr2::from_bits_truncate(r.bits())).bits()) });
                }

                fn write_sample_times(&mut self, smpr1: u32, smpr2: u32) {
                    self.rb.smpr1().write(|w| unsafe { w.bits(smpr1) });
                    self.rb.smpr2().write(|w| unsafe { w.bits(smpr2) });
                }

                fn write_regular_sequence(&mut self, sqr1: u32, sqr2: u32, sqr3: u32) {
                    self.rb.sqr3().write(|w| unsafe { w.bits(sqr3) });
                    self.rb.sqr2().write(|w| unsafe { w.bits(sqr2) });
                    self.rb.sqr1().write(|w| unsafe { w.bits(sqr1) });
                }

                fn data_register(&self) -> PeripheralAddress {
                    PeripheralAddress::new(self.rb.dr().as_ptr() as usize)
                }

                fn stabilize(&mut self) {
                    cortex_m::asm::delay(self.stab_cycles);
                }
            }
        )+
    };
}

adc! {
    ADC1: (adc1, Adc1),
}

#[cfg(feature = "has-adc23")]
adc! {
    ADC2: (adc2, Adc2),
    ADC3: (adc3, Adc3),
}

/// Registers shared by all ADCs
pub struct AdcCommon {
    rb: pac::ADC_COMMON,
}

impl AdcCommon {
    pub fn new(rb: pac::ADC_COMMON) -> Self {
        AdcCommon { rb }
    }

    pub fn free(self) -> pac::ADC_COMMON {
        self.rb
    }
}

impl AdcCommonRegisters for AdcCommon {
    fn ccr(&self) -> Ccr {
        Ccr::from_bits_truncate(self.rb.ccr().read().bits())
    }

    fn modify_ccr<F>(&mut self, f: F)
    where
        F: FnOnce(Ccr) -> Ccr,
    {
        self.rb
            .ccr()
            .modify(|r, w| unsafe { w.bits(f(Ccr::from_bits_truncate(r.bits())).bits()) });
    }
}
