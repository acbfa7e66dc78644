use core::marker::PhantomData;

use super::*;
use crate::pac::dma2;

/// FIFO control register reset value (direct mode, threshold 1/2)
const FCR_RESET: u32 = 0x21;

pub trait DmaExt {
    type Streams;

    fn split(self) -> Self::Streams;
}

/// One stream of a DMA controller
pub struct Stream<DMA, const S: u8> {
    _dma: PhantomData<DMA>,
}

/// The eight streams of a DMA controller
pub struct Streams<DMA> {
    pub s0: Stream<DMA, 0>,
    pub s1: Stream<DMA, 1>,
    pub s2: Stream<DMA, 2>,
    pub s3: Stream<DMA, 3>,
    pub s4: Stream<DMA, 4>,
    pub s5: Stream<DMA, 5>,
    pub s6: Stream<DMA, 6>,
    pub s7: Stream<DMA, 7>,
}

macro_rules! dma {
    ($($DMAX:ident: $instance:ident,)+) => {
        $(
            impl DmaExt for pac::$DMAX {
                type Streams = Streams<pac::$DMAX>;

                fn split(self) -> Streams<pac::$DMAX> {
                    Streams {
                        s0: Stream { _dma: PhantomData },
                        s1: Stream { _dma: PhantomData },
                        s2: Stream { _dma: PhantomData },
                        s3: Stream { _dma: PhantomData },
                        s4: Stream { _dma: PhantomData },
                        s5: Stream { _dma: PhantomData },
                        s6: Stream { _dma: PhantomData },
                        s7: Stream { _dma: PhantomData },
                    }
                }
            }

            impl<const S: u8> Stream<pac::$DMAX, S> {
                fn rb(&self) -> &dma2::RegisterBlock {
                    // NOTE(unsafe) `split` consumed the controller; each stream
                    // only touches its own registers and flag bits.
                    unsafe { &*(pac::$DMAX::ptr() as *const dma2::RegisterBlock) }
                }
            }

            impl<const S: u8> StreamRegisters for Stream<pac::$DMAX, S> {
                fn controller(&self) -> DmaInstance {
                    DmaInstance::$instance
                }

                fn id(&self) -> StreamId {
                    StreamId::ALL[S as usize & 0b111]
                }

                fn control(&self) -> StreamCr {
                    StreamCr::from_bits_truncate(self.rb().st(S as usize).cr().read().bits())
                }

                fn modify_control<F>(&mut self, f: F)
                where
                    F: FnOnce(StreamCr) -> StreamCr,
                {
                    self.rb()
                        .st(S as usize)
                        .cr()
                        .modify(|r, w| unsafe { w.bits(f(StreamCr::from_bits_truncate(r.bits())).bits()) });
                }

                fn set_peripheral_address(&mut self, address: usize) {
                    self.rb().st(S as usize).par().write(|w| unsafe { w.bits(address as u32) });
                }

                fn set_memory_address(&mut self, address: usize) {
                    self.rb().st(S as usize).m0ar().write(|w| unsafe { w.bits(address as u32) });
                }

                fn set_number_of_transfers(&mut self, count: u16) {
                    self.rb().st(S as usize).ndtr().write(|w| unsafe { w.bits(count as u32) });
                }

                fn number_of_transfers(&self) -> u16 {
                    self.rb().st(S as usize).ndtr().read().bits() as u16
                }

                fn reset(&mut self) {
                    let st = self.rb().st(S as usize);
                    st.cr().reset();
                    st.ndtr().reset();
                    st.par().reset();
                    st.m0ar().reset();
                    st.m1ar().reset();
                    st.fcr().write(|w| unsafe { w.bits(FCR_RESET) });
                }

                fn flags(&self) -> StreamFlags {
                    let id = self.id();
                    let bits = if id.uses_high_flags() {
                        self.rb().hisr().read().bits()
                    } else {
                        self.rb().lisr().read().bits()
                    };
                    StreamFlags::from_bits_truncate(bits >> id.flag_offset())
                }

                fn clear_flags(&mut self, flags: StreamFlags) {
                    let id = self.id();
                    let bits = flags.bits() << id.flag_offset();
                    if id.uses_high_flags() {
                        self.rb().hifcr().write(|w| unsafe { w.bits(bits) });
                    } else {
                        self.rb().lifcr().write(|w| unsafe { w.bits(bits) });
                    }
                }
            }
        )+
    };
}

dma! {
    DMA1: Dma1,
    DMA2: Dma2,
}
