#[cfg(feature = "device-selected")]
pub use crate::pacext::DmaExt as _stm32_adc_dma_pacext_DmaExt;
pub use crate::adc::AdcCommonRegisters as _stm32_adc_dma_adc_AdcCommonRegisters;
pub use crate::adc::AdcRegisters as _stm32_adc_dma_adc_AdcRegisters;
pub use crate::dma::StreamRegisters as _stm32_adc_dma_dma_StreamRegisters;
pub use crate::time::RateExtU32 as _fugit_RateExtU32;
