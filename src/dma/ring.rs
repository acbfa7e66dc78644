//! Circular DMA destination

use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

use embedded_dma::WriteBuffer;

use super::Destination;
use crate::error::{ConfigError, Error};

/// Word storage continuously overwritten by a circular DMA stream
///
/// Owns a `'static` buffer for as long as the stream may write to it. Software
/// only ever reads it, through volatile loads, so values written by the DMA
/// engine behind the compiler's back are always observed.
pub struct SampleBuffer<B> {
    buffer: B,
    ptr: *mut u16,
    capacity: usize,
    valid_len: usize,
}

// NOTE(unsafe) `ptr` points into `buffer` and travels with it
unsafe impl<B: Send> Send for SampleBuffer<B> {}

impl<B> SampleBuffer<B>
where
    B: WriteBuffer<Word = u16>,
{
    /// Take ownership of `buffer`; its current contents are the "no sample yet" state
    pub fn new(mut buffer: B) -> Self {
        // NOTE(unsafe) `buffer` is held by `self` until `free`, so the location
        // stays valid for as long as a stream can be pointed at it.
        let (ptr, capacity) = unsafe { buffer.write_buffer() };
        SampleBuffer {
            buffer,
            ptr,
            capacity,
            valid_len: 0,
        }
    }
}

impl<B> SampleBuffer<B> {
    /// Number of words the buffer holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of words a full circular cycle writes (0 until armed)
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Location handed to the DMA stream
    pub fn destination(&self) -> Destination {
        Destination::new(self.ptr as usize, self.capacity)
    }

    pub(crate) fn arm(&mut self, transfer_count: u16) -> Result<(), ConfigError> {
        if transfer_count as usize > self.capacity {
            return Err(ConfigError::BufferTooSmall {
                capacity: self.capacity,
                transfer_count,
            });
        }
        self.valid_len = transfer_count as usize;
        Ok(())
    }

    pub(crate) fn disarm(&mut self) {
        self.valid_len = 0;
    }

    /// Word at `index`, `None` past the capacity
    pub fn get(&self, index: usize) -> Option<u16> {
        if index >= self.capacity {
            return None;
        }
        compiler_fence(Ordering::Acquire);
        // NOTE(unsafe) in bounds and aligned, see `new`
        Some(unsafe { ptr::read_volatile(self.ptr.add(index)) })
    }

    /// Copy `out.len()` words starting at `start`, wrapping at the armed length
    ///
    /// `out` is left untouched on error.
    pub fn copy_wrapping(&self, start: usize, out: &mut [u16]) -> Result<(), Error> {
        let len = self.valid_len;
        if len == 0 {
            return Err(Error::NotArmed);
        }
        if out.len() > len {
            return Err(Error::LengthMismatch {
                expected: len,
                actual: out.len(),
            });
        }
        compiler_fence(Ordering::Acquire);
        for (i, slot) in out.iter_mut().enumerate() {
            let index = (start + i) % len;
            // NOTE(unsafe) `index < valid_len <= capacity`
            *slot = unsafe { ptr::read_volatile(self.ptr.add(index)) };
        }
        Ok(())
    }

    /// Give the storage back
    ///
    /// Only reachable once the owner has stopped the stream.
    pub fn free(self) -> B {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::boxed::Box;

    #[test]
    fn reports_geometry_of_the_backing_array() {
        let buf = SampleBuffer::new(Box::leak(Box::new([0u16; 16])));
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.valid_len(), 0);
        assert_eq!(buf.destination().capacity(), 16);
        assert_ne!(buf.destination().address(), 0);
    }

    #[test]
    fn arming_is_bounded_by_capacity() {
        let mut buf = SampleBuffer::new(Box::leak(Box::new([0u16; 4])));
        assert_eq!(
            buf.arm(5),
            Err(ConfigError::BufferTooSmall {
                capacity: 4,
                transfer_count: 5
            })
        );
        buf.arm(4).unwrap();
        assert_eq!(buf.valid_len(), 4);
        buf.disarm();
        assert_eq!(buf.valid_len(), 0);
    }

    #[test]
    fn wrapping_copy_stays_inside_the_cycle() {
        let mut buf = SampleBuffer::new(Box::leak(Box::new([1u16, 2, 3, 4, 5, 6, 7, 8])));
        buf.arm(6).unwrap();

        let mut out = [0u16; 4];
        buf.copy_wrapping(4, &mut out).unwrap();
        assert_eq!(out, [5, 6, 1, 2]);

        let mut too_long = [0u16; 7];
        assert_eq!(
            buf.copy_wrapping(0, &mut too_long),
            Err(Error::LengthMismatch {
                expected: 6,
                actual: 7
            })
        );
        assert_eq!(too_long, [0; 7]);
        assert_eq!(buf.get(7), Some(8));
        assert_eq!(buf.get(8), None);
    }

    #[test]
    fn unarmed_buffer_refuses_copies() {
        let mut buf = SampleBuffer::new(Box::leak(Box::new([3u16; 4])));
        let mut out = [0u16; 2];
        assert_eq!(buf.copy_wrapping(0, &mut out), Err(Error::NotArmed));

        buf.arm(4).unwrap();
        buf.disarm();
        assert_eq!(buf.copy_wrapping(0, &mut out), Err(Error::NotArmed));
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn free_returns_the_storage() {
        let buf = SampleBuffer::new(Box::leak(Box::new([9u16; 2])));
        assert_eq!(*buf.free(), [9, 9]);
    }
}
