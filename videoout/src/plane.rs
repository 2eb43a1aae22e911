//! Packed 2-bit-per-pixel frame buffers.
//!
//! Four pixels per byte, left-most pixel in the top two bits. Within a pixel,
//! the high bit is the video signal and the low bit is the inverted intensity
//! signal, so:
//!
//! * `0b00` is off
//! * `0b10` is dim
//! * `0b11` is bright
//!
//! The pixel DMA channel byte-swaps each 32-bit word on the way to the PIO,
//! so byte order in memory is left-to-right on screen.

// -----------------------------------------------------------------------------
// Licence Statement
// -----------------------------------------------------------------------------
// Copyright (c) Jonathan 'theJPster' Pallant and the Neotron Developers, 2023
// Copyright (c) The pico-mda-rs developers, 2026
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.
// -----------------------------------------------------------------------------

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use core::cell::UnsafeCell;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// How a new pixel value combines with the one already there.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Op {
    /// Replace the pixel
    Set,
    /// Exclusive-OR with the pixel
    Xor,
    /// Bitwise-AND with the pixel
    And,
}

/// A mutable view of a packed frame buffer.
pub struct PixelPlane<'a> {
    data: &'a mut [u8],
    stride: usize,
}

impl<'a> PixelPlane<'a> {
    /// Wrap a byte buffer. Each row of pixels is `stride` bytes long.
    pub fn new(data: &'a mut [u8], stride: usize) -> PixelPlane<'a> {
        PixelPlane { data, stride }
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Width of the plane, in pixels
    pub fn width(&self) -> usize {
        self.stride * 4
    }

    /// Height of the plane, in rows
    pub fn height(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }

    /// Combine a two-bit value into the pixel at (x, y).
    ///
    /// Only the low two bits of `value` are used. Touches only the one pixel.
    ///
    /// # Panics
    ///
    /// Panics if (x, y) is outside the buffer.
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, value: u8, op: Op) {
        let index = y * self.stride + (x >> 2);
        let shift = 6 - 2 * (x & 3);
        let mask = 0b11 << shift;
        let value = (value & 0b11) << shift;
        apply(&mut self.data[index], value, mask, op);
    }

    /// Read the two-bit pixel at (x, y).
    ///
    /// # Panics
    ///
    /// Panics if (x, y) is outside the buffer.
    pub fn get_pixel(&self, x: usize, y: usize) -> u8 {
        let byte = self.data[y * self.stride + (x >> 2)];
        (byte >> (6 - 2 * (x & 3))) & 0b11
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: u8) {
        let value = value & 0b11;
        let byte = value | value << 2 | value << 4 | value << 6;
        self.data.fill(byte);
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }
}

/// Storage for one frame of `N` bytes, suitable for scanning out.
///
/// Word aligned, because the pixel DMA channel reads it a word at a time.
#[repr(C, align(4))]
pub struct FrameBuffer<const N: usize> {
    data: UnsafeCell<[u8; N]>,
}

impl<const N: usize> FrameBuffer<N> {
    /// Make a blank frame buffer.
    pub const fn new() -> FrameBuffer<N> {
        FrameBuffer {
            data: UnsafeCell::new([0; N]),
        }
    }

    /// Start address, as handed to the frame engine.
    pub fn as_ptr(&self) -> *const u32 {
        self.data.get() as *const u32
    }

    /// Size of the buffer in bytes
    pub const fn len(&self) -> usize {
        N
    }

    /// Size of the buffer is never zero for a usable frame.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Get a drawing view of this buffer.
    ///
    /// # Safety
    ///
    /// Nothing else may hold a view of this buffer at the same time, and the
    /// buffer must not be the one currently being scanned out.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn plane(&self, stride: usize) -> PixelPlane<'_> {
        PixelPlane::new(&mut *self.data.get(), stride)
    }
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

// Access is controlled by the caller of `plane`, and the DMA engine only
// reads.
unsafe impl<const N: usize> Sync for FrameBuffer<N> {}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// Pixel is dark
pub const OFF: u8 = 0b00;

/// Pixel is lit at low intensity
pub const DIM: u8 = 0b10;

/// Pixel is lit at full intensity
pub const BRIGHT: u8 = 0b11;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Apply `value` to the bits of `byte` selected by `mask`.
///
/// `value` must have no bits outside `mask`.
#[inline]
pub(crate) fn apply(byte: &mut u8, value: u8, mask: u8, op: Op) {
    match op {
        Op::Set => *byte = (*byte & !mask) | value,
        Op::Xor => *byte ^= value,
        Op::And => *byte &= value | !mask,
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pixel_packing() {
        let mut data = [0u8; 2];
        let mut plane = PixelPlane::new(&mut data, 2);
        plane.set_pixel(0, 0, BRIGHT, Op::Set);
        plane.set_pixel(3, 0, DIM, Op::Set);
        plane.set_pixel(5, 0, 0b01, Op::Set);
        assert_eq!(data, [0b1100_0010, 0b0001_0000]);
    }

    #[test]
    fn xor_flips_one_pixel() {
        // byte 0b11100100, XOR pixel 1 with 0b11
        let mut data = [0b1110_0100u8];
        let mut plane = PixelPlane::new(&mut data, 1);
        plane.set_pixel(1, 0, 0b11, Op::Xor);
        assert_eq!(data[0], 0b1101_0100);
    }

    #[test]
    fn and_clears_selected_bits() {
        let mut data = [0xFFu8];
        let mut plane = PixelPlane::new(&mut data, 1);
        plane.set_pixel(2, 0, 0b10, Op::And);
        assert_eq!(plane.get_pixel(2, 0), 0b10);
        assert_eq!(data[0], 0b1111_1011);
    }

    #[test]
    fn value_is_masked() {
        let mut data = [0u8];
        let mut plane = PixelPlane::new(&mut data, 1);
        plane.set_pixel(3, 0, 0xFD, Op::Set);
        assert_eq!(data[0], 0b0000_0001);
    }

    #[test]
    fn fill_and_geometry() {
        let mut data = [0u8; 6];
        let mut plane = PixelPlane::new(&mut data, 2);
        assert_eq!(plane.width(), 8);
        assert_eq!(plane.height(), 3);
        plane.fill(DIM);
        assert_eq!(plane.get_pixel(7, 2), DIM);
        assert_eq!(data, [0xAA; 6]);
    }

    #[test]
    #[should_panic]
    fn out_of_range_panics() {
        let mut data = [0u8; 4];
        let mut plane = PixelPlane::new(&mut data, 2);
        plane.set_pixel(0, 2, BRIGHT, Op::Set);
    }

    #[test]
    fn frame_buffer_alignment() {
        static FB: FrameBuffer<63_000> = FrameBuffer::new();
        assert_eq!(FB.as_ptr() as usize % 4, 0);
        assert_eq!(FB.len(), 63_000);
        let mut plane = unsafe { FB.plane(180) };
        assert_eq!(plane.height(), 350);
        plane.set_pixel(719, 349, BRIGHT, Op::Set);
        assert_eq!(plane.get_pixel(719, 349), BRIGHT);
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Set), Just(Op::Xor), Just(Op::And)]
    }

    proptest! {
        #[test]
        fn set_is_idempotent(init in any::<[u8; 4]>(), x in 0usize..16, v in 0u8..4) {
            let mut once = init;
            PixelPlane::new(&mut once, 4).set_pixel(x, 0, v, Op::Set);
            let mut twice = once;
            PixelPlane::new(&mut twice, 4).set_pixel(x, 0, v, Op::Set);
            prop_assert_eq!(once, twice);
            prop_assert_eq!(PixelPlane::new(&mut once, 4).get_pixel(x, 0), v);
        }

        #[test]
        fn xor_twice_restores(init in any::<[u8; 4]>(), x in 0usize..16, v in 0u8..4) {
            let mut data = init;
            let mut plane = PixelPlane::new(&mut data, 4);
            plane.set_pixel(x, 0, v, Op::Xor);
            plane.set_pixel(x, 0, v, Op::Xor);
            prop_assert_eq!(data, init);
        }

        #[test]
        fn only_one_pixel_changes(
            init in any::<[u8; 8]>(),
            x in 0usize..16,
            y in 0usize..2,
            v in any::<u8>(),
            op in op(),
        ) {
            let mut data = init;
            PixelPlane::new(&mut data, 4).set_pixel(x, y, v, op);
            let mut before = init;
            let before = PixelPlane::new(&mut before, 4);
            let after = PixelPlane::new(&mut data, 4);
            for py in 0..2 {
                for px in 0..16 {
                    if (px, py) != (x, y) {
                        prop_assert_eq!(before.get_pixel(px, py), after.get_pixel(px, py));
                    }
                }
            }
        }
    }
}

// End of file
