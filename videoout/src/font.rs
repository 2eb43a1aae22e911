//! Bitmap fonts, and drawing them into a [`PixelPlane`].
//!
//! A font is a 16 x 16 grid of glyphs, packed one bit per pixel, most
//! significant bit on the left. Each pixel row of the grid is
//! `16 * cell_width` bits, or `2 * cell_width` bytes. With 9-pixel wide
//! cells, most glyph rows straddle two bytes.

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

use crate::{
    plane::{self, Op, PixelPlane},
    Error,
};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// A borrowed, read-only glyph matrix.
#[derive(Debug, Copy, Clone)]
pub struct Font<'a> {
    data: &'a [u8],
    cell_width: usize,
    cell_height: usize,
}

impl<'a> Font<'a> {
    /// Wrap some font data.
    ///
    /// Cells can be 8 or 9 pixels wide, and 8 or 14 pixels high. The data must
    /// hold the whole 16 x 16 grid.
    pub fn new(data: &'a [u8], cell_width: usize, cell_height: usize) -> Result<Font<'a>, Error> {
        if !matches!(cell_width, 8 | 9) || !matches!(cell_height, 8 | 14) {
            return Err(Error::BadFont);
        }
        if data.len() < matrix_len(cell_width, cell_height) {
            return Err(Error::BadFont);
        }
        Ok(Font {
            data,
            cell_width,
            cell_height,
        })
    }

    /// Width of a glyph, in pixels
    pub fn cell_width(&self) -> usize {
        self.cell_width
    }

    /// Height of a glyph, in pixels
    pub fn cell_height(&self) -> usize {
        self.cell_height
    }

    /// Get one row of a glyph, right-aligned in the result.
    ///
    /// The left-most pixel is bit `cell_width - 1`.
    ///
    /// # Panics
    ///
    /// Panics if `y` is not less than the cell height.
    pub fn glyph_row(&self, glyph: u8, y: usize) -> u16 {
        assert!(y < self.cell_height);
        let (index, bit) = locate(self.cell_width, self.cell_height, glyph, y);
        let left = u16::from(self.data[index]);
        if self.cell_width == 8 {
            // Always byte aligned
            return left;
        }
        let right = u16::from(self.data[index + 1]);
        ((left << (1 + bit)) | (right >> (7 - bit))) & 0x1FF
    }

    /// Draw a glyph with its top-left corner at pixel (x, y), one pixel at a
    /// time.
    ///
    /// Set bits are drawn in `fg` and clear bits in `bg`, both combined with
    /// the existing pixels using `op`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_glyph(
        &self,
        plane: &mut PixelPlane,
        x: usize,
        y: usize,
        glyph: u8,
        fg: u8,
        bg: u8,
        op: Op,
    ) {
        for row in 0..self.cell_height {
            let bits = self.glyph_row(glyph, row);
            for col in 0..self.cell_width {
                let value = if bits & (1 << (self.cell_width - 1 - col)) != 0 {
                    fg
                } else {
                    bg
                };
                plane.set_pixel(x + col, y + row, value, op);
            }
        }
    }

    /// Draw a glyph with its top-left corner at pixel (x, y), a whole row at
    /// a time.
    ///
    /// Gives exactly the same result as [`Font::draw_glyph`].
    #[allow(clippy::too_many_arguments)]
    pub fn draw_glyph_fast(
        &self,
        plane: &mut PixelPlane,
        x: usize,
        y: usize,
        glyph: u8,
        fg: u8,
        bg: u8,
        op: Op,
    ) {
        let span = 2 * self.cell_width as u32;
        let offset = 2 * (x & 3) as u32;
        let num_bytes = (offset + span + 7) as usize / 8;
        // Line up the row so the first pixel lands at `offset` bits from the
        // top of a word
        let lift = 32 - span - offset;
        let row_mask = ((1u32 << span) - 1) << lift;
        let fg = u32::from(fg & 0b11) * 0x5555_5555;
        let bg = u32::from(bg & 0b11) * 0x5555_5555;
        let stride = plane.stride();
        let bytes = plane.bytes_mut();

        for row in 0..self.cell_height {
            let on = spread(self.glyph_row(glyph, row)) * 0b11;
            let off = !on;
            let pattern = (((fg & on) | (bg & off)) << lift) & row_mask;
            let start = (y + row) * stride + (x >> 2);
            for (i, byte) in bytes[start..start + num_bytes].iter_mut().enumerate() {
                let shift = 24 - 8 * i;
                let mask = (row_mask >> shift) as u8;
                let value = (pattern >> shift) as u8;
                plane::apply(byte, value, mask, op);
            }
        }
    }
}

/// An owned glyph matrix of `N` bytes, which can be filled in at run-time.
#[derive(Debug, Clone)]
pub struct FontMatrix<const N: usize> {
    data: [u8; N],
    cell_width: usize,
    cell_height: usize,
}

impl<const N: usize> FontMatrix<N> {
    /// Make a blank matrix.
    ///
    /// `N` must be exactly the size of a 16 x 16 grid of the given cells.
    pub const fn new(cell_width: usize, cell_height: usize) -> Result<FontMatrix<N>, Error> {
        if !matches!(cell_width, 8 | 9) || !matches!(cell_height, 8 | 14) {
            return Err(Error::BadFont);
        }
        if N != matrix_len(cell_width, cell_height) {
            return Err(Error::BadFont);
        }
        Ok(FontMatrix {
            data: [0; N],
            cell_width,
            cell_height,
        })
    }

    /// Store one row of a glyph. The left-most pixel is bit `cell_width - 1`
    /// of `bits`, and any higher bits are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `y` is not less than the cell height.
    pub fn set_glyph_row(&mut self, glyph: u8, y: usize, bits: u16) {
        assert!(y < self.cell_height);
        let (index, bit) = locate(self.cell_width, self.cell_height, glyph, y);
        if self.cell_width == 8 {
            self.data[index] = bits as u8;
            return;
        }
        // Nine bits, somewhere inside this sixteen bit window
        let shift = 7 - bit;
        let mask = 0x1FF << shift;
        let window = u16::from_be_bytes([self.data[index], self.data[index + 1]]);
        let window = (window & !mask) | ((bits & 0x1FF) << shift);
        [self.data[index], self.data[index + 1]] = window.to_be_bytes();
    }

    /// Get one row of a glyph. See [`Font::glyph_row`].
    pub fn glyph_row(&self, glyph: u8, y: usize) -> u16 {
        self.font().glyph_row(glyph, y)
    }

    /// Borrow this matrix as a [`Font`] for drawing.
    pub fn font(&self) -> Font<'_> {
        Font {
            data: &self.data,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
        }
    }

    /// The packed matrix
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Size of a 16 x 16 glyph matrix, in bytes.
pub const fn matrix_len(cell_width: usize, cell_height: usize) -> usize {
    16 * cell_height * cell_width * 2
}

/// Find the byte holding the first pixel of row `y` of `glyph`, and the
/// position of that pixel counting from the top bit.
fn locate(cell_width: usize, cell_height: usize, glyph: u8, y: usize) -> (usize, u32) {
    let matrix_stride = cell_width * 2;
    let matrix_row = cell_height * usize::from(glyph >> 4) + y;
    let start_bit = usize::from(glyph & 0x0F) * cell_width;
    (
        matrix_row * matrix_stride + (start_bit >> 3),
        (start_bit & 7) as u32,
    )
}

/// Put a zero bit between every bit of `bits`, so each one lines up with the
/// low bit of a two-bit pixel.
fn spread(bits: u16) -> u32 {
    let mut x = u32::from(bits);
    x = (x | (x << 8)) & 0x00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333;
    (x | (x << 1)) & 0x5555_5555
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


// End of file
