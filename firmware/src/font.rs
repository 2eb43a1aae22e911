//! Builds the 9x8 code page 437 font from the `font8x8` glyphs.

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

use font8x8::legacy::{BASIC_LEGACY, BLOCK_LEGACY, BOX_LEGACY};
use videoout::font::{matrix_len, FontMatrix};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// A font with 9 pixel wide and 8 pixel high cells.
pub type MdaFont = FontMatrix<{ matrix_len(CELL_WIDTH, CELL_HEIGHT) }>;

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// Pixels across a character cell
pub const CELL_WIDTH: usize = 9;

/// Pixels down a character cell
pub const CELL_HEIGHT: usize = 8;

/// Code page 437 positions we fill from the `font8x8` block elements.
///
/// Indices are relative to U+2580.
static BLOCKS: [(u8, usize); 8] = [
    (0xB0, 0x11), // light shade
    (0xB1, 0x12), // medium shade
    (0xB2, 0x13), // dark shade
    (0xDB, 0x08), // full block
    (0xDC, 0x04), // lower half
    (0xDD, 0x0C), // left half
    (0xDE, 0x10), // right half
    (0xDF, 0x00), // upper half
];

/// Code page 437 positions we fill from the `font8x8` box drawing set.
///
/// Indices are relative to U+2500.
static BOXES: [(u8, usize); 17] = [
    (0xB3, 0x02),
    (0xB4, 0x24),
    (0xBA, 0x51),
    (0xBB, 0x57),
    (0xBC, 0x5D),
    (0xBF, 0x10),
    (0xC0, 0x14),
    (0xC1, 0x34),
    (0xC2, 0x2C),
    (0xC3, 0x1C),
    (0xC4, 0x00),
    (0xC5, 0x3C),
    (0xC8, 0x5A),
    (0xC9, 0x54),
    (0xCD, 0x50),
    (0xDA, 0x0C),
    (0xD9, 0x18),
];

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Build the font.
///
/// Printable ASCII comes from the basic Latin set. The block and box
/// drawing characters land at their code page 437 positions. Anything else
/// is left blank.
pub fn build() -> Result<MdaFont, videoout::Error> {
    let mut matrix = MdaFont::new(CELL_WIDTH, CELL_HEIGHT)?;
    for glyph in 0x20..0x7F {
        load_glyph(&mut matrix, glyph, &BASIC_LEGACY[usize::from(glyph)]);
    }
    for &(glyph, index) in BLOCKS.iter() {
        load_glyph(&mut matrix, glyph, &BLOCK_LEGACY[index]);
    }
    for &(glyph, index) in BOXES.iter() {
        load_glyph(&mut matrix, glyph, &BOX_LEGACY[index]);
    }
    Ok(matrix)
}

/// Copy one 8x8 glyph into the 9 pixel cell.
///
/// `font8x8` keeps the left-most pixel in bit 0. Line-drawing characters
/// (0xC0 to 0xDF) copy their eighth column into the ninth, so they join up
/// with the next cell, like a real MDA card.
fn load_glyph(matrix: &mut MdaFont, glyph: u8, rows: &[u8; 8]) {
    let line_drawing = (0xC0..=0xDF).contains(&glyph);
    for (y, row) in rows.iter().enumerate() {
        let mut bits = u16::from(row.reverse_bits()) << 1;
        if line_drawing {
            bits |= (bits >> 1) & 1;
        }
        matrix.set_glyph_row(glyph, y, bits);
    }
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
