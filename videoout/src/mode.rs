//! Raster mode descriptors.
//!
//! A [`Mode`] is a handful of constants describing one fixed-line-rate
//! analog raster. Every other timing value is derived from them, and
//! [`Mode::validate`] checks they hang together.

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
// Types
// -----------------------------------------------------------------------------

/// Describes the polarity of a sync pulse.
///
/// Some pulses are positive (active-high), some are negative (active-low).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncPolarity {
    /// An active-high pulse
    Positive,
    /// An active-low pulse
    Negative,
}

impl SyncPolarity {
    /// The pin level for a pulse that is (or isn't) active.
    pub const fn level(self, active: bool) -> bool {
        match self {
            SyncPolarity::Positive => active,
            SyncPolarity::Negative => !active,
        }
    }
}

/// Timing constants for one raster standard.
///
/// Lines are counted from the start of the V-Sync pulse, so line 0 is the
/// first V-Sync line and `visible_start_line` includes the V-Sync lines.
///
/// Within a line, everything before the visible portion is lumped together
/// as the *back porch* (see [`Mode::back_porch_ns`]). The H-Sync pulse starts
/// the line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mode {
    /// Horizontal resolution
    pub visible_dots_per_line: u32,
    /// Vertical resolution
    pub visible_lines_per_frame: u32,
    /// Period of one whole line, in nanoseconds
    pub line_period_ns: u32,
    /// Lines in a whole frame, visible or not
    pub lines_per_frame: u32,
    /// V-Sync lines at the start of the frame
    pub vsync_lines_per_frame: u32,
    /// First visible line (0-based)
    pub visible_start_line: u32,
    /// Width of the H-Sync pulse, in nanoseconds
    pub hsync_width_ns: u32,
    /// Width of the visible portion of a line, in nanoseconds
    pub visible_width_ns: u32,
    /// Polarity of the H-Sync pulse
    pub hsync_polarity: SyncPolarity,
    /// Polarity of the V-Sync pulse
    pub vsync_polarity: SyncPolarity,
}

impl Mode {
    /// Pixels move in 32-bit words of 16 pixels.
    pub const DOTS_PER_WORD: u32 = 16;

    /// 720 x 350 monochrome, at roughly 60 Hz.
    ///
    /// The line is a little wider than a real MDA card produces, so that 720
    /// dots fit with a dot clock (48 ns) that divides the line period exactly.
    pub const MDA_720X350: Mode = Mode {
        visible_dots_per_line: 720,
        visible_lines_per_frame: 350,
        line_period_ns: 44_400,
        lines_per_frame: 375,
        vsync_lines_per_frame: 3,
        visible_start_line: 22,
        hsync_width_ns: 8_256,
        visible_width_ns: 34_560,
        hsync_polarity: SyncPolarity::Positive,
        vsync_polarity: SyncPolarity::Negative,
    };

    /// Check the constants in this mode are consistent with each other.
    ///
    /// A mode that fails this check must never be given to the engine. This
    /// has no side effects.
    pub const fn validate(&self) -> bool {
        let dots = self.visible_dots_per_line;
        if dots == 0 || self.visible_lines_per_frame == 0 || self.vsync_lines_per_frame == 0 {
            return false;
        }
        // A dot must be a whole number of nanoseconds ...
        if self.visible_width_ns < dots || self.visible_width_ns % dots != 0 {
            return false;
        }
        // ... and a line must be a whole number of dots.
        if self.line_period_ns % self.dot_clock_ns() != 0 {
            return false;
        }
        // Pixels are transferred 16 at a time.
        if dots % Self::DOTS_PER_WORD != 0 {
            return false;
        }
        if self.visible_width_ns >= self.line_period_ns {
            return false;
        }
        // The frame must fit the V-Sync, the visible lines, and some blanking
        // either side of the visible lines.
        if self.visible_start_line <= self.vsync_lines_per_frame {
            return false;
        }
        let Some(vsync_and_visible) = self
            .vsync_lines_per_frame
            .checked_add(self.visible_lines_per_frame)
        else {
            return false;
        };
        let Some(visible_end) = self
            .visible_start_line
            .checked_add(self.visible_lines_per_frame)
        else {
            return false;
        };
        if self.lines_per_frame <= vsync_and_visible || self.lines_per_frame <= visible_end {
            return false;
        }
        // A zero-length interval in the visible line can't be encoded.
        self.back_porch_ns() != self.hsync_width_ns
    }

    /// The period of one dot, in nanoseconds.
    pub const fn dot_clock_ns(&self) -> u32 {
        self.visible_width_ns / self.visible_dots_per_line
    }

    /// Time from the start of the line to the start of the visible portion.
    pub const fn back_porch_ns(&self) -> u32 {
        self.line_period_ns - self.visible_width_ns
    }

    /// Horizontal resolution in pixels.
    pub const fn visible_width(&self) -> u32 {
        self.visible_dots_per_line
    }

    /// Vertical resolution in pixels.
    pub const fn visible_height(&self) -> u32 {
        self.visible_lines_per_frame
    }

    /// Bytes per line of frame buffer.
    pub const fn stride_bytes(&self) -> u32 {
        (self.visible_dots_per_line / Self::DOTS_PER_WORD) * 4
    }

    /// Bytes in a whole frame buffer.
    pub const fn frame_size_bytes(&self) -> usize {
        self.stride_bytes() as usize * self.visible_lines_per_frame as usize
    }

    /// 32-bit words the pixel DMA moves per frame.
    pub const fn frame_words(&self) -> u32 {
        self.visible_lines_per_frame * (self.stride_bytes() / 4)
    }

    /// Blank lines between the end of V-Sync and the first visible line.
    pub const fn post_vsync_blank_lines(&self) -> u32 {
        self.visible_start_line - self.vsync_lines_per_frame
    }

    /// Blank lines between the last visible line and the end of the frame.
    pub const fn post_visible_blank_lines(&self) -> u32 {
        self.lines_per_frame - self.visible_start_line - self.visible_lines_per_frame
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


// End of file
