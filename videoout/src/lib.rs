//! # videoout
//!
//! The timing engine and 2-bpp renderer behind the RP2040 MDA-style video
//! adaptor.
//!
//! Video goes out as two bit-serial signals (VIDEO and !DIM) plus H-Sync and
//! V-Sync. Two PIO state machines generate them: one plays a *timing program*
//! that wiggles the sync pins, the other shifts packed pixels out of a frame
//! buffer. DMA feeds both. The CPU only gets involved four times a frame, when
//! a timing transfer completes and the [`FrameEngine`] re-arms the next one.
//!
//! Nothing in this crate touches a register. The hardware sits behind the
//! [`TimingTransfer`] trait, so everything here also runs (and is tested) on
//! the host.
//!
//! * [`Mode`] describes a raster and [`Mode::validate`] checks it.
//! * [`timing::compile`] turns a mode into a [`TimingProgram`].
//! * [`PixelPlane`] is the 2-bpp frame buffer, [`Font`] blits glyphs into it.
//! * [`FrameEngine`] runs the four-phase frame cycle and hands frame buffers
//!   over from the renderer.

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

#![cfg_attr(not(test), no_std)]

// -----------------------------------------------------------------------------
// Sub-modules
// -----------------------------------------------------------------------------

pub mod engine;
pub mod font;
pub mod handoff;
pub mod mode;
pub mod plane;
pub mod timing;

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

pub use engine::{FrameEngine, Phase, TimingTransfer, VideoControl};
pub use font::{Font, FontMatrix};
pub use handoff::{FrameBufferHandle, FrameSignal};
pub use mode::{Mode, SyncPolarity};
pub use plane::{FrameBuffer, Op, PixelPlane};
pub use timing::TimingProgram;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Everything that can go wrong when configuring video output.
///
/// Drawing never fails; see [`PixelPlane::set_pixel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The [`Mode`] failed [`Mode::validate`]
    InvalidMode,
    /// An interval in the timing program is too short or too long for the
    /// timing state machine to play
    UnencodableTiming,
    /// The engine must be parked to do that
    Running,
    /// The engine cannot start without a mode
    NoMode,
    /// The font has an unsupported cell size, or not enough data
    BadFont,
}

// End of file
