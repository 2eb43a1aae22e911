//! The frame engine.
//!
//! Each frame is played as four phases. At the start of each phase the engine
//! hands the sync generator a line program and a line count. When that
//! transfer completes, the hardware calls [`FrameEngine::on_timing_complete`]
//! and the engine moves on to the next phase. The CPU does nothing else to
//! keep the picture on screen.
//!
//! ```text
//! VSYNC -> POST_VSYNC_BLANK -> VISIBLE -> POST_VISIBLE_BLANK -+
//!   ^                                                         |
//!   +---------------------------------------------------------+
//! ```
//!
//! Stopping only takes effect at the top of the frame. The engine then parks,
//! and stays parked until it is started again.

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

use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU8, Ordering},
};

use crate::{
    handoff::{FrameBufferHandle, FrameSignal},
    timing::{self, TimingProgram},
    Error, Mode,
};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// The hardware the frame engine drives.
///
/// Both calls must return straight away. When the timing transfer finishes,
/// the implementation must arrange for
/// [`FrameEngine::on_timing_complete`] to be called.
pub trait TimingTransfer {
    /// Play `program` (one line's worth of timing words) over and over, for
    /// `lines` lines.
    ///
    /// The program lives inside the [`FrameEngine`], so it stays put for as
    /// long as the hardware reads it.
    fn play_timing(&mut self, program: &[u32], lines: u32);

    /// Start feeding `words` words of pixels, starting at `frame`, to the
    /// pixel shifter.
    fn play_pixels(&mut self, frame: *const u32, words: u32);
}

/// Where we are in the frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Phase {
    /// Playing the V-Sync pulse
    Vsync = 0,
    /// Blank lines between V-Sync and the picture
    PostVsyncBlank = 1,
    /// Lines with pixels on
    Visible = 2,
    /// Blank lines between the picture and the next V-Sync
    PostVisibleBlank = 3,
}

impl Phase {
    /// The phase that follows this one.
    pub const fn next(self) -> Phase {
        match self {
            Phase::Vsync => Phase::PostVsyncBlank,
            Phase::PostVsyncBlank => Phase::Visible,
            Phase::Visible => Phase::PostVisibleBlank,
            Phase::PostVisibleBlank => Phase::Vsync,
        }
    }

    const fn previous(self) -> Phase {
        match self {
            Phase::Vsync => Phase::PostVisibleBlank,
            Phase::PostVsyncBlank => Phase::Vsync,
            Phase::Visible => Phase::PostVsyncBlank,
            Phase::PostVisibleBlank => Phase::Visible,
        }
    }

    const fn from_u8(value: u8) -> Phase {
        match value & 0b11 {
            0 => Phase::Vsync,
            1 => Phase::PostVsyncBlank,
            2 => Phase::Visible,
            _ => Phase::PostVisibleBlank,
        }
    }
}

/// Only ever changed while the engine is parked.
struct Config {
    mode: Option<Mode>,
    program: TimingProgram,
}

/// Drives the video hardware through each frame.
///
/// Lives in a `static`. Thread code configures it through the single
/// [`VideoControl`] from [`FrameEngine::take`], and the timing interrupt calls
/// [`FrameEngine::on_timing_complete`].
pub struct FrameEngine {
    config: UnsafeCell<Config>,
    taken: portable_atomic::AtomicBool,
    running: AtomicBool,
    parked: AtomicBool,
    phase: AtomicU8,
    frame_buffer: FrameBufferHandle,
    vblank: FrameSignal,
    callback: AtomicPtr<()>,
    frame_count: AtomicU32,
}

// The config is only written while the engine is parked, and only read by the
// phase handler while it isn't.
unsafe impl Sync for FrameEngine {}

/// The one handle allowed to change the engine's configuration.
pub struct VideoControl<'a> {
    engine: &'a FrameEngine,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl FrameEngine {
    /// Make a stopped engine with no mode.
    pub const fn new() -> FrameEngine {
        FrameEngine {
            config: UnsafeCell::new(Config {
                mode: None,
                program: TimingProgram::EMPTY,
            }),
            taken: portable_atomic::AtomicBool::new(false),
            running: AtomicBool::new(false),
            parked: AtomicBool::new(true),
            phase: AtomicU8::new(Phase::Vsync as u8),
            frame_buffer: FrameBufferHandle::new(),
            vblank: FrameSignal::new(),
            callback: AtomicPtr::new(core::ptr::null_mut()),
            frame_count: AtomicU32::new(0),
        }
    }

    /// Get the configuration handle.
    ///
    /// Returns `Some` the first time only.
    pub fn take(&self) -> Option<VideoControl<'_>> {
        if self.taken.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(VideoControl { engine: self })
        }
    }

    /// Call this when the timing transfer completes.
    ///
    /// Arms the hardware for the next phase. Never blocks, and does nothing
    /// if the engine is parked.
    pub fn on_timing_complete<T>(&self, hw: &mut T)
    where
        T: TimingTransfer,
    {
        if self.parked.load(Ordering::Acquire) {
            return;
        }
        // Safety: we aren't parked, so nobody is writing to the config
        let config = unsafe { &*self.config.get() };
        let Some(mode) = config.mode.as_ref() else {
            self.parked.store(true, Ordering::Release);
            return;
        };
        let phase = Phase::from_u8(self.phase.load(Ordering::Relaxed));
        if phase == Phase::Vsync && !self.running.load(Ordering::Acquire) {
            self.parked.store(true, Ordering::Release);
            return;
        }
        self.phase.store(phase.next() as u8, Ordering::Relaxed);

        let program = &config.program;
        match phase {
            Phase::Vsync => {
                hw.play_timing(&program.vsync_line.0, mode.vsync_lines_per_frame);
                hw.play_pixels(self.frame_buffer.load(), mode.frame_words());
            }
            Phase::PostVsyncBlank => {
                hw.play_timing(&program.blank_line.0, mode.post_vsync_blank_lines());
            }
            Phase::Visible => {
                hw.play_timing(&program.visible_line.0, mode.visible_lines_per_frame);
            }
            Phase::PostVisibleBlank => {
                hw.play_timing(&program.blank_line.0, mode.post_visible_blank_lines());
                // Only the phase handler writes this
                let count = self.frame_count.load(Ordering::Relaxed);
                self.frame_count
                    .store(count.wrapping_add(1), Ordering::Relaxed);
                self.vblank.release();
                let callback = self.callback.load(Ordering::Acquire);
                if !callback.is_null() {
                    // Safety: only ever set from a `fn()` in `set_frame_callback`
                    let f: fn() = unsafe { core::mem::transmute(callback) };
                    f();
                }
            }
        }
    }

    /// Scan out this frame from the next V-Sync onwards.
    ///
    /// `frame` must point to at least `frame_words()` words, and stay valid
    /// until another frame has been published and a frame boundary has
    /// passed.
    pub fn publish(&self, frame: *const u32) {
        self.frame_buffer.publish(frame);
    }

    /// The frame which will be (or is being) scanned out.
    pub fn published(&self) -> *const u32 {
        self.frame_buffer.load()
    }

    /// Wait until the current frame has finished being drawn.
    ///
    /// If a frame ended since the last call, returns at once.
    pub fn wait_for_frame_boundary<F>(&self, idle: F)
    where
        F: FnMut(),
    {
        self.vblank.acquire_blocking(idle);
    }

    /// Call `callback` at the end of every frame, from the phase handler.
    ///
    /// It runs in interrupt context, so it must be quick and must not block.
    pub fn set_frame_callback(&self, callback: Option<fn()>) {
        let ptr = match callback {
            Some(f) => f as *mut (),
            None => core::ptr::null_mut(),
        };
        self.callback.store(ptr, Ordering::Release);
    }

    /// How many frames have been completed since power-up.
    pub fn frame_count(&self) -> u32 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Which phase the hardware is currently playing.
    ///
    /// The engine stores the phase it will arm next, so this is the one
    /// before that.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Relaxed)).previous()
    }
}

impl Default for FrameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> VideoControl<'a> {
    /// Select a video mode and compile its line programs.
    ///
    /// Only allowed while parked.
    pub fn set_mode(&mut self, mode: &Mode) -> Result<(), Error> {
        if !self.is_parked() {
            return Err(Error::Running);
        }
        let program = timing::compile(mode)?;
        // Safety: we are parked, so the phase handler won't read the config
        let config = unsafe { &mut *self.engine.config.get() };
        config.mode = Some(*mode);
        config.program = program;
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Mode set: {}x{} @ {} ns/line",
            mode.visible_dots_per_line,
            mode.visible_lines_per_frame,
            mode.line_period_ns
        );
        Ok(())
    }

    /// Start generating frames, beginning with a V-Sync.
    ///
    /// Primes the hardware by running the first phase directly. Everything
    /// after that is driven by [`FrameEngine::on_timing_complete`].
    pub fn start<T>(&mut self, hw: &mut T) -> Result<(), Error>
    where
        T: TimingTransfer,
    {
        if !self.is_parked() {
            return Err(Error::Running);
        }
        if self.mode().is_none() {
            return Err(Error::NoMode);
        }
        let engine = self.engine;
        engine.vblank.reset();
        engine.phase.store(Phase::Vsync as u8, Ordering::Relaxed);
        engine.running.store(true, Ordering::Release);
        engine.parked.store(false, Ordering::Release);
        #[cfg(feature = "defmt")]
        defmt::debug!("Video starting");
        engine.on_timing_complete(hw);
        Ok(())
    }

    /// Ask the engine to stop at the end of the current frame.
    ///
    /// Poll [`VideoControl::is_parked`] to find out when it has.
    pub fn stop(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::debug!("Video stopping");
        self.engine.running.store(false, Ordering::Release);
    }

    /// Has the engine stopped driving the hardware?
    pub fn is_parked(&self) -> bool {
        self.engine.parked.load(Ordering::Acquire)
    }

    /// Has the engine been started, and not asked to stop?
    pub fn is_running(&self) -> bool {
        self.engine.running.load(Ordering::Acquire)
    }

    /// The current mode, if one has been set.
    pub fn mode(&self) -> Option<Mode> {
        // Safety: only `set_mode` writes this, and it needs `&mut self`
        let config = unsafe { &*self.engine.config.get() };
        config.mode
    }

    /// Width of the picture in pixels.
    pub fn visible_width(&self) -> Option<u32> {
        self.mode().map(|m| m.visible_width())
    }

    /// Height of the picture in lines.
    pub fn visible_height(&self) -> Option<u32> {
        self.mode().map(|m| m.visible_height())
    }

    /// Bytes per line in a frame buffer.
    pub fn stride_bytes(&self) -> Option<u32> {
        self.mode().map(|m| m.stride_bytes())
    }

}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Timing { program: Vec<u32>, lines: u32 },
        Pixels { frame: usize, words: u32 },
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl TimingTransfer for Recorder {
        fn play_timing(&mut self, program: &[u32], lines: u32) {
            self.calls.push(Call::Timing {
                program: program.to_vec(),
                lines,
            });
        }

        fn play_pixels(&mut self, frame: *const u32, words: u32) {
            self.calls.push(Call::Pixels {
                frame: frame as usize,
                words,
            });
        }
    }

    fn running_engine<'a>(engine: &'a FrameEngine, hw: &mut Recorder) -> VideoControl<'a> {
        let mut control = engine.take().unwrap();
        control.set_mode(&Mode::MDA_720X350).unwrap();
        control.start(hw).unwrap();
        control
    }

    #[test]
    fn only_one_control() {
        let engine = FrameEngine::new();
        assert!(engine.take().is_some());
        assert!(engine.take().is_none());
    }

    #[test]
    fn start_needs_a_mode() {
        let engine = FrameEngine::new();
        let mut control = engine.take().unwrap();
        let mut hw = Recorder::default();
        assert_eq!(control.start(&mut hw), Err(Error::NoMode));
        assert!(hw.calls.is_empty());
        assert!(control.is_parked());
        assert_eq!(control.visible_width(), None);
    }

    #[test]
    fn bad_mode_refused() {
        let engine = FrameEngine::new();
        let mut control = engine.take().unwrap();
        let mode = Mode {
            lines_per_frame: 372,
            ..Mode::MDA_720X350
        };
        assert_eq!(control.set_mode(&mode), Err(Error::InvalidMode));
        assert!(control.mode().is_none());
    }

    #[test]
    fn refused_mode_leaves_control_usable() {
        let engine = FrameEngine::new();
        let mut control = engine.take().unwrap();
        let mut hw = Recorder::default();
        let mode = Mode {
            visible_lines_per_frame: u32::MAX - 1,
            lines_per_frame: u32::MAX,
            ..Mode::MDA_720X350
        };
        assert_eq!(control.set_mode(&mode), Err(Error::InvalidMode));
        assert!(control.is_parked());
        assert!(hw.calls.is_empty());
        // Same control, second attempt
        control.set_mode(&Mode::MDA_720X350).unwrap();
        control.start(&mut hw).unwrap();
        assert!(control.is_running());
        assert_eq!(control.visible_height(), Some(350));
        assert!(engine.take().is_none());
    }

    #[test]
    fn one_frame() {
        let engine = FrameEngine::new();
        let frame = [0u32; 350 * 45];
        engine.publish(frame.as_ptr());
        let mut hw = Recorder::default();
        let control = running_engine(&engine, &mut hw);
        let program = compile_mda();

        // start primes the V-Sync phase
        assert_eq!(
            hw.calls,
            [
                Call::Timing {
                    program: program.vsync_line.0.to_vec(),
                    lines: 3
                },
                Call::Pixels {
                    frame: frame.as_ptr() as usize,
                    words: 350 * 45
                },
            ]
        );
        assert_eq!(engine.phase(), Phase::Vsync);
        hw.calls.clear();

        engine.on_timing_complete(&mut hw);
        assert_eq!(engine.phase(), Phase::PostVsyncBlank);
        engine.on_timing_complete(&mut hw);
        assert_eq!(engine.phase(), Phase::Visible);
        engine.on_timing_complete(&mut hw);
        assert_eq!(engine.phase(), Phase::PostVisibleBlank);
        assert_eq!(
            hw.calls,
            [
                Call::Timing {
                    program: program.blank_line.0.to_vec(),
                    lines: 19
                },
                Call::Timing {
                    program: program.visible_line.0.to_vec(),
                    lines: 350
                },
                Call::Timing {
                    program: program.blank_line.0.to_vec(),
                    lines: 3
                },
            ]
        );
        assert_eq!(engine.frame_count(), 1);
        assert!(control.is_running());

        // Line counts add up to a whole frame
        let lines: u32 = [3, 19, 350, 3].iter().sum();
        assert_eq!(lines, Mode::MDA_720X350.lines_per_frame);
    }

    #[test]
    fn frame_buffer_picked_up_at_vsync() {
        let engine = FrameEngine::new();
        let front = [0u32; 4];
        let back = [0u32; 4];
        engine.publish(front.as_ptr());
        let mut hw = Recorder::default();
        let _control = running_engine(&engine, &mut hw);
        assert_eq!(engine.published(), front.as_ptr());
        // Publishing mid-frame doesn't change the frame in flight
        engine.publish(back.as_ptr());
        assert_eq!(engine.published(), back.as_ptr());
        for _ in 0..3 {
            engine.on_timing_complete(&mut hw);
        }
        let back_addr = back.as_ptr() as usize;
        assert!(!hw
            .calls
            .iter()
            .any(|c| matches!(c, Call::Pixels { frame, .. } if *frame == back_addr)));
        hw.calls.clear();
        // Next V-Sync reads the new one
        engine.on_timing_complete(&mut hw);
        assert_eq!(
            hw.calls[1],
            Call::Pixels {
                frame: back.as_ptr() as usize,
                words: 350 * 45
            }
        );
    }

    #[test]
    fn stop_waits_for_vsync() {
        let engine = FrameEngine::new();
        let mut hw = Recorder::default();
        let mut control = running_engine(&engine, &mut hw);
        engine.on_timing_complete(&mut hw);
        control.stop();
        assert!(!control.is_parked());
        // Rest of the frame still plays
        engine.on_timing_complete(&mut hw);
        engine.on_timing_complete(&mut hw);
        assert!(!control.is_parked());
        assert_eq!(engine.frame_count(), 1);
        // Top of the next frame parks instead of playing V-Sync
        hw.calls.clear();
        engine.on_timing_complete(&mut hw);
        assert!(control.is_parked());
        assert!(hw.calls.is_empty());
        // Stray events do nothing once parked
        engine.on_timing_complete(&mut hw);
        assert!(hw.calls.is_empty());
        assert_eq!(engine.frame_count(), 1);
    }

    /// Run one frame, calling `stop` after `before_stop` phase completions.
    ///
    /// Returns the calls made after the stop.
    fn stop_after(before_stop: usize) -> (FrameEngine, Vec<Call>) {
        let engine = FrameEngine::new();
        let mut hw = Recorder::default();
        {
            let mut control = running_engine(&engine, &mut hw);
            for _ in 0..before_stop {
                engine.on_timing_complete(&mut hw);
            }
            hw.calls.clear();
            control.stop();
            for _ in 0..8 {
                engine.on_timing_complete(&mut hw);
            }
            assert!(control.is_parked());
            assert!(!control.is_running());
        }
        (engine, hw.calls)
    }

    #[test]
    fn stop_during_visible() {
        let (engine, calls) = stop_after(2);
        let program = compile_mda();
        // Only the closing blank lines play, then it parks
        assert_eq!(
            calls,
            [Call::Timing {
                program: program.blank_line.0.to_vec(),
                lines: 3
            }]
        );
        assert_eq!(engine.frame_count(), 1);
        assert_eq!(engine.phase(), Phase::PostVisibleBlank);
    }

    #[test]
    fn stop_during_post_visible_blank() {
        let (engine, calls) = stop_after(3);
        // The next V-Sync entry parks, so nothing else is armed
        assert!(calls.is_empty());
        assert_eq!(engine.frame_count(), 1);
        assert_eq!(engine.phase(), Phase::PostVisibleBlank);
    }

    #[test]
    fn stop_in_any_phase_never_starts_another_picture() {
        let program = compile_mda();
        for before_stop in 0..4 {
            let (engine, calls) = stop_after(before_stop);
            let visible = Call::Timing {
                program: program.visible_line.0.to_vec(),
                lines: 350,
            };
            let visible_armed = calls.iter().filter(|c| **c == visible).count();
            // Only a stop during V-Sync or the blank lines after it still
            // has this frame's picture to come
            let expected = if before_stop < 2 { 1 } else { 0 };
            assert_eq!(visible_armed, expected, "stopped after {before_stop}");
            assert!(!calls.iter().any(|c| matches!(c, Call::Pixels { .. })));
            assert_eq!(engine.frame_count(), 1);
        }
    }

    #[test]
    fn config_locked_while_running() {
        let engine = FrameEngine::new();
        let mut hw = Recorder::default();
        let mut control = running_engine(&engine, &mut hw);
        assert_eq!(control.set_mode(&Mode::MDA_720X350), Err(Error::Running));
        assert_eq!(control.start(&mut hw), Err(Error::Running));
        control.stop();
        for _ in 0..4 {
            engine.on_timing_complete(&mut hw);
        }
        assert!(control.is_parked());
        assert!(control.set_mode(&Mode::MDA_720X350).is_ok());
        hw.calls.clear();
        assert!(control.start(&mut hw).is_ok());
        assert_eq!(hw.calls.len(), 2);
        assert_eq!(engine.phase(), Phase::Vsync);
    }

    #[test]
    fn signal_and_callback_once_per_frame() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        fn on_frame() {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }

        let engine = FrameEngine::new();
        engine.set_frame_callback(Some(on_frame));
        let mut hw = Recorder::default();
        let _control = running_engine(&engine, &mut hw);
        let mut idles = 0;
        for frame in 1..=3 {
            for _ in 0..4 {
                engine.on_timing_complete(&mut hw);
            }
            assert_eq!(engine.frame_count(), frame);
        }
        assert_eq!(CALLS.load(Ordering::Relaxed), 3);
        // Three frames went by, but only one wake-up is remembered
        engine.wait_for_frame_boundary(|| idles += 1);
        assert_eq!(idles, 0);
        engine.wait_for_frame_boundary(|| {
            idles += 1;
            if idles == 2 {
                for _ in 0..4 {
                    engine.on_timing_complete(&mut hw);
                }
            }
        });
        assert_eq!(idles, 2);
        assert_eq!(CALLS.load(Ordering::Relaxed), 4);

        engine.set_frame_callback(None);
        for _ in 0..4 {
            engine.on_timing_complete(&mut hw);
        }
        assert_eq!(CALLS.load(Ordering::Relaxed), 4);
        assert_eq!(engine.frame_count(), 5);
    }

    fn compile_mda() -> TimingProgram {
        timing::compile(&Mode::MDA_720X350).unwrap()
    }
}

// End of file
