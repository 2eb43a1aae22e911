//! # MDA video output for the RP2040
//!
//! Binds the [`videoout`] frame engine to two PIO state machines and two DMA
//! channels.
//!
//! * SM0 on PIO0 plays timing words onto the V-Sync and H-Sync pins.
//! * SM1 on PIO0 shifts 2-bpp pixels onto the !DIM and VIDEO pins, starting
//!   each visible line when SM0 raises PIO IRQ 4.
//! * DMA channel 0 plays one line of timing words to SM0, over and over, and
//!   interrupts us on `DMA_IRQ_0` when a phase is done.
//! * DMA channel 1 streams a whole frame of pixels to SM1.

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

use cortex_m::peripheral::NVIC;
use rp2040_hal::{
    self as hal,
    pac::{self, interrupt},
    pio::{
        PIOBuilder, PinDir, Running, Rx, ShiftDirection, StateMachine, Tx, UninitStateMachine,
        PIO, SM0, SM1,
    },
};
use videoout::{FrameEngine, Mode, TimingTransfer, VideoControl};

use crate::hw::{HSYNC_PIN, NOT_DIM_PIN, VIDEO_PIN, VSYNC_PIN};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// The ways bringing up the video can fail
#[derive(Debug, Copy, Clone, PartialEq, Eq, defmt::Format)]
pub enum Error {
    /// The frame engine refused the mode
    Video(videoout::Error),
    /// The PIO programs would not fit in PIO0's instruction memory
    NoProgramSpace,
}

/// Why [`VideoOut::init`] failed, along with everything it was given.
pub struct InitFailure {
    pub error: Error,
    pub resources: VideoResources,
    pub control: VideoControl<'static>,
}

/// The peripherals the video output needs.
///
/// [`VideoOut::init`] takes these, and [`VideoOut::cleanup`] gives them back.
pub struct VideoResources {
    pub pio: PIO<pac::PIO0>,
    pub timing_sm: UninitStateMachine<(pac::PIO0, SM0)>,
    pub pixel_sm: UninitStateMachine<(pac::PIO0, SM1)>,
    pub dma: pac::DMA,
}

/// Running video output.
///
/// Both state machines run from `init` until `cleanup`. Whether they get any
/// data is up to the frame engine.
pub struct VideoOut {
    pio: PIO<pac::PIO0>,
    timing_sm: StateMachine<(pac::PIO0, SM0), Running>,
    timing_rx: Rx<(pac::PIO0, SM0)>,
    timing_tx: Tx<(pac::PIO0, SM0)>,
    pixel_sm: StateMachine<(pac::PIO0, SM1), Running>,
    pixel_rx: Rx<(pac::PIO0, SM1)>,
    pixel_tx: Tx<(pac::PIO0, SM1)>,
    /// Where the pixel program starts, so we can re-run its set-up
    pixel_offset: u8,
    dma: pac::DMA,
    control: VideoControl<'static>,
    sys_clk_hz: u32,
}

/// Arms our two DMA channels on behalf of the frame engine.
struct DmaTransfer<'a> {
    dma: &'a pac::dma::RegisterBlock,
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// The one and only frame engine.
pub static ENGINE: FrameEngine = FrameEngine::new();

/// DMA channel for the timing FIFO
const TIMING_DMA_CHAN: usize = 0;

/// DMA channel for the pixel FIFO
const PIXEL_DMA_CHAN: usize = 1;

/// Read over and over when no frame buffer has been published.
static BLANK_PIXELS: u32 = 0;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl From<videoout::Error> for Error {
    fn from(value: videoout::Error) -> Self {
        Error::Video(value)
    }
}

impl VideoOut {
    /// Load the PIO programs, set up the DMA channels and select `mode`.
    ///
    /// The video is left parked. Publish a frame buffer and call
    /// [`VideoOut::start`] to get a picture.
    ///
    /// On failure the hardware is left as it was and handed back, so you can
    /// try again.
    pub fn init(
        mut resources: VideoResources,
        mut control: VideoControl<'static>,
        mode: &Mode,
        sys_clk_hz: u32,
    ) -> Result<VideoOut, InitFailure> {
        // Check the mode before we touch any hardware.
        if let Err(e) = control.set_mode(mode) {
            return Err(InitFailure {
                error: e.into(),
                resources,
                control,
            });
        }


        // This program runs the timing loop. We post timing words (the length
        // of each period, along with what the H-Sync and V-Sync pins should
        // do) and it sets the GPIO pins and busy-waits the appropriate amount
        // of time. It also takes an extra 'instruction' which we use to start
        // the pixel state machine.
        //
        // Post <value:32> where value: <instruction:16> <clock_cycles:14>
        // <hsync:1> <vsync:1>
        //
        // The period is the actual period minus
        // FIXED_CLOCKS_PER_TIMING_PULSE, because the loop has some cycles
        // we cannot avoid.
        //
        // Note: autopull should be set to 32-bits, OSR is set to shift right.
        let timing_program = pio_proc::pio_asm!(
            ".wrap_target"
            // Step 1. Push next 2 bits of OSR into `pins`, to set H-Sync and V-Sync.
            //         Takes 1 clock cycle.
            "out pins, 2"
            // Step 2. Push next 14 bits of OSR into X for the timing loop.
            //         Takes 1 clock cycle.
            "out x, 14"
            // Step 3. Execute top 16-bits of OSR as an instruction.
            //         This takes two cycles, always.
            "out exec, 16"
            // Spin until X is zero. Takes X + 1 clock cycles.
            "timing_loop:"
                "jmp x-- timing_loop"
            ".wrap"
        );

        // This is the pixel program. We post the number of dots per line
        // (minus one) once, and then a whole frame of packed pixels. Each
        // line it waits for IRQ 4 from the timing program, then shifts out
        // one line of 2-bit pixels, at two clocks per dot.
        //
        // Note: autopull should be set to 32-bits, OSR is set to shift left.
        let pixel_program = pio_proc::pio_asm!(
            "pull block"
            "out y, 32"
            ".wrap_target"
            "mov x, y"
            // Wait for the timing state machine to reach the visible part
            "wait 1 irq 4"
            "pixel_loop:"
                "out pins, 2"
                "jmp x-- pixel_loop"
            // Blank the pins after the visible section
            "mov pins, null"
            ".wrap"
        );

        let Ok(timing_installed) = resources.pio.install(&timing_program.program) else {
            return Err(InitFailure {
                error: Error::NoProgramSpace,
                resources,
                control,
            });
        };
        let pixel_installed = match resources.pio.install(&pixel_program.program) {
            Ok(installed) => installed,
            Err(_) => {
                resources.pio.uninstall(timing_installed);
                return Err(InitFailure {
                    error: Error::NoProgramSpace,
                    resources,
                    control,
                });
            }
        };

        let VideoResources {
            pio,
            timing_sm,
            pixel_sm,
            dma,
        } = resources;
        let pixel_offset = pixel_installed.offset();

        // A fractional divider adds a lot of jitter (i.e. the start of each
        // line differs by some number of system clock cycles), so we warn
        // about it.
        let (timing_int, timing_frac) =
            videoout::timing::clock_divisor(sys_clk_hz, mode.dot_clock_ns(), 1);
        let (pixel_int, pixel_frac) =
            videoout::timing::clock_divisor(sys_clk_hz, mode.dot_clock_ns(), 2);
        if timing_frac != 0 || pixel_frac != 0 {
            defmt::warn!(
                "Fractional PIO divider {}+{}/256 - expect jitter",
                timing_int,
                timing_frac
            );
        }

        let (mut timing_sm, timing_rx, timing_tx) =
            PIOBuilder::from_installed_program(timing_installed)
                .buffers(hal::pio::Buffers::OnlyTx)
                .out_pins(VSYNC_PIN, 2) // V-Sync is GPIO2, H-Sync is GPIO3
                .autopull(true)
                .out_shift_direction(ShiftDirection::Right)
                .pull_threshold(32)
                .clock_divisor_fixed_point(timing_int, timing_frac)
                .build(timing_sm);
        timing_sm.set_pindirs([(VSYNC_PIN, PinDir::Output), (HSYNC_PIN, PinDir::Output)]);

        let (mut pixel_sm, pixel_rx, pixel_tx) =
            PIOBuilder::from_installed_program(pixel_installed)
                .buffers(hal::pio::Buffers::OnlyTx)
                .out_pins(NOT_DIM_PIN, 2) // !DIM is GPIO4, VIDEO is GPIO5
                .autopull(true)
                .out_shift_direction(ShiftDirection::Left)
                .pull_threshold(32)
                .clock_divisor_fixed_point(pixel_int, pixel_frac)
                .build(pixel_sm);
        pixel_sm.set_pindirs([(NOT_DIM_PIN, PinDir::Output), (VIDEO_PIN, PinDir::Output)]);

        // Read from the timing program and write to the timing FIFO. The
        // read address wraps around one line's worth of words. We only arm
        // it when the frame engine asks.
        dma.ch(TIMING_DMA_CHAN).ch_ctrl_trig().write(|w| {
            w.data_size().size_word();
            w.incr_read().set_bit();
            w.incr_write().clear_bit();
            unsafe { w.treq_sel().bits(timing_tx.dreq_value()) };
            unsafe { w.chain_to().bits(TIMING_DMA_CHAN as u8) };
            unsafe { w.ring_size().bits(0) };
            w.ring_sel().clear_bit();
            w.bswap().clear_bit();
            w.irq_quiet().clear_bit();
            w.en().clear_bit();
            w.sniff_en().clear_bit();
            w
        });
        dma.ch(TIMING_DMA_CHAN)
            .ch_write_addr()
            .write(|w| unsafe { w.bits(timing_tx.fifo_address() as usize as u32) });

        // Read from the frame buffer and write to the pixel FIFO. The bytes
        // are swapped so the left-most pixel of each word comes out first.
        dma.ch(PIXEL_DMA_CHAN).ch_ctrl_trig().write(|w| {
            w.data_size().size_word();
            w.incr_read().set_bit();
            w.incr_write().clear_bit();
            unsafe { w.treq_sel().bits(pixel_tx.dreq_value()) };
            unsafe { w.chain_to().bits(PIXEL_DMA_CHAN as u8) };
            unsafe { w.ring_size().bits(0) };
            w.ring_sel().clear_bit();
            w.bswap().set_bit();
            w.irq_quiet().clear_bit();
            w.en().clear_bit();
            w.sniff_en().clear_bit();
            w
        });
        dma.ch(PIXEL_DMA_CHAN)
            .ch_write_addr()
            .write(|w| unsafe { w.bits(pixel_tx.fifo_address() as usize as u32) });

        // Only the timing channel interrupts us
        dma.inte0()
            .write(|w| unsafe { w.inte0().bits(1 << TIMING_DMA_CHAN) });
        NVIC::unpend(pac::Interrupt::DMA_IRQ_0);
        unsafe {
            NVIC::unmask(pac::Interrupt::DMA_IRQ_0);
        }

        let mut video = VideoOut {
            pio,
            timing_sm: timing_sm.start(),
            timing_rx,
            timing_tx,
            pixel_sm: pixel_sm.start(),
            pixel_rx,
            pixel_tx,
            pixel_offset,
            dma,
            control,
            sys_clk_hz,
        };
        video.load_line_length(mode);

        defmt::info!(
            "Video ready: {}x{}, PIO divider {}+{}/256",
            mode.visible_dots_per_line,
            mode.visible_lines_per_frame,
            timing_int,
            timing_frac
        );

        Ok(video)
    }

    /// Select a new mode. Only allowed while parked.
    pub fn set_mode(&mut self, mode: &Mode) -> Result<(), Error> {
        self.control.set_mode(mode)?;
        let dot_clock_ns = mode.dot_clock_ns();
        let (int, frac) = videoout::timing::clock_divisor(self.sys_clk_hz, dot_clock_ns, 1);
        self.timing_sm.clock_divisor_fixed_point(int, frac);
        let (int, frac) = videoout::timing::clock_divisor(self.sys_clk_hz, dot_clock_ns, 2);
        self.pixel_sm.clock_divisor_fixed_point(int, frac);
        self.load_line_length(mode);
        Ok(())
    }

    /// Start scanning out frames, beginning with a V-Sync.
    pub fn start(&mut self) -> Result<(), Error> {
        let mut transfer = DmaTransfer { dma: &self.dma };
        self.control.start(&mut transfer)?;
        Ok(())
    }

    /// Ask the video to stop at the end of this frame.
    pub fn stop(&mut self) {
        self.control.stop();
    }

    /// Has the video stopped?
    pub fn is_parked(&self) -> bool {
        self.control.is_parked()
    }

    /// Stop the video and hand back the hardware.
    ///
    /// Waits for the current frame to finish first.
    pub fn cleanup(mut self) -> (VideoResources, VideoControl<'static>) {
        self.control.stop();
        while !self.control.is_parked() {
            cortex_m::asm::wfi();
        }

        NVIC::mask(pac::Interrupt::DMA_IRQ_0);
        self.dma.inte0().write(|w| unsafe { w.inte0().bits(0) });

        let channels = (1 << TIMING_DMA_CHAN) | (1 << PIXEL_DMA_CHAN);
        self.dma
            .chan_abort()
            .write(|w| unsafe { w.chan_abort().bits(channels) });
        while self.dma.chan_abort().read().bits() != 0 {}

        let (timing_sm, timing_installed) =
            self.timing_sm.stop().uninit(self.timing_rx, self.timing_tx);
        let (pixel_sm, pixel_installed) =
            self.pixel_sm.stop().uninit(self.pixel_rx, self.pixel_tx);
        self.pio.uninstall(timing_installed);
        self.pio.uninstall(pixel_installed);

        defmt::info!("Video shut down");

        (
            VideoResources {
                pio: self.pio,
                timing_sm,
                pixel_sm,
                dma: self.dma,
            },
            self.control,
        )
    }

    /// Tell the pixel program how many dots there are in a line.
    ///
    /// Sends it back to its preamble first, so it collects the new value
    /// with `pull block`. The state machine is either waiting for IRQ 4 or
    /// for its first pull, so this is safe to do while parked.
    fn load_line_length(&mut self, mode: &Mode) {
        self.pixel_sm.exec_instruction(pio::Instruction {
            operands: pio::InstructionOperands::JMP {
                condition: pio::JmpCondition::Always,
                address: self.pixel_offset,
            },
            delay: 0,
            side_set: None,
        });
        if !self.pixel_tx.write(mode.visible_dots_per_line - 1) {
            defmt::warn!("Pixel FIFO full when loading line length");
        }
    }
}

impl TimingTransfer for DmaTransfer<'_> {
    fn play_timing(&mut self, program: &[u32], lines: u32) {
        let ch = self.dma.ch(TIMING_DMA_CHAN);
        // The ring covers the whole program, which is 8 or 16 bytes and
        // aligned to match.
        let ring_bits = core::mem::size_of_val(program).trailing_zeros() as u8;
        ch.ch_read_addr()
            .write(|w| unsafe { w.bits(program.as_ptr() as u32) });
        ch.ch_trans_count()
            .write(|w| unsafe { w.bits(program.len() as u32 * lines) });
        // Writing CTRL_TRIG starts the transfer
        ch.ch_ctrl_trig().modify(|_r, w| {
            unsafe { w.ring_size().bits(ring_bits) };
            w.en().set_bit();
            w
        });
    }

    fn play_pixels(&mut self, frame: *const u32, words: u32) {
        let ch = self.dma.ch(PIXEL_DMA_CHAN);
        let (source, increment) = if frame.is_null() {
            (&raw const BLANK_PIXELS, false)
        } else {
            (frame, true)
        };
        ch.ch_read_addr()
            .write(|w| unsafe { w.bits(source as u32) });
        ch.ch_trans_count().write(|w| unsafe { w.bits(words) });
        ch.ch_ctrl_trig().modify(|_r, w| {
            w.incr_read().bit(increment);
            w.en().set_bit();
            w
        });
    }
}

/// Called when the timing DMA channel finishes a phase.
///
/// The timing state machine still has a few words in its FIFO, so there is
/// time to arm the next phase before the output notices.
#[link_section = ".data"]
#[interrupt]
fn DMA_IRQ_0() {
    let dma = unsafe { &*pac::DMA::ptr() };

    // Clear the interrupt
    dma.ints0()
        .write(|w| unsafe { w.ints0().bits(1 << TIMING_DMA_CHAN) });

    let mut transfer = DmaTransfer { dma };
    ENGINE.on_timing_complete(&mut transfer);
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
