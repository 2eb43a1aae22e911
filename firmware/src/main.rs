//! # pico-mda-rs
//!
//! Rust Firmware for an RP2040 MDA-style video adaptor.
//!
//! Draws a status screen into one of two frame buffers, hands it to the video
//! engine at the next frame boundary and then draws the next one.

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

#![no_std]
#![no_main]

// -----------------------------------------------------------------------------
// Sub-modules
// -----------------------------------------------------------------------------

mod font;
mod hw;
mod vga;

// -----------------------------------------------------------------------------
// Imports
// -----------------------------------------------------------------------------

use core::fmt::Write as _;
use core::sync::atomic::{AtomicU32, Ordering};

use defmt_rtt as _;
use embedded_hal::digital::StatefulOutputPin as _;
use panic_probe as _;
use rp2040_hal as hal;

use hal::pac;
use videoout::{
    plane::{BRIGHT, DIM, OFF},
    Font, FrameBuffer, Mode, Op, PixelPlane,
};

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

#[link_section = ".boot2"]
#[no_mangle]
#[used]
pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

/// Things picotool can read out of the flash image
#[link_section = ".bi_entries"]
#[used]
pub static PICOTOOL_ENTRIES: [hal::binary_info::EntryAddr; 4] = [
    hal::binary_info::rp_cargo_bin_name!(),
    hal::binary_info::rp_cargo_version!(),
    hal::binary_info::rp_program_description!(c"RP2040 MDA-style video adaptor"),
    hal::binary_info::rp_program_build_attribute!(),
];

/// The only mode we drive.
const MODE: Mode = Mode::MDA_720X350;

/// Bytes in one frame buffer
const FRAME_BYTES: usize = MODE.frame_size_bytes();

/// Bytes in one line of a frame buffer
const STRIDE: usize = MODE.stride_bytes() as usize;

/// Text columns across the screen
const COLUMNS: usize = MODE.visible_dots_per_line as usize / font::CELL_WIDTH;

/// Frames between each change of the cursor
const BLINK_FRAMES: u32 = 16;

/// One frame buffer is scanned out while we draw into the other.
static FRAMES: [FrameBuffer<FRAME_BYTES>; 2] = [FrameBuffer::new(), FrameBuffer::new()];

/// Counts up once per frame, for blinking things.
static BLINK: AtomicU32 = AtomicU32::new(0);

/// Double-line box pieces: top-left, top-right, bottom-left, bottom-right,
/// horizontal, vertical.
const DOUBLE_BOX: [u8; 6] = [0xC9, 0xBB, 0xC8, 0xBC, 0xCD, 0xBA];

/// Single-line box pieces, in the same order as [`DOUBLE_BOX`].
const SINGLE_BOX: [u8; 6] = [0xDA, 0xBF, 0xC0, 0xD9, 0xC4, 0xB3];

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

#[hal::entry]
fn main() -> ! {
    defmt::info!(
        "Firmware {} {} starting up",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let periph = defmt::unwrap!(pac::Peripherals::take());
    let mut hw = hw::Hardware::init(periph);

    let font_matrix = defmt::unwrap!(font::build());
    let font = font_matrix.font();

    let control = defmt::unwrap!(vga::ENGINE.take());
    let mut video = match vga::VideoOut::init(hw.video, control, &MODE, hw.sys_clk_hz) {
        Ok(video) => video,
        Err(failure) => defmt::panic!("Video init failed: {}", failure.error),
    };

    // Get something on screen before the first V-Sync
    let mut back = 0;
    {
        // Safety: video isn't running yet
        let mut plane = unsafe { FRAMES[back].plane(STRIDE) };
        draw_screen(&mut plane, &font, 0, 0);
    }
    vga::ENGINE.publish(FRAMES[back].as_ptr());
    vga::ENGINE.set_frame_callback(Some(on_frame));
    defmt::unwrap!(video.start());

    defmt::info!("Video running");

    let mut last_second = 0;
    loop {
        back ^= 1;
        let uptime: fugit::MicrosDurationU64 = hw.timer.get_counter().duration_since_epoch();
        let uptime_secs = uptime.to_secs();
        let frames = vga::ENGINE.frame_count();
        {
            // Safety: the other buffer is the one on screen, and a frame
            // boundary has passed since this one was last published.
            let mut plane = unsafe { FRAMES[back].plane(STRIDE) };
            draw_screen(&mut plane, &font, uptime_secs, frames);
        }
        vga::ENGINE.publish(FRAMES[back].as_ptr());

        // Once a frame ends after the publish, the next V-Sync picks up the
        // new buffer and the old one is ours again.
        let published_at = vga::ENGINE.frame_count();
        while vga::ENGINE.frame_count() == published_at {
            vga::ENGINE.wait_for_frame_boundary(cortex_m::asm::wfe);
        }

        if uptime_secs != last_second {
            last_second = uptime_secs;
            let _ = hw.led.toggle();
        }
    }
}

/// Runs in the DMA interrupt at the end of every frame.
fn on_frame() {
    // Only this function writes to it
    let count = BLINK.load(Ordering::Relaxed);
    BLINK.store(count.wrapping_add(1), Ordering::Relaxed);
}

/// Draw the whole status screen.
fn draw_screen(plane: &mut PixelPlane, font: &Font, uptime_secs: u64, frames: u32) {
    plane.fill(OFF);

    draw_box(plane, font, 0, 0, COLUMNS, 6, &DOUBLE_BOX, BRIGHT);
    draw_text(plane, font, 2, 1, "pico-mda-rs", BRIGHT);
    draw_text(plane, font, 2, 2, "720 x 350 monochrome video from an RP2040", DIM);

    let mut line: heapless::String<COLUMNS> = heapless::String::new();
    let _ = write!(line, "Uptime: {:>6} s   Frames: {:>8}", uptime_secs, frames);
    draw_text(plane, font, 2, 3, &line, DIM);

    draw_box(plane, font, 2, 8, 24, 4, &SINGLE_BOX, DIM);
    draw_text(plane, font, 4, 9, "Shading", DIM);
    for (i, glyph) in [0xB0, 0xB1, 0xB2, 0xDB].into_iter().enumerate() {
        for repeat in 0..3 {
            draw_char(plane, font, 4 + i * 4 + repeat, 10, glyph, BRIGHT);
        }
    }

    draw_text(plane, font, 0, 14, "A:\\>", BRIGHT);
    if (BLINK.load(Ordering::Relaxed) / BLINK_FRAMES) & 1 == 0 {
        // A solid block, XOR'd over whatever is under the cursor
        font.draw_glyph_fast(
            plane,
            4 * font.cell_width(),
            14 * font.cell_height(),
            0xDB,
            BRIGHT,
            OFF,
            Op::Xor,
        );
    }
}

/// Draw a box of the given size in character cells.
#[allow(clippy::too_many_arguments)]
fn draw_box(
    plane: &mut PixelPlane,
    font: &Font,
    col: usize,
    row: usize,
    width: usize,
    height: usize,
    pieces: &[u8; 6],
    fg: u8,
) {
    let [top_left, top_right, bottom_left, bottom_right, horizontal, vertical] = *pieces;
    let right = col + width - 1;
    let bottom = row + height - 1;
    for x in col + 1..right {
        draw_char(plane, font, x, row, horizontal, fg);
        draw_char(plane, font, x, bottom, horizontal, fg);
    }
    for y in row + 1..bottom {
        draw_char(plane, font, col, y, vertical, fg);
        draw_char(plane, font, right, y, vertical, fg);
    }
    draw_char(plane, font, col, row, top_left, fg);
    draw_char(plane, font, right, row, top_right, fg);
    draw_char(plane, font, col, bottom, bottom_left, fg);
    draw_char(plane, font, right, bottom, bottom_right, fg);
}

/// Draw a string starting at the given character cell.
fn draw_text(plane: &mut PixelPlane, font: &Font, col: usize, row: usize, text: &str, fg: u8) {
    for (i, ch) in text.bytes().enumerate() {
        draw_char(plane, font, col + i, row, ch, fg);
    }
}

/// Draw one glyph into a character cell.
fn draw_char(plane: &mut PixelPlane, font: &Font, col: usize, row: usize, glyph: u8, fg: u8) {
    font.draw_glyph_fast(
        plane,
        col * font.cell_width(),
        row * font.cell_height(),
        glyph,
        fg,
        OFF,
        Op::Set,
    );
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
