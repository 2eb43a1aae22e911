//! Hardware set-up for the pico-mda firmware
//!
//! Clocks, pins and the peripherals the video engine borrows.

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

use rp2040_hal::{
    clocks::{init_clocks_and_plls, Clock as _},
    gpio::{
        bank0, FunctionPio0, FunctionSioOutput, OutputDriveStrength, OutputSlewRate, Pin, Pins,
        PullNone,
    },
    pac, Sio, Timer, Watchdog,
};

use crate::vga::VideoResources;

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

/// On-board crystal frequency, in Hz.
const XOSC_CRYSTAL_FREQ: u32 = 12_000_000;

/// GPIO for the V-Sync output. The timing state machine's first OUT pin.
pub const VSYNC_PIN: u8 = 2;

/// GPIO for the H-Sync output. Must follow [`VSYNC_PIN`].
pub const HSYNC_PIN: u8 = 3;

/// GPIO for the inverted intensity output. The pixel state machine's first OUT pin.
pub const NOT_DIM_PIN: u8 = 4;

/// GPIO for the video output. Must follow [`NOT_DIM_PIN`].
pub const VIDEO_PIN: u8 = 5;

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// The four pins of the MDA connector we drive.
///
/// All of them belong to PIO0. Holding them here keeps them in that function.
pub struct VideoPins {
    /// Vertical Sync pin
    _v_sync: Pin<bank0::Gpio2, FunctionPio0, PullNone>,
    /// Horizontal Sync pin
    _h_sync: Pin<bank0::Gpio3, FunctionPio0, PullNone>,
    /// Intensity, active low
    _not_dim: Pin<bank0::Gpio4, FunctionPio0, PullNone>,
    /// Video
    _video: Pin<bank0::Gpio5, FunctionPio0, PullNone>,
}

pub struct Hardware {
    /// Our pins for MDA video output
    pub _video_pins: VideoPins,
    /// The peripherals the video engine takes over
    pub video: VideoResources,
    /// Our blinky LED
    pub led: Pin<bank0::Gpio25, FunctionSioOutput, PullNone>,
    /// Free-running microsecond timer
    pub timer: Timer,
    /// The system clock, which also clocks the PIO
    pub sys_clk_hz: u32,
}

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

impl Hardware {
    /// Call this once on start-up to initialise the hardware
    pub fn init(mut periph: pac::Peripherals) -> Hardware {
        let mut watchdog = Watchdog::new(periph.WATCHDOG);
        let sio = Sio::new(periph.SIO);

        defmt::info!("Configuring clocks...");

        // The default set-up gives a 125 MHz system clock. The MDA dot clock
        // is 125 MHz ÷ 6, which is exactly 48 ns, so no fractional divider.
        let clocks = defmt::unwrap!(init_clocks_and_plls(
            XOSC_CRYSTAL_FREQ,
            periph.XOSC,
            periph.CLOCKS,
            periph.PLL_SYS,
            periph.PLL_USB,
            &mut periph.RESETS,
            &mut watchdog,
        )
        .ok());
        let sys_clk_hz = clocks.system_clock.freq().to_Hz();

        defmt::info!("Clocks OK! sys_clk = {} Hz", sys_clk_hz);

        let timer = Timer::new(periph.TIMER, &mut periph.RESETS, &clocks);

        defmt::info!("Configuring pins...");

        let hal_pins = Pins::new(
            periph.IO_BANK0,
            periph.PADS_BANK0,
            sio.gpio_bank0,
            &mut periph.RESETS,
        );

        let video_pins = VideoPins {
            _v_sync: {
                let mut pin = hal_pins.gpio2.reconfigure();
                pin.set_drive_strength(OutputDriveStrength::EightMilliAmps);
                pin.set_slew_rate(OutputSlewRate::Fast);
                pin
            },
            _h_sync: {
                let mut pin = hal_pins.gpio3.reconfigure();
                pin.set_drive_strength(OutputDriveStrength::EightMilliAmps);
                pin.set_slew_rate(OutputSlewRate::Fast);
                pin
            },
            _not_dim: {
                let mut pin = hal_pins.gpio4.reconfigure();
                pin.set_drive_strength(OutputDriveStrength::EightMilliAmps);
                pin.set_slew_rate(OutputSlewRate::Fast);
                pin
            },
            _video: {
                let mut pin = hal_pins.gpio5.reconfigure();
                pin.set_drive_strength(OutputDriveStrength::EightMilliAmps);
                pin.set_slew_rate(OutputSlewRate::Fast);
                pin
            },
        };

        defmt::info!("Resetting DMA...");

        // Reset the DMA engine. If we don't do this, starting from probe-rs
        // (as opposed to a cold-start) is unreliable.
        periph.RESETS.reset().modify(|_r, w| w.dma().set_bit());
        cortex_m::asm::nop();
        periph.RESETS.reset().modify(|_r, w| w.dma().clear_bit());
        while periph.RESETS.reset_done().read().dma().bit_is_clear() {}

        let (pio, timing_sm, pixel_sm, _, _) = {
            use rp2040_hal::pio::PIOExt as _;
            periph.PIO0.split(&mut periph.RESETS)
        };

        defmt::info!("HW init complete");

        Hardware {
            _video_pins: video_pins,
            video: VideoResources {
                pio,
                timing_sm,
                pixel_sm,
                dma: periph.DMA,
            },
            led: hal_pins.gpio25.reconfigure(),
            timer,
            sys_clk_hz,
        }
    }
}

// -----------------------------------------------------------------------------
// End of file
// -----------------------------------------------------------------------------
