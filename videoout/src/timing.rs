//! Timing programs for the sync state machine.
//!
//! The sync state machine plays a stream of 32-bit words. Each word sets the
//! H-Sync and V-Sync pins, runs one PIO instruction (a side-effect, used to
//! raise or clear the pixel trigger), then holds for some number of dot
//! clocks. A line is a short run of these words, and a frame is the same few
//! lines repeated by DMA in ring mode.
//!
//! Post `<value:32>` where value is:
//!
//! ```text
//! +----------------+-----------------+-------+-------+
//! | instruction:16 | clock_cycles:14 | hsync | vsync |
//! +----------------+-----------------+-------+-------+
//!   31          16   15            2     1       0
//! ```
//!
//! The state machine shifts right, so the pin levels come out first.

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

use crate::{Error, Mode};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// What the sync state machine does at the start of an interval.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SideEffect {
    /// Nothing
    Nop,
    /// Raise the pixel trigger, which starts the pixel state machine on a line
    SetTrigger,
    /// Lower the pixel trigger
    ClearTrigger,
}

impl SideEffect {
    const NOP_INSTR: u16 = pio::InstructionOperands::MOV {
        destination: pio::MovDestination::Y,
        op: pio::MovOperation::None,
        source: pio::MovSource::Y,
    }
    .encode();

    const SET_TRIGGER_INSTR: u16 = pio::InstructionOperands::IRQ {
        clear: false,
        wait: false,
        index: TRIGGER_IRQ,
        relative: false,
    }
    .encode();

    const CLEAR_TRIGGER_INSTR: u16 = pio::InstructionOperands::IRQ {
        clear: true,
        wait: false,
        index: TRIGGER_IRQ,
        relative: false,
    }
    .encode();

    /// Produces the PIO instruction which performs this side-effect.
    #[inline]
    pub const fn into_command(self) -> u16 {
        match self {
            SideEffect::Nop => Self::NOP_INSTR,
            SideEffect::SetTrigger => Self::SET_TRIGGER_INSTR,
            SideEffect::ClearTrigger => Self::CLEAR_TRIGGER_INSTR,
        }
    }

    /// Work out which side-effect a PIO instruction performs.
    pub const fn from_command(command: u16) -> Option<SideEffect> {
        if command == Self::NOP_INSTR {
            Some(SideEffect::Nop)
        } else if command == Self::SET_TRIGGER_INSTR {
            Some(SideEffect::SetTrigger)
        } else if command == Self::CLEAR_TRIGGER_INSTR {
            Some(SideEffect::ClearTrigger)
        } else {
            None
        }
    }
}

/// One interval of a line, before encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instruction {
    /// Is the H-Sync pulse active during this interval?
    pub hsync_active: bool,
    /// Is the V-Sync pulse active during this interval?
    pub vsync_active: bool,
    /// Length of this interval, in dot clocks
    pub clocks: u32,
    /// Performed at the start of the interval
    pub side_effect: SideEffect,
}

impl Instruction {
    /// Generate a 32-bit value we can send to the timing FIFO.
    ///
    /// The polarities turn "active" into pin levels.
    pub fn encode(
        &self,
        mode_hsync: crate::SyncPolarity,
        mode_vsync: crate::SyncPolarity,
    ) -> Result<u32, Error> {
        if !(MIN_CLOCKS..=MAX_CLOCKS).contains(&self.clocks) {
            return Err(Error::UnencodableTiming);
        }
        let mut value: u32 = 0;
        if mode_vsync.level(self.vsync_active) {
            value |= 1 << 0;
        }
        if mode_hsync.level(self.hsync_active) {
            value |= 1 << 1;
        }
        value |= (self.clocks - FIXED_CLOCKS_PER_TIMING_PULSE) << 2;
        Ok(value | u32::from(self.side_effect.into_command()) << 16)
    }

    /// Turn a timing FIFO word back into an [`Instruction`].
    ///
    /// Returns `None` if the embedded PIO instruction isn't one we generate.
    pub fn decode(
        word: u32,
        mode_hsync: crate::SyncPolarity,
        mode_vsync: crate::SyncPolarity,
    ) -> Option<Instruction> {
        let vsync_level = (word & (1 << 0)) != 0;
        let hsync_level = (word & (1 << 1)) != 0;
        let side_effect = SideEffect::from_command((word >> 16) as u16)?;
        Some(Instruction {
            hsync_active: mode_hsync.level(hsync_level),
            vsync_active: mode_vsync.level(vsync_level),
            clocks: ((word >> 2) & 0x3FFF) + FIXED_CLOCKS_PER_TIMING_PULSE,
            side_effect,
        })
    }
}

/// Timing words for a two-interval line.
///
/// DMA reads this in ring mode, wrapping on the low address bits, so it must
/// sit on a boundary equal to its own size.
#[repr(C, align(8))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShortLineTiming(pub [u32; 2]);

/// Timing words for a four-interval line.
///
/// As [`ShortLineTiming`], this must be aligned to its own size.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LongLineTiming(pub [u32; 4]);

/// The three line programs which make up every frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimingProgram {
    /// A line with no video and no V-Sync
    pub blank_line: ShortLineTiming,
    /// A line inside the V-Sync pulse
    pub vsync_line: ShortLineTiming,
    /// A line with video, including the pixel trigger
    pub visible_line: LongLineTiming,
}

impl TimingProgram {
    /// A program which plays nothing useful. Used until a mode is set.
    pub const EMPTY: TimingProgram = TimingProgram {
        blank_line: ShortLineTiming([0; 2]),
        vsync_line: ShortLineTiming([0; 2]),
        visible_line: LongLineTiming([0; 4]),
    };

    /// How far into the visible line the pixel trigger is raised, in dot
    /// clocks.
    ///
    /// Returns `None` if the visible line never raises it.
    pub fn trigger_offset_clocks(&self, mode: &Mode) -> Option<u32> {
        let mut offset = 0;
        for word in self.visible_line.0 {
            let instr = Instruction::decode(word, mode.hsync_polarity, mode.vsync_polarity)?;
            if instr.side_effect == SideEffect::SetTrigger {
                return Some(offset);
            }
            offset += instr.clocks;
        }
        None
    }
}

// -----------------------------------------------------------------------------
// Static and Const Data
// -----------------------------------------------------------------------------

/// How many fixed clock cycles there are per timing pulse.
///
/// `out pins`, `out x` and `out exec` (which takes two) plus the final `jmp`
/// of the delay loop.
pub const FIXED_CLOCKS_PER_TIMING_PULSE: u32 = 5;

/// The shortest interval the sync state machine can play.
pub const MIN_CLOCKS: u32 = FIXED_CLOCKS_PER_TIMING_PULSE;

/// The longest interval the sync state machine can play.
pub const MAX_CLOCKS: u32 = 0x3FFF + FIXED_CLOCKS_PER_TIMING_PULSE;

/// Which PIO IRQ flag is the pixel trigger.
pub const TRIGGER_IRQ: u8 = 4;

/// How long the trigger stays up after H-Sync, in dot clocks.
pub const TRIGGER_WIDTH_CLOCKS: u32 = 16;

// -----------------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------------

/// Build the three line programs for `mode`.
///
/// Every program adds up to exactly one line period. In the visible line the
/// pixel trigger goes up at the end of the back porch, whichever of the
/// back porch or H-Sync pulse is longer, so pixels always start at the same
/// point relative to the sync pulse.
pub fn compile(mode: &Mode) -> Result<TimingProgram, Error> {
    if !mode.validate() {
        return Err(Error::InvalidMode);
    }
    let dot_ns = mode.dot_clock_ns();
    let line = mode.line_period_ns / dot_ns;
    let hsync = mode.hsync_width_ns / dot_ns;
    let back_porch = mode.back_porch_ns() / dot_ns;

    let encode = |hsync_active: bool,
                  vsync_active: bool,
                  clocks: Option<u32>,
                  side_effect: SideEffect|
     -> Result<u32, Error> {
        Instruction {
            hsync_active,
            vsync_active,
            clocks: clocks.ok_or(Error::UnencodableTiming)?,
            side_effect,
        }
        .encode(mode.hsync_polarity, mode.vsync_polarity)
    };
    let after_hsync = line.checked_sub(hsync);

    let blank_line = ShortLineTiming([
        encode(true, false, Some(hsync), SideEffect::Nop)?,
        encode(false, false, after_hsync, SideEffect::Nop)?,
    ]);

    let vsync_line = ShortLineTiming([
        encode(true, true, Some(hsync), SideEffect::Nop)?,
        encode(false, true, after_hsync, SideEffect::Nop)?,
    ]);

    let visible_line = if back_porch < hsync {
        // Trigger goes up part way through the sync pulse
        LongLineTiming([
            encode(true, false, Some(back_porch), SideEffect::Nop)?,
            encode(true, false, hsync.checked_sub(back_porch), SideEffect::SetTrigger)?,
            encode(false, false, Some(TRIGGER_WIDTH_CLOCKS), SideEffect::ClearTrigger)?,
            encode(
                false,
                false,
                after_hsync.and_then(|x| x.checked_sub(TRIGGER_WIDTH_CLOCKS)),
                SideEffect::Nop,
            )?,
        ])
    } else {
        // Trigger goes up some time after the sync pulse
        LongLineTiming([
            encode(true, false, Some(hsync), SideEffect::Nop)?,
            encode(false, false, back_porch.checked_sub(hsync), SideEffect::Nop)?,
            encode(false, false, Some(TRIGGER_WIDTH_CLOCKS), SideEffect::SetTrigger)?,
            encode(
                false,
                false,
                line.checked_sub(back_porch + TRIGGER_WIDTH_CLOCKS),
                SideEffect::ClearTrigger,
            )?,
        ])
    };

    Ok(TimingProgram {
        blank_line,
        vsync_line,
        visible_line,
    })
}

/// Work out the PIO clock divider for a state machine which runs
/// `cycles_per_period` instructions every `period_ns`.
///
/// Returns (integer_part, fractional_part) for the 16.8 fixed-point divider.
pub fn clock_divisor(sys_clk_hz: u32, period_ns: u32, cycles_per_period: u32) -> (u16, u8) {
    if cycles_per_period == 0 {
        return (0xFFFF, 0xFF);
    }
    // divider = sys_clk_hz * period / (1e9 * cycles), kept to 8 fractional bits
    let divider_x256 = (u64::from(sys_clk_hz) * u64::from(period_ns) * 256)
        / (1_000_000_000 * u64::from(cycles_per_period));

    let int_part = (divider_x256 / 256).clamp(1, 0xFFFF) as u16;
    let frac_part = if divider_x256 / 256 == 0 {
        0
    } else {
        (divider_x256 % 256) as u8
    };
    (int_part, frac_part)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncPolarity;
    use proptest::prelude::*;

    /// MDA timing with the H-Sync pulse wider than the back porch.
    const WIDE_SYNC: Mode = Mode {
        hsync_width_ns: 16_560,
        ..Mode::MDA_720X350
    };

    fn decode_all(words: &[u32], mode: &Mode) -> Vec<Instruction> {
        words
            .iter()
            .map(|w| Instruction::decode(*w, mode.hsync_polarity, mode.vsync_polarity).unwrap())
            .collect()
    }

    fn total_ns(words: &[u32], mode: &Mode) -> u32 {
        decode_all(words, mode)
            .iter()
            .map(|i| i.clocks * mode.dot_clock_ns())
            .sum()
    }

    #[test]
    fn mda_compiles() {
        let mode = Mode::MDA_720X350;
        let program = compile(&mode).unwrap();
        assert_eq!(program.visible_line.0.len(), 4);
        assert_eq!(program.blank_line.0.len(), 2);
        assert_eq!(program.vsync_line.0.len(), 2);
        assert_eq!(total_ns(&program.visible_line.0, &mode), 44_400);
        assert_eq!(total_ns(&program.blank_line.0, &mode), 44_400);
        assert_eq!(total_ns(&program.vsync_line.0, &mode), 44_400);
    }

    #[test]
    fn mda_visible_line() {
        // back porch (205 clocks) is wider than H-Sync (172 clocks)
        let mode = Mode::MDA_720X350;
        let program = compile(&mode).unwrap();
        let line = decode_all(&program.visible_line.0, &mode);
        let clocks: Vec<u32> = line.iter().map(|i| i.clocks).collect();
        assert_eq!(clocks, [172, 33, 16, 704]);
        let hsync: Vec<bool> = line.iter().map(|i| i.hsync_active).collect();
        assert_eq!(hsync, [true, false, false, false]);
        assert!(line.iter().all(|i| !i.vsync_active));
        assert_eq!(line[2].side_effect, SideEffect::SetTrigger);
        assert_eq!(line[3].side_effect, SideEffect::ClearTrigger);
        assert_eq!(program.trigger_offset_clocks(&mode), Some(205));
    }

    #[test]
    fn wide_sync_visible_line() {
        let mode = WIDE_SYNC;
        let program = compile(&mode).unwrap();
        let line = decode_all(&program.visible_line.0, &mode);
        let clocks: Vec<u32> = line.iter().map(|i| i.clocks).collect();
        assert_eq!(clocks, [205, 140, 16, 564]);
        let hsync: Vec<bool> = line.iter().map(|i| i.hsync_active).collect();
        assert_eq!(hsync, [true, true, false, false]);
        assert_eq!(line[1].side_effect, SideEffect::SetTrigger);
        assert_eq!(line[2].side_effect, SideEffect::ClearTrigger);
        assert_eq!(program.trigger_offset_clocks(&mode), Some(205));
        assert_eq!(total_ns(&program.visible_line.0, &mode), 44_400);
    }

    #[test]
    fn vsync_line_holds_vsync() {
        let mode = Mode::MDA_720X350;
        let program = compile(&mode).unwrap();
        let line = decode_all(&program.vsync_line.0, &mode);
        assert!(line.iter().all(|i| i.vsync_active));
        assert!(line[0].hsync_active);
        assert!(!line[1].hsync_active);
        let blank = decode_all(&program.blank_line.0, &mode);
        assert!(blank.iter().all(|i| !i.vsync_active));
        assert!(blank.iter().all(|i| i.side_effect == SideEffect::Nop));
    }

    #[test]
    fn pin_levels_follow_polarity() {
        // MDA: H-Sync active high, V-Sync active low
        let mode = Mode::MDA_720X350;
        let program = compile(&mode).unwrap();
        // during the V-Sync pulse, V-Sync pin low, H-Sync pin high
        assert_eq!(program.vsync_line.0[0] & 0b11, 0b10);
        // after the H-Sync pulse in a blank line, both idle
        assert_eq!(program.blank_line.0[1] & 0b11, 0b01);
    }

    #[test]
    fn encoding_layout() {
        let instr = Instruction {
            hsync_active: true,
            vsync_active: false,
            clocks: 100,
            side_effect: SideEffect::Nop,
        };
        let word = instr
            .encode(SyncPolarity::Positive, SyncPolarity::Positive)
            .unwrap();
        assert_eq!(word & 0b11, 0b10);
        assert_eq!((word >> 2) & 0x3FFF, 95);
        assert_eq!((word >> 16) as u16, SideEffect::Nop.into_command());
    }

    #[test]
    fn side_effect_commands_differ() {
        let nop = SideEffect::Nop.into_command();
        let set = SideEffect::SetTrigger.into_command();
        let clear = SideEffect::ClearTrigger.into_command();
        assert_ne!(nop, set);
        assert_ne!(set, clear);
        assert_ne!(nop, clear);
        assert_eq!(SideEffect::from_command(clear), Some(SideEffect::ClearTrigger));
        assert_eq!(SideEffect::from_command(0xFFFF), None);
    }

    #[test]
    fn durations_out_of_range() {
        let mut instr = Instruction {
            hsync_active: false,
            vsync_active: false,
            clocks: MIN_CLOCKS - 1,
            side_effect: SideEffect::Nop,
        };
        assert_eq!(
            instr.encode(SyncPolarity::Positive, SyncPolarity::Positive),
            Err(Error::UnencodableTiming)
        );
        instr.clocks = MAX_CLOCKS + 1;
        assert_eq!(
            instr.encode(SyncPolarity::Positive, SyncPolarity::Positive),
            Err(Error::UnencodableTiming)
        );
        instr.clocks = MAX_CLOCKS;
        assert!(instr
            .encode(SyncPolarity::Positive, SyncPolarity::Positive)
            .is_ok());
    }

    #[test]
    fn invalid_mode_refused() {
        let mode = Mode {
            hsync_width_ns: 9_840,
            ..Mode::MDA_720X350
        };
        assert_eq!(compile(&mode), Err(Error::InvalidMode));
    }

    #[test]
    fn tiny_sync_refused() {
        // Valid, but a 2-dot H-Sync pulse is too short for the state machine
        let mode = Mode {
            hsync_width_ns: 96,
            ..Mode::MDA_720X350
        };
        assert!(mode.validate());
        assert_eq!(compile(&mode), Err(Error::UnencodableTiming));
    }

    #[test]
    fn ring_alignment() {
        assert_eq!(
            core::mem::align_of::<ShortLineTiming>(),
            core::mem::size_of::<ShortLineTiming>()
        );
        assert_eq!(
            core::mem::align_of::<LongLineTiming>(),
            core::mem::size_of::<LongLineTiming>()
        );
        let program = compile(&Mode::MDA_720X350).unwrap();
        assert_eq!(program.visible_line.0.as_ptr() as usize % 16, 0);
        assert_eq!(program.blank_line.0.as_ptr() as usize % 8, 0);
        assert_eq!(program.vsync_line.0.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_clock_divider() {
        // 125 MHz system clock, 48 ns dots
        assert_eq!(clock_divisor(125_000_000, 48, 1), (6, 0));
        assert_eq!(clock_divisor(125_000_000, 48, 2), (3, 0));
        // 133 MHz gives 6.384 -> 6 + 98/256
        assert_eq!(clock_divisor(133_000_000, 48, 1), (6, 98));
        assert_eq!(clock_divisor(125_000_000, 48, 0), (0xFFFF, 0xFF));
    }

    prop_compose! {
        /// Valid modes, built from whole numbers of dots so they pass validation.
        fn valid_mode()(
            words in 20u32..60,
            dot_ns in 30u32..80,
            porch_dots in 40u32..400,
            hsync_dots in 8u32..380,
            visible_lines in 100u32..400,
            vsync_lines in 1u32..6,
            pre_blank in 1u32..30,
            post_blank in 1u32..30,
        ) -> Mode {
            let dots = words * 16;
            Mode {
                visible_dots_per_line: dots,
                visible_lines_per_frame: visible_lines,
                line_period_ns: (dots + porch_dots) * dot_ns,
                lines_per_frame: vsync_lines + pre_blank + visible_lines + post_blank,
                vsync_lines_per_frame: vsync_lines,
                visible_start_line: vsync_lines + pre_blank,
                hsync_width_ns: hsync_dots * dot_ns,
                visible_width_ns: dots * dot_ns,
                hsync_polarity: SyncPolarity::Positive,
                vsync_polarity: SyncPolarity::Negative,
            }
        }
    }

    proptest! {
        #[test]
        fn programs_fill_the_line(mode in valid_mode()) {
            prop_assume!(mode.validate());
            if let Ok(program) = compile(&mode) {
                prop_assert_eq!(total_ns(&program.blank_line.0, &mode), mode.line_period_ns);
                prop_assert_eq!(total_ns(&program.vsync_line.0, &mode), mode.line_period_ns);
                prop_assert_eq!(total_ns(&program.visible_line.0, &mode), mode.line_period_ns);
            }
        }

        #[test]
        fn trigger_at_end_of_back_porch(mode in valid_mode()) {
            prop_assume!(mode.validate());
            if let Ok(program) = compile(&mode) {
                prop_assert_eq!(
                    program.trigger_offset_clocks(&mode),
                    Some(mode.back_porch_ns() / mode.dot_clock_ns())
                );
            }
        }

        #[test]
        fn only_short_intervals_refused(mode in valid_mode()) {
            prop_assume!(mode.validate());
            let hsync = mode.hsync_width_ns / mode.dot_clock_ns();
            let porch = mode.back_porch_ns() / mode.dot_clock_ns();
            let line = mode.line_period_ns / mode.dot_clock_ns();
            let fits = hsync >= MIN_CLOCKS
                && porch.abs_diff(hsync) >= MIN_CLOCKS
                && line >= hsync + TRIGGER_WIDTH_CLOCKS + MIN_CLOCKS;
            prop_assert_eq!(compile(&mode).is_ok(), fits);
        }
    }
}

// End of file
