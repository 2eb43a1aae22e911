//! Passing frames between the renderer and the frame engine.
//!
//! The renderer publishes a pointer to the frame it wants shown. The frame
//! engine picks it up once per frame, at the start of V-Sync, and raises a
//! signal at the end of each frame so the renderer can pace itself.

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

use portable_atomic::{AtomicBool, AtomicPtr, Ordering};

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

/// Holds the address of the frame to be scanned out.
///
/// Reads and writes are single atomic operations, so an interrupt can take
/// the value at any point and always sees either the old frame or the new
/// one.
pub struct FrameBufferHandle {
    ptr: AtomicPtr<u32>,
}

impl FrameBufferHandle {
    /// Make a handle pointing at nothing.
    pub const fn new() -> FrameBufferHandle {
        FrameBufferHandle {
            ptr: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Point the handle at a new frame.
    pub fn publish(&self, frame: *const u32) {
        self.ptr.store(frame as *mut u32, Ordering::Release);
    }

    /// Get the most recently published frame.
    pub fn load(&self) -> *const u32 {
        self.ptr.load(Ordering::Acquire)
    }
}

impl Default for FrameBufferHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A binary semaphore, raised from interrupt context and taken from thread
/// context.
///
/// Raising it when it is already raised does nothing, so a renderer which
/// misses several frames wakes up once, not once per frame.
pub struct FrameSignal {
    raised: AtomicBool,
}

impl FrameSignal {
    /// Make a lowered signal.
    pub const fn new() -> FrameSignal {
        FrameSignal {
            raised: AtomicBool::new(false),
        }
    }

    /// Raise the signal. Never blocks.
    pub fn release(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Lower the signal without waiting.
    pub fn reset(&self) {
        self.raised.store(false, Ordering::Release);
    }

    /// Take the signal if it is raised.
    pub fn try_acquire(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    /// Wait for the signal to be raised, then take it.
    ///
    /// `idle` is called each time round the loop. On the target it will
    /// usually wait for an interrupt.
    pub fn acquire_blocking<F>(&self, mut idle: F)
    where
        F: FnMut(),
    {
        while !self.try_acquire() {
            idle();
        }
    }
}

impl Default for FrameSignal {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_starts_null() {
        let handle = FrameBufferHandle::new();
        assert!(handle.load().is_null());
    }

    #[test]
    fn last_publish_wins() {
        let a = [0u32; 4];
        let b = [0u32; 4];
        let handle = FrameBufferHandle::new();
        handle.publish(a.as_ptr());
        handle.publish(b.as_ptr());
        assert_eq!(handle.load(), b.as_ptr());
    }

    #[test]
    fn load_never_sees_a_torn_pointer() {
        static A: [u32; 4] = [0; 4];
        static B: [u32; 4] = [0; 4];
        let a = A.as_ptr() as usize;
        let b = B.as_ptr() as usize;
        let handle = std::sync::Arc::new(FrameBufferHandle::new());
        handle.publish(A.as_ptr());
        let done = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

        let writer = {
            let handle = handle.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                loop {
                    handle.publish(A.as_ptr());
                    handle.publish(B.as_ptr());
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
            })
        };
        for _ in 0..200_000 {
            let frame = handle.load() as usize;
            assert!(frame == a || frame == b, "torn pointer {frame:#x}");
        }
        done.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        // The writer always finishes on B
        assert_eq!(handle.load() as usize, b);
    }

    #[test]
    fn signal_does_not_count() {
        let signal = FrameSignal::new();
        assert!(!signal.try_acquire());
        signal.release();
        signal.release();
        assert!(signal.try_acquire());
        assert!(!signal.try_acquire());
        signal.release();
        signal.reset();
        assert!(!signal.try_acquire());
    }

    #[test]
    fn blocking_acquire_idles_until_raised() {
        let signal = FrameSignal::new();
        let mut spins = 0;
        signal.acquire_blocking(|| {
            spins += 1;
            if spins == 3 {
                signal.release();
            }
        });
        assert_eq!(spins, 3);
        assert!(!signal.try_acquire());
    }

    #[test]
    fn raised_from_another_thread() {
        let signal = std::sync::Arc::new(FrameSignal::new());
        let remote = signal.clone();
        let t = std::thread::spawn(move || remote.release());
        signal.acquire_blocking(std::thread::yield_now);
        t.join().unwrap();
    }
}

// End of file
