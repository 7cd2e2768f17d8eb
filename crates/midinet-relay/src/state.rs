/// Shared relay state touched from more than one task.
///
/// Every cross-task field is an atomic (`AtomicU64` for the counters, a
/// bit-cast `AtomicF64` for the doubles) so the relay's single mutex is
/// reserved for the playback queue and log buffer alone.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::queue::PlaybackQueue;

/// An `f64` stored behind an `AtomicU64` via its bit pattern. `Relaxed`
/// ordering is sufficient everywhere this is used: every reader only needs
/// the most recent value, not a happens-before relationship with other
/// state (the playback queue's own mutex provides that where it matters).
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// State shared between the network-reader task, the MIDI-ingress task, the
/// scheduled-release tick task, and the main clock-sync/status loop.
pub struct RelayState {
    /// Estimated `peer_clock - local_clock`.
    pub delta: AtomicF64,
    /// Estimated one-way network latency.
    pub network_latency: AtomicF64,
    /// Current playback latency offset (`config.latency`, possibly
    /// continuously overwritten when `auto_latency` is set).
    pub playback_latency: AtomicF64,
    pub auto_latency: bool,
    pub duplication: u32,
    pub num_packets: AtomicU64,
    pub num_midi_messages: AtomicU64,
    /// Outbound MIDI identifier serial, assigned from the single task that
    /// processes local MIDI input.
    pub next_serial: AtomicU32,
    pub queue: PlaybackQueue,
}

impl RelayState {
    pub fn new(initial_latency: f64, auto_latency: bool, duplication: u32) -> Self {
        Self {
            delta: AtomicF64::new(0.0),
            network_latency: AtomicF64::new(0.0),
            playback_latency: AtomicF64::new(initial_latency),
            auto_latency,
            duplication,
            num_packets: AtomicU64::new(0),
            num_midi_messages: AtomicU64::new(0),
            next_serial: AtomicU32::new(0),
            queue: PlaybackQueue::default(),
        }
    }

    /// Allocate the next outbound serial. Incremented once per logical
    /// message sent, not once per `duplication` copy.
    pub fn take_serial(&self) -> u32 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f64_roundtrips() {
        let a = AtomicF64::new(1.5);
        assert_eq!(a.load(), 1.5);
        a.store(-2.25);
        assert_eq!(a.load(), -2.25);
    }

    #[test]
    fn serial_increments_once_per_call() {
        let state = RelayState::new(0.0, true, 3);
        assert_eq!(state.take_serial(), 0);
        assert_eq!(state.take_serial(), 1);
        assert_eq!(state.take_serial(), 2);
    }
}
