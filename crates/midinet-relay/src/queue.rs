/// The playback queue and the session-log buffer, combined behind a single
/// lock so the "push/pop the queue, append to the log" invariant can't be
/// split across two locks by accident.
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex;

use tracing::warn;

use midinet_device::MidiOutput;

/// A message waiting to be released to the outputs, ordered by ascending
/// `timestamp`; `seq` breaks ties by insertion order so release order is
/// deterministic within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub timestamp: f64,
    pub seq: u64,
    pub bytes: Vec<u8>,
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .partial_cmp(&other.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Shared {
    heap: BinaryHeap<Reverse<QueuedMessage>>,
    log_buffer: VecDeque<QueuedMessage>,
    next_seq: u64,
}

pub struct PlaybackQueue {
    shared: Mutex<Shared>,
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self {
            shared: Mutex::new(Shared {
                heap: BinaryHeap::new(),
                log_buffer: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }
}

impl PlaybackQueue {
    /// Insert a message scheduled to render at `timestamp`.
    pub fn push(&self, timestamp: f64, bytes: Vec<u8>) {
        let mut guard = self.shared.lock().expect("playback queue mutex poisoned");
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.heap.push(Reverse(QueuedMessage {
            timestamp,
            seq,
            bytes,
        }));
    }

    /// Pop every message whose `timestamp <= now`, fan it out synchronously
    /// to every output port, and append a copy to the log buffer. Returns the
    /// number of messages released, for the `num_midi_messages` counter.
    pub fn release_ready(&self, now: f64, outputs: &[Box<dyn MidiOutput>]) -> usize {
        let mut guard = self.shared.lock().expect("playback queue mutex poisoned");
        let mut released = 0usize;
        while let Some(Reverse(top)) = guard.heap.peek() {
            if top.timestamp > now {
                break;
            }
            let Reverse(msg) = guard.heap.pop().expect("just peeked");
            for output in outputs {
                if let Err(e) = output.send(&msg.bytes) {
                    warn!(error = %e, device = output.device_name(), "failed to send MIDI to output port");
                }
            }
            guard.log_buffer.push_back(msg);
            released += 1;
        }
        released
    }

    /// Atomically drain the log buffer, for the main loop's periodic flush.
    pub fn drain_log(&self) -> Vec<QueuedMessage> {
        let mut guard = self.shared.lock().expect("playback queue mutex poisoned");
        guard.log_buffer.drain(..).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shared.lock().unwrap().heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingOutput {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl MidiOutput for RecordingOutput {
        fn device_name(&self) -> &str {
            "recording"
        }
        fn send(&self, data: &[u8]) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }
        fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn release_pops_in_ascending_timestamp_order() {
        let q = PlaybackQueue::default();
        q.push(3.0, vec![3]);
        q.push(1.0, vec![1]);
        q.push(2.0, vec![2]);

        let out: Box<dyn MidiOutput> = Box::new(RecordingOutput {
            sent: Mutex::new(Vec::new()),
        });
        let outputs = vec![out];
        let released = q.release_ready(10.0, &outputs);
        assert_eq!(released, 3);

        let log = q.drain_log();
        let order: Vec<f64> = log.iter().map(|m| m.timestamp).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn release_only_pops_ready_messages() {
        let q = PlaybackQueue::default();
        q.push(5.0, vec![5]);
        q.push(15.0, vec![15]);
        let outputs: Vec<Box<dyn MidiOutput>> = Vec::new();
        let released = q.release_ready(10.0, &outputs);
        assert_eq!(released, 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let q = PlaybackQueue::default();
        q.push(1.0, vec![0xA]);
        q.push(1.0, vec![0xB]);
        let outputs: Vec<Box<dyn MidiOutput>> = Vec::new();
        q.release_ready(1.0, &outputs);
        let log = q.drain_log();
        assert_eq!(log[0].bytes, vec![0xA]);
        assert_eq!(log[1].bytes, vec![0xB]);
    }
}
