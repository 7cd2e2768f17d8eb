/// The scheduled-release tick task: wakes at a fixed interval, releases every
/// playback-queue entry whose timestamp has come due, and fans it out to
/// every configured output port.
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use midinet_device::MidiOutput;

use crate::state::RelayState;

/// Release granularity. 100µs keeps worst-case release jitter well under a
/// millisecond without busy-spinning the task.
pub const TICK_PERIOD: Duration = Duration::from_micros(100);

pub async fn run(state: Arc<RelayState>, outputs: Arc<Vec<Box<dyn MidiOutput>>>) {
    let mut interval = tokio::time::interval(TICK_PERIOD);
    loop {
        interval.tick().await;
        let now = midinet_protocol::clock::now();
        let released = state.queue.release_ready(now, &outputs);
        if released > 0 {
            state.num_midi_messages.fetch_add(released as u64, Ordering::Relaxed);
        }
    }
}
