/// Append-only, human-readable session log: one `MIDI` line per released
/// message and one `NTP` stats line every 50 main-loop ticks. Distinct from
/// the `tracing`-based structured diagnostics — this is the operator-facing
/// artifact written to `config.log_file`.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::queue::QueuedMessage;

pub struct SessionLog {
    file: File,
    /// Wall-clock time the log was opened; every `MIDI` line's timestamp is
    /// relative to this.
    time_reference: f64,
}

impl SessionLog {
    pub fn open(path: &Path, now: f64) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file)?;
        writeln!(
            file,
            "# ============================================================================="
        )?;
        writeln!(
            file,
            "# Startup (UTC time): {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(
            file,
            "# ============================================================================="
        )?;
        writeln!(file, "TIME-REFERENCE {now:.6}")?;
        writeln!(file)?;
        file.flush()?;
        Ok(Self {
            file,
            time_reference: now,
        })
    }

    /// Append one `MIDI` line per message in `messages`, in order.
    pub fn log_messages(&mut self, messages: &[QueuedMessage]) -> std::io::Result<()> {
        for msg in messages {
            write!(
                self.file,
                "MIDI {:.6} {}",
                msg.timestamp - self.time_reference,
                msg.bytes.len()
            )?;
            for byte in &msg.bytes {
                write!(self.file, " {byte}")?;
            }
            writeln!(self.file)?;
        }
        self.file.flush()
    }

    /// Append one periodic `NTP` stats line.
    pub fn log_stats(&mut self, playback_latency: f64, network_latency: f64, delta: f64) -> std::io::Result<()> {
        writeln!(
            self.file,
            "NTP latency {playback_latency:.6} network-latency {network_latency:.6} delta {delta:.6}"
        )?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_lines() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("midinet-sessionlog-test-{}.log", std::process::id()));
        let mut log = SessionLog::open(&path, 1000.0).unwrap();
        log.log_messages(&[QueuedMessage {
            timestamp: 1000.5,
            seq: 0,
            bytes: vec![0x90, 0x3C, 0x7F],
        }])
        .unwrap();
        log.log_stats(0.05, 0.01, 0.5).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("TIME-REFERENCE 1000.000000"));
        assert!(contents.contains("MIDI 0.500000 3 144 60 127"));
        assert!(contents.contains("NTP latency 0.050000 network-latency 0.010000 delta 0.500000"));
        let _ = std::fs::remove_file(&path);
    }
}
