/// Fallback backend for platforms without a native MIDI API.
use crate::{MidiInput, MidiOutput};

pub fn list_inputs() -> anyhow::Result<Vec<String>> {
    Ok(Vec::new())
}

pub fn list_outputs() -> anyhow::Result<Vec<String>> {
    Ok(Vec::new())
}

pub fn open_input(index: usize) -> anyhow::Result<Box<dyn MidiInput>> {
    anyhow::bail!("no MIDI input at index {index}: platform not supported")
}

pub fn open_output(index: usize) -> anyhow::Result<Box<dyn MidiOutput>> {
    anyhow::bail!("no MIDI output at index {index}: platform not supported")
}

pub fn create_virtual_output(name: &str) -> anyhow::Result<Box<dyn MidiOutput>> {
    tracing::warn!(name, "virtual MIDI output not supported on this platform");
    Ok(Box::new(StubOutput {
        name: name.to_string(),
    }))
}

struct StubOutput {
    name: String,
}

impl MidiOutput for StubOutput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn send(&self, _data: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
