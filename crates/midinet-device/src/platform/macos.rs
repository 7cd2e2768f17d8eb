/// macOS CoreMIDI backend: physical port enumeration/open plus virtual
/// output port creation, the latter via `coremidi::Client::virtual_source`
/// (seen by other applications as an input), the former via
/// `coremidi::{Sources, Destinations}`.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use coremidi::{Client, Destinations, OutputPort, PacketBuffer, Sources, VirtualSource};
use tracing::{debug, warn};

use crate::{MidiInput, MidiOutput};

fn client(name: &str) -> anyhow::Result<Client> {
    Client::new(name).map_err(|e| anyhow::anyhow!("failed to create CoreMIDI client: {e:?}"))
}

pub fn list_inputs() -> anyhow::Result<Vec<String>> {
    Ok(Sources
        .into_iter()
        .map(|s| s.display_name().unwrap_or_default())
        .collect())
}

pub fn list_outputs() -> anyhow::Result<Vec<String>> {
    Ok(Destinations
        .into_iter()
        .map(|d| d.display_name().unwrap_or_default())
        .collect())
}

pub fn open_input(index: usize) -> anyhow::Result<Box<dyn MidiInput>> {
    let source = Sources
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("no MIDI input at index {index}"))?;
    let name = source.display_name().unwrap_or_default();

    let client = client(&format!("midinet-in-{name}"))?;
    let buffer: Arc<Mutex<VecDeque<Vec<u8>>>> = Arc::new(Mutex::new(VecDeque::new()));
    let callback_buffer = Arc::clone(&buffer);

    let port = client
        .input_port(&format!("midinet-in-{name}"), move |packet_list| {
            let mut buf = callback_buffer.lock().expect("coremidi input buffer poisoned");
            for packet in packet_list.iter() {
                if buf.len() >= 4096 {
                    buf.pop_front();
                }
                buf.push_back(packet.data().to_vec());
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to create CoreMIDI input port: {e:?}"))?;
    port.connect_source(&source)
        .map_err(|e| anyhow::anyhow!("failed to connect to MIDI source '{name}': {e:?}"))?;

    Ok(Box::new(CoreMidiInput {
        name,
        _client: client,
        _port: port,
        buffer,
    }))
}

pub fn open_output(index: usize) -> anyhow::Result<Box<dyn MidiOutput>> {
    let destination = Destinations
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("no MIDI output at index {index}"))?;
    let name = destination.display_name().unwrap_or_default();

    let client = client(&format!("midinet-out-{name}"))?;
    let port = client
        .output_port(&format!("midinet-out-{name}"))
        .map_err(|e| anyhow::anyhow!("failed to create CoreMIDI output port: {e:?}"))?;

    Ok(Box::new(CoreMidiPhysicalOutput {
        name,
        _client: client,
        port,
        destination,
    }))
}

pub fn create_virtual_output(name: &str) -> anyhow::Result<Box<dyn MidiOutput>> {
    let client = client(&format!("midinet-{name}"))?;
    let source = client
        .virtual_source(name)
        .map_err(|e| anyhow::anyhow!("failed to create virtual source '{name}': {e:?}"))?;

    Ok(Box::new(CoreMidiVirtualOutput {
        name: name.to_string(),
        _client: client,
        source,
    }))
}

struct CoreMidiInput {
    name: String,
    _client: Client,
    _port: coremidi::InputPort,
    buffer: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl MidiInput for CoreMidiInput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn recv(&self) -> Option<Vec<u8>> {
        self.buffer.lock().ok()?.pop_front()
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct CoreMidiPhysicalOutput {
    name: String,
    _client: Client,
    port: OutputPort,
    destination: coremidi::Destination,
}

impl MidiOutput for CoreMidiPhysicalOutput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn send(&self, data: &[u8]) -> anyhow::Result<()> {
        let packet = PacketBuffer::new(0, data);
        self.port
            .send(&self.destination, &packet)
            .map_err(|e| anyhow::anyhow!("failed to send MIDI to '{}': {e:?}", self.name))?;
        debug!(bytes = data.len(), name = %self.name, "sent MIDI to CoreMIDI destination");
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct CoreMidiVirtualOutput {
    name: String,
    _client: Client,
    source: VirtualSource,
}

impl MidiOutput for CoreMidiVirtualOutput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn send(&self, data: &[u8]) -> anyhow::Result<()> {
        let packet = PacketBuffer::new(0, data);
        self.source
            .received(&packet)
            .map_err(|e| anyhow::anyhow!("failed to send MIDI to virtual source: {e:?}"))?;
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        warn!(name = %self.name, "closing CoreMIDI virtual source");
        Ok(())
    }
}
