/// Windows backend built on the WinRT `Devices::Midi` API. WinRT's
/// `Devices::Midi` namespace has no API to register a brand-new virtual
/// port, so `create_virtual_output` resolves `name` against an
/// already-enumerated output device (e.g. a loopMIDI-style loopback device
/// configured under that name) instead of creating one.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use windows::core::HSTRING;
use windows::Devices::Enumeration::DeviceInformation;
use windows::Devices::Midi::{MidiInPort, MidiMessageReceivedEventArgs, MidiOutPort};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter};

use crate::{MidiInput, MidiOutput};

fn to_anyhow(e: windows::core::Error) -> anyhow::Error {
    anyhow::anyhow!("WinRT MIDI error: {e}")
}

fn enumerate(selector: &HSTRING) -> anyhow::Result<Vec<DeviceInformation>> {
    let collection = DeviceInformation::FindAllAsyncAqsFilter(selector)
        .map_err(to_anyhow)?
        .get()
        .map_err(to_anyhow)?;
    let mut result = Vec::new();
    for i in 0..collection.Size().map_err(to_anyhow)? {
        result.push(collection.GetAt(i).map_err(to_anyhow)?);
    }
    Ok(result)
}

fn device_name(info: &DeviceInformation) -> String {
    info.Name().map(|n| n.to_string()).unwrap_or_default()
}

pub fn list_inputs() -> anyhow::Result<Vec<String>> {
    let selector = MidiInPort::GetDeviceSelector().map_err(to_anyhow)?;
    Ok(enumerate(&selector)?.iter().map(device_name).collect())
}

pub fn list_outputs() -> anyhow::Result<Vec<String>> {
    let selector = MidiOutPort::GetDeviceSelector().map_err(to_anyhow)?;
    Ok(enumerate(&selector)?.iter().map(device_name).collect())
}

pub fn open_input(index: usize) -> anyhow::Result<Box<dyn MidiInput>> {
    let selector = MidiInPort::GetDeviceSelector().map_err(to_anyhow)?;
    let infos = enumerate(&selector)?;
    let info = infos
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("no MIDI input at index {index}"))?;
    let name = device_name(info);

    let id = info.Id().map_err(to_anyhow)?;
    let port = MidiInPort::FromIdAsync(&id)
        .map_err(to_anyhow)?
        .get()
        .map_err(to_anyhow)?;

    let buffer: Arc<Mutex<VecDeque<Vec<u8>>>> = Arc::new(Mutex::new(VecDeque::new()));
    let callback_buffer = Arc::clone(&buffer);
    let handler = TypedEventHandler::<MidiInPort, MidiMessageReceivedEventArgs>::new(
        move |_sender, args| {
            if let Some(args) = args {
                if let Ok(message) = args.Message() {
                    if let Ok(raw) = message.RawData() {
                        if let Ok(reader) = DataReader::FromBuffer(&raw) {
                            let len = reader.UnconsumedBufferLength().unwrap_or(0) as usize;
                            let mut bytes = vec![0u8; len];
                            if reader.ReadBytes(&mut bytes).is_ok() {
                                let mut buf =
                                    callback_buffer.lock().expect("midi input buffer poisoned");
                                if buf.len() >= 4096 {
                                    buf.pop_front();
                                }
                                buf.push_back(bytes);
                            }
                        }
                    }
                }
            }
            Ok(())
        },
    );
    port.MessageReceived(&handler).map_err(to_anyhow)?;

    Ok(Box::new(WinMidiInput {
        name,
        _port: port,
        buffer,
    }))
}

pub fn open_output(index: usize) -> anyhow::Result<Box<dyn MidiOutput>> {
    let selector = MidiOutPort::GetDeviceSelector().map_err(to_anyhow)?;
    let infos = enumerate(&selector)?;
    let info = infos
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("no MIDI output at index {index}"))?;
    let name = device_name(info);
    let id = info.Id().map_err(to_anyhow)?;
    let port = MidiOutPort::FromIdAsync(&id)
        .map_err(to_anyhow)?
        .get()
        .map_err(to_anyhow)?;

    Ok(Box::new(WinMidiOutput { name, port }))
}

pub fn create_virtual_output(name: &str) -> anyhow::Result<Box<dyn MidiOutput>> {
    let selector = MidiOutPort::GetDeviceSelector().map_err(to_anyhow)?;
    let info = enumerate(&selector)?
        .into_iter()
        .find(|info| device_name(info) == name)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no MIDI output device named '{name}': WinRT cannot create a virtual port, \
                 configure a loopback device (e.g. loopMIDI) under this name first"
            )
        })?;
    let id = info.Id().map_err(to_anyhow)?;
    let port = MidiOutPort::FromIdAsync(&id)
        .map_err(to_anyhow)?
        .get()
        .map_err(to_anyhow)?;

    Ok(Box::new(WinMidiOutput {
        name: name.to_string(),
        port,
    }))
}

struct WinMidiInput {
    name: String,
    _port: MidiInPort,
    buffer: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl MidiInput for WinMidiInput {
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

struct WinMidiOutput {
    name: String,
    port: MidiOutPort,
}

impl MidiOutput for WinMidiOutput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn send(&self, data: &[u8]) -> anyhow::Result<()> {
        let writer = DataWriter::new().map_err(to_anyhow)?;
        writer.WriteBytes(data).map_err(to_anyhow)?;
        let buffer = writer.DetachBuffer().map_err(to_anyhow)?;
        self.port.SendBuffer(&buffer).map_err(to_anyhow)?;
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
