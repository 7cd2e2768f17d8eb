/// Linux ALSA sequencer backend: physical port enumeration/open plus virtual
/// output port creation. The sequencer API operates on structured events
/// (`EvNote`, `EvCtrl`, ...), not raw MIDI bytes; conversion happens at the
/// boundary in `raw_midi_to_alsa_event`/`alsa_event_to_raw_midi`, shared by
/// both the physical and virtual port paths.
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use alsa::seq::{
    self, Addr, ClientIter, EvCtrl, EvNote, Event, EventType, PortCap, PortInfo, PortIter,
    PortType, Seq,
};
use tracing::{debug, error, warn};

use crate::{MidiInput, MidiOutput};

fn open_seq(name: &str) -> anyhow::Result<Seq> {
    let seq = Seq::open(None, None, true)
        .map_err(|e| anyhow::anyhow!("failed to open ALSA sequencer: {e}"))?;
    let cname = CString::new(name)?;
    seq.set_client_name(&cname)
        .map_err(|e| anyhow::anyhow!("failed to set client name: {e}"))?;
    Ok(seq)
}

/// Enumerate hardware sequencer ports exposing the given capability, skipping
/// the kernel's own System client (id 0).
fn enumerate_ports(cap: PortCap) -> anyhow::Result<Vec<(Addr, String)>> {
    let seq = Seq::open(None, None, false)
        .map_err(|e| anyhow::anyhow!("failed to open ALSA sequencer: {e}"))?;
    let mut result = Vec::new();
    for client in ClientIter::new(&seq) {
        let client_id = client.get_client();
        if client_id == 0 {
            continue;
        }
        for port in PortIter::new(&seq, client_id) {
            if !port.get_capability().contains(cap) {
                continue;
            }
            if !port.get_type().contains(PortType::MIDI_GENERIC) {
                continue;
            }
            let addr = Addr {
                client: client_id,
                port: port.get_port(),
            };
            result.push((addr, port.get_name().unwrap_or("").to_string()));
        }
    }
    Ok(result)
}

pub fn list_inputs() -> anyhow::Result<Vec<String>> {
    Ok(enumerate_ports(PortCap::READ | PortCap::SUBS_READ)?
        .into_iter()
        .map(|(_, name)| name)
        .collect())
}

pub fn list_outputs() -> anyhow::Result<Vec<String>> {
    Ok(enumerate_ports(PortCap::WRITE | PortCap::SUBS_WRITE)?
        .into_iter()
        .map(|(_, name)| name)
        .collect())
}

pub fn open_input(index: usize) -> anyhow::Result<Box<dyn MidiInput>> {
    let ports = enumerate_ports(PortCap::READ | PortCap::SUBS_READ)?;
    let (addr, name) = ports
        .get(index)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no MIDI input at index {index}"))?;

    let feedback_buffer = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicBool::new(true));

    let thread_running = Arc::clone(&running);
    let thread_buffer = Arc::clone(&feedback_buffer);
    let thread_name = name.clone();
    let thread = std::thread::Builder::new()
        .name(format!("midinet-alsa-in-{name}"))
        .spawn(move || {
            if let Err(e) = run_input_receiver(addr, &thread_name, thread_running, thread_buffer) {
                error!(name = %thread_name, "ALSA input receiver error: {e}");
            }
        })?;

    Ok(Box::new(AlsaInput {
        name,
        feedback_buffer,
        running,
        thread: Some(thread),
    }))
}

pub fn open_output(index: usize) -> anyhow::Result<Box<dyn MidiOutput>> {
    let ports = enumerate_ports(PortCap::WRITE | PortCap::SUBS_WRITE)?;
    let (addr, name) = ports
        .get(index)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no MIDI output at index {index}"))?;

    let seq = open_seq(&format!("midinet-out-{name}"))?;
    let own_port = seq
        .create_simple_port(
            &CString::new("out")?,
            PortCap::READ | PortCap::SUBS_READ,
            PortType::MIDI_GENERIC | PortType::APPLICATION,
        )
        .map_err(|e| anyhow::anyhow!("failed to create output port: {e}"))?;

    let sub = seq::PortSubscribe::empty()?;
    sub.set_sender(Addr {
        client: seq.client_id()?,
        port: own_port,
    });
    sub.set_dest(addr);
    seq.subscribe_port(&sub)
        .map_err(|e| anyhow::anyhow!("failed to connect to output device: {e}"))?;

    Ok(Box::new(AlsaOutput {
        name,
        seq,
        port: own_port,
    }))
}

pub fn create_virtual_output(name: &str) -> anyhow::Result<Box<dyn MidiOutput>> {
    let seq = open_seq(name)?;

    let mut out_info = PortInfo::empty().map_err(|e| anyhow::anyhow!("{e}"))?;
    let out_name = CString::new(format!("{name} MIDI 1"))?;
    out_info.set_name(&out_name);
    out_info.set_capability(PortCap::READ | PortCap::SUBS_READ);
    out_info.set_type(PortType::MIDI_GENERIC | PortType::APPLICATION);
    out_info.set_midi_channels(16);
    seq.create_port(&out_info)
        .map_err(|e| anyhow::anyhow!("failed to create virtual port: {e}"))?;

    Ok(Box::new(AlsaOutput {
        name: name.to_string(),
        seq,
        port: out_info.get_port(),
    }))
}

struct AlsaOutput {
    name: String,
    seq: Seq,
    port: i32,
}

impl MidiOutput for AlsaOutput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn send(&self, data: &[u8]) -> anyhow::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut offset = 0;
        while offset < data.len() {
            let (event_opt, consumed) = raw_midi_to_alsa_event(&data[offset..]);
            if consumed == 0 {
                offset += 1;
                continue;
            }
            if let Some(mut ev) = event_opt {
                ev.set_source(self.port);
                ev.set_subs();
                ev.set_direct();
                if let Err(e) = self.seq.event_output(&mut ev) {
                    warn!("failed to output ALSA event: {e}");
                }
            }
            offset += consumed;
        }
        if let Err(e) = self.seq.drain_output() {
            warn!("failed to drain ALSA output: {e}");
        }
        debug!(bytes = data.len(), name = %self.name, "sent MIDI to ALSA port");
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct AlsaInput {
    name: String,
    feedback_buffer: Arc<Mutex<Vec<Vec<u8>>>>,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MidiInput for AlsaInput {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn recv(&self) -> Option<Vec<u8>> {
        let mut buf = self.feedback_buffer.lock().ok()?;
        if buf.is_empty() {
            None
        } else {
            Some(buf.remove(0))
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }
}

/// Background thread: opens a dedicated sequencer connection, subscribes to
/// the hardware port `source`, and converts every inbound event to raw MIDI
/// bytes pushed onto `buffer`.
fn run_input_receiver(
    source: Addr,
    name: &str,
    running: Arc<AtomicBool>,
    buffer: Arc<Mutex<Vec<Vec<u8>>>>,
) -> anyhow::Result<()> {
    let seq_rx = Seq::open(None, Some(alsa::Direction::Capture), false)
        .map_err(|e| anyhow::anyhow!("failed to open ALSA sequencer for input: {e}"))?;
    let rx_name = CString::new(format!("midinet-rx-{name}"))?;
    seq_rx.set_client_name(&rx_name)?;

    let rx_port = seq_rx.create_simple_port(
        &CString::new("rx")?,
        PortCap::WRITE | PortCap::SUBS_WRITE,
        PortType::MIDI_GENERIC | PortType::APPLICATION,
    )?;

    let sub = seq::PortSubscribe::empty()?;
    sub.set_sender(source);
    sub.set_dest(Addr {
        client: seq_rx.client_id()?,
        port: rx_port,
    });
    seq_rx
        .subscribe_port(&sub)
        .map_err(|e| anyhow::anyhow!("failed to subscribe to input device: {e}"))?;

    use alsa::PollDescriptors;
    let mut fds: Vec<libc::pollfd> = (&seq_rx, Some(alsa::Direction::Capture))
        .get()
        .map_err(|e| anyhow::anyhow!("failed to get poll descriptors: {e}"))?;

    while running.load(Ordering::SeqCst) {
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, 100) };
        if ret < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(anyhow::anyhow!("poll() failed: {errno}"));
        }
        if ret == 0 {
            continue;
        }

        let mut input = seq_rx.input();
        while input.event_input_pending(true)? > 0 {
            match input.event_input() {
                Ok(event) => {
                    if let Some(raw) = alsa_event_to_raw_midi(&event) {
                        if let Ok(mut buf) = buffer.lock() {
                            if buf.len() >= 4096 {
                                buf.remove(0);
                            }
                            buf.push(raw);
                        }
                    }
                }
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        warn!(name, "input event_input error: {e}");
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

fn raw_midi_to_alsa_event(data: &[u8]) -> (Option<Event>, usize) {
    if data.is_empty() {
        return (None, 0);
    }
    let status = data[0];

    if status == 0xF0 {
        let end = data.iter().position(|&b| b == 0xF7);
        let sysex_len = end.map(|pos| pos + 1).unwrap_or(data.len());
        let ev = Event::new_ext(EventType::Sysex, &data[..sysex_len]);
        return (Some(ev), sysex_len);
    }

    if status >= 0xF8 {
        let ev_type = match status {
            0xF8 => Some(EventType::Clock),
            0xFA => Some(EventType::Start),
            0xFB => Some(EventType::Continue),
            0xFC => Some(EventType::Stop),
            0xFE => Some(EventType::Sensing),
            0xFF => Some(EventType::Reset),
            _ => None,
        };
        let ctrl = EvCtrl {
            channel: 0,
            param: 0,
            value: 0,
        };
        return match ev_type {
            Some(t) => (Some(Event::new(t, &ctrl)), 1),
            None => (None, 1),
        };
    }

    if status >= 0xF0 {
        return match status {
            0xF1 if data.len() >= 2 => (None, 2),
            0xF2 if data.len() >= 3 => (None, 3),
            0xF3 if data.len() >= 2 => (None, 2),
            0xF6 => {
                let ctrl = EvCtrl {
                    channel: 0,
                    param: 0,
                    value: 0,
                };
                (Some(Event::new(EventType::TuneRequest, &ctrl)), 1)
            }
            _ => (None, 1),
        };
    }

    let msg_type = status & 0xF0;
    let channel = status & 0x0F;

    match msg_type {
        0x80 if data.len() >= 3 => {
            let note = EvNote {
                channel,
                note: data[1] & 0x7F,
                velocity: data[2] & 0x7F,
                off_velocity: 0,
                duration: 0,
            };
            (Some(Event::new(EventType::Noteoff, &note)), 3)
        }
        0x90 if data.len() >= 3 => {
            let vel = data[2] & 0x7F;
            let note = EvNote {
                channel,
                note: data[1] & 0x7F,
                velocity: vel,
                off_velocity: 0,
                duration: 0,
            };
            let ev_type = if vel == 0 {
                EventType::Noteoff
            } else {
                EventType::Noteon
            };
            (Some(Event::new(ev_type, &note)), 3)
        }
        0xA0 if data.len() >= 3 => {
            let note = EvNote {
                channel,
                note: data[1] & 0x7F,
                velocity: data[2] & 0x7F,
                off_velocity: 0,
                duration: 0,
            };
            (Some(Event::new(EventType::Keypress, &note)), 3)
        }
        0xB0 if data.len() >= 3 => {
            let ctrl = EvCtrl {
                channel,
                param: (data[1] & 0x7F) as u32,
                value: (data[2] & 0x7F) as i32,
            };
            (Some(Event::new(EventType::Controller, &ctrl)), 3)
        }
        0xC0 if data.len() >= 2 => {
            let ctrl = EvCtrl {
                channel,
                param: 0,
                value: (data[1] & 0x7F) as i32,
            };
            (Some(Event::new(EventType::Pgmchange, &ctrl)), 2)
        }
        0xD0 if data.len() >= 2 => {
            let ctrl = EvCtrl {
                channel,
                param: 0,
                value: (data[1] & 0x7F) as i32,
            };
            (Some(Event::new(EventType::Chanpress, &ctrl)), 2)
        }
        0xE0 if data.len() >= 3 => {
            let lsb = (data[1] & 0x7F) as i32;
            let msb = (data[2] & 0x7F) as i32;
            let value = ((msb << 7) | lsb) - 8192;
            let ctrl = EvCtrl {
                channel,
                param: 0,
                value,
            };
            (Some(Event::new(EventType::Pitchbend, &ctrl)), 3)
        }
        _ => (None, 1),
    }
}

fn alsa_event_to_raw_midi(event: &Event) -> Option<Vec<u8>> {
    match event.get_type() {
        EventType::Noteon => {
            let d: EvNote = event.get_data()?;
            Some(vec![0x90 | (d.channel & 0x0F), d.note & 0x7F, d.velocity & 0x7F])
        }
        EventType::Noteoff => {
            let d: EvNote = event.get_data()?;
            Some(vec![0x80 | (d.channel & 0x0F), d.note & 0x7F, d.velocity & 0x7F])
        }
        EventType::Keypress => {
            let d: EvNote = event.get_data()?;
            Some(vec![0xA0 | (d.channel & 0x0F), d.note & 0x7F, d.velocity & 0x7F])
        }
        EventType::Controller => {
            let d: EvCtrl = event.get_data()?;
            Some(vec![
                0xB0 | (d.channel & 0x0F),
                (d.param & 0x7F) as u8,
                (d.value & 0x7F) as u8,
            ])
        }
        EventType::Pgmchange => {
            let d: EvCtrl = event.get_data()?;
            Some(vec![0xC0 | (d.channel & 0x0F), (d.value & 0x7F) as u8])
        }
        EventType::Chanpress => {
            let d: EvCtrl = event.get_data()?;
            Some(vec![0xD0 | (d.channel & 0x0F), (d.value & 0x7F) as u8])
        }
        EventType::Pitchbend => {
            let d: EvCtrl = event.get_data()?;
            let unsigned = (d.value + 8192).clamp(0, 16383) as u16;
            let lsb = (unsigned & 0x7F) as u8;
            let msb = ((unsigned >> 7) & 0x7F) as u8;
            Some(vec![0xE0 | (d.channel & 0x0F), lsb, msb])
        }
        EventType::Sysex => event.get_ext().map(|data| data.to_vec()),
        EventType::Clock => Some(vec![0xF8]),
        EventType::Start => Some(vec![0xFA]),
        EventType::Continue => Some(vec![0xFB]),
        EventType::Stop => Some(vec![0xFC]),
        EventType::Sensing => Some(vec![0xFE]),
        EventType::Reset => Some(vec![0xFF]),
        EventType::TuneRequest => Some(vec![0xF6]),
        _ => None,
    }
}
