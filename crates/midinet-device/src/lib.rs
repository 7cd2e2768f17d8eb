/// MIDI port abstraction and platform-specific backends.
///
/// Input and output ports are enumerated and opened by index, and a virtual
/// output port can be created under an arbitrary name; each OS gets its own
/// `platform/` module behind a common set of free functions.
pub mod platform;

/// A physical or virtual MIDI input: something that produces raw MIDI bytes.
pub trait MidiInput: Send + Sync {
    fn device_name(&self) -> &str;

    /// Non-blocking poll. Returns `None` if nothing is pending.
    fn recv(&self) -> Option<Vec<u8>>;

    fn close(&mut self) -> anyhow::Result<()>;
}

/// A physical or virtual MIDI output: something that accepts raw MIDI bytes.
pub trait MidiOutput: Send + Sync {
    fn device_name(&self) -> &str;

    fn send(&self, data: &[u8]) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()>;

    /// All Sound Off (CC 120) + All Notes Off (CC 123) on every channel.
    fn send_all_off(&self) -> anyhow::Result<()> {
        for ch in 0u8..16 {
            let status = 0xB0 | ch;
            self.send(&[status, 120, 0])?;
            self.send(&[status, 123, 0])?;
        }
        Ok(())
    }
}

/// List the names of available physical MIDI input devices, in the index
/// order `open_input` expects.
pub fn list_inputs() -> anyhow::Result<Vec<String>> {
    platform::list_inputs()
}

/// List the names of available physical MIDI output devices, in the index
/// order `open_output` expects.
pub fn list_outputs() -> anyhow::Result<Vec<String>> {
    platform::list_outputs()
}

/// Open a physical input device by its index in `list_inputs()`'s ordering.
pub fn open_input(index: usize) -> anyhow::Result<Box<dyn MidiInput>> {
    platform::open_input(index)
}

/// Open a physical output device by its index in `list_outputs()`'s ordering.
pub fn open_output(index: usize) -> anyhow::Result<Box<dyn MidiOutput>> {
    platform::open_output(index)
}

/// Create a new virtual MIDI output port visible to other applications under
/// `name`.
pub fn create_virtual_output(name: &str) -> anyhow::Result<Box<dyn MidiOutput>> {
    platform::create_virtual_output(name)
}
