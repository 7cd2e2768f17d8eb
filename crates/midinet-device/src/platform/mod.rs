#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::{create_virtual_output, list_inputs, list_outputs, open_input, open_output};

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::{create_virtual_output, list_inputs, list_outputs, open_input, open_output};

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use windows::{create_virtual_output, list_inputs, list_outputs, open_input, open_output};

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod stub;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub use stub::{create_virtual_output, list_inputs, list_outputs, open_input, open_output};
