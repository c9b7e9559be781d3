//! Serial port handling
//!
//! Port enumeration, pendant discovery and low-level port setup.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
#[cfg(target_os = "linux")]
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::ProtocolError;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }

    /// Check whether this port carries the given USB signature
    pub fn matches_usb(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }
}

/// USB signature used to recognise the pendant
#[derive(Debug, Clone)]
pub struct PendantSignature {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// Directory of stable per-device symlinks
    pub by_id_dir: String,
    /// Name prefix of the pendant's symlink in `by_id_dir`
    pub by_id_prefix: String,
}

/// Sort key: (family, numeric suffix, basename)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// Enumerate serial ports, ttyACM first, then ttyUSB, then the rest.
///
/// On Linux, `/dev/ttyACM*` and `/dev/ttyUSB*` nodes that enumeration missed
/// are appended without USB details.
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();

    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        let extra: Vec<PortInfo> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| name.starts_with("ttyACM") || name.starts_with("ttyUSB"))
            .map(|name| PortInfo::bare(format!("/dev/{}", name)))
            .collect();
        ports.extend(extra);
    }

    // Stable sort keeps enumerated entries (with USB ids) ahead of bare duplicates
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports.dedup_by(|later, earlier| later.name == earlier.name);
    ports
}

/// Find the first entry in a by-id directory whose name starts with `prefix`
fn find_by_id(dir: &Path, prefix: &str) -> Option<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    names
        .first()
        .map(|name| dir.join(name).to_string_lossy().into_owned())
}

/// Pick the first port carrying the pendant's USB signature
fn select_by_usb(ports: &[PortInfo], vid: u16, pid: u16) -> Option<String> {
    ports
        .iter()
        .find(|p| p.matches_usb(vid, pid))
        .map(|p| p.name.clone())
}

/// Locate the pendant.
///
/// Stable by-id symlinks are preferred; otherwise enumerated ports are matched
/// on USB vendor/product id.
pub fn discover_pendant(signature: &PendantSignature) -> Option<String> {
    let by_id = Path::new(&signature.by_id_dir);
    if by_id.is_dir() {
        if let Some(found) = find_by_id(by_id, &signature.by_id_prefix) {
            return Some(found);
        }
    }
    select_by_usb(&list_ports(), signature.vid, signature.pid)
}

/// Open a serial port for the pendant link (8N1, no flow control)
pub fn open_port(
    name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let mut port = serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()
        .map_err(|e| match e.kind {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        })?;

    // Teensy USB serial ignores DTR for resets, but keep it asserted so the
    // pendant sees the host as present.
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!(port = name, "failed to set DTR high: {} (continuing)", e);
    }

    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, vid: u16, pid: u16) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: Some(vid),
            pid: Some(pid),
            product: None,
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "/dev/ttyACM10",
        ];
        let mut ports: Vec<PortInfo> = names
            .into_iter()
            .map(|n| PortInfo::bare(n.to_string()))
            .collect();

        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<String> = ports.into_iter().map(|p| p.name).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/someport",
            ]
        );
    }

    #[test]
    fn test_select_by_usb() {
        let ports = vec![
            usb("/dev/ttyACM0", 0x2341, 0x0043),
            usb("/dev/ttyACM1", 0x16c0, 0x0483),
            PortInfo::bare("/dev/ttyS0".to_string()),
        ];
        assert_eq!(
            select_by_usb(&ports, 0x16c0, 0x0483).as_deref(),
            Some("/dev/ttyACM1")
        );
        assert_eq!(select_by_usb(&ports, 0x1234, 0x5678), None);
    }

    #[test]
    fn test_find_by_id_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("usb-Arduino_Uno-if00"), b"").unwrap();
        std::fs::write(dir.path().join("usb-Teensyduino_USB_Serial_123-if00"), b"").unwrap();

        let found = find_by_id(dir.path(), "usb-Teensyduino_USB_Serial_").unwrap();
        assert!(found.ends_with("usb-Teensyduino_USB_Serial_123-if00"));
        assert_eq!(find_by_id(dir.path(), "usb-Nothing"), None);
    }
}
