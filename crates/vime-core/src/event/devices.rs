// Vime Device Grab
// Direct evdev access: keyboard autodetection, exclusive grab, poll loop

use evdev::{Device, EventType, InputEvent, Key};
use std::os::unix::io::AsRawFd;

use crate::output::VIRT_DEVICE_PREFIX;

/// Result type for device operations
pub type EventResult<T> = Result<T, EventError>;

/// Errors from device enumeration, grabbing, or polling
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device information for listing devices
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device index
    pub index: usize,
    /// Device name
    pub name: String,
    /// Device path (if available)
    pub path: Option<String>,
}

/// Input event annotated with source device metadata.
///
/// The device name travels with every event so the hook can recognize
/// events originating from the virtual output device.
#[derive(Debug, Clone)]
pub struct PolledEvent {
    /// Raw evdev input event
    pub event: InputEvent,
    /// Source device name
    pub device_name: String,
}

/// Check whether a device name marks one of our own virtual devices.
pub fn is_virtual_device(name: &str) -> bool {
    name.contains(VIRT_DEVICE_PREFIX)
}

/// Device selection logic.
///
/// With explicit filter entries, devices match by exact path or name only.
/// Without them, autodetection takes every keyboard that is not one of our
/// own virtual devices.
pub fn matches_device_filter(
    device_name: &str,
    device_path: &str,
    filter_names: &[String],
    is_keyboard: bool,
    is_virtual: bool,
) -> bool {
    if !filter_names.is_empty() {
        return filter_names
            .iter()
            .any(|entry| device_path == entry || device_name == entry);
    }
    if is_virtual {
        return false;
    }
    is_keyboard
}

/// Exclusive grab over the machine's keyboard devices.
///
/// Grabbing diverts the devices' events to this process; nothing reaches
/// other applications except what the virtual output device emits. Devices
/// MUST be released again on every exit path or the keyboard is left dead,
/// so `Drop` ungrabs unconditionally.
pub struct DeviceGrab {
    devices: Vec<Device>,
    poll_fds: Vec<libc::pollfd>,
    grabbed: bool,
}

impl DeviceGrab {
    /// Open matching keyboard devices without grabbing (diagnostics, tests).
    pub fn open(filter_names: &[String]) -> EventResult<Self> {
        let devices = Self::find_keyboards(filter_names)?;
        let poll_fds = Self::create_poll_fds(&devices);
        Ok(Self {
            devices,
            poll_fds,
            grabbed: false,
        })
    }

    /// Open matching keyboard devices and grab them exclusively.
    pub fn grab(filter_names: &[String]) -> EventResult<Self> {
        let mut devices = Self::find_keyboards(filter_names)?;

        // A previous instance may have died while holding the grab; ungrab
        // first so we start from a clean state.
        for device in &mut devices {
            let _ = device.ungrab();
        }

        for device in &mut devices {
            device.grab()?;
        }

        let poll_fds = Self::create_poll_fds(&devices);
        Ok(Self {
            devices,
            poll_fds,
            grabbed: true,
        })
    }

    fn create_poll_fds(devices: &[Device]) -> Vec<libc::pollfd> {
        devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect()
    }

    /// Release all devices (called on shutdown). Idempotent.
    pub fn ungrab_all(&mut self) {
        if self.grabbed {
            for device in &mut self.devices {
                let _ = device.ungrab();
            }
            self.grabbed = false;
        }
    }

    /// List all available keyboard devices, for the --list-devices flag.
    pub fn list_devices() -> EventResult<Vec<DeviceInfo>> {
        let mut devices_info = Vec::new();
        let mut index = 0;

        for (path, device) in evdev::enumerate() {
            if Self::is_keyboard_device(&device) {
                let name = device.name().unwrap_or("Unknown").to_string();
                let device_path = path.to_str().map(|s| s.to_string());
                devices_info.push(DeviceInfo {
                    index,
                    name,
                    path: device_path,
                });
                index += 1;
            }
        }

        if devices_info.is_empty() {
            return Err(EventError::DeviceNotFound(
                "No keyboard devices found".to_string(),
            ));
        }

        Ok(devices_info)
    }

    fn find_keyboards(filter_names: &[String]) -> EventResult<Vec<Device>> {
        let mut keyboards = Vec::new();

        for (path, device) in evdev::enumerate() {
            let device_name = device.name().unwrap_or("Unknown");
            let device_path = path.to_str().unwrap_or_default();
            let is_keyboard = Self::is_keyboard_device(&device);
            let is_virtual = is_virtual_device(device_name);

            if matches_device_filter(device_name, device_path, filter_names, is_keyboard, is_virtual)
            {
                keyboards.push(device);
            }
        }

        if keyboards.is_empty() {
            return Err(EventError::DeviceNotFound(
                "No keyboard devices found".to_string(),
            ));
        }

        Ok(keyboards)
    }

    /// Check if a device looks like a real keyboard.
    fn is_keyboard_device(device: &Device) -> bool {
        if !device.supported_events().contains(EventType::KEY) {
            return false;
        }

        // Never treat our own virtual device as a keyboard to grab
        let device_name = device.name().unwrap_or("");
        if is_virtual_device(device_name) {
            return false;
        }

        let keys = match device.supported_keys() {
            Some(k) => k,
            None => return false,
        };

        // QWERTY row plus A/Z/SPACE is a good signature for a full keyboard
        const QWERTY_CODES: &[u16] = &[16, 17, 18, 19, 20, 21];
        const A_Z_SPACE_CODES: &[u16] = &[57, 30, 44];

        let qwerty_present = QWERTY_CODES
            .iter()
            .all(|code| keys.contains(Key::new(*code)));
        let az_present = A_Z_SPACE_CODES
            .iter()
            .all(|code| keys.contains(Key::new(*code)));

        qwerty_present && az_present
    }

    /// Poll for events across all devices.
    ///
    /// # Arguments
    /// * `timeout_ms` - Timeout in milliseconds (0 = non-blocking, -1 = infinite)
    ///
    /// Returns an empty vector on timeout or EINTR; the caller checks its
    /// running flag each tick. Errors are reserved for fatal I/O failures.
    pub fn poll(&mut self, timeout_ms: i32) -> EventResult<Vec<PolledEvent>> {
        let mut events = Vec::new();

        let poll_result = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if poll_result < 0 {
            let err = std::io::Error::last_os_error();
            // EINTR just means a signal arrived (e.g. Ctrl+C); treat it like
            // a timeout and let the caller notice the shutdown flag.
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(events);
            }
            return Err(EventError::Io(err));
        }

        if poll_result == 0 {
            return Ok(events);
        }

        for (i, device) in self.devices.iter_mut().enumerate() {
            if self.poll_fds[i].revents & libc::POLLIN != 0 {
                let device_name = device.name().unwrap_or("Unknown").to_string();
                if let Ok(device_events) = device.fetch_events() {
                    for event in device_events {
                        events.push(PolledEvent {
                            event,
                            device_name: device_name.clone(),
                        });
                    }
                }
            }
        }

        Ok(events)
    }

    /// Get the names of all managed devices
    pub fn device_names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|d| d.name().unwrap_or("Unknown").to_string())
            .collect()
    }

    /// Get number of devices managed by this grab
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Drop for DeviceGrab {
    fn drop(&mut self) {
        // Runs during normal return, early return, panic, and explicit exit.
        self.ungrab_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_path() {
        let filter = vec!["/dev/input/event0".to_string()];
        assert!(matches_device_filter(
            "Logitech Keyboard",
            "/dev/input/event0",
            &filter,
            true,
            false
        ));
    }

    #[test]
    fn test_matches_by_name() {
        let filter = vec!["Logitech Keyboard".to_string()];
        assert!(matches_device_filter(
            "Logitech Keyboard",
            "/dev/input/event5",
            &filter,
            true,
            false
        ));
    }

    #[test]
    fn test_no_match_when_filtered() {
        let filter = vec!["Specific Device".to_string()];
        assert!(!matches_device_filter(
            "Other Device",
            "/dev/input/event1",
            &filter,
            true,
            false
        ));
    }

    #[test]
    fn test_autodetect_takes_keyboards_only() {
        assert!(matches_device_filter(
            "Generic Keyboard",
            "/dev/input/event0",
            &[],
            true,
            false
        ));
        assert!(!matches_device_filter(
            "Generic Mouse",
            "/dev/input/event1",
            &[],
            false,
            false
        ));
    }

    #[test]
    fn test_autodetect_excludes_own_virtual_device() {
        assert!(!matches_device_filter(
            "Vime (virtual) keyboard",
            "/dev/input/event2",
            &[],
            true,
            true
        ));
    }

    #[test]
    fn test_explicit_match_includes_virtual() {
        // An exact name match wins even for a virtual device
        let filter = vec!["Vime (virtual) keyboard".to_string()];
        assert!(matches_device_filter(
            "Vime (virtual) keyboard",
            "/dev/input/event2",
            &filter,
            true,
            true
        ));
    }

    #[test]
    fn test_is_virtual_device() {
        assert!(is_virtual_device("Vime (virtual) keyboard"));
        assert!(!is_virtual_device("Logitech USB Keyboard"));
    }

    #[test]
    fn test_open_skips_without_hardware() {
        // Only asserts behavior when real keyboards are present
        match DeviceGrab::open(&[]) {
            Ok(grab) => {
                assert!(grab.device_count() > 0);
                assert!(!grab.grabbed);
            }
            Err(EventError::DeviceNotFound(_)) => {
                println!("Skipping test: no keyboard devices found");
            }
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    #[test]
    fn test_poll_timeout() {
        match DeviceGrab::open(&[]) {
            Ok(mut grab) => {
                let events = grab.poll(10).expect("poll failed");
                // Nothing typed within 10ms of a test run, usually
                let _ = events;
            }
            Err(EventError::DeviceNotFound(_)) => {
                println!("Skipping test: no keyboard devices found");
            }
            Err(_) => {}
        }
    }
}
