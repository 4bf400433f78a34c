// Vime Event Layer
// Grabbed-device enumeration and polling

mod devices;

pub use devices::{
    is_virtual_device, matches_device_filter, DeviceGrab, DeviceInfo, EventError, EventResult,
    PolledEvent,
};
pub use evdev::InputEvent;
