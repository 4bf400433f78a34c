// Vime Output Layer
// Virtual keyboard device and synthetic key emission

mod uinput;

pub use uinput::{UInputError, VirtualKeyboard, VIRT_DEVICE_PREFIX};
