// Vime Window Context
// Focused-application identity for per-app policy switching

mod provider;
mod wayland;

pub use provider::{FocusedWindow, WindowContextProvider, WindowError};
pub use wayland::WaylandFocus;
