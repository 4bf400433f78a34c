// Vime Wayland Focus Tracking
// Follows toplevel activation over wlr-foreign-toplevel-management-unstable-v1
// so the processor can key per-application behavior off the focused app

use std::collections::HashMap;
use std::env;
use std::fs;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use parking_lot::Mutex;
use wayland_backend::rs::client::ObjectId;
use wayland_client::{
    event_created_child,
    globals::{registry_queue_init, GlobalListContents},
    protocol::wl_registry,
    Connection, Dispatch, Proxy, QueueHandle,
};
use wayland_protocols_wlr::foreign_toplevel::v1::client::{
    zwlr_foreign_toplevel_handle_v1, zwlr_foreign_toplevel_manager_v1,
};

use super::provider::{FocusedWindow, WindowContextProvider, WindowError};

/// zwlr_foreign_toplevel_handle_v1.state value for an activated toplevel
const STATE_ACTIVATED: u32 = 2;

/// Per-toplevel bookkeeping while the surface is alive
#[derive(Debug, Clone, Default)]
struct Toplevel {
    app_id: String,
    title: String,
    activated: bool,
}

impl Toplevel {
    /// Snapshot form. The protocol reports missing details as empty strings.
    fn focus(&self) -> FocusedWindow {
        FocusedWindow {
            app_id: (!self.app_id.is_empty()).then(|| self.app_id.clone()),
            title: (!self.title.is_empty()).then(|| self.title.clone()),
        }
    }
}

/// Dispatch state for the watcher thread: every live toplevel plus the
/// shared snapshot of whichever one is focused.
struct FocusState {
    toplevels: HashMap<ObjectId, Toplevel>,
    active: Option<ObjectId>,
    snapshot: Arc<Mutex<FocusedWindow>>,
}

impl FocusState {
    fn new(snapshot: Arc<Mutex<FocusedWindow>>) -> Self {
        Self {
            toplevels: HashMap::new(),
            active: None,
            snapshot,
        }
    }

    fn refresh_snapshot(&self) {
        if let Some(active) = &self.active {
            if let Some(top) = self.toplevels.get(active) {
                let focus = top.focus();
                debug!("Focused app: {:?}", focus.app_id);
                *self.snapshot.lock() = focus;
            }
        }
    }

    fn clear_active(&mut self) {
        self.active = None;
        *self.snapshot.lock() = FocusedWindow::default();
    }
}

/// The state event carries packed native-endian u32 values.
fn is_activated(raw: &[u8]) -> bool {
    raw.chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .any(|value| value == STATE_ACTIVATED)
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for FocusState {
    fn event(
        _state: &mut Self,
        _registry: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _globals: &GlobalListContents,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1, ()> for FocusState {
    fn event(
        state: &mut Self,
        _manager: &zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1,
        event: zwlr_foreign_toplevel_manager_v1::Event,
        _: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_foreign_toplevel_manager_v1::Event::Toplevel { toplevel } => {
                state.toplevels.insert(toplevel.id(), Toplevel::default());
            }
            zwlr_foreign_toplevel_manager_v1::Event::Finished => {}
            _ => {}
        }
    }

    event_created_child!(FocusState, zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1, [
        zwlr_foreign_toplevel_manager_v1::EVT_TOPLEVEL_OPCODE => (zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1, ())
    ]);
}

impl Dispatch<zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1, ()> for FocusState {
    fn event(
        state: &mut Self,
        handle: &zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1,
        event: zwlr_foreign_toplevel_handle_v1::Event,
        _: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_foreign_toplevel_handle_v1::Event::Title { title } => {
                let id = handle.id();
                if let Some(top) = state.toplevels.get_mut(&id) {
                    top.title = title;
                    if state.active.as_ref() == Some(&id) {
                        state.refresh_snapshot();
                    }
                }
            }
            zwlr_foreign_toplevel_handle_v1::Event::AppId { app_id } => {
                let id = handle.id();
                if let Some(top) = state.toplevels.get_mut(&id) {
                    top.app_id = app_id;
                    if state.active.as_ref() == Some(&id) {
                        state.refresh_snapshot();
                    }
                }
            }
            zwlr_foreign_toplevel_handle_v1::Event::State { state: raw } => {
                let id = handle.id();
                let activated = is_activated(&raw);
                if let Some(top) = state.toplevels.get_mut(&id) {
                    top.activated = activated;
                    if activated {
                        state.active = Some(id);
                        state.refresh_snapshot();
                    } else if state.active.as_ref() == Some(&id) {
                        state.clear_active();
                    }
                }
            }
            zwlr_foreign_toplevel_handle_v1::Event::Closed => {
                let id = handle.id();
                if state.toplevels.remove(&id).is_some() && state.active.as_ref() == Some(&id) {
                    state.clear_active();
                }
                handle.destroy();
            }
            zwlr_foreign_toplevel_handle_v1::Event::Done => {}
            zwlr_foreign_toplevel_handle_v1::Event::Parent { .. } => {}
            _ => {}
        }
    }
}

fn display_ordinal(name: &str) -> Option<u32> {
    let suffix = name.strip_prefix("wayland-")?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Socket paths to try, in order. `WAYLAND_DISPLAY` wins when set (absolute,
/// or relative to the runtime dir), then any `wayland-N` sockets discovered
/// under the runtime dir, newest display first. Discovery matters because
/// the daemon usually runs as root with the compositor's environment absent.
fn candidate_sockets(runtime_dir: Option<&Path>, env_display: Option<&str>) -> Vec<PathBuf> {
    let mut sockets = Vec::new();

    if let Some(display) = env_display.filter(|name| !name.trim().is_empty()) {
        if Path::new(display).is_absolute() {
            sockets.push(PathBuf::from(display));
        } else if let Some(dir) = runtime_dir {
            sockets.push(dir.join(display));
        }
    }

    if let Some(dir) = runtime_dir {
        let mut discovered: Vec<(u32, PathBuf)> = Vec::new();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(ordinal) = display_ordinal(name) {
                        discovered.push((ordinal, entry.path()));
                    }
                }
            }
        }
        discovered.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in discovered {
            if !sockets.contains(&path) {
                sockets.push(path);
            }
        }
    }

    sockets
}

/// Focused-window tracking for wlroots compositors.
///
/// A background thread follows toplevel activation events and maintains a
/// snapshot the processor reads between keystrokes.
pub struct WaylandFocus {
    snapshot: Arc<Mutex<FocusedWindow>>,
    connected: Arc<AtomicBool>,
    watcher: Option<thread::JoinHandle<()>>,
}

impl WaylandFocus {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(FocusedWindow::default())),
            connected: Arc::new(AtomicBool::new(false)),
            watcher: None,
        }
    }

    fn connect_via(&mut self, sockets: &[PathBuf]) -> Result<(), WindowError> {
        let mut connection = None;
        for path in sockets {
            match UnixStream::connect(path) {
                Ok(stream) => match Connection::from_socket(stream) {
                    Ok(conn) => {
                        info!("Window context: connected to {}", path.display());
                        connection = Some(conn);
                        break;
                    }
                    Err(err) => debug!("Window context: {} rejected: {}", path.display(), err),
                },
                Err(err) => debug!("Window context: cannot open {}: {}", path.display(), err),
            }
        }
        let Some(connection) = connection else {
            return Err(WindowError::ConnectionFailed(
                "no reachable wayland socket".to_string(),
            ));
        };

        let (globals, mut event_queue) = registry_queue_init::<FocusState>(&connection)
            .map_err(|err| WindowError::ConnectionFailed(err.to_string()))?;
        let qhandle = event_queue.handle();

        let _manager = globals
            .bind::<zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1, _, _>(
                &qhandle,
                1..=3,
                (),
            )
            .map_err(|err| {
                WindowError::ConnectionFailed(format!(
                    "foreign-toplevel protocol unavailable: {err}"
                ))
            })?;

        let mut state = FocusState::new(self.snapshot.clone());
        let connected = self.connected.clone();
        let snapshot = self.snapshot.clone();
        connected.store(true, Ordering::SeqCst);

        let watcher = thread::Builder::new()
            .name("vime-focus".to_string())
            .spawn(move || {
                let _ = event_queue.roundtrip(&mut state);
                while event_queue.blocking_dispatch(&mut state).is_ok() {}
                warn!("Window context: compositor connection closed");
                connected.store(false, Ordering::SeqCst);
                *snapshot.lock() = FocusedWindow::default();
            })
            .map_err(|err| {
                self.connected.store(false, Ordering::SeqCst);
                WindowError::ConnectionFailed(format!("watcher thread: {err}"))
            })?;

        self.watcher = Some(watcher);
        Ok(())
    }
}

impl Default for WaylandFocus {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowContextProvider for WaylandFocus {
    fn connect(&mut self) -> Result<(), WindowError> {
        if self.is_connected() {
            return Ok(());
        }
        let runtime_dir = env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from);
        let env_display = env::var("WAYLAND_DISPLAY").ok();
        let sockets = candidate_sockets(runtime_dir.as_deref(), env_display.as_deref());
        if sockets.is_empty() {
            return Err(WindowError::ConnectionFailed(
                "no wayland socket candidates (XDG_RUNTIME_DIR and WAYLAND_DISPLAY unset)"
                    .to_string(),
            ));
        }
        self.connect_via(&sockets)
    }

    // The watcher thread only exits when the compositor connection drops;
    // from here on its snapshot is simply no longer read.
    fn disconnect(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.watcher.take();
        *self.snapshot.lock() = FocusedWindow::default();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn focused_window(&self) -> Result<FocusedWindow, WindowError> {
        if !self.is_connected() {
            return Err(WindowError::NotConnected);
        }
        Ok(self.snapshot.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_states(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn test_is_activated() {
        assert!(is_activated(&raw_states(&[STATE_ACTIVATED])));
        assert!(is_activated(&raw_states(&[0, 2, 3])));
        assert!(!is_activated(&raw_states(&[0, 1, 3])));
        assert!(!is_activated(&raw_states(&[])));
    }

    #[test]
    fn test_toplevel_focus_maps_empty_to_unknown() {
        let top = Toplevel::default();
        assert_eq!(top.focus(), FocusedWindow::default());

        let top = Toplevel {
            app_id: "kitty".to_string(),
            title: String::new(),
            activated: true,
        };
        let focus = top.focus();
        assert_eq!(focus.app_id, Some("kitty".to_string()));
        assert_eq!(focus.title, None);
    }

    #[test]
    fn test_display_ordinal() {
        assert_eq!(display_ordinal("wayland-0"), Some(0));
        assert_eq!(display_ordinal("wayland-12"), Some(12));
        assert_eq!(display_ordinal("wayland-1.lock"), None);
        assert_eq!(display_ordinal("wayland-1-awww-daemon..sock"), None);
        assert_eq!(display_ordinal("not-wayland-1"), None);
        assert_eq!(display_ordinal("wayland-"), None);
    }

    #[test]
    fn test_candidate_sockets_env_display_first() {
        let tmp = std::env::temp_dir().join(format!("vime-focus-sockets-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("wayland-0"), b"").unwrap();
        fs::write(tmp.join("wayland-2"), b"").unwrap();
        fs::write(tmp.join("wayland-2.lock"), b"").unwrap();
        fs::write(tmp.join("wayland-abc"), b"").unwrap();
        fs::write(tmp.join("not-wayland"), b"").unwrap();

        let sockets = candidate_sockets(Some(&tmp), Some("wayland-0"));
        assert_eq!(sockets, vec![tmp.join("wayland-0"), tmp.join("wayland-2")]);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_candidate_sockets_absolute_display() {
        let sockets = candidate_sockets(None, Some("/run/user/1000/wayland-7"));
        assert_eq!(sockets, vec![PathBuf::from("/run/user/1000/wayland-7")]);
    }

    #[test]
    fn test_candidate_sockets_nothing_known() {
        assert!(candidate_sockets(None, None).is_empty());
        assert!(candidate_sockets(None, Some("  ")).is_empty());
        assert!(candidate_sockets(None, Some("wayland-1")).is_empty());
    }

    #[test]
    fn test_focused_window_requires_connection() {
        let focus = WaylandFocus::new();
        assert!(!focus.is_connected());
        assert_eq!(focus.focused_window(), Err(WindowError::NotConnected));
    }

    #[test]
    fn test_snapshot_read_and_disconnect() {
        let mut focus = WaylandFocus::new();
        focus.connected.store(true, Ordering::SeqCst);
        *focus.snapshot.lock() =
            FocusedWindow::with_details(Some("Kitty".to_string()), Some("~".to_string()));

        let current = focus.focused_window().unwrap();
        assert_eq!(current.app_key(), Some("kitty".to_string()));

        focus.disconnect();
        assert_eq!(focus.focused_window(), Err(WindowError::NotConnected));
        assert_eq!(*focus.snapshot.lock(), FocusedWindow::default());
    }

    #[test]
    fn test_connect_via_unreachable_socket() {
        let mut focus = WaylandFocus::new();
        let missing = std::env::temp_dir().join("vime-no-such-wayland-socket");
        let result = focus.connect_via(&[missing]);
        assert!(matches!(result, Err(WindowError::ConnectionFailed(_))));
        assert!(!focus.is_connected());
    }
}
