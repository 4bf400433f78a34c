// Vime Keyboard Hook
// Sole entry point for keyboard activity: owns the device grab, the
// recursion guard and the feedback-loop cutoff

use log::{info, warn};

use crate::action::Action;
use crate::event::{is_virtual_device, DeviceGrab, EventResult, PolledEvent};
use crate::key::{self, Key};
use crate::state::ModifierTracker;
use crate::translate;
use evdev::EventType;

/// One relevant key-down as the processor sees it.
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub caps_lock: bool,
}

/// What became of a grabbed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Re-emitted to the application via the virtual device.
    PassThrough,
    /// Suppressed; its effect was already injected.
    Consumed,
    /// Not a key event; nothing to deliver.
    Dropped,
}

/// The processor as the hook sees it.
pub trait EventHandler {
    /// One relevant key-down. Returns true when the event was handled and
    /// must not reach the application.
    fn on_key(&mut self, event: &KeyEvent) -> bool;

    /// Toggle hotkey fired. Returns the new enabled state, for logging.
    fn on_toggle(&mut self) -> bool;

    /// Word aborted or ended: drop shortcut and engine word state.
    fn clear_buffers(&mut self);

    /// Application chord in flight: drop engine word state only.
    fn clear_engine_buffer(&mut self);

    /// Deliver a grabbed event to the application unchanged.
    fn forward_key(&mut self, code: u16, action: Action);
}

/// Grabs the keyboards and filters every event through a fixed decision
/// ladder; only plain presses of relevant keys ever reach the processor,
/// and everything else is re-emitted in arrival order.
pub struct KeyboardHook<H: EventHandler> {
    handler: H,
    tracker: ModifierTracker,
    grab: Option<DeviceGrab>,
    processing: bool,
    toggle_hotkey: bool,
}

impl<H: EventHandler> KeyboardHook<H> {
    pub fn new(handler: H, toggle_hotkey: bool) -> Self {
        Self {
            handler,
            tracker: ModifierTracker::new(),
            grab: None,
            processing: false,
            toggle_hotkey,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Grab the keyboard devices and start intercepting.
    ///
    /// Failure leaves the hook stopped; the caller reports it and may retry.
    pub fn start(&mut self, device_filter: &[String]) -> EventResult<()> {
        if self.grab.is_some() {
            return Ok(());
        }
        let grab = DeviceGrab::grab(device_filter)?;
        info!(
            "Intercepting {} keyboard device(s): {}",
            grab.device_count(),
            grab.device_names().join(", ")
        );
        self.tracker.reset_held();
        self.grab = Some(grab);
        Ok(())
    }

    /// Release the devices. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut grab) = self.grab.take() {
            grab.ungrab_all();
            info!("Keyboard interception stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.grab.is_some()
    }

    /// Wait up to `timeout_ms` for grabbed events. Empty on timeout.
    pub fn poll(&mut self, timeout_ms: i32) -> EventResult<Vec<PolledEvent>> {
        match &mut self.grab {
            Some(grab) => grab.poll(timeout_ms),
            None => Ok(Vec::new()),
        }
    }

    /// Run one grabbed event through the decision ladder.
    pub fn process(&mut self, polled: &PolledEvent) -> Verdict {
        let raw = &polled.event;
        if raw.event_type() != EventType::KEY {
            return Verdict::Dropped;
        }
        let code = raw.code();
        let Some(action) = Action::from_value(raw.value()) else {
            warn!("Dropping key event with unknown value {}", raw.value());
            return Verdict::Dropped;
        };

        // A synthetic event observed while its own injection is still in
        // progress must never re-enter the pipeline.
        if self.processing {
            return self.pass(code, action);
        }

        // Feedback cutoff: events reporting our own virtual device.
        if is_virtual_device(&polled.device_name) {
            return self.pass(code, action);
        }

        // Modifier bookkeeping happens before any early exit below.
        let state_only = self.tracker.handle(code, action);

        // Releases go through untouched; decisions are made on presses.
        if action.is_released() {
            return self.pass(code, action);
        }

        // A bare Control press is an explicit "abort word" signal.
        if (code == key::LEFT_CTRL || code == key::RIGHT_CTRL) && action.just_pressed() {
            self.handler.clear_buffers();
            return self.pass(code, action);
        }

        if state_only {
            return self.pass(code, action);
        }

        let mods = self.tracker.snapshot();

        // The toggle hotkey (Ctrl+Space) flips the IME and never reaches
        // the application. Repeats are swallowed without re-toggling.
        if self.toggle_hotkey && code == key::SPACE && mods.ctrl && !mods.alt {
            if action.just_pressed() {
                let enabled = self.handler.on_toggle();
                info!("Input method {}", if enabled { "enabled" } else { "disabled" });
            }
            return Verdict::Consumed;
        }

        // Keys outside the relevant set are none of our business.
        if !translate::is_relevant(code) {
            return self.pass(code, action);
        }

        // Application and compositor chords are never intercepted, but
        // they invalidate the word being composed.
        if mods.ctrl || mods.alt || self.tracker.meta() {
            self.handler.clear_engine_buffer();
            return self.pass(code, action);
        }

        // Every word boundary except Space resets engine state and still
        // reaches the application.
        if translate::is_word_boundary(code) && code != key::SPACE {
            self.handler.clear_buffers();
            return self.pass(code, action);
        }

        let event = KeyEvent {
            key: Key::from(code),
            shift: mods.shift,
            ctrl: mods.ctrl,
            alt: mods.alt,
            caps_lock: mods.caps_lock,
        };

        self.processing = true;
        let handled = self.handler.on_key(&event);
        self.processing = false;

        if handled && translate::is_word_boundary(code) && code != key::SPACE {
            self.handler.clear_engine_buffer();
        }

        if handled {
            Verdict::Consumed
        } else {
            self.pass(code, action)
        }
    }

    fn pass(&mut self, code: u16, action: Action) -> Verdict {
        self.handler.forward_key(code, action);
        Verdict::PassThrough
    }
}
