// Vime Daemon
// System-wide Vietnamese input method for Wayland: grabs the keyboards,
// transforms keystrokes and injects the result through a virtual device

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use vime_core::{
    AppStateFile, DeviceGrab, Engine, FfiEngine, Injector, KeyboardHook, PassthroughEngine,
    Processor, Settings, SystemClipboard, VirtualKeyboard, WaylandFocus, WindowContextProvider,
};

/// System-wide Vietnamese input method for Wayland
#[derive(Parser, Debug)]
#[command(name = "vime")]
#[command(version)]
#[command(about = "System-wide Vietnamese input method for Wayland", long_about = None)]
struct Args {
    /// TOML configuration file (default: ~/.config/vime/config.toml)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Keyboard devices to grab, by path or name (repeatable)
    #[arg(short, long, value_name = "DEVICE")]
    devices: Vec<String>,

    /// Transform engine library, overriding the configured one
    #[arg(short, long, value_name = "LIBRARY")]
    engine: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// List available keyboard devices
    #[arg(long)]
    list_devices: bool,
}

/// Everything the daemon needs to run.
struct Application {
    settings: Settings,
    state_path: PathBuf,
    args: Args,
    /// Cleared by the signal handler to stop the event loop.
    running: Arc<AtomicBool>,
}

impl Application {
    fn new(args: Args) -> Result<Self> {
        let config_path = match &args.config {
            Some(path) => path.clone(),
            None => Settings::default_path()?,
        };
        let mut settings = Settings::load_or_create(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        info!("Configuration: {}", config_path.display());

        // Per-app state overrides any [apps] entries seeded in the config
        let state_path = config_path.with_file_name("state.toml");
        match AppStateFile::load(&state_path) {
            Ok(state) => settings.apps.merge(&state.apps),
            Err(err) => warn!("Ignoring unreadable state file: {err}"),
        }

        Ok(Self {
            settings,
            state_path,
            args,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    fn list_devices() -> Result<()> {
        let devices = DeviceGrab::list_devices().context("Failed to enumerate input devices")?;
        println!("Found {} keyboard device(s):", devices.len());
        for device in &devices {
            match &device.path {
                Some(path) => println!("  {}: {} ({})", device.index, device.name, path),
                None => println!("  {}: {}", device.index, device.name),
            }
        }
        Ok(())
    }

    /// Load the engine library, falling back to passthrough so a broken
    /// library never leaves the keyboard grabbed and dead.
    fn build_engine(&self) -> Box<dyn Engine> {
        let library = self
            .args
            .engine
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.settings.engine.library));
        match FfiEngine::load(&library) {
            Ok(engine) => {
                info!("Loaded transform engine {}", library.display());
                Box::new(engine)
            }
            Err(err) => {
                warn!("{err}; keystrokes will pass through untransformed");
                Box::new(PassthroughEngine::new())
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        let engine = self.build_engine();

        let keyboard = VirtualKeyboard::new().context("Failed to create the virtual keyboard")?;
        let clipboard = SystemClipboard::new().context("Failed to open the clipboard")?;
        let injector = Injector::new(
            Box::new(keyboard),
            Box::new(clipboard),
            self.settings.injection.to_config(),
        );

        let mut window = WaylandFocus::new();
        if let Err(err) = window.connect() {
            warn!("Focus tracking unavailable: {err}");
        }

        let processor = Processor::new(engine, injector, Box::new(window), &self.settings);
        let mut hook = KeyboardHook::new(processor, self.settings.general.toggle_hotkey);

        let device_filter = if self.args.devices.is_empty() {
            self.settings.general.devices.clone()
        } else {
            self.args.devices.clone()
        };
        hook.start(&device_filter)
            .context("Failed to grab keyboard devices")?;

        self.install_signal_handler();
        println!("vime is running. Press Ctrl+C to exit.");

        let result = self.event_loop(&mut hook);

        hook.stop();
        let processor = hook.handler_mut();
        processor.remember_current_app();
        processor.release_all();

        let state = AppStateFile {
            apps: processor.registry().clone(),
        };
        match state.save(&self.state_path) {
            Ok(()) => info!("Saved per-app state to {}", self.state_path.display()),
            Err(err) => warn!("Could not save per-app state: {err}"),
        }

        result
    }

    fn install_signal_handler(&self) {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let running = Arc::clone(&self.running);
        std::thread::spawn(move || {
            let Ok(mut signals) = Signals::new([SIGINT, SIGTERM]) else {
                warn!("Signal handler unavailable; Ctrl+C will not shut down cleanly");
                return;
            };
            if signals.forever().next().is_some() {
                info!("Shutdown signal received");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    fn event_loop(&self, hook: &mut KeyboardHook<Processor>) -> Result<()> {
        while self.running.load(Ordering::SeqCst) {
            match hook.poll(100) {
                Ok(events) => {
                    for event in events {
                        hook.process(&event);
                    }
                }
                Err(err) => {
                    warn!("Event poll failed: {err}");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
        Ok(())
    }
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Settings::default_path()?,
    };
    Settings::from_file(&path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    println!("Configuration is valid: {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if args.list_devices {
        return Application::list_devices();
    }
    if args.check_config {
        return check_config(args.config.as_deref());
    }

    let mut app = Application::new(args)?;
    app.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["vime"]);
        assert!(args.config.is_none());
        assert!(args.devices.is_empty());
        assert!(args.engine.is_none());
        assert!(!args.debug);
        assert!(!args.check_config);
        assert!(!args.list_devices);
    }

    #[test]
    fn test_args_with_options() {
        let args = Args::parse_from([
            "vime",
            "--config",
            "/tmp/vime.toml",
            "--debug",
            "--devices",
            "/dev/input/event0",
            "--devices",
            "AT Translated Set 2 keyboard",
            "--engine",
            "/usr/lib/libvime_engine.so",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/vime.toml")));
        assert!(args.debug);
        assert_eq!(args.devices.len(), 2);
        assert_eq!(args.devices[1], "AT Translated Set 2 keyboard");
        assert_eq!(args.engine, Some(PathBuf::from("/usr/lib/libvime_engine.so")));
    }

    #[test]
    fn test_args_short_flags() {
        let args = Args::parse_from(["vime", "-c", "/tmp/a.toml", "-d", "kbd", "-e", "lib.so"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/a.toml")));
        assert_eq!(args.devices, vec!["kbd".to_string()]);
        assert_eq!(args.engine, Some(PathBuf::from("lib.so")));
    }

    #[test]
    fn test_args_list_devices() {
        let args = Args::parse_from(["vime", "--list-devices"]);
        assert!(args.list_devices);
    }
}
