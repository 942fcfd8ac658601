pub mod backends;

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::model::{Direction, KeyState};

/// OS-level input emission for the four arrow keys and relative pointer motion.
///
/// Implementations must deliver each event as its own discrete group (a sync
/// marker or flush after every event).
pub trait InputInjector {
    fn key(&mut self, direction: Direction, state: KeyState) -> Result<()>;

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()>;

    /// Down, hold for `hold`, up.
    fn press_key(&mut self, direction: Direction, hold: Duration) -> Result<()> {
        self.key(direction, KeyState::Pressed)?;
        std::thread::sleep(hold);
        self.key(direction, KeyState::Released)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedEvent {
    Key {
        direction: Direction,
        state: KeyState,
    },
    Hold(Duration),
    Motion {
        dx: i32,
        dy: i32,
    },
}

/// Records what would have been sent, without touching any device or sleeping.
#[derive(Debug, Clone, Default)]
pub struct NullInjector {
    events: Vec<InjectedEvent>,
}

impl NullInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[InjectedEvent] {
        &self.events
    }

    /// Number of completed down/up cycles.
    pub fn presses(&self) -> usize {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    InjectedEvent::Key {
                        state: KeyState::Released,
                        ..
                    }
                )
            })
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl InputInjector for NullInjector {
    fn key(&mut self, direction: Direction, state: KeyState) -> Result<()> {
        self.events.push(InjectedEvent::Key { direction, state });
        Ok(())
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.events.push(InjectedEvent::Motion { dx, dy });
        Ok(())
    }

    fn press_key(&mut self, direction: Direction, hold: Duration) -> Result<()> {
        self.key(direction, KeyState::Pressed)?;
        self.events.push(InjectedEvent::Hold(hold));
        self.key(direction, KeyState::Released)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorBackend {
    Auto,
    Uinput,
    X11,
}

/// What backend auto-detection looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectorEnvironment {
    pub uinput_present: bool,
    pub display: Option<String>,
    pub xdg_session_type: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl InjectorEnvironment {
    pub fn detect() -> Self {
        Self {
            uinput_present: Path::new(backends::UINPUT_PATH).exists(),
            display: non_empty_var("DISPLAY"),
            xdg_session_type: non_empty_var("XDG_SESSION_TYPE"),
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();

        if self.uinput_present {
            parts.push(format!("{} exists", backends::UINPUT_PATH));
        }
        if let Some(display) = &self.display {
            parts.push(format!("DISPLAY={display}"));
        }
        if let Some(session) = &self.xdg_session_type {
            parts.push(format!("XDG_SESSION_TYPE={session}"));
        }

        if parts.is_empty() {
            format!(
                "No input backend detected ({} is missing and DISPLAY is not set).",
                backends::UINPUT_PATH
            )
        } else {
            format!("Detected environment: {}", parts.join(", "))
        }
    }
}

fn auto_backend(env: &InjectorEnvironment) -> InjectorBackend {
    // Prefer uinput: its events pass through the kernel like a physical keyboard.
    if env.uinput_present {
        if cfg!(feature = "uinput") {
            return InjectorBackend::Uinput;
        }
        if cfg!(feature = "x11") && env.display.is_some() {
            return InjectorBackend::X11;
        }
        return InjectorBackend::Uinput;
    }

    if env.display.is_some() {
        return InjectorBackend::X11;
    }

    InjectorBackend::Auto
}

fn require_supported_backend(
    #[allow(unused_variables)] selected: InjectorBackend,
    resolved: InjectorBackend,
    env: &InjectorEnvironment,
) -> Result<()> {
    #[allow(unused_variables)]
    let how = match selected {
        InjectorBackend::Auto => "detected",
        _ => "requested",
    };

    match resolved {
        InjectorBackend::Uinput => {
            #[cfg(feature = "uinput")]
            {
                Ok(())
            }

            #[cfg(not(feature = "uinput"))]
            {
                Err(anyhow!(
                    "uinput backend {how} but is disabled in this build. (Rebuild with `--features uinput`.) {details}",
                    details = env.describe()
                ))
            }
        }
        InjectorBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(())
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.) {details}",
                    details = env.describe()
                ))
            }
        }
        InjectorBackend::Auto => {
            let mut forced = Vec::new();
            if cfg!(feature = "uinput") {
                forced.push("--backend uinput");
            }
            if cfg!(feature = "x11") {
                forced.push("--backend x11");
            }
            let hint = if forced.is_empty() {
                "This build has no input backends enabled."
            } else {
                "Load the uinput module (`sudo modprobe uinput`) or force a backend:"
            };

            Err(anyhow!(
                "No supported input backend detected. {details}\n{hint} {}",
                forced.join(" or "),
                details = env.describe(),
            ))
        }
    }
}

pub fn resolve_backend_in(
    requested: InjectorBackend,
    env: &InjectorEnvironment,
) -> Result<InjectorBackend> {
    let resolved = match requested {
        InjectorBackend::Auto => auto_backend(env),
        other => other,
    };

    require_supported_backend(requested, resolved, env)?;
    Ok(resolved)
}

pub fn resolve_backend(requested: InjectorBackend) -> Result<InjectorBackend> {
    resolve_backend_in(requested, &InjectorEnvironment::detect())
}

/// Opens the input device for `requested`. Failure here is fatal for the process.
pub fn open_injector<R: Rng + ?Sized>(
    requested: InjectorBackend,
    #[allow(unused_variables)] rng: &mut R,
) -> Result<Box<dyn InputInjector>> {
    let backend = resolve_backend(requested)?;
    log::info!("using {backend:?} input backend");

    match backend {
        InjectorBackend::Uinput => {
            #[cfg(feature = "uinput")]
            {
                let device = backends::uinput::UinputInjector::open(rng)?;
                Ok(Box::new(device))
            }

            #[cfg(not(feature = "uinput"))]
            {
                Err(anyhow!(
                    "uinput backend is disabled in this build (rebuild with `--features uinput`)."
                ))
            }
        }
        InjectorBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                let injector = backends::x11::XtestInjector::connect()?;
                Ok(Box::new(injector))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        InjectorBackend::Auto => Err(anyhow!("no input backend resolved")),
    }
}
