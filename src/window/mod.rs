#[cfg(feature = "x11")]
pub mod x11;

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown";

/// An X11 window id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u32);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

pub trait WindowBridge {
    /// Blocks until the user clicks a window.
    fn select_target_interactively(&mut self) -> Result<WindowHandle>;

    /// Falls back to [`UNKNOWN_TITLE`] when the window has no usable name.
    fn title(&self, target: WindowHandle) -> String;

    /// Unminimize, raise, then request input focus. Each step is attempted even
    /// when an earlier one fails; the first failure is returned.
    fn focus_and_raise(&mut self, target: WindowHandle) -> Result<()>;
}

/// Bridge for dry runs: no window system, every request succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBridge;

impl WindowBridge for NoopBridge {
    fn select_target_interactively(&mut self) -> Result<WindowHandle> {
        Ok(WindowHandle(0))
    }

    fn title(&self, _target: WindowHandle) -> String {
        UNKNOWN_TITLE.to_string()
    }

    fn focus_and_raise(&mut self, _target: WindowHandle) -> Result<()> {
        Ok(())
    }
}

/// Connects to the display server. Failure here is fatal for the process.
pub fn open_window_bridge() -> Result<Box<dyn WindowBridge>> {
    #[cfg(feature = "x11")]
    {
        Ok(Box::new(x11::X11WindowBridge::connect()?))
    }

    #[cfg(not(feature = "x11"))]
    {
        Err(anyhow::anyhow!(
            "window selection needs X11, which is disabled in this build (rebuild with `--features x11`)."
        ))
    }
}
