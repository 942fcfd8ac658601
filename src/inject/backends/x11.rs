use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use crate::inject::InputInjector;
use crate::model::{Direction, KeyState};

pub(crate) fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On most Linux Xorg setups, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn key_state_to_x11_event_type(state: KeyState) -> u8 {
    match state {
        KeyState::Pressed => xproto::KEY_PRESS_EVENT,
        KeyState::Released => xproto::KEY_RELEASE_EVENT,
    }
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    let _ = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok());

    Ok(())
}

/// Injects through the XTEST extension. Events reach whatever window has X input
/// focus; no kernel device is created.
pub struct XtestInjector {
    conn: RustConnection,
    root: xproto::Window,
}

impl XtestInjector {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .context("Cannot open X display (is DISPLAY set and the X server reachable?)")?;
        query_xtest(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?;

        Ok(Self { conn, root })
    }

    fn fake_input(&self, type_: u8, detail: u8, root: xproto::Window, x: i16, y: i16) -> Result<()> {
        // deviceid 0 targets the core devices.
        self.conn
            .xtest_fake_input(type_, detail, x11rb::CURRENT_TIME, root, x, y, 0)
            .context("failed to send XTEST fake input")?;
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }
}

impl InputInjector for XtestInjector {
    fn key(&mut self, direction: Direction, state: KeyState) -> Result<()> {
        let keycode = evdev_to_x11_keycode(direction.evdev_code())?;
        self.fake_input(key_state_to_x11_event_type(state), keycode, self.root, 0, 0)
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        let dx = i16::try_from(dx).map_err(|_| anyhow!("relative dx {dx} out of range"))?;
        let dy = i16::try_from(dy).map_err(|_| anyhow!("relative dy {dy} out of range"))?;
        // detail = 1 marks the motion as relative; root must be None.
        self.fake_input(xproto::MOTION_NOTIFY_EVENT, 1, x11rb::NONE, dx, dy)
    }
}
