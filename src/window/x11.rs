use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    self, Allow, AtomEnum, ClientMessageEvent, ConfigureWindowAux, ConnectionExt as _, EventMask,
    GrabMode, GrabStatus, StackMode,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::window::{WindowBridge, WindowHandle, UNKNOWN_TITLE};

x11rb::atom_manager! {
    Atoms: AtomsCookie {
        _NET_ACTIVE_WINDOW,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_NAME,
        UTF8_STRING,
        WM_STATE,
    }
}

const NET_WM_STATE_REMOVE: u32 = 0;
// Pager source indication: honored even under focus-stealing prevention.
const SOURCE_PAGER: u32 = 2;

// Pauses that let the window manager react between steps.
const UNMINIMIZE_SETTLE: Duration = Duration::from_millis(100);
const RAISE_SETTLE: Duration = Duration::from_millis(50);
const FOCUS_SETTLE: Duration = Duration::from_millis(100);

const CLIENT_SEARCH_LIMIT: usize = 256;

/// EWMH window operations over an X11 connection.
pub struct X11WindowBridge {
    conn: RustConnection,
    root: xproto::Window,
    atoms: Atoms,
}

impl X11WindowBridge {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .context("Cannot open X display (is DISPLAY set and the X server reachable?)")?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?;

        let atoms = Atoms::new(&conn)
            .context("failed to request X11 atoms")?
            .reply()
            .context("failed to intern X11 atoms")?;

        Ok(Self { conn, root, atoms })
    }

    fn wait_for_click(&self) -> Result<xproto::Window> {
        self.conn
            .allow_events(Allow::SYNC_POINTER, x11rb::CURRENT_TIME)
            .context("failed to release the pointer grab queue")?;
        self.conn.flush().context("failed to flush X11 connection")?;

        loop {
            let event = self
                .conn
                .wait_for_event()
                .context("X11 connection closed while waiting for a click")?;
            if let Event::ButtonPress(press) = event {
                return Ok(if press.child != x11rb::NONE {
                    press.child
                } else {
                    press.root
                });
            }
        }
    }

    fn has_wm_state(&self, window: xproto::Window) -> bool {
        self.conn
            .get_property(false, window, self.atoms.WM_STATE, AtomEnum::ANY, 0, 0)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| reply.type_ != x11rb::NONE)
            .unwrap_or(false)
    }

    fn children(&self, window: xproto::Window) -> Vec<xproto::Window> {
        self.conn
            .query_tree(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| reply.children)
            .unwrap_or_default()
    }

    /// The clicked window is usually the window manager's frame; the application's
    /// own window is the nearest descendant carrying WM_STATE.
    fn client_window(&self, frame: xproto::Window) -> xproto::Window {
        if frame == self.root || self.has_wm_state(frame) {
            return frame;
        }

        let mut queue: VecDeque<xproto::Window> = self.children(frame).into();
        let mut visited = 0usize;
        while let Some(window) = queue.pop_front() {
            visited += 1;
            if visited > CLIENT_SEARCH_LIMIT {
                break;
            }
            if self.has_wm_state(window) {
                return window;
            }
            queue.extend(self.children(window));
        }

        frame
    }

    fn text_property(&self, window: xproto::Window, property: u32, type_: u32) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, u32::MAX)
            .ok()?
            .reply()
            .ok()?;

        if reply.value.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn send_root_message(&self, window: xproto::Window, message_type: u32, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .context("failed to send client message")?;
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }

    fn is_hidden(&self, window: xproto::Window) -> Result<bool> {
        let reply = self
            .conn
            .get_property(false, window, self.atoms._NET_WM_STATE, AtomEnum::ATOM, 0, u32::MAX)
            .context("failed to request _NET_WM_STATE")?
            .reply()
            .context("failed to read _NET_WM_STATE")?;

        let hidden = self.atoms._NET_WM_STATE_HIDDEN;
        Ok(reply
            .value32()
            .map(|mut states| states.any(|state| state == hidden))
            .unwrap_or(false))
    }

    fn unminimize(&self, window: xproto::Window) -> Result<()> {
        if !self.is_hidden(window)? {
            return Ok(());
        }

        log::debug!("window 0x{window:x} is hidden, asking the window manager to restore it");
        self.send_root_message(
            window,
            self.atoms._NET_WM_STATE,
            [NET_WM_STATE_REMOVE, self.atoms._NET_WM_STATE_HIDDEN, 0, 0, 0],
        )?;
        std::thread::sleep(UNMINIMIZE_SETTLE);
        Ok(())
    }

    fn raise(&self, window: xproto::Window) -> Result<()> {
        let aux = ConfigureWindowAux::new().stack_mode(StackMode::ABOVE);
        self.conn
            .configure_window(window, &aux)
            .context("failed to raise window")?;
        self.conn.flush().context("failed to flush X11 connection")?;
        std::thread::sleep(RAISE_SETTLE);
        Ok(())
    }

    fn activate(&self, window: xproto::Window) -> Result<()> {
        self.send_root_message(
            window,
            self.atoms._NET_ACTIVE_WINDOW,
            [SOURCE_PAGER, x11rb::CURRENT_TIME, 0, 0, 0],
        )?;
        std::thread::sleep(FOCUS_SETTLE);
        Ok(())
    }
}

impl WindowBridge for X11WindowBridge {
    fn select_target_interactively(&mut self) -> Result<WindowHandle> {
        println!("Click on the window you want to target...");

        let grab = self
            .conn
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS,
                GrabMode::SYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )
            .context("failed to request pointer grab")?
            .reply()
            .context("failed to grab the pointer")?;
        if grab.status != GrabStatus::SUCCESS {
            return Err(anyhow!(
                "could not grab the pointer ({:?}); another client may hold it",
                grab.status
            ));
        }

        let clicked = self.wait_for_click();

        let _ = self.conn.ungrab_pointer(x11rb::CURRENT_TIME);
        let _ = self.conn.flush();

        Ok(WindowHandle(self.client_window(clicked?)))
    }

    fn title(&self, target: WindowHandle) -> String {
        self.text_property(target.0, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .or_else(|| self.text_property(target.0, AtomEnum::WM_NAME.into(), AtomEnum::ANY.into()))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
    }

    fn focus_and_raise(&mut self, target: WindowHandle) -> Result<()> {
        let window = target.0;
        let mut first_error = None;

        let steps: [fn(&Self, xproto::Window) -> Result<()>; 3] =
            [Self::unminimize, Self::raise, Self::activate];
        for step in steps {
            if let Err(err) = step(self, window) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
