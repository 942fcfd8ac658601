use anyhow::{Context, Result};
use rand::Rng;

use crate::clock::Clock;
use crate::inject::InputInjector;
use crate::scheduler::{SchedulerConfig, Session, SessionEnd, TestOutcome};
use crate::sink::LogSink;
use crate::timing::TimingModel;
use crate::window::{WindowBridge, WindowHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Startup delay, then the unbounded loop.
    Continuous,
    /// Fixed number of turns at fixed spacing, then exit.
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Session(SessionEnd),
    Test(TestOutcome),
}

/// The opened collaborators and the window the user picked.
///
/// Both collaborators are released when this is dropped, including when `open`
/// fails part-way through.
pub struct Attached {
    pub injector: Box<dyn InputInjector>,
    pub bridge: Box<dyn WindowBridge>,
    pub target: WindowHandle,
    pub title: String,
}

impl Attached {
    /// Opens the injector, then the window bridge, then blocks until a target window
    /// is clicked. Any failure is fatal; nothing has been sent when it happens.
    pub fn open<R, FI, FW>(
        open_injector: FI,
        open_bridge: FW,
        sink: &mut LogSink,
        rng: &mut R,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
        FI: FnOnce(&mut R) -> Result<Box<dyn InputInjector>>,
        FW: FnOnce() -> Result<Box<dyn WindowBridge>>,
    {
        let injector = open_injector(rng)?;
        let mut bridge = open_bridge()?;

        let target = bridge
            .select_target_interactively()
            .context("failed to select a target window")?;
        let title = bridge.title(target);
        sink.console(&format!("Selected window: {target} ({title})"));

        Ok(Self {
            injector,
            bridge,
            target,
            title,
        })
    }

    pub fn run<R: Rng + ?Sized>(
        &mut self,
        mode: Mode,
        cfg: &SchedulerConfig,
        timing: &TimingModel,
        clock: &mut dyn Clock,
        sink: &mut LogSink,
        rng: &mut R,
    ) -> RunOutcome {
        let mut session = Session {
            cfg,
            timing,
            injector: self.injector.as_mut(),
            bridge: self.bridge.as_mut(),
            target: self.target,
            clock,
            sink,
        };

        match mode {
            Mode::Continuous => RunOutcome::Session(session.run(rng)),
            Mode::Test => RunOutcome::Test(session.run_test_mode(rng)),
        }
    }
}
