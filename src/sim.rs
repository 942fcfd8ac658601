use chrono::{DateTime, Local};
use rand::Rng;
use serde::Serialize;

use crate::clock::VirtualClock;
use crate::inject::NullInjector;
use crate::model::ActionVariant;
use crate::scheduler::{SchedulerConfig, Session, SessionStats, TurnReport};
use crate::sink::LogSink;
use crate::timing::TimingModel;
use crate::window::{NoopBridge, WindowHandle};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub turns: usize,
    pub keys: u64,
    pub injected_presses: usize,
    pub normal: usize,
    pub double_tap: usize,
    pub misclick: usize,
    pub extended_breaks: usize,
    pub ceiling_replacements: usize,
    /// Turns per timing pattern, indexed like the pattern table.
    pub pattern_counts: Vec<usize>,
    pub total_delay_secs: u64,
    pub min_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub turns: Vec<TurnReport>,
    pub session: SessionStats,
    pub stats: SimStats,
}

pub fn stats(turns: &[TurnReport], pattern_count: usize) -> SimStats {
    let mut out = SimStats {
        turns: turns.len(),
        pattern_counts: vec![0; pattern_count],
        ..Default::default()
    };

    for turn in turns {
        out.keys += turn.record.key_count();
        match turn.record.variant() {
            ActionVariant::Normal => out.normal += 1,
            ActionVariant::DoubleTap => out.double_tap += 1,
            ActionVariant::Misclick => out.misclick += 1,
        }

        let delay = &turn.delay;
        if delay.extended_break_secs.is_some() {
            out.extended_breaks += 1;
        }
        if delay.ceiling_replaced {
            out.ceiling_replacements += 1;
        }
        if let Some(count) = out.pattern_counts.get_mut(delay.pattern) {
            *count += 1;
        }

        out.total_delay_secs = out.total_delay_secs.saturating_add(delay.delay_secs);
        let secs = delay.delay_secs;
        out.min_delay_secs = Some(out.min_delay_secs.map_or(secs, |m| m.min(secs)));
        out.max_delay_secs = Some(out.max_delay_secs.map_or(secs, |m| m.max(secs)));
    }

    out
}

/// Runs `turns` scheduler turns in virtual time without touching any device or
/// window. Delays are slept on a [`VirtualClock`], so timestamps advance as they
/// would in a real session.
pub fn simulate<R: Rng + ?Sized>(
    turns: usize,
    cfg: &SchedulerConfig,
    timing: &TimingModel,
    start: DateTime<Local>,
    rng: &mut R,
) -> SimReport {
    let mut injector = NullInjector::new();
    let mut bridge = NoopBridge;
    let mut clock = VirtualClock::new(start);
    let mut sink = LogSink::silent();
    let target = WindowHandle(0);

    let mut session_stats = SessionStats::new(start);
    let mut reports = Vec::with_capacity(turns);
    {
        let mut session = Session {
            cfg,
            timing,
            injector: &mut injector,
            bridge: &mut bridge,
            target,
            clock: &mut clock,
            sink: &mut sink,
        };

        for _ in 0..turns {
            let report = session.run_turn(&mut session_stats, rng);
            session.clock.sleep(report.delay.delay());
            reports.push(report);
        }
    }

    let mut stats = stats(&reports, timing.patterns().len());
    stats.injected_presses = injector.presses();

    SimReport {
        turns: reports,
        session: session_stats,
        stats,
    }
}
