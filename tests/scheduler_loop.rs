use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{Local, TimeZone};
use rand::rngs::StdRng;
use rand::SeedableRng;

use antiidle::clock::VirtualClock;
use antiidle::inject::NullInjector;
use antiidle::scheduler::{next_delay, SchedulerConfig, Session, SessionEnd, SessionStats};
use antiidle::sink::LogSink;
use antiidle::timing::{TimingConfig, TimingModel};
use antiidle::window::{NoopBridge, WindowBridge, WindowHandle};

fn timing() -> TimingModel {
    TimingModel::new(TimingConfig::default()).expect("default config is valid")
}

fn start() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

#[test]
fn delays_stay_within_the_ceiling() {
    let cfg = SchedulerConfig::default();
    let timing = timing();
    let stats = SessionStats::with_counts(start(), 500, 600);
    let mut rng = StdRng::seed_from_u64(1);
    let mut replaced = 0;

    for _ in 0..20_000 {
        let decision = next_delay(&cfg, &timing, &stats, &mut rng);
        assert!(
            (1..=240).contains(&decision.delay_secs),
            "{decision:?}"
        );
        if decision.ceiling_replaced {
            replaced += 1;
            assert!(decision.uncapped_secs > 240);
            assert!((180..240).contains(&decision.delay_secs), "{decision:?}");
        } else {
            assert_eq!(decision.delay_secs as i64, decision.uncapped_secs);
        }
    }

    assert!(replaced > 0, "very-long samples plus jitter should trip the ceiling");
}

#[test]
fn no_extended_break_within_the_first_ten_actions() {
    let cfg = SchedulerConfig {
        extended_break_probability: 1.0,
        ..Default::default()
    };
    let timing = timing();
    let mut rng = StdRng::seed_from_u64(2);

    for actions in 0..=10 {
        let stats = SessionStats::with_counts(start(), actions, actions);
        for _ in 0..200 {
            let decision = next_delay(&cfg, &timing, &stats, &mut rng);
            assert_eq!(decision.extended_break_secs, None);
            assert_eq!(decision.uncapped_secs, decision.base_secs);
        }
    }
}

#[test]
fn forced_extended_breaks_are_added_then_capped() {
    let cfg = SchedulerConfig {
        extended_break_probability: 1.0,
        ..Default::default()
    };
    let timing = timing();
    let stats = SessionStats::with_counts(start(), 11, 11);
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..1_000 {
        let decision = next_delay(&cfg, &timing, &stats, &mut rng);
        let extra = decision.extended_break_secs.expect("forced break");
        assert!((60..180).contains(&extra));
        assert_eq!(decision.uncapped_secs, decision.base_secs + extra as i64);

        if decision.uncapped_secs > 240 {
            assert!(decision.ceiling_replaced);
            assert!((180..240).contains(&decision.delay_secs), "{decision:?}");
        } else {
            assert_eq!(decision.delay_secs as i64, decision.uncapped_secs);
        }
        assert!(decision.delay_secs <= 240);
    }
}

#[test]
fn extended_breaks_recur_at_roughly_five_percent() {
    let cfg = SchedulerConfig::default();
    let timing = timing();
    let stats = SessionStats::with_counts(start(), 50, 55);
    let mut rng = StdRng::seed_from_u64(4);

    let trials = 40_000;
    let breaks = (0..trials)
        .filter(|_| {
            next_delay(&cfg, &timing, &stats, &mut rng)
                .extended_break_secs
                .is_some()
        })
        .count();
    let rate = breaks as f64 / trials as f64;
    assert!((rate - 0.05).abs() < 0.006, "{rate}");
}

#[test]
fn scheduler_config_validation() {
    assert!(SchedulerConfig::default().validate().is_ok());

    let bad_probability = SchedulerConfig {
        extended_break_probability: -0.1,
        ..Default::default()
    };
    assert!(bad_probability.validate().is_err());

    let fallback_over_ceiling = SchedulerConfig {
        ceiling_fallback_secs: 200..300,
        ..Default::default()
    };
    assert!(fallback_over_ceiling.validate().is_err());
}

#[test]
fn counters_advance_by_one_action_and_one_or_two_keys() {
    let cfg = SchedulerConfig::default();
    let timing = timing();
    let mut injector = NullInjector::new();
    let mut bridge = NoopBridge;
    let mut clock = VirtualClock::new(start());
    let mut sink = LogSink::silent();
    let mut rng = StdRng::seed_from_u64(5);
    let mut stats = SessionStats::with_counts(start(), 7, 9);

    let mut session = Session {
        cfg: &cfg,
        timing: &timing,
        injector: &mut injector,
        bridge: &mut bridge,
        target: WindowHandle(0x1a00007),
        clock: &mut clock,
        sink: &mut sink,
    };

    for _ in 0..300 {
        let before = stats;
        let report = session.run_turn(&mut stats, &mut rng);

        assert_eq!(report.record.turn, before.actions + 1);
        assert_eq!(stats.actions, before.actions + 1);
        let added = stats.keys - before.keys;
        assert!(added == 1 || added == 2);
        assert_eq!(added, report.record.key_count());
        assert!(report.delay.delay_secs >= 1 && report.delay.delay_secs <= 240);
    }
}

#[test]
fn first_extended_break_can_only_follow_the_eleventh_action() {
    let cfg = SchedulerConfig {
        extended_break_probability: 1.0,
        ..Default::default()
    };
    let timing = timing();
    let mut injector = NullInjector::new();
    let mut bridge = NoopBridge;
    let mut clock = VirtualClock::new(start());
    let mut sink = LogSink::silent();
    let mut rng = StdRng::seed_from_u64(6);
    let mut stats = SessionStats::new(start());

    let mut session = Session {
        cfg: &cfg,
        timing: &timing,
        injector: &mut injector,
        bridge: &mut bridge,
        target: WindowHandle(1),
        clock: &mut clock,
        sink: &mut sink,
    };

    for _ in 0..30 {
        let report = session.run_turn(&mut stats, &mut rng);
        let eligible = report.record.turn >= 11;
        assert_eq!(
            report.delay.extended_break_secs.is_some(),
            eligible,
            "turn {}",
            report.record.turn
        );
    }
}

#[test]
fn session_runs_until_the_clock_stops_and_writes_markers() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("antiidle.log");

    let cfg = SchedulerConfig::default();
    let timing = timing();
    let mut injector = NullInjector::new();
    let mut bridge = NoopBridge;
    // Ten seconds of startup plus about an hour of turns.
    let mut clock = VirtualClock::new(start()).with_budget(Duration::from_secs(3_600));
    let mut sink = LogSink::with_console(Some(log_path.clone()), Box::new(std::io::sink()));
    let mut rng = StdRng::seed_from_u64(7);

    let mut session = Session {
        cfg: &cfg,
        timing: &timing,
        injector: &mut injector,
        bridge: &mut bridge,
        target: WindowHandle(0x2c00004),
        clock: &mut clock,
        sink: &mut sink,
    };
    let end = session.run(&mut rng);

    let SessionEnd::Stopped(stats) = end else {
        panic!("expected a stopped session, got {end:?}");
    };
    assert!(stats.actions >= 15, "an hour should hold at least 15 turns");
    assert_eq!(stats.started_at, start() + chrono::Duration::seconds(10));
    assert_eq!(injector.presses() as u64, stats.keys);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.starts_with('\n'));
    let lines: Vec<&str> = log.lines().filter(|l| !l.is_empty()).collect();
    assert!(lines[0].ends_with("=== SESSION STARTED ==="));
    assert!(lines[1].ends_with("Target window: 0x2c00004 (Unknown)"));
    assert!(lines.last().unwrap().contains("=== SESSION ENDED ==="));

    let actions = lines.iter().filter(|l| l.contains("] Action #")).count();
    let stats_lines = lines.iter().filter(|l| l.contains("] Stats: ")).count();
    assert_eq!(actions as u64, stats.actions);
    assert_eq!(stats_lines as u64, stats.actions);
    assert!(lines
        .iter()
        .any(|l| l.contains(&format!("| {} actions | {} keys |", stats.actions, stats.keys))));
}

#[test]
fn stop_during_startup_sends_nothing() {
    let cfg = SchedulerConfig::default();
    let timing = timing();
    let mut injector = NullInjector::new();
    let mut bridge = NoopBridge;
    let mut clock = VirtualClock::new(start()).with_budget(Duration::from_secs(5));
    let mut sink = LogSink::silent();
    let mut rng = StdRng::seed_from_u64(8);

    let mut session = Session {
        cfg: &cfg,
        timing: &timing,
        injector: &mut injector,
        bridge: &mut bridge,
        target: WindowHandle(1),
        clock: &mut clock,
        sink: &mut sink,
    };

    assert_eq!(session.run(&mut rng), SessionEnd::DuringStartup);
    assert!(injector.events().is_empty());
}

#[test]
fn test_mode_runs_ten_turns_one_second_apart() {
    let cfg = SchedulerConfig::default();
    let timing = timing();
    let mut injector = NullInjector::new();
    let mut bridge = NoopBridge;
    let mut clock = VirtualClock::new(start());
    let mut sink = LogSink::silent();
    let mut rng = StdRng::seed_from_u64(9);

    let mut session = Session {
        cfg: &cfg,
        timing: &timing,
        injector: &mut injector,
        bridge: &mut bridge,
        target: WindowHandle(1),
        clock: &mut clock,
        sink: &mut sink,
    };
    let outcome = session.run_test_mode(&mut rng);

    assert!(outcome.completed);
    assert_eq!(outcome.turns, 10);
    assert_eq!(injector.presses() as u64, outcome.stats.keys);

    let spacing: Vec<_> = clock
        .slept()
        .iter()
        .filter(|d| **d >= Duration::from_millis(500))
        .collect();
    assert_eq!(spacing.len(), 10);
    assert!(spacing.iter().all(|d| **d == Duration::from_secs(1)));
    // No startup delay in test mode.
    assert!(clock.elapsed() < Duration::from_secs(15));
}

struct StubbornWindow {
    focus_attempts: Rc<Cell<usize>>,
}

impl WindowBridge for StubbornWindow {
    fn select_target_interactively(&mut self) -> Result<WindowHandle> {
        Ok(WindowHandle(42))
    }

    fn title(&self, _target: WindowHandle) -> String {
        "Stubborn".to_string()
    }

    fn focus_and_raise(&mut self, _target: WindowHandle) -> Result<()> {
        self.focus_attempts.set(self.focus_attempts.get() + 1);
        Err(anyhow!("window manager refused"))
    }
}

#[test]
fn focus_failures_are_not_fatal() {
    let cfg = SchedulerConfig::default();
    let timing = timing();
    let attempts = Rc::new(Cell::new(0));
    let mut injector = NullInjector::new();
    let mut bridge = StubbornWindow {
        focus_attempts: attempts.clone(),
    };
    let mut clock = VirtualClock::new(start());
    let mut sink = LogSink::silent();
    let mut rng = StdRng::seed_from_u64(10);

    let mut session = Session {
        cfg: &cfg,
        timing: &timing,
        injector: &mut injector,
        bridge: &mut bridge,
        target: WindowHandle(42),
        clock: &mut clock,
        sink: &mut sink,
    };
    let outcome = session.run_test_mode(&mut rng);

    assert!(outcome.completed);
    assert_eq!(attempts.get(), 10);
    assert_eq!(injector.presses() as u64, outcome.stats.keys);
}
