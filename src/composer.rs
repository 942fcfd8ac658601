use std::time::Duration;

use rand::Rng;

use crate::clock::Clock;
use crate::inject::InputInjector;
use crate::model::{ActionKind, ActionRecord, Direction, Press};
use crate::timing::TimingModel;

// Pause ranges in microseconds, half-open.
const MISCLICK_PAUSE_MICROS: (u64, u64) = (100_000, 300_000);
const DOUBLE_TAP_GAP_MICROS: (u64, u64) = (80_000, 200_000);
const SETTLE_PAUSE_MICROS: (u64, u64) = (10_000, 50_000);

fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Direction {
    Direction::ALL[rng.gen_range(0..Direction::ALL.len())]
}

/// Uniform over the other three directions, by resampling.
fn wrong_direction<R: Rng + ?Sized>(intended: Direction, rng: &mut R) -> Direction {
    loop {
        let candidate = random_direction(rng);
        if candidate != intended {
            return candidate;
        }
    }
}

fn pause<R: Rng + ?Sized>(clock: &mut dyn Clock, range: (u64, u64), rng: &mut R) {
    let micros = rng.gen_range(range.0..range.1);
    clock.sleep(Duration::from_micros(micros));
}

/// One down-hold-up cycle. Injector failures are logged and otherwise ignored: a
/// missing device degrades the turn, it does not abort it.
fn press<R: Rng + ?Sized>(
    timing: &TimingModel,
    injector: &mut dyn InputInjector,
    direction: Direction,
    rng: &mut R,
) -> Press {
    let hold_micros = timing.sample_press_duration_micros(rng);
    if let Err(err) = injector.press_key(direction, Duration::from_micros(hold_micros)) {
        log::warn!("input injection failed for {direction}: {err:#}");
    }
    Press {
        direction,
        hold_micros,
    }
}

/// Emits one turn's worth of input and describes what was sent.
///
/// A misclick (wrong direction, short pause, intended direction) takes precedence
/// over a double-tap and skips the trailing settle pause. Otherwise the intended
/// direction is pressed once, sometimes twice, followed by a 10-50ms settle.
pub fn perform_turn<R: Rng + ?Sized>(
    turn: u64,
    timing: &TimingModel,
    injector: &mut dyn InputInjector,
    clock: &mut dyn Clock,
    rng: &mut R,
) -> ActionRecord {
    let at = clock.now();
    let intended = random_direction(rng);

    if timing.should_misclick(rng) {
        let mistaken = wrong_direction(intended, rng);
        let wrong = press(timing, injector, mistaken, rng);
        pause(clock, MISCLICK_PAUSE_MICROS, rng);
        let corrected = press(timing, injector, intended, rng);

        return ActionRecord {
            turn,
            at,
            kind: ActionKind::Misclick { wrong, corrected },
        };
    }

    let first = press(timing, injector, intended, rng);

    let kind = if timing.should_double_tap(rng) {
        pause(clock, DOUBLE_TAP_GAP_MICROS, rng);
        let second = press(timing, injector, intended, rng);
        ActionKind::DoubleTap { first, second }
    } else {
        ActionKind::Normal { press: first }
    };

    pause(clock, SETTLE_PAUSE_MICROS, rng);

    ActionRecord { turn, at, kind }
}
