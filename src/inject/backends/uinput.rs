use std::time::Duration;

use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key, RelativeAxisType};
use rand::Rng;

use crate::inject::backends::UINPUT_HELP;
use crate::inject::InputInjector;
use crate::model::{Direction, KeyState};

const DEVICE_NAME: &str = "USB Keyboard";
const BASE_VENDOR: u16 = 0x046d;
const BASE_PRODUCT: u16 = 0xc52b;
const SETTLE: Duration = Duration::from_millis(500);

fn evdev_key(direction: Direction) -> Key {
    // Arrow keycodes are all well below u16::MAX.
    Key::new(direction.evdev_code() as u16)
}

fn key_event(direction: Direction, state: KeyState) -> InputEvent {
    let value = match state {
        KeyState::Pressed => 1,
        KeyState::Released => 0,
    };
    InputEvent::new(EventType::KEY, evdev_key(direction).code(), value)
}

/// Zero axes are left out; the caller's emit appends the SYN_REPORT.
fn relative_motion_events(dx: i32, dy: i32) -> Vec<InputEvent> {
    let mut events = Vec::with_capacity(2);
    if dx != 0 {
        events.push(InputEvent::new(
            EventType::RELATIVE,
            RelativeAxisType::REL_X.0,
            dx,
        ));
    }
    if dy != 0 {
        events.push(InputEvent::new(
            EventType::RELATIVE,
            RelativeAxisType::REL_Y.0,
            dy,
        ));
    }
    events
}

/// Vendor/product ids vary slightly per run so the device does not carry a fixed
/// fingerprint.
fn randomized_input_id<R: Rng + ?Sized>(rng: &mut R) -> InputId {
    let vendor = BASE_VENDOR + rng.gen_range(0..10);
    let product = BASE_PRODUCT + rng.gen_range(0..100);
    InputId::new(BusType::BUS_USB, vendor, product, 1)
}

/// A virtual USB keyboard with the four arrow keys and relative X/Y axes.
///
/// The kernel device is destroyed when this value is dropped.
pub struct UinputInjector {
    device: VirtualDevice,
}

impl UinputInjector {
    pub fn open<R: Rng + ?Sized>(rng: &mut R) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for direction in Direction::ALL {
            keys.insert(evdev_key(direction));
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);

        let device = VirtualDeviceBuilder::new()
            .context(UINPUT_HELP)?
            .name(DEVICE_NAME)
            .input_id(randomized_input_id(rng))
            .with_keys(&keys)
            .context("failed to enable arrow keys on the uinput device")?
            .with_relative_axes(&axes)
            .context("failed to enable relative axes on the uinput device")?
            .build()
            .context("failed to create the uinput device")?;

        // Give udev and the display server time to pick up the new device.
        std::thread::sleep(SETTLE);

        println!("SUCCESS: uinput device created");

        Ok(Self { device })
    }
}

impl InputInjector for UinputInjector {
    fn key(&mut self, direction: Direction, state: KeyState) -> Result<()> {
        self.device
            .emit(&[key_event(direction, state)])
            .with_context(|| format!("failed to write {direction} {state:?} to uinput"))
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        let events = relative_motion_events(dx, dy);
        if events.is_empty() {
            return Ok(());
        }
        self.device
            .emit(&events)
            .context("failed to write relative motion to uinput")
    }
}
