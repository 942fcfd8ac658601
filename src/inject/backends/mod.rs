#[cfg(feature = "uinput")]
pub mod uinput;

#[cfg(feature = "x11")]
pub mod x11;

pub(crate) const UINPUT_PATH: &str = "/dev/uinput";

/// Remediation shown when the uinput device cannot be created.
pub(crate) const UINPUT_HELP: &str = "\
Cannot open /dev/uinput. You may need to:
  1. Run as root, OR
  2. Add yourself to the 'input' group: sudo usermod -a -G input $USER
  3. Load the uinput module: sudo modprobe uinput";
