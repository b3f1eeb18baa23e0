//! Lighting controller abstraction.

use std::fmt::{self, Display, Formatter};

use crate::Rgb;

/// High-level lighting command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LightingCommand {
    /// Set a single LED zone to a raw color.
    SetColor { led_id: u8, color: Rgb },
    /// Set the brightness in percent.
    SetIntensity(u8),
    /// Set the horizontal light position.
    SetPosition(u8, u8),
    /// Set the vertical light position.
    SetVerticalPosition(u8),
    Idle,
    Reset,
    /// Read back the device state.
    GetReport,
}

/// Open session with a lighting device.
///
/// Commands are fire-and-forget, transport failures are only logged.
pub trait LightController {
    /// Human-readable bus location.
    fn location(&self) -> String;

    /// Device serial, empty if unavailable.
    fn serial(&self) -> String;

    /// Whether the device was opened and claimed successfully.
    fn is_initialized(&self) -> bool;

    /// Apply a command to the device.
    fn send_command(&self, command: &LightingCommand);
}

/// Destination for controllers found during detection.
pub trait Registry {
    fn register(&mut self, name: String, controller: Box<dyn LightController>);
}

/// Controller registered under its display name.
pub struct Registered {
    pub name: String,
    pub controller: Box<dyn LightController>,
}

impl Registry for Vec<Registered> {
    fn register(&mut self, name: String, controller: Box<dyn LightController>) {
        self.push(Registered { name, controller });
    }
}

/// Location of a device on its bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    Usb { bus: u8, address: u8 },
    Path(String),
}

impl Display for DeviceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb { bus, address } => write!(f, "{bus}-{address}"),
            Self::Path(path) => write!(f, "{path}"),
        }
    }
}

/// Enumerated device, only used for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub address: DeviceAddress,
}

impl DeviceIdentity {
    /// Check for an exact VID/PID match.
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}
