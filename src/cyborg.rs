//! MadCatz Cyborg gaming light control.
//!
//! Every command is a fixed-size HID feature report, starting with its opcode.

use bytes::{BufMut, Bytes, BytesMut};
use clap::ValueEnum;
use log::{debug, error, info, warn};

use crate::controller::{LightController, LightingCommand, Registry};
use crate::hid::{FeatureDevice, HidBus};
use crate::Rgb;

pub const NAME: &str = "MadCatz Cyborg Gaming Light";
pub const VENDOR_ID: u16 = 0x06a3;
pub const PRODUCT_ID: u16 = 0x0dc5;

const COLOR: u8 = 0xa2;
const POSITION: u8 = 0xa4;
const VERTICAL_POSITION: u8 = 0xa5;
const INTENSITY: u8 = 0xa6;
const RESET: u8 = 0xa7;

const REPORT_SIZE: usize = 9;
const MAX_INTENSITY: u8 = 100;

/// Horizontal light position.
#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Position {
    Center,
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl Position {
    /// Convert position to Cyborg format.
    pub const fn bytes(self) -> (u8, u8) {
        match self {
            Self::Center => (0x00, 0x01),
            Self::N => (0x01, 0x00),
            Self::Ne => (0x02, 0x00),
            Self::E => (0x04, 0x00),
            Self::Se => (0x08, 0x00),
            Self::S => (0x10, 0x00),
            Self::Sw => (0x20, 0x00),
            Self::W => (0x40, 0x00),
            Self::Nw => (0x80, 0x00),
        }
    }
}

/// Session with an opened Cyborg light.
pub struct CyborgController<D: FeatureDevice> {
    device: D,
    location: String,
}

impl<D: FeatureDevice> CyborgController<D> {
    pub fn new(device: D, path: &str) -> Self {
        Self { device, location: path.into() }
    }

    /// Run the startup handshake and turn the light off.
    ///
    /// Handshake failures only show up through later commands.
    pub fn initialize(&self) {
        if let Err(err) = self.device.set_blocking_mode(true) {
            debug!("Unable to enable blocking mode for {}: {err}", self.location);
        }

        self.idle_request();
        self.reset_request();
        self.get_report();
        self.set_led_color(Rgb::default());
    }

    pub fn idle_request(&self) {
        self.send(&LightingCommand::Idle);
    }

    pub fn reset_request(&self) {
        self.send(&LightingCommand::Reset);
    }

    /// Read the current device state.
    pub fn get_report(&self) -> Vec<u8> {
        let mut buf = report_bytes(&LightingCommand::GetReport).to_vec();

        match self.device.get_feature_report(&mut buf) {
            Ok(read) => buf.truncate(read),
            Err(err) => {
                error!("Failed to read report from {}: {err}", self.location);
                buf.clear();
            },
        }

        buf
    }

    pub fn set_led_color(&self, color: Rgb) {
        debug!("Setting {} color to {color}", self.location);
        self.send(&LightingCommand::SetColor { led_id: 0, color });
    }

    /// Set brightness in percent, clamped to 100.
    pub fn set_intensity(&self, intensity: u8) {
        if intensity > MAX_INTENSITY {
            warn!("Intensity {intensity} out of range, clamping to {MAX_INTENSITY}");
        }

        self.send(&LightingCommand::SetIntensity(intensity));
    }

    pub fn set_position(&self, byte1: u8, byte2: u8) {
        self.send(&LightingCommand::SetPosition(byte1, byte2));
    }

    pub fn set_vertical_position(&self, position: u8) {
        self.send(&LightingCommand::SetVerticalPosition(position));
    }

    /// Write a command report, logging failed or truncated writes.
    fn send(&self, command: &LightingCommand) {
        let report = report_bytes(command);

        match self.device.send_feature_report(&report) {
            Ok(written) if written == report.len() => (),
            Ok(written) => warn!(
                "Incomplete HID report sent to {}: {written} of {} bytes",
                self.location,
                report.len()
            ),
            Err(err) => error!("Failed to send {command:?} to {}: {err}", self.location),
        }
    }
}

impl<D: FeatureDevice> LightController for CyborgController<D> {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn serial(&self) -> String {
        match self.device.serial_number() {
            Ok(Some(serial)) => serial,
            _ => String::new(),
        }
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn send_command(&self, command: &LightingCommand) {
        match *command {
            LightingCommand::SetColor { color, .. } => self.set_led_color(color),
            LightingCommand::SetIntensity(intensity) => self.set_intensity(intensity),
            LightingCommand::SetPosition(byte1, byte2) => self.set_position(byte1, byte2),
            LightingCommand::SetVerticalPosition(position) => self.set_vertical_position(position),
            LightingCommand::Idle => self.idle_request(),
            LightingCommand::Reset => self.reset_request(),
            LightingCommand::GetReport => {
                self.get_report();
            },
        }
    }
}

/// Detect Cyborg lights and register each one under a unique name.
pub fn register_if_found<B>(bus: &B, vendor_id: u16, product_id: u16, registry: &mut dyn Registry)
where
    B: HidBus,
    B::Device: 'static,
{
    let devices = bus.devices().into_iter().filter(|device| device.matches(vendor_id, product_id));
    for identity in devices {
        let path = identity.address.to_string();

        let device = match bus.open_path(&path) {
            Ok(device) => device,
            Err(err) => {
                debug!("Unable to open {path}: {err}");
                continue;
            },
        };

        let controller = CyborgController::new(device, &path);
        controller.initialize();

        info!("Found {NAME} at {path}");

        // Include the path to tell identical lights apart.
        registry.register(format!("{NAME} at {path}"), Box::new(controller));
    }
}

/// Convert a command to a Cyborg feature report.
fn report_bytes(command: &LightingCommand) -> Bytes {
    let mut buf = BytesMut::with_capacity(REPORT_SIZE);

    match *command {
        // The light has a single zone.
        LightingCommand::SetColor { color, .. } => {
            buf.put_slice(&[COLOR, 0x00, color.r, color.g, color.b]);

            // Padding.
            buf.put_slice(&[0x00; 4]);
        },
        LightingCommand::SetIntensity(intensity) => {
            buf.put_slice(&[INTENSITY, 0x00, intensity.min(MAX_INTENSITY)]);
        },
        LightingCommand::SetPosition(byte1, byte2) => {
            buf.put_slice(&[POSITION, 0x00, byte1, byte2]);
        },
        LightingCommand::SetVerticalPosition(position) => {
            buf.put_slice(&[VERTICAL_POSITION, 0x00, position]);
        },
        LightingCommand::Idle => buf.put_u8(0x00),
        LightingCommand::Reset => buf.put_slice(&[RESET, 0x00]),
        LightingCommand::GetReport => buf.put_slice(&[0x00; REPORT_SIZE]),
    }

    buf.freeze()
}
