//! Philips amBX gaming lights control.
//!
//! Colors are written as 6 byte interrupt packets to interface 0. The device
//! needs a short settle delay between two consecutive color packets.

use std::thread;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use clap::ValueEnum;
use log::{debug, error, info, warn};

use crate::controller::{DeviceAddress, LightController, LightingCommand, Registry};
use crate::error::TransportError;
use crate::usb::{BusContext, BusDevice, BusHandle, UsbBus};
use crate::Rgb;

pub const NAME: &str = "Philips amBX";
pub const VENDOR_ID: u16 = 0x0471;
pub const PRODUCT_ID: u16 = 0x083f;

const INTERFACE: u8 = 0;
const ENDPOINT_OUT: u8 = 0x02;
const PACKET_HEADER: u8 = 0xa1;
const SET_COLOR: u8 = 0x03;

const SEND_TIMEOUT: Duration = Duration::from_millis(100);
const SETTLE_DELAY: Duration = Duration::from_millis(2);

/// amBX light zone.
#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AmbxZone {
    Left,
    Right,
    WallLeft,
    WallCenter,
    WallRight,
}

impl AmbxZone {
    /// All zones in the order they are switched off.
    pub const ALL: [AmbxZone; 5] =
        [Self::Left, Self::Right, Self::WallLeft, Self::WallCenter, Self::WallRight];

    pub const fn led_id(self) -> u8 {
        match self {
            Self::Left => 0x0b,
            Self::Right => 0x1b,
            Self::WallLeft => 0x2b,
            Self::WallCenter => 0x3b,
            Self::WallRight => 0x4b,
        }
    }
}

/// Result of opening an amBX session.
#[derive(Debug)]
pub enum SessionStatus {
    /// Device opened and interface claimed.
    Ready,
    /// USB context or device list unavailable.
    EnumerationFailed(TransportError),
    /// No device with matching IDs at the requested address.
    NoMatch,
    /// A matching device exists, but could not be opened or claimed.
    Unavailable(TransportError),
}

/// Exclusive session with one amBX device.
pub struct AmbxController<C: BusContext> {
    location: String,
    serial: String,
    status: SessionStatus,
    interface_claimed: bool,
    handle: Option<C::Handle>,
    context: Option<C>,
}

impl<C: BusContext> AmbxController<C> {
    /// Open the device at `path`, formatted as `<bus>-<address>`.
    pub fn open<B>(bus: &B, vendor_id: u16, product_id: u16, path: &str) -> Self
    where
        B: UsbBus<Context = C>,
    {
        let mut controller = Self {
            location: format!("USB amBX: {path}"),
            serial: String::new(),
            status: SessionStatus::NoMatch,
            interface_claimed: false,
            handle: None,
            context: None,
        };

        let context = match bus.init() {
            Ok(context) => controller.context.insert(context),
            Err(err) => {
                controller.status = SessionStatus::EnumerationFailed(err);
                return controller;
            },
        };

        let devices = match context.devices() {
            Ok(devices) => devices,
            Err(err) => {
                controller.status = SessionStatus::EnumerationFailed(err);
                controller.context = None;
                return controller;
            },
        };

        // Keep scanning after a failed claim, though addresses should be unique.
        for candidate in devices {
            let identity = &candidate.identity;
            if !identity.matches(vendor_id, product_id) || identity.address.to_string() != path {
                continue;
            }

            controller.location = location(&identity.address);

            let handle = match claim(context, &candidate) {
                Ok(handle) => handle,
                Err(err) => {
                    debug!("Unable to claim {}: {err}", controller.location);
                    controller.status = SessionStatus::Unavailable(err);
                    continue;
                },
            };
            controller.interface_claimed = true;

            if let Some(index) = candidate.serial_index.filter(|index| *index != 0) {
                match handle.read_string(index) {
                    Ok(serial) => controller.serial = serial,
                    Err(err) => debug!("Unable to read serial of {}: {err}", controller.location),
                }
            }

            controller.handle = Some(handle);
            controller.status = SessionStatus::Ready;
            break;
        }

        if controller.is_ready() {
            controller.turn_off();
        } else {
            controller.context = None;
        }

        controller
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Set a single LED, blocking for the device's settle delay.
    pub fn set_led_color(&self, led: u8, color: Rgb) {
        if !self.is_ready() {
            return;
        }

        self.send_packet(&color_packet(led, color));

        thread::sleep(SETTLE_DELAY);
    }

    /// Set LEDs one after another, in input order.
    pub fn set_led_colors(&self, leds: &[u8], colors: &[Rgb]) {
        for (led, color) in leds.iter().zip(colors) {
            self.set_led_color(*led, *color);
        }
    }

    /// Switch all zones to black.
    pub fn turn_off(&self) {
        let leds = AmbxZone::ALL.map(AmbxZone::led_id);
        self.set_led_colors(&leds, &[Rgb::default(); 5]);
    }

    fn is_ready(&self) -> bool {
        matches!(self.status, SessionStatus::Ready)
    }

    /// Write a raw packet to the command endpoint.
    ///
    /// Failed transfers are logged and dropped.
    fn send_packet(&self, packet: &[u8]) {
        let handle = match &self.handle {
            Some(handle) if self.is_ready() && self.interface_claimed => handle,
            _ => return,
        };

        match handle.write_interrupt(ENDPOINT_OUT, packet, SEND_TIMEOUT) {
            Ok(written) if written == packet.len() => (),
            Ok(written) => {
                let err = TransportError::ShortWrite { expected: packet.len(), actual: written };
                warn!("Dropped amBX packet for {}: {err}", self.location);
            },
            Err(err) => error!("Failed to send amBX packet to {}: {err}", self.location),
        }
    }
}

impl<C: BusContext> Drop for AmbxController<C> {
    fn drop(&mut self) {
        if self.is_ready() {
            self.turn_off();
        }

        if let Some(mut handle) = self.handle.take() {
            if self.interface_claimed {
                let _ = handle.release_interface(INTERFACE);
                self.interface_claimed = false;
            }

            drop(handle);
        }

        drop(self.context.take());
    }
}

impl<C: BusContext> LightController for AmbxController<C> {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn is_initialized(&self) -> bool {
        self.is_ready()
    }

    fn send_command(&self, command: &LightingCommand) {
        match *command {
            LightingCommand::SetColor { led_id, color } => self.set_led_color(led_id, color),
            command => debug!("Ignoring unsupported amBX command {command:?}"),
        }
    }
}

/// Detect amBX lights and register every device that initializes.
pub fn register_if_found<B>(bus: &B, vendor_id: u16, product_id: u16, registry: &mut dyn Registry)
where
    B: UsbBus,
    B::Context: 'static,
{
    let context = match bus.init() {
        Ok(context) => context,
        Err(err) => {
            debug!("USB unavailable: {err}");
            return;
        },
    };

    let devices = match context.devices() {
        Ok(devices) => devices,
        Err(err) => {
            debug!("Unable to list USB devices: {err}");
            return;
        },
    };

    let candidates = devices.iter().filter(|device| device.identity.matches(vendor_id, product_id));
    for candidate in candidates {
        let path = candidate.identity.address.to_string();

        // Skip devices which can't be opened right now.
        match context.open(&candidate.device) {
            Ok(handle) => drop(handle),
            Err(err) => {
                debug!("Skipping inaccessible amBX at {path}: {err}");
                continue;
            },
        }

        let controller = AmbxController::open(bus, vendor_id, product_id, &path);
        if controller.is_initialized() {
            info!("Found {NAME} at {}", controller.location());
            registry.register(NAME.into(), Box::new(controller));
        } else {
            debug!("Unable to initialize amBX at {path}: {:?}", controller.status());
        }
    }
}

/// Open a device and claim its command interface.
fn claim<C: BusContext>(
    context: &C,
    candidate: &BusDevice<C::Device>,
) -> Result<C::Handle, TransportError> {
    let mut handle = context.open(&candidate.device)?;

    // Detaching is best effort, claiming reports the real failure.
    if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
        if let Err(err) = handle.detach_kernel_driver(INTERFACE) {
            debug!("Unable to detach kernel driver: {err}");
        }
    }
    if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
        debug!("Unable to enable kernel driver auto-detach: {err}");
    }

    handle.claim_interface(INTERFACE)?;

    Ok(handle)
}

/// Human-readable device location.
fn location(address: &DeviceAddress) -> String {
    match address {
        DeviceAddress::Usb { bus, address } => format!("USB amBX: Bus {bus} Addr {address}"),
        DeviceAddress::Path(path) => format!("USB amBX: {path}"),
    }
}

/// Convert an LED color to amBX packet format.
fn color_packet(led: u8, color: Rgb) -> Bytes {
    let mut buf = BytesMut::with_capacity(6);

    buf.put_u8(PACKET_HEADER);
    buf.put_u8(led);
    buf.put_u8(SET_COLOR);

    // Raw color, no gamma correction.
    buf.put_u8(color.r);
    buf.put_u8(color.g);
    buf.put_u8(color.b);

    buf.freeze()
}
