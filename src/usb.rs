//! USB bulk/interrupt transport.

use std::time::Duration;

use rusb::UsbContext;

use crate::controller::{DeviceAddress, DeviceIdentity};
use crate::error::TransportError;

/// Source of fresh USB contexts.
pub trait UsbBus {
    type Context: BusContext;

    fn init(&self) -> Result<Self::Context, TransportError>;
}

/// Initialized USB context.
///
/// Dropping the context releases it.
pub trait BusContext {
    type Device;
    type Handle: BusHandle;

    /// List all attached devices with a readable descriptor.
    fn devices(&self) -> Result<Vec<BusDevice<Self::Device>>, TransportError>;

    fn open(&self, device: &Self::Device) -> Result<Self::Handle, TransportError>;
}

/// Open USB device.
///
/// Dropping the handle closes the device.
pub trait BusHandle {
    fn kernel_driver_active(&self, iface: u8) -> Result<bool, TransportError>;

    fn detach_kernel_driver(&mut self, iface: u8) -> Result<(), TransportError>;

    fn set_auto_detach_kernel_driver(&mut self, enable: bool) -> Result<(), TransportError>;

    fn claim_interface(&mut self, iface: u8) -> Result<(), TransportError>;

    fn release_interface(&mut self, iface: u8) -> Result<(), TransportError>;

    /// Read an ASCII string descriptor.
    fn read_string(&self, index: u8) -> Result<String, TransportError>;

    /// Blocking interrupt write, returning the number of bytes transferred.
    fn write_interrupt(
        &self,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;
}

/// Enumerated USB device.
pub struct BusDevice<D> {
    pub identity: DeviceIdentity,
    /// Serial number string descriptor index.
    pub serial_index: Option<u8>,
    pub device: D,
}

/// System libusb.
pub struct LibUsb;

impl UsbBus for LibUsb {
    type Context = rusb::Context;

    fn init(&self) -> Result<rusb::Context, TransportError> {
        Ok(rusb::Context::new()?)
    }
}

impl BusContext for rusb::Context {
    type Device = rusb::Device<rusb::Context>;
    type Handle = rusb::DeviceHandle<rusb::Context>;

    fn devices(&self) -> Result<Vec<BusDevice<Self::Device>>, TransportError> {
        let list = UsbContext::devices(self)?;

        let mut devices = Vec::new();
        for device in list.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(_) => continue,
            };

            let bus = device.bus_number();
            let address = DeviceAddress::Usb { bus, address: device.address() };
            let identity = DeviceIdentity {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                address,
            };

            devices.push(BusDevice {
                identity,
                serial_index: descriptor.serial_number_string_index(),
                device,
            });
        }

        Ok(devices)
    }

    fn open(&self, device: &Self::Device) -> Result<Self::Handle, TransportError> {
        Ok(device.open()?)
    }
}

impl BusHandle for rusb::DeviceHandle<rusb::Context> {
    fn kernel_driver_active(&self, iface: u8) -> Result<bool, TransportError> {
        Ok(rusb::DeviceHandle::kernel_driver_active(self, iface)?)
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> Result<(), TransportError> {
        Ok(rusb::DeviceHandle::detach_kernel_driver(self, iface)?)
    }

    fn set_auto_detach_kernel_driver(&mut self, enable: bool) -> Result<(), TransportError> {
        Ok(rusb::DeviceHandle::set_auto_detach_kernel_driver(self, enable)?)
    }

    fn claim_interface(&mut self, iface: u8) -> Result<(), TransportError> {
        Ok(rusb::DeviceHandle::claim_interface(self, iface)?)
    }

    fn release_interface(&mut self, iface: u8) -> Result<(), TransportError> {
        Ok(rusb::DeviceHandle::release_interface(self, iface)?)
    }

    fn read_string(&self, index: u8) -> Result<String, TransportError> {
        Ok(self.read_string_descriptor_ascii(index)?)
    }

    fn write_interrupt(
        &self,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        Ok(rusb::DeviceHandle::write_interrupt(self, endpoint, buf, timeout)?)
    }
}
