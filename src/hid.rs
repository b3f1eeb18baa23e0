//! HID feature report transport.

use hidapi::{HidApi, HidDevice};

use crate::controller::{DeviceAddress, DeviceIdentity};
use crate::error::TransportError;

/// HID device enumeration.
pub trait HidBus {
    type Device: FeatureDevice;

    /// List all currently attached HID devices.
    fn devices(&self) -> Vec<DeviceIdentity>;

    fn open_path(&self, path: &str) -> Result<Self::Device, TransportError>;
}

/// Open HID device exchanging feature reports.
///
/// Dropping the device closes it.
pub trait FeatureDevice {
    fn set_blocking_mode(&self, blocking: bool) -> Result<(), TransportError>;

    /// Send a feature report, returning the number of bytes written.
    fn send_feature_report(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read a feature report into `buf`, returning the number of bytes read.
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn serial_number(&self) -> Result<Option<String>, TransportError>;
}

impl HidBus for HidApi {
    type Device = HidDevice;

    fn devices(&self) -> Vec<DeviceIdentity> {
        self.device_list()
            .map(|info| DeviceIdentity {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                address: DeviceAddress::Path(info.path().to_string_lossy().into_owned()),
            })
            .collect()
    }

    fn open_path(&self, path: &str) -> Result<HidDevice, TransportError> {
        let path = std::ffi::CString::new(path)
            .map_err(|_| TransportError::NotFound(path.into()))?;
        Ok(HidApi::open_path(self, &path)?)
    }
}

impl FeatureDevice for HidDevice {
    fn set_blocking_mode(&self, blocking: bool) -> Result<(), TransportError> {
        Ok(HidDevice::set_blocking_mode(self, blocking)?)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        // hidapi only reports success, which implies the full report.
        HidDevice::send_feature_report(self, data)?;
        Ok(data.len())
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(HidDevice::get_feature_report(self, buf)?)
    }

    fn serial_number(&self) -> Result<Option<String>, TransportError> {
        Ok(self.get_serial_number_string()?)
    }
}

/// Simulated HID devices recording every report.
#[cfg(test)]
pub mod sim {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum HidEvent {
        Open(String),
        Blocking(bool),
        Send(Vec<u8>),
        Get(usize),
        Close(String),
    }

    pub type EventLog = Rc<RefCell<Vec<HidEvent>>>;

    /// Reply to a feature report write.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum SendReply {
        Full,
        Short(usize),
        Fail,
    }

    #[derive(Clone)]
    pub struct SimHidDevice {
        pub path: String,
        pub serial: Result<Option<String>, ()>,
        pub reply: SendReply,
        pub log: EventLog,
    }

    impl SimHidDevice {
        pub fn new(path: &str) -> Self {
            Self {
                path: path.into(),
                serial: Ok(None),
                reply: SendReply::Full,
                log: Default::default(),
            }
        }

        pub fn events(&self) -> Vec<HidEvent> {
            self.log.borrow().clone()
        }

        /// All feature reports written so far.
        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.log
                .borrow()
                .iter()
                .filter_map(|event| match event {
                    HidEvent::Send(report) => Some(report.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Drop for SimHidDevice {
        fn drop(&mut self) {
            self.log.borrow_mut().push(HidEvent::Close(self.path.clone()));
        }
    }

    impl FeatureDevice for SimHidDevice {
        fn set_blocking_mode(&self, blocking: bool) -> Result<(), TransportError> {
            self.log.borrow_mut().push(HidEvent::Blocking(blocking));
            Ok(())
        }

        fn send_feature_report(&self, data: &[u8]) -> Result<usize, TransportError> {
            self.log.borrow_mut().push(HidEvent::Send(data.to_vec()));
            match self.reply {
                SendReply::Full => Ok(data.len()),
                SendReply::Short(written) => Ok(written),
                SendReply::Fail => Err(TransportError::Hid("broken pipe".into())),
            }
        }

        fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            self.log.borrow_mut().push(HidEvent::Get(buf.len()));
            buf[0] = 0xa7;
            Ok(buf.len())
        }

        fn serial_number(&self) -> Result<Option<String>, TransportError> {
            self.serial.clone().map_err(|_| TransportError::Hid("no serial".into()))
        }
    }

    /// HID bus with a fixed device list.
    #[derive(Default)]
    pub struct SimHidBus {
        pub devices: Vec<(DeviceIdentity, SimHidDevice)>,
        pub log: EventLog,
    }

    impl SimHidBus {
        pub fn attach(&mut self, vendor_id: u16, product_id: u16, path: &str) {
            let identity = DeviceIdentity {
                vendor_id,
                product_id,
                address: DeviceAddress::Path(path.into()),
            };
            let mut device = SimHidDevice::new(path);
            device.log = self.log.clone();
            self.devices.push((identity, device));
        }

        pub fn events(&self) -> Vec<HidEvent> {
            self.log.borrow().clone()
        }
    }

    impl HidBus for SimHidBus {
        type Device = SimHidDevice;

        fn devices(&self) -> Vec<DeviceIdentity> {
            self.devices.iter().map(|(identity, _)| identity.clone()).collect()
        }

        fn open_path(&self, path: &str) -> Result<SimHidDevice, TransportError> {
            let (_, device) = self
                .devices
                .iter()
                .find(|(identity, _)| identity.address.to_string() == path)
                .ok_or_else(|| TransportError::NotFound(path.into()))?;

            self.log.borrow_mut().push(HidEvent::Open(path.into()));
            Ok(device.clone())
        }
    }
}
