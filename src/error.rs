//! Transport error types.

use thiserror::Error;

/// Errors raised by the USB and HID transport layers.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("HID error: {0}")]
    Hid(String),

    #[error("no device at {0}")]
    NotFound(String),

    #[error("incomplete transfer: {actual} of {expected} bytes")]
    ShortWrite { expected: usize, actual: usize },
}

impl From<hidapi::HidError> for TransportError {
    fn from(err: hidapi::HidError) -> Self {
        TransportError::Hid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_write_message() {
        let err = TransportError::ShortWrite { expected: 9, actual: 4 };
        assert_eq!(err.to_string(), "incomplete transfer: 4 of 9 bytes");
    }

    #[test]
    fn usb_error_conversion() {
        let err: TransportError = rusb::Error::Busy.into();
        assert!(matches!(err, TransportError::Usb(rusb::Error::Busy)));
    }
}
