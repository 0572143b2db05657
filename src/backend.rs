use log::debug;
use rusb::{
    Device, DeviceHandle, Direction, GlobalContext, InterfaceDescriptor, TransferType, UsbContext,
};
use std::time::Duration;
use thiserror::Error;

/// Every response from the device fits into a buffer of this size.
pub const MAX_RESPONSE_LENGTH: usize = 12;

// Interface (0, 0) of the active configuration carries both bulk endpoints.
const INTERFACE_NUMBER: u8 = 0;
const ALTERNATE_SETTING: u8 = 0;

// libusb treats a zero timeout as "wait forever".
const NO_TIMEOUT: Duration = Duration::ZERO;

/// A device that answers each request sent via bulk transfer with a response.
pub trait BulkTransfer {
    /// Send `request` to the outbound endpoint, then block until the inbound endpoint delivers a
    /// response. Returns only the bytes actually received.
    fn bulk_transfer(&self, request: &[u8]) -> Result<Vec<u8>, Error>;

    fn product_name(&self) -> Option<&str>;

    fn serial_number(&self) -> Option<&str>;
}

/// A USB device with one outbound and one inbound bulk endpoint on interface 0. Owns the device
/// handle; dropping it releases the interface and closes the handle.
pub struct UsbBulkTransferDevice<T: UsbContext = GlobalContext> {
    handle: DeviceHandle<T>,
    endpoint_out: u8,
    endpoint_in: u8,
    reattach_driver: bool,
    product_name: Option<String>,
    serial_number: Option<String>,
}

impl<T: UsbContext> UsbBulkTransferDevice<T> {
    /// Open `device`, activating its first configuration if it has none, and locate its bulk
    /// endpoints.
    pub fn open(device: &Device<T>) -> Result<Self, ConfigurationError> {
        let descriptor = device.device_descriptor().map_err(|e| ConfigurationError::Open {
            device: format!("bus {} address {}", device.bus_number(), device.address()),
            source: e,
        })?;
        let id = format!("{:04x}:{:04x}", descriptor.vendor_id(), descriptor.product_id());

        let mut handle = device
            .open()
            .map_err(|e| ConfigurationError::Open { device: id.clone(), source: e })?;

        // Unreadable strings only make log messages less helpful.
        let product_name = descriptor
            .product_string_index()
            .and_then(|i| handle.read_string_descriptor_ascii(i).ok());
        let serial_number = descriptor
            .serial_number_string_index()
            .and_then(|i| handle.read_string_descriptor_ascii(i).ok());
        let name = product_name.clone().unwrap_or(id);

        let config = match device.active_config_descriptor() {
            Ok(config) => {
                debug!("Device already configured, active configuration: {}", config.number());
                config
            }
            Err(e) => {
                debug!("Device has no active configuration ({e})");
                let configure =
                    |handle: &mut DeviceHandle<T>| -> rusb::Result<rusb::ConfigDescriptor> {
                        let first = device.config_descriptor(0)?;
                        handle.set_active_configuration(first.number())?;
                        device.active_config_descriptor()
                    };
                let config = configure(&mut handle).map_err(|e| ConfigurationError::Configure {
                    device: name.clone(),
                    source: e,
                })?;
                debug!("Configuration successful");
                config
            }
        };

        let interface = config
            .interfaces()
            .find(|i| i.number() == INTERFACE_NUMBER)
            .and_then(|i| i.descriptors().find(|d| d.setting_number() == ALTERNATE_SETTING))
            .ok_or_else(|| ConfigurationError::InterfaceNotFound { device: name.clone() })?;

        let endpoint_out = find_endpoint(&interface, Direction::Out).map_err(|e| {
            ConfigurationError::Endpoint {
                device: name.clone(),
                source: e,
            }
        })?;
        debug!("Found outbound endpoint: {endpoint_out:#04x}");
        let endpoint_in = find_endpoint(&interface, Direction::In).map_err(|e| {
            ConfigurationError::Endpoint {
                device: name.clone(),
                source: e,
            }
        })?;
        debug!("Found inbound endpoint: {endpoint_in:#04x}");

        let reattach_driver = detach_driver_if_needed(&mut handle, &name)?;

        if let Err(e) = handle.claim_interface(INTERFACE_NUMBER) {
            if reattach_driver {
                if let Err(e) = handle.attach_kernel_driver(INTERFACE_NUMBER) {
                    debug!("Unable to reattach kernel driver: {e}");
                }
            }
            return Err(ConfigurationError::ClaimInterface {
                device: name,
                source: e,
            });
        }

        Ok(Self {
            handle,
            endpoint_out,
            endpoint_in,
            reattach_driver,
            product_name,
            serial_number,
        })
    }
}

impl<T: UsbContext> BulkTransfer for UsbBulkTransferDevice<T> {
    fn bulk_transfer(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        let written = self
            .handle
            .write_bulk(self.endpoint_out, request, NO_TIMEOUT)
            .map_err(|e| Error::DeviceIoError {
                source: e,
                action: "sending request",
            })?;
        if written != request.len() {
            return Err(ProtocolError::ShortWrite {
                expected: request.len(),
                actual: written,
            }
            .into());
        }

        let mut buffer = [0u8; MAX_RESPONSE_LENGTH];
        let received = self
            .handle
            .read_bulk(self.endpoint_in, &mut buffer, NO_TIMEOUT)
            .map_err(|e| Error::DeviceIoError {
                source: e,
                action: "reading response",
            })?;

        let response = buffer[..received].to_vec();
        debug!("Got response: {response:02x?}");
        Ok(response)
    }

    fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }
}

impl<T: UsbContext> Drop for UsbBulkTransferDevice<T> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(INTERFACE_NUMBER) {
            debug!("Unable to release interface #{INTERFACE_NUMBER}: {e}");
        }
        if self.reattach_driver {
            match self.handle.attach_kernel_driver(INTERFACE_NUMBER) {
                Ok(()) => debug!("Kernel driver reattached"),
                Err(e) => debug!("Unable to reattach kernel driver: {e}"),
            }
        }
    }
}

/// Detach the kernel driver from our interface if one is bound. Returns whether a driver was
/// detached. Platforms that can't tell us about kernel drivers are left alone.
fn detach_driver_if_needed<T: UsbContext>(
    handle: &mut DeviceHandle<T>,
    name: &str,
) -> Result<bool, ConfigurationError> {
    let active = handle.kernel_driver_active(INTERFACE_NUMBER);
    if needs_detach(active, name)? {
        debug!("Detaching driver from interface #{INTERFACE_NUMBER}");
        handle
            .detach_kernel_driver(INTERFACE_NUMBER)
            .map_err(|e| ConfigurationError::DetachDriver {
                device: name.to_owned(),
                source: e,
            })?;
        debug!("Driver successfully detached");
        return Ok(true);
    }
    Ok(false)
}

/// Interpret the answer to "is a kernel driver bound to our interface?".
fn needs_detach(active: rusb::Result<bool>, name: &str) -> Result<bool, ConfigurationError> {
    match active {
        Ok(active) => Ok(active),
        Err(rusb::Error::NotSupported) => {
            debug!(
                "Note: unable to detach driver for interface #{INTERFACE_NUMBER} \
                 (not supported on this platform); proceeding"
            );
            Ok(false)
        }
        Err(e) => Err(ConfigurationError::DetachDriver {
            device: name.to_owned(),
            source: e,
        }),
    }
}

fn find_endpoint(
    interface: &InterfaceDescriptor,
    direction: Direction,
) -> Result<u8, EndpointNotFound> {
    interface
        .endpoint_descriptors()
        .find(|e| e.direction() == direction && e.transfer_type() == TransferType::Bulk)
        .map(|e| e.address())
        .ok_or(EndpointNotFound {
            direction,
            interface: interface.interface_number(),
        })
}

/// No bulk endpoint with the wanted direction exists. Only ever seen as the source of a
/// [ConfigurationError].
#[derive(Error, Debug)]
#[error("no bulk {direction:?} endpoint on interface #{interface}")]
pub struct EndpointNotFound {
    pub direction: Direction,
    pub interface: u8,
}

/// A device was found but can't be put into a usable state.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("unable to open {device}")]
    Open { device: String, source: rusb::Error },

    #[error("unable to connect to {device}")]
    Configure { device: String, source: rusb::Error },

    #[error("{device} has no interface #0 with alternate setting 0")]
    InterfaceNotFound { device: String },

    #[error("unable to detach kernel driver from {device}")]
    DetachDriver { device: String, source: rusb::Error },

    #[error("unable to claim interface #0 of {device}")]
    ClaimInterface { device: String, source: rusb::Error },

    #[error("endpoint not found for {device}")]
    Endpoint {
        device: String,
        source: EndpointNotFound,
    },
}

/// All errors that can happen during a bulk transfer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("protocol violation")]
    ProtocolError(#[from] ProtocolError),

    #[error("USB transfer error while {action}")]
    DeviceIoError {
        source: rusb::Error,
        action: &'static str,
    },
}

impl Error {
    /// Whether trying the same transfer again may succeed. Protocol violations point at a
    /// firmware or driver mismatch and never do, nor does talking to an endpoint that is gone.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ProtocolError(_) => false,
            Error::DeviceIoError { source, .. } => !matches!(
                source,
                rusb::Error::NotFound
                    | rusb::Error::Access
                    | rusb::Error::InvalidParam
                    | rusb::Error::NotSupported
            ),
        }
    }
}

/// Failure modes that can happen even when all USB I/O succeeds.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("device accepted {actual} of {expected} request bytes")]
    ShortWrite { expected: usize, actual: usize },

    #[error("response from device was {actual} bytes, expected {expected}")]
    ResponseLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(source: rusb::Error) -> Error {
        Error::DeviceIoError {
            source,
            action: "testing",
        }
    }

    #[test]
    fn io_errors_are_transient() {
        assert!(io_error(rusb::Error::Io).is_transient());
        assert!(io_error(rusb::Error::Busy).is_transient());
        assert!(io_error(rusb::Error::Pipe).is_transient());
        assert!(io_error(rusb::Error::NoDevice).is_transient());
    }

    #[test]
    fn missing_endpoints_are_not_transient() {
        assert!(!io_error(rusb::Error::NotFound).is_transient());
        assert!(!io_error(rusb::Error::Access).is_transient());
    }

    #[test]
    fn protocol_violations_are_not_transient() {
        let short_write: Error = ProtocolError::ShortWrite {
            expected: 5,
            actual: 3,
        }
        .into();
        assert!(!short_write.is_transient());

        let bad_length: Error = ProtocolError::ResponseLength {
            expected: 12,
            actual: 11,
        }
        .into();
        assert!(!bad_length.is_transient());
    }

    #[test]
    fn kernel_driver_query() {
        assert!(needs_detach(Ok(true), "heat it").unwrap());
        assert!(!needs_detach(Ok(false), "heat it").unwrap());
        assert!(!needs_detach(Err(rusb::Error::NotSupported), "heat it").unwrap());
        assert!(matches!(
            needs_detach(Err(rusb::Error::Access), "heat it"),
            Err(ConfigurationError::DetachDriver {
                source: rusb::Error::Access,
                ..
            })
        ));
    }

    #[test]
    fn endpoint_not_found_is_wrapped() {
        let error = ConfigurationError::Endpoint {
            device: "heat it".to_owned(),
            source: EndpointNotFound {
                direction: Direction::In,
                interface: 0,
            },
        };
        assert_eq!(error.to_string(), "endpoint not found for heat it");
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "no bulk In endpoint on interface #0");
    }
}
