use crate::backend::{self, ConfigurationError};
use crate::prefs::Preferences;
use crate::support::{
    self, ConnectionFactory, SUPPORT_STATEMENTS, SupportStatement, UsbHandle, UsbId,
};
use log::{debug, warn};
use rusb::{DeviceDescriptor, UsbContext};
use std::fmt::Display;

/// A connected bite healer, ready to take commands.
pub trait BiteHealer: Display {
    /// Make sure the device is online and functional.
    fn self_test(&self) -> Result<(), backend::Error>;

    /// Tell the device to start heating up.
    fn start_with_preferences(&self, preferences: &Preferences) -> Result<(), backend::Error>;
}

/// What discovery needs to know about a USB device.
pub trait UsbDevice {
    fn usb_id(&self) -> Result<UsbId, rusb::Error>;

    /// Product string as reported by the device, if it has one.
    fn product_string(&self) -> Result<Option<String>, rusb::Error>;

    /// Serial number as reported by the device, if it has one.
    fn serial_number(&self) -> Result<Option<String>, rusb::Error>;
}

impl<T: UsbContext> UsbDevice for rusb::Device<T> {
    fn usb_id(&self) -> Result<UsbId, rusb::Error> {
        let descriptor = self.device_descriptor()?;
        Ok(UsbId::new(descriptor.vendor_id(), descriptor.product_id()))
    }

    fn product_string(&self) -> Result<Option<String>, rusb::Error> {
        read_string(self, DeviceDescriptor::product_string_index)
    }

    fn serial_number(&self) -> Result<Option<String>, rusb::Error> {
        read_string(self, DeviceDescriptor::serial_number_string_index)
    }
}

/// Reading string descriptors requires opening the device, which the host may not permit.
fn read_string<T: UsbContext>(
    device: &rusb::Device<T>,
    index: fn(&DeviceDescriptor) -> Option<u8>,
) -> Result<Option<String>, rusb::Error> {
    let descriptor = device.device_descriptor()?;
    let Some(index) = index(&descriptor) else {
        return Ok(None);
    };
    device.open()?.read_string_descriptor_ascii(index).map(Some)
}

/// What is known about a recognized device without connecting to it.
#[derive(Debug)]
pub struct Description<H: 'static = UsbHandle> {
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub statement: &'static SupportStatement<H>,
}

impl<H: 'static> Display for Description<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}  (S/N: {})",
            self.product_name.as_deref().unwrap_or("unknown"),
            self.serial_number.as_deref().unwrap_or("unknown")
        )
    }
}

/// A bite healer Itchcraft can drive, not yet connected.
pub struct SupportedBiteHealer<H: 'static = UsbHandle> {
    pub description: Description<H>,
    device: H,
    connection: ConnectionFactory<H>,
}

impl<H: 'static> SupportedBiteHealer<H> {
    /// Open a connection. The device is released when the returned driver is dropped.
    pub fn connect(self) -> Result<Box<dyn BiteHealer>, ConfigurationError> {
        (self.connection)(self.device)
    }
}

/// A recognized device, whether or not Itchcraft can drive it.
pub enum DeviceMetadata<H: 'static = UsbHandle> {
    Supported(SupportedBiteHealer<H>),
    Unsupported(Description<H>),
}

impl<H: 'static> DeviceMetadata<H> {
    pub fn description(&self) -> &Description<H> {
        match self {
            DeviceMetadata::Supported(device) => &device.description,
            DeviceMetadata::Unsupported(description) => description,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, DeviceMetadata::Supported(_))
    }
}

impl<H: 'static> Display for DeviceMetadata<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Display::fmt(self.description(), f)
    }
}

/// Enumerate the host's USB devices and yield every recognized bite healer, supported or not.
/// Each call enumerates anew.
pub fn find_bite_healers() -> Result<impl Iterator<Item = DeviceMetadata>, rusb::Error> {
    let devices: Vec<UsbHandle> = rusb::devices()?.iter().collect();
    Ok(identify_all(SUPPORT_STATEMENTS, devices))
}

/// Match each of `devices` against `statements`, skipping those that aren't listed.
pub fn identify_all<H: UsbDevice + 'static>(
    statements: &'static [SupportStatement<H>],
    devices: impl IntoIterator<Item = H>,
) -> impl Iterator<Item = DeviceMetadata<H>> {
    devices
        .into_iter()
        .filter_map(move |device| identify(statements, device))
}

/// Match a single device against `statements`.
pub fn identify<H: UsbDevice + 'static>(
    statements: &'static [SupportStatement<H>],
    device: H,
) -> Option<DeviceMetadata<H>> {
    let id = match device.usb_id() {
        Ok(id) => id,
        Err(e) => {
            debug!("Skipping device with unreadable descriptor: {e}");
            return None;
        }
    };
    let statement = support::lookup_in(statements, id)?;

    // Only bother the user about devices they can actually use.
    let string_or_none = |result: Result<Option<String>, rusb::Error>, what: &str| match result {
        Ok(s) => s,
        Err(e) => {
            if statement.is_supported() {
                warn!("Unable to read {what} of {statement}: {e}; check USB permissions");
            }
            None
        }
    };
    let description = Description {
        product_name: string_or_none(device.product_string(), "product name"),
        serial_number: string_or_none(device.serial_number(), "serial number"),
        statement,
    };

    Some(match statement.connection_factory() {
        Some(connection) => DeviceMetadata::Supported(SupportedBiteHealer {
            description,
            device,
            connection,
        }),
        None => DeviceMetadata::Unsupported(description),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::Support;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct FakeDevice {
        id: UsbId,
        strings_readable: bool,
        string_reads: Rc<Cell<usize>>,
    }

    impl FakeDevice {
        fn new(vid: u16, pid: u16) -> Self {
            Self {
                id: UsbId::new(vid, pid),
                strings_readable: true,
                string_reads: Rc::default(),
            }
        }

        fn locked(vid: u16, pid: u16) -> Self {
            Self {
                strings_readable: false,
                ..Self::new(vid, pid)
            }
        }
    }

    impl UsbDevice for FakeDevice {
        fn usb_id(&self) -> Result<UsbId, rusb::Error> {
            Ok(self.id)
        }

        fn product_string(&self) -> Result<Option<String>, rusb::Error> {
            self.string_reads.set(self.string_reads.get() + 1);
            if self.strings_readable {
                Ok(Some("Heat it".to_owned()))
            } else {
                Err(rusb::Error::Access)
            }
        }

        fn serial_number(&self) -> Result<Option<String>, rusb::Error> {
            if self.strings_readable {
                Ok(None)
            } else {
                Err(rusb::Error::Access)
            }
        }
    }

    fn never_connects(_: FakeDevice) -> Result<Box<dyn BiteHealer>, ConfigurationError> {
        Err(ConfigurationError::InterfaceNotFound {
            device: "fake".to_owned(),
        })
    }

    static STATEMENTS: &[SupportStatement<FakeDevice>] = &[
        SupportStatement {
            id: UsbId::new(0x32f9, 0xfcba),
            vendor_name: "Kamedi GmbH",
            product_name: "heat it",
            comment: None,
            support: Support::Supported(never_connects),
        },
        SupportStatement {
            id: UsbId::new(0x10c4, 0x8c9b),
            vendor_name: "Kamedi GmbH",
            product_name: "heat it (legacy)",
            comment: Some("legacy"),
            support: Support::Unsupported,
        },
    ];

    #[test]
    fn unknown_devices_are_skipped() {
        let found: Vec<_> = identify_all(
            STATEMENTS,
            [
                FakeDevice::new(0x05a7, 0x40fe),
                FakeDevice::new(0x32f9, 0x0007),
                FakeDevice::new(0xfcba, 0x32f9),
            ],
        )
        .collect();
        assert!(found.is_empty());
    }

    #[test]
    fn known_devices_keep_enumeration_order() {
        let found: Vec<_> = identify_all(
            STATEMENTS,
            [
                FakeDevice::new(0x10c4, 0x8c9b),
                FakeDevice::new(0x1d6b, 0x0002),
                FakeDevice::new(0x32f9, 0xfcba),
            ],
        )
        .collect();
        assert_eq!(found.len(), 2);
        assert!(!found[0].is_supported());
        assert!(std::ptr::eq(found[0].description().statement, &STATEMENTS[1]));
        assert!(found[1].is_supported());
        assert!(std::ptr::eq(found[1].description().statement, &STATEMENTS[0]));
    }

    #[test]
    fn unknown_devices_are_not_opened() {
        let device = FakeDevice::new(0x05a7, 0x40fe);
        let string_reads = device.string_reads.clone();
        assert!(identify(STATEMENTS, device).is_none());
        assert_eq!(string_reads.get(), 0);
    }

    #[test]
    fn unreadable_strings_become_absent() {
        for device in [FakeDevice::locked(0x32f9, 0xfcba), FakeDevice::locked(0x10c4, 0x8c9b)] {
            let found = identify(STATEMENTS, device).unwrap();
            assert_eq!(found.description().product_name, None);
            assert_eq!(found.description().serial_number, None);
        }
    }

    #[test]
    fn supported_devices_connect_through_their_factory() {
        let Some(DeviceMetadata::Supported(device)) =
            identify(STATEMENTS, FakeDevice::new(0x32f9, 0xfcba))
        else {
            panic!("expected a supported device");
        };
        assert!(matches!(
            device.connect(),
            Err(ConfigurationError::InterfaceNotFound { .. })
        ));
    }

    #[test]
    fn display() {
        let found = identify(STATEMENTS, FakeDevice::new(0x32f9, 0xfcba)).unwrap();
        assert_eq!(found.to_string(), "Heat it  (S/N: unknown)");
    }
}
