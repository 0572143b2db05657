use crate::backend::{
    BulkTransfer, ConfigurationError, Error, ProtocolError, UsbBulkTransferDevice,
};
use crate::devices::BiteHealer;
use crate::prefs::Preferences;
use crate::retry::{RetryPolicy, retry};
use crate::support::UsbHandle;
use log::{debug, info, warn};
use std::fmt::Display;

/// Length of every response a "heat it" sends back.
pub const RESPONSE_LENGTH: usize = 12;

const FRAME_START: u8 = 0xff;

const TEST_BOOTLOADER: [u8; 2] = [FRAME_START, 0xb0];
const GET_STATUS: [u8; 3] = [FRAME_START, 0x02, 0x02];
const MSG_START_HEATING: u8 = 0x08;

/// Connection factory for the "heat it" models in the support table.
pub fn connect(device: UsbHandle) -> Result<Box<dyn BiteHealer>, ConfigurationError> {
    let transport = UsbBulkTransferDevice::open(&device)?;
    Ok(Box::new(HeatItDevice::new(transport)))
}

/// Build the MSG_START_HEATING request for the given preferences: frame start, three payload
/// bytes and a checksum over the payload.
pub fn start_heating_request(preferences: &Preferences) -> [u8; 5] {
    let duration = u8::from(preferences.duration) - 1;
    let generation = u8::from(preferences.generation) - 1;
    let skin_sensitivity = u8::from(preferences.skin_sensitivity) - 1;

    let payload = [
        MSG_START_HEATING,
        (generation << 1) + skin_sensitivity,
        duration,
    ];
    [
        FRAME_START,
        payload[0],
        payload[1],
        payload[2],
        checksum(&payload),
    ]
}

/// Sum of all bytes, wrapping at 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Check that the last byte of a request is the checksum of everything between the frame start
/// and itself.
pub fn has_valid_checksum(request: &[u8]) -> bool {
    match request {
        [FRAME_START, payload @ .., expected] => checksum(payload) == *expected,
        _ => false,
    }
}

/// A "heat it" bite healer, configured over USB.
pub struct HeatItDevice<D> {
    device: D,
    retry_policy: RetryPolicy,
}

impl<D: BulkTransfer> HeatItDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Use a different policy for retrying the self-test.
    pub fn with_retry_policy(self, retry_policy: RetryPolicy) -> Self {
        Self {
            retry_policy,
            ..self
        }
    }

    pub fn test_bootloader(&self) -> Result<Vec<u8>, Error> {
        self.command(&TEST_BOOTLOADER, "TEST_BOOTLOADER")
    }

    pub fn get_status(&self) -> Result<Vec<u8>, Error> {
        self.command(&GET_STATUS, "GET_STATUS")
    }

    pub fn msg_start_heating(&self, preferences: &Preferences) -> Result<Vec<u8>, Error> {
        self.command(&start_heating_request(preferences), "MSG_START_HEATING")
    }

    fn command(&self, request: &[u8], name: &'static str) -> Result<Vec<u8>, Error> {
        info!("Sending command: {name}");
        let response = self.device.bulk_transfer(request)?;
        if response.len() != RESPONSE_LENGTH {
            return Err(ProtocolError::ResponseLength {
                expected: RESPONSE_LENGTH,
                actual: response.len(),
            }
            .into());
        }
        Ok(response)
    }
}

impl<D: BulkTransfer> BiteHealer for HeatItDevice<D> {
    fn self_test(&self) -> Result<(), Error> {
        retry(&self.retry_policy, Error::is_transient, || {
            let response = self.test_bootloader()?;
            debug!("Response: {response:02x?}");
            let response = self.get_status()?;
            debug!("Response: {response:02x?}");
            Ok(())
        })
    }

    fn start_with_preferences(&self, preferences: &Preferences) -> Result<(), Error> {
        let response = self.msg_start_heating(preferences)?;
        debug!("Response: {response:02x?}");

        info!("Device now preheating.");
        info!("Watch the LED closely.");
        info!("It will blink purple, then stop");
        info!("and light up blue.");

        warn!("While using this app, your");
        warn!("bite healer is NOT SAFE for");
        warn!("use on human skin.");

        info!("Once the LED turns green,");
        info!("the tech demo has completed.");
        Ok(())
    }
}

impl<D: BulkTransfer> Display for HeatItDevice<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}  (S/N: {})",
            self.device
                .product_name()
                .unwrap_or("unknown, self-identifies as heat-it"),
            self.device.serial_number().unwrap_or("unknown")
        )
    }
}
