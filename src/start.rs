use crate::backend::{self, ConfigurationError};
use crate::devices::{DeviceMetadata, find_bite_healers};
use crate::prefs::Preferences;
use log::{info, warn};
use thiserror::Error;

/// Activate (i.e. heat up) the first supported bite healer connected to the host.
pub fn start_with_preferences(preferences: &Preferences) -> Result<(), Error> {
    info!("Searching for bite healer");
    let candidates = find_bite_healers().map_err(Error::Enumeration)?;
    start_first_supported(candidates, preferences)
}

/// Pick the first supported device among `candidates`, test it and make it heat up. Candidates
/// are considered in the order given; the others are left alone. The connection is closed again
/// before this returns, whether or not it succeeds.
pub fn start_first_supported<H: 'static>(
    candidates: impl IntoIterator<Item = DeviceMetadata<H>>,
    preferences: &Preferences,
) -> Result<(), Error> {
    let mut supported = Vec::new();
    let mut first_unsupported = None;
    for candidate in candidates {
        match candidate {
            DeviceMetadata::Supported(device) => supported.push(device),
            DeviceMetadata::Unsupported(description) => {
                info!("Found unsupported device: {description} ({})", description.statement);
                if first_unsupported.is_none() {
                    first_unsupported = Some(description);
                }
            }
        }
    }

    let mut supported = supported.into_iter();
    let Some(device) = supported.next() else {
        return Err(match first_unsupported {
            Some(description) => DeviceError::Unsupported {
                device: description.to_string(),
                model: description.statement.to_string(),
            },
            None => DeviceError::NotConnected,
        }
        .into());
    };

    for rejected in supported {
        info!("Ignoring additional device: {}", rejected.description);
        warn!("Itchcraft can only use one device at a time.");
    }

    let bite_healer = device.connect()?;
    info!("Using device: {bite_healer}");
    info!("Using settings: {preferences}");
    bite_healer.self_test().map_err(Error::SelfTest)?;
    bite_healer
        .start_with_preferences(preferences)
        .map_err(Error::StartHeating)
}

/// Nothing usable is connected.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DeviceError {
    #[error("No bite healer connected")]
    NotConnected,

    #[error(
        "Unsupported bite healer: {model}, {device}. \
         Please report it on https://github.com/claui/itchcraft/issues"
    )]
    Unsupported { device: String, model: String },
}

/// Everything that can keep a bite healer from heating up.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("unable to enumerate USB devices")]
    Enumeration(#[source] rusb::Error),

    #[error("unable to set up bite healer")]
    Configuration(#[from] ConfigurationError),

    #[error("bite healer failed its self-test")]
    SelfTest(#[source] backend::Error),

    #[error("unable to start heating")]
    StartHeating(#[source] backend::Error),
}
