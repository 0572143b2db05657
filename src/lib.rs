/// Match USB IDs against the table of known bite healers.
pub mod support;

/// Talk to a USB device through a pair of bulk transfer endpoints.
pub mod backend;

/// Enumerate connected USB devices and identify bite healers among them.
pub mod devices;

/// Command protocol spoken by "heat it" bite healers.
pub mod heat_it;

/// User preferences for a heating session.
pub mod prefs;

/// Bounded retry loop with a fixed delay between attempts.
pub mod retry;

/// Pick a connected bite healer, test it and make it heat up.
pub mod start;
