use crate::backend::ConfigurationError;
use crate::devices::BiteHealer;
use crate::heat_it;
use std::fmt::Display;

const KAMEDI_VID: u16 = 0x32f9;
const SILABS_VID: u16 = 0x10c4;

const UNTESTED: &str = "\
Itchcraft hasn't been tested on this model, but it is expected to work
just fine. Feedback is welcome: please open an issue on
https://github.com/claui/itchcraft/issues and share your findings.";

/// Every VID/PID combination Itchcraft knows about, supported or not.
pub static SUPPORT_STATEMENTS: &[SupportStatement] = &[
    // Supported bite healers
    heat_it_board(0x0001, Some(UNTESTED)),
    heat_it_board(0x0002, Some(UNTESTED)),
    heat_it_board(0x0003, Some(UNTESTED)),
    heat_it_board(0x0004, Some(UNTESTED)),
    heat_it_board(0x0005, Some(UNTESTED)),
    heat_it_board(0x0006, Some(UNTESTED)),
    heat_it_board(0xfca9, Some(UNTESTED)),
    heat_it_board(0xfcba, None),
    // Unsupported bite healers
    unsupported(
        UsbId::new(SILABS_VID, 0x8c9b),
        "Kamedi GmbH",
        "heat it (legacy)",
        "Itchcraft doesn't work with this legacy model.",
    ),
    unsupported(
        UsbId::new(SILABS_VID, 0xea60),
        "mibeTec GmbH",
        "bite away® pro",
        "Support for this model is on the roadmap for a future release of Itchcraft.",
    ),
    unsupported(
        UsbId::new(SILABS_VID, 0xeac9),
        "Silicon Laboratories, Inc.",
        "EFM8UB1",
        "Stock EFM8 chipset; missing bite healer firmware.\n\
         Can't be used as a bite healer unless firmware is installed.",
    ),
    unsupported(
        UsbId::new(KAMEDI_VID, 0x0007),
        "Kamedi GmbH",
        "heat it",
        "Itchcraft is not compatible with this new model. If you'd like\n\
         support to be added, please open an issue on\n\
         https://github.com/claui/itchcraft/issues",
    ),
];

const fn heat_it_board(pid: u16, comment: Option<&'static str>) -> SupportStatement {
    SupportStatement {
        id: UsbId::new(KAMEDI_VID, pid),
        vendor_name: "Kamedi GmbH",
        product_name: "heat it",
        comment,
        support: Support::Supported(heat_it::connect),
    }
}

const fn unsupported(
    id: UsbId,
    vendor_name: &'static str,
    product_name: &'static str,
    comment: &'static str,
) -> SupportStatement {
    SupportStatement {
        id,
        vendor_name,
        product_name,
        comment: Some(comment),
        support: Support::Unsupported,
    }
}

/// The USB device type that real connection factories receive.
pub type UsbHandle = rusb::Device<rusb::GlobalContext>;

/// Opens a live driver for a device. Takes ownership of the device handle.
pub type ConnectionFactory<H = UsbHandle> =
    fn(H) -> Result<Box<dyn BiteHealer>, ConfigurationError>;

/// A USB vendor ID and product ID pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl Display for UsbId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Whether Itchcraft can drive a model. Only supported models carry a way to connect to them.
#[derive(Debug)]
pub enum Support<H = UsbHandle> {
    Supported(ConnectionFactory<H>),
    Unsupported,
}

/// Establishes whether a given VID/PID is a supported bite healer, and which model it is.
#[derive(Debug)]
pub struct SupportStatement<H = UsbHandle> {
    pub id: UsbId,
    /// Canonical vendor name, which may differ from what the device reports.
    pub vendor_name: &'static str,
    /// Canonical product name. Several board revisions may share one.
    pub product_name: &'static str,
    pub comment: Option<&'static str>,
    pub support: Support<H>,
}

impl<H> SupportStatement<H> {
    pub fn is_supported(&self) -> bool {
        matches!(self.support, Support::Supported(_))
    }

    pub fn connection_factory(&self) -> Option<ConnectionFactory<H>> {
        match self.support {
            Support::Supported(factory) => Some(factory),
            Support::Unsupported => None,
        }
    }
}

impl<H> Display for SupportStatement<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {} [{}]", self.vendor_name, self.product_name, self.id)
    }
}

/// Find the statement registered for a USB ID in the built-in table.
pub fn lookup(id: UsbId) -> Option<&'static SupportStatement> {
    lookup_in(SUPPORT_STATEMENTS, id)
}

/// Find the statement registered for a USB ID in an arbitrary table.
pub fn lookup_in<H>(statements: &[SupportStatement<H>], id: UsbId) -> Option<&SupportStatement<H>> {
    statements.iter().find(|statement| statement.id == id)
}
