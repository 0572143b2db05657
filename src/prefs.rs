use num_enum::IntoPrimitive;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// How long a heating session lasts.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, IntoPrimitive)]
pub enum Duration {
    #[default]
    Short = 1,
    Medium = 2,
    Long = 3,
}

/// The age cohort of the person being treated.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, IntoPrimitive)]
pub enum Generation {
    #[default]
    Child = 1,
    Adult = 2,
}

/// Whether the person's skin is particularly sensitive.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, IntoPrimitive)]
pub enum SkinSensitivity {
    #[default]
    Sensitive = 1,
    Regular = 2,
}

/// A user-selectable setting with a small, fixed set of values, each named by a CLI token.
pub trait Preference: Copy + 'static {
    /// Name of the setting as the user sees it.
    const NAME: &'static str;
    const VARIANTS: &'static [Self];

    fn token(self) -> &'static str;

    /// Look up the variant named by `value`, ignoring case.
    fn parse(value: &str) -> Result<Self, PreferenceParseError> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|v| v.token().eq_ignore_ascii_case(value))
            .ok_or_else(|| PreferenceParseError {
                value: value.to_owned(),
                preference: Self::NAME,
                valid: Self::VARIANTS
                    .iter()
                    .map(|v| v.token())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl Preference for Duration {
    const NAME: &'static str = "duration";
    const VARIANTS: &'static [Self] = &[Duration::Short, Duration::Medium, Duration::Long];

    fn token(self) -> &'static str {
        match self {
            Duration::Short => "short",
            Duration::Medium => "medium",
            Duration::Long => "long",
        }
    }
}

impl Preference for Generation {
    const NAME: &'static str = "generation";
    const VARIANTS: &'static [Self] = &[Generation::Child, Generation::Adult];

    fn token(self) -> &'static str {
        match self {
            Generation::Child => "child",
            Generation::Adult => "adult",
        }
    }
}

impl Preference for SkinSensitivity {
    const NAME: &'static str = "skin_sensitivity";
    const VARIANTS: &'static [Self] = &[SkinSensitivity::Sensitive, SkinSensitivity::Regular];

    fn token(self) -> &'static str {
        match self {
            SkinSensitivity::Sensitive => "sensitive",
            SkinSensitivity::Regular => "regular",
        }
    }
}

impl FromStr for Duration {
    type Err = PreferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for Generation {
    type Err = PreferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for SkinSensitivity {
    type Err = PreferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} duration", self.token())
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl Display for SkinSensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} skin", self.token())
    }
}

/// Settings for one heating session.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Preferences {
    pub duration: Duration,
    pub generation: Generation,
    pub skin_sensitivity: SkinSensitivity,
}

impl Display for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.duration, self.generation, self.skin_sensitivity
        )
    }
}

/// A preference token that names none of the valid values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value `{value}`; valid values for {preference} are: {valid}")]
pub struct PreferenceParseError {
    pub value: String,
    pub preference: &'static str,
    pub valid: String,
}
