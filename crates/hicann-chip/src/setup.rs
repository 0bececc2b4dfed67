//! Setup types of the deployed systems.

use std::fmt;
use std::str::FromStr;

/// Kind of system a wafer is mounted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupType {
    /// First-generation full wafer system.
    FacetsWafer,
    /// Vertical lab setup.
    VSetup,
    /// Cube setup carrying single reticles.
    CubeSetup,
    /// BrainScaleS production wafer module, managed by a MACU.
    BssWafer,
}

impl SetupType {
    /// Canonical lower-case name as used in the hardware database.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FacetsWafer => "facetswafer",
            Self::VSetup => "vsetup",
            Self::CubeSetup => "cubesetup",
            Self::BssWafer => "bsswafer",
        }
    }
}

impl fmt::Display for SetupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown setup type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSetupType(pub String);

impl fmt::Display for UnknownSetupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown setup type: {:?}", self.0)
    }
}

impl std::error::Error for UnknownSetupType {}

impl FromStr for SetupType {
    type Err = UnknownSetupType;

    /// Setup type strings are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "facetswafer" => Ok(Self::FacetsWafer),
            "vsetup" => Ok(Self::VSetup),
            "cubesetup" => Ok(Self::CubeSetup),
            "bsswafer" => Ok(Self::BssWafer),
            _ => Err(UnknownSetupType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("CuBeSeTuP".parse(), Ok(SetupType::CubeSetup));
        assert_eq!("VSetup".parse(), Ok(SetupType::VSetup));
        assert_eq!("facetswafer".parse(), Ok(SetupType::FacetsWafer));
        assert_eq!("BSSWafer".parse(), Ok(SetupType::BssWafer));
    }

    #[test]
    fn unknown_setup_type_is_an_error() {
        assert!("wafer9000".parse::<SetupType>().is_err());
    }

    #[test]
    fn canonical_name_roundtrip() {
        for setup in [
            SetupType::FacetsWafer,
            SetupType::VSetup,
            SetupType::CubeSetup,
            SetupType::BssWafer,
        ] {
            assert_eq!(setup.name().parse(), Ok(setup));
        }
    }
}
