//! Coordinate hierarchy of the wafer substrate.
//!
//! One wafer carries 48 FPGAs. Each FPGA drives exactly one DNC (its
//! reticle), each DNC serves 8 HICANNs, giving 384 HICANN positions per
//! wafer. HICANN enumeration is reticle-major: `hicann = fpga * 8 + slot`.
//!
//! All coordinates are immutable value types, compared and ordered by their
//! underlying integer enumeration. Constructors validate the range: an
//! out-of-range value is rejected, never truncated.

use std::fmt;

/// Declares a bounded on-wafer coordinate backed by an integer enumeration.
macro_rules! bounded_coord {
    ($(#[$doc:meta])* $name:ident, $repr:ty, $count:expr, $prefix:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($repr);

        impl $name {
            /// Number of valid enumeration values.
            pub const COUNT: usize = $count;

            /// Create from the enumeration value, `None` if out of range.
            pub fn new(value: $repr) -> Option<Self> {
                (usize::from(value) < Self::COUNT).then_some(Self(value))
            }

            /// The underlying enumeration value.
            pub const fn value(self) -> $repr {
                self.0
            }

            /// Iterate all valid coordinates in enumeration order.
            #[allow(clippy::cast_possible_truncation)]
            pub fn iter_all() -> impl Iterator<Item = Self> {
                (0..Self::COUNT).map(|v| Self(v as $repr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

/// Wafer identifier. Any value is a valid wafer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wafer(u16);

impl Wafer {
    /// Create from the wafer enumeration value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// The underlying enumeration value.
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Wafer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

bounded_coord!(
    /// FPGA position on a wafer.
    FpgaOnWafer, u8, 48, "F"
);

bounded_coord!(
    /// DNC position on a wafer. On this substrate each FPGA drives exactly
    /// one DNC, so the enumeration coincides with [`FpgaOnWafer`].
    DncOnWafer, u8, 48, "D"
);

bounded_coord!(
    /// HICANN position on a wafer.
    HicannOnWafer, u16, 384, "H"
);

bounded_coord!(
    /// HICANN slot within one DNC/reticle.
    HicannOnDnc, u8, 8, "h"
);

bounded_coord!(
    /// Highspeed link within one DNC, one per HICANN slot.
    HighspeedLinkOnDnc, u8, 8, "HS"
);

bounded_coord!(
    /// Analog output channel of a HICANN.
    AnalogOnHicann, u8, 2, "A"
);

impl FpgaOnWafer {
    /// The DNC driven by this FPGA.
    pub const fn dnc(self) -> DncOnWafer {
        DncOnWafer(self.0)
    }

    /// Attach a wafer to form a global coordinate.
    pub const fn global(self, wafer: Wafer) -> FpgaGlobal {
        FpgaGlobal { fpga: self, wafer }
    }
}

impl DncOnWafer {
    /// The FPGA driving this DNC.
    pub const fn fpga(self) -> FpgaOnWafer {
        FpgaOnWafer(self.0)
    }

    /// Attach a wafer to form a global coordinate.
    pub const fn global(self, wafer: Wafer) -> DncGlobal {
        DncGlobal { dnc: self, wafer }
    }
}

impl HicannOnWafer {
    /// The FPGA serving this HICANN.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn fpga(self) -> FpgaOnWafer {
        FpgaOnWafer((self.0 / 8) as u8)
    }

    /// The DNC serving this HICANN.
    pub const fn dnc(self) -> DncOnWafer {
        self.fpga().dnc()
    }

    /// Slot of this HICANN within its reticle.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn on_dnc(self) -> HicannOnDnc {
        HicannOnDnc((self.0 % 8) as u8)
    }

    /// The highspeed link wired to this HICANN.
    pub const fn highspeed_link(self) -> HighspeedLinkOnDnc {
        self.on_dnc().highspeed_link()
    }

    /// Attach a wafer to form a global coordinate.
    pub const fn global(self, wafer: Wafer) -> HicannGlobal {
        HicannGlobal {
            hicann: self,
            wafer,
        }
    }
}

impl HicannOnDnc {
    /// The on-wafer coordinate of this slot within the given reticle.
    pub const fn on_wafer(self, dnc: DncOnWafer) -> HicannOnWafer {
        HicannOnWafer(dnc.0 as u16 * 8 + self.0 as u16)
    }

    /// The highspeed link wired to this slot.
    pub const fn highspeed_link(self) -> HighspeedLinkOnDnc {
        HighspeedLinkOnDnc(self.0)
    }
}

impl HighspeedLinkOnDnc {
    /// The HICANN slot served by this link.
    pub const fn hicann(self) -> HicannOnDnc {
        HicannOnDnc(self.0)
    }
}

/// FPGA coordinate qualified with its wafer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FpgaGlobal {
    /// FPGA position on the wafer.
    pub fpga: FpgaOnWafer,
    /// The wafer.
    pub wafer: Wafer,
}

impl fmt::Display for FpgaGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.wafer, self.fpga)
    }
}

/// DNC coordinate qualified with its wafer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DncGlobal {
    /// DNC position on the wafer.
    pub dnc: DncOnWafer,
    /// The wafer.
    pub wafer: Wafer,
}

impl fmt::Display for DncGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.wafer, self.dnc)
    }
}

/// HICANN coordinate qualified with its wafer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HicannGlobal {
    /// HICANN position on the wafer.
    pub hicann: HicannOnWafer,
    /// The wafer.
    pub wafer: Wafer,
}

impl HicannGlobal {
    /// The FPGA serving this HICANN, on the same wafer.
    pub const fn fpga(self) -> FpgaGlobal {
        FpgaGlobal {
            fpga: self.hicann.fpga(),
            wafer: self.wafer,
        }
    }

    /// The DNC serving this HICANN, on the same wafer.
    pub const fn dnc(self) -> DncGlobal {
        DncGlobal {
            dnc: self.hicann.dnc(),
            wafer: self.wafer,
        }
    }
}

impl fmt::Display for HicannGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.wafer, self.hicann)
    }
}
