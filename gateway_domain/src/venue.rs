use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tags the four upstream spot venues this gateway normalizes. `Reference` is
/// the venue the canonical model is modeled after (§3); `VenueB`/`VenueC`/
/// `VenueD` are the three alternates, each with its own wire shapes (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueTag {
    Reference,
    VenueB,
    VenueC,
    VenueD,
}

impl VenueTag {
    pub const ALL: [VenueTag; 4] = [
        VenueTag::Reference,
        VenueTag::VenueB,
        VenueTag::VenueC,
        VenueTag::VenueD,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VenueTag::Reference => "reference",
            VenueTag::VenueB => "venue_b",
            VenueTag::VenueC => "venue_c",
            VenueTag::VenueD => "venue_d",
        }
    }
}

impl fmt::Display for VenueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueTagParseError(pub String);

impl fmt::Display for VenueTagParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized venue tag: {}", self.0)
    }
}
impl std::error::Error for VenueTagParseError {}

impl FromStr for VenueTag {
    type Err = VenueTagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" | "binance" => Ok(VenueTag::Reference),
            "venue_b" | "kraken" => Ok(VenueTag::VenueB),
            "venue_c" | "bitfinex" => Ok(VenueTag::VenueC),
            "venue_d" | "okx" => Ok(VenueTag::VenueD),
            other => Err(VenueTagParseError(other.to_string())),
        }
    }
}
