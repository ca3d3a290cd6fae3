use serde::{Deserialize, Serialize};
use validator::Validate;

/// A postal address used as ship-from or ship-to location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, message = "Address line 1 is required"))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    /// State or province code
    pub region: String,
    /// ISO 3166-1 alpha-2 country code
    #[validate(length(equal = 2, message = "Country must be a two-letter code"))]
    pub country: String,
    pub postal_code: String,
    /// Opaque identifier of the address in the host system
    #[serde(default)]
    pub address_code: Option<String>,
}

impl Address {
    pub fn new(
        line1: impl Into<String>,
        city: impl Into<String>,
        region: impl Into<String>,
        country: impl Into<String>,
        postal_code: impl Into<String>,
    ) -> Self {
        Self {
            line1: line1.into(),
            line2: None,
            city: city.into(),
            region: region.into(),
            country: country.into(),
            postal_code: postal_code.into(),
            address_code: None,
        }
    }

    pub fn with_line2(mut self, line2: impl Into<String>) -> Self {
        self.line2 = Some(line2.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.address_code = Some(code.into());
        self
    }

    /// Case-insensitive check of the country code against a list.
    pub fn is_in_any(&self, countries: &[&str]) -> bool {
        countries
            .iter()
            .any(|country| self.country.trim().eq_ignore_ascii_case(country))
    }

    /// True when no field that identifies a location is filled in.
    pub fn is_blank(&self) -> bool {
        self.line1.trim().is_empty()
            && self.city.trim().is_empty()
            && self.postal_code.trim().is_empty()
            && self.country.trim().is_empty()
    }
}
