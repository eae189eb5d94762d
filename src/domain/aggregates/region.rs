//! Region Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::CountryCode;

/// A set of countries sharing a currency and tax configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub currency_code: String,
    #[serde(default)]
    pub countries: Vec<RegionCountry>,
    #[serde(default = "default_automatic_taxes")]
    pub automatic_taxes: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionCountry {
    pub iso_2: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_automatic_taxes() -> bool { true }

impl Region {
    /// Country codes this region can be looked up by. Malformed entries are skipped.
    pub fn country_codes(&self) -> impl Iterator<Item = CountryCode> + '_ {
        self.countries.iter().filter_map(|c| CountryCode::new(c.iso_2.as_str()).ok())
    }
}

/// A way to ship a cart, as offered by `GET /store/shipping-options`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub amount: Decimal,
}
