//! Default lookup record for city-level databases.
//!
//! [`GeoRecord`] mirrors the fields of the GeoLite2 City schema that most
//! callers care about. Lookups are generic, so callers with different
//! databases (country-only, ASN, custom) can supply their own record type;
//! fields absent from a record decode to their defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Localized names keyed by language code ("en", "pt-BR", ...).
pub type Names = BTreeMap<String, String>;

/// Continent portion of a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Continent {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub names: Names,
}

/// Country portion of a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Country {
    #[serde(default)]
    pub iso_code: String,
    #[serde(default)]
    pub names: Names,
}

/// One subdivision (region/state) of a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subdivision {
    #[serde(default)]
    pub iso_code: String,
    #[serde(default)]
    pub names: Names,
}

/// City portion of a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub names: Names,
}

/// Coordinates and time zone of a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub metro_code: u16,
    #[serde(default)]
    pub time_zone: String,
}

/// Postal code portion of a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Postal {
    #[serde(default)]
    pub code: String,
}

/// Default record type for city-level database lookups.
///
/// An address that is in the database but has no data for a given section
/// leaves that section at its default. An address absent from the database
/// decodes to `GeoRecord::default()` entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(default)]
    pub continent: Continent,
    #[serde(default)]
    pub country: Country,
    #[serde(default)]
    pub subdivisions: Vec<Subdivision>,
    #[serde(default)]
    pub city: City,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub postal: Postal,
}

impl GeoRecord {
    /// True when the record carries no data at all.
    pub fn is_empty(&self) -> bool {
        *self == GeoRecord::default()
    }
}
