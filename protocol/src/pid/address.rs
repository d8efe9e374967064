//! Normalized addresses and disclosure precision.
//!
//! A [`NormalizedAddress`] is what the external normalizer hands us: one
//! canonical code per administrative level, uppercase, no free text. This
//! module only checks *shape*. Whether `13` really is Tokyo is the
//! normalizer's business.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PidError;
use crate::config::MAX_COMPONENT_LENGTH;

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// How many administrative levels a PID discloses.
///
/// There is deliberately no level for building or unit: those identify a
/// single household and stay inside the encrypted vault record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Country,
    Admin1,
    Admin2,
    Locality,
    Sublocality,
    Block,
}

impl Precision {
    /// All precisions from coarsest to finest.
    pub const ALL: [Precision; 6] = [
        Precision::Country,
        Precision::Admin1,
        Precision::Admin2,
        Precision::Locality,
        Precision::Sublocality,
        Precision::Block,
    ];

    /// Wire byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Number of levels below the country that this precision carries.
    pub fn depth(self) -> usize {
        self as usize
    }
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Block
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precision::Country => "country",
            Precision::Admin1 => "admin1",
            Precision::Admin2 => "admin2",
            Precision::Locality => "locality",
            Precision::Sublocality => "sublocality",
            Precision::Block => "block",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// NormalizedAddress
// ---------------------------------------------------------------------------

/// Names of the sub-country levels, in encoding order.
pub const LEVEL_NAMES: [&str; 7] = [
    "admin1",
    "admin2",
    "locality",
    "sublocality",
    "block",
    "building",
    "unit",
];

/// A canonical, already-normalized address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub country: String,
    #[serde(default)]
    pub admin1: Option<String>,
    #[serde(default)]
    pub admin2: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub sublocality: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl NormalizedAddress {
    /// Start an address with only its country set.
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Default::default()
        }
    }

    pub fn with_admin1(mut self, v: impl Into<String>) -> Self {
        self.admin1 = Some(v.into());
        self
    }

    pub fn with_admin2(mut self, v: impl Into<String>) -> Self {
        self.admin2 = Some(v.into());
        self
    }

    pub fn with_locality(mut self, v: impl Into<String>) -> Self {
        self.locality = Some(v.into());
        self
    }

    pub fn with_sublocality(mut self, v: impl Into<String>) -> Self {
        self.sublocality = Some(v.into());
        self
    }

    pub fn with_block(mut self, v: impl Into<String>) -> Self {
        self.block = Some(v.into());
        self
    }

    pub fn with_building(mut self, v: impl Into<String>) -> Self {
        self.building = Some(v.into());
        self
    }

    pub fn with_unit(mut self, v: impl Into<String>) -> Self {
        self.unit = Some(v.into());
        self
    }

    /// Sub-country levels in encoding order, building and unit included.
    pub fn levels(&self) -> [Option<&str>; 7] {
        [
            self.admin1.as_deref(),
            self.admin2.as_deref(),
            self.locality.as_deref(),
            self.sublocality.as_deref(),
            self.block.as_deref(),
            self.building.as_deref(),
            self.unit.as_deref(),
        ]
    }

    /// The levels a PID at `precision` discloses.
    pub fn disclosed(&self, precision: Precision) -> Vec<Option<&str>> {
        self.levels()[..precision.depth()].to_vec()
    }

    /// Copy of this address with every level finer than `precision`
    /// removed. Building and unit are always removed.
    pub fn truncate(&self, precision: Precision) -> NormalizedAddress {
        let keep = |level: Precision, v: &Option<String>| {
            if level <= precision {
                v.clone()
            } else {
                None
            }
        };
        NormalizedAddress {
            country: self.country.clone(),
            admin1: keep(Precision::Admin1, &self.admin1),
            admin2: keep(Precision::Admin2, &self.admin2),
            locality: keep(Precision::Locality, &self.locality),
            sublocality: keep(Precision::Sublocality, &self.sublocality),
            block: keep(Precision::Block, &self.block),
            building: None,
            unit: None,
        }
    }

    /// Check the country code, every present component, and the
    /// country-specific rules.
    pub fn validate(&self) -> Result<(), PidError> {
        validate_country(&self.country)?;
        for (name, value) in LEVEL_NAMES.iter().zip(self.levels()) {
            if let Some(value) = value {
                validate_component(name, value)?;
            }
        }
        validate_country_rules(self)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> PidError {
    PidError::InvalidComponent {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// ISO 3166-1 alpha-2 shape: exactly two ASCII uppercase letters.
pub fn validate_country(country: &str) -> Result<(), PidError> {
    if country.is_empty() {
        return Err(invalid("country", "missing"));
    }
    if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(invalid("country", "must be two uppercase letters"));
    }
    Ok(())
}

/// `[A-Z0-9-]`, 1..=MAX_COMPONENT_LENGTH, no leading or trailing dash.
pub fn validate_component(field: &str, value: &str) -> Result<(), PidError> {
    if value.is_empty() {
        return Err(invalid(field, "empty"));
    }
    if value.len() > MAX_COMPONENT_LENGTH {
        return Err(invalid(field, format!("longer than {MAX_COMPONENT_LENGTH} bytes")));
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(field, "must be uppercase alphanumeric or '-'"));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(invalid(field, "must not start or end with '-'"));
    }
    Ok(())
}

fn validate_country_rules(address: &NormalizedAddress) -> Result<(), PidError> {
    let Some(admin1) = address.admin1.as_deref() else {
        return Ok(());
    };
    match address.country.as_str() {
        "JP" => {
            let code: u8 = admin1
                .parse()
                .ok()
                .filter(|_| admin1.len() == 2)
                .ok_or_else(|| invalid("admin1", "JP prefecture code must be two digits"))?;
            if !(1..=47).contains(&code) {
                return Err(invalid("admin1", "JP prefecture code must be 01-47"));
            }
        }
        "US" => {
            if admin1.len() != 2 || !admin1.bytes().all(|b| b.is_ascii_uppercase()) {
                return Err(invalid("admin1", "US state code must be two letters"));
            }
        }
        "CN" => {
            if admin1.len() != 2 || !admin1.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("admin1", "CN province code must be two digits"));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokyo() -> NormalizedAddress {
        NormalizedAddress::new("JP")
            .with_admin1("13")
            .with_admin2("101")
            .with_locality("1-1")
            .with_building("5F")
    }

    #[test]
    fn precision_ordering_and_bytes() {
        assert!(Precision::Country < Precision::Block);
        assert_eq!(Precision::default(), Precision::Block);
        for p in Precision::ALL {
            assert_eq!(Precision::from_u8(p.as_u8()), Some(p));
        }
        assert_eq!(Precision::from_u8(6), None);
    }

    #[test]
    fn truncate_drops_building_and_unit_always() {
        let t = tokyo().with_unit("R342").truncate(Precision::Block);
        assert_eq!(t.locality.as_deref(), Some("1-1"));
        assert!(t.building.is_none());
        assert!(t.unit.is_none());
    }

    #[test]
    fn truncate_to_admin1() {
        let t = tokyo().truncate(Precision::Admin1);
        assert_eq!(t, NormalizedAddress::new("JP").with_admin1("13"));
    }

    #[test]
    fn valid_address_passes() {
        assert!(tokyo().validate().is_ok());
        assert!(NormalizedAddress::new("US").with_admin1("CA").validate().is_ok());
    }

    #[test]
    fn missing_country_rejected() {
        let err = NormalizedAddress::default().validate().unwrap_err();
        assert!(matches!(err, PidError::InvalidComponent { ref field, .. } if field == "country"));
    }

    #[test]
    fn lowercase_country_rejected() {
        assert!(NormalizedAddress::new("jp").validate().is_err());
        assert!(NormalizedAddress::new("JPN").validate().is_err());
    }

    #[test]
    fn jp_prefecture_range_enforced() {
        assert!(NormalizedAddress::new("JP").with_admin1("48").validate().is_err());
        assert!(NormalizedAddress::new("JP").with_admin1("00").validate().is_err());
        assert!(NormalizedAddress::new("JP").with_admin1("1").validate().is_err());
        assert!(NormalizedAddress::new("JP").with_admin1("47").validate().is_ok());
    }

    #[test]
    fn us_state_must_be_letters() {
        assert!(NormalizedAddress::new("US").with_admin1("06").validate().is_err());
    }

    #[test]
    fn component_shape_rules() {
        assert!(validate_component("block", "B12").is_ok());
        assert!(validate_component("block", "b12").is_err());
        assert!(validate_component("block", "-12").is_err());
        assert!(validate_component("block", "B 12").is_err());
        assert!(validate_component("block", &"9".repeat(MAX_COMPONENT_LENGTH + 1)).is_err());
    }

    #[test]
    fn building_is_validated_even_though_never_encoded() {
        let err = tokyo().with_building("5f").validate().unwrap_err();
        assert!(matches!(err, PidError::InvalidComponent { ref field, .. } if field == "building"));
    }
}
