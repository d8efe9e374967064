//! Shipping conditions and parcel measurements.
//!
//! Conditions arrive in requester units (kilograms, centimetres or
//! inches) and are evaluated in integer grams and millimetres, the units
//! the proof circuit works in. Limits round down, parcel measurements
//! round up, so rounding can never turn a failing parcel into a passing
//! one.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{CONDITION_SLOTS, DOMAIN_CONDITIONS};
use crate::crypto::hash::tagged_field;
use crate::crypto::signatures::canonical_bytes;
use crate::pid::NormalizedAddress;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("invalid shipping condition: {0}")]
    Invalid(String),

    #[error("invalid parcel: {0}")]
    InvalidParcel(String),

    #[error("parcel information required to evaluate weight or size limits")]
    ParcelRequired,
}

/// Length unit for dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Cm,
    In,
}

impl LengthUnit {
    /// Millimetres per unit.
    fn to_mm(self) -> f64 {
        match self {
            LengthUnit::Cm => 10.0,
            LengthUnit::In => 25.4,
        }
    }
}

/// Length × width × height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub unit: LengthUnit,
}

impl Dimensions {
    pub fn cm(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
            unit: LengthUnit::Cm,
        }
    }

    pub fn inches(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
            unit: LengthUnit::In,
        }
    }

    fn to_mm(self, rounding: Rounding) -> Option<[u64; 3]> {
        let factor = self.unit.to_mm();
        Some([
            to_units(self.length, factor, rounding)?,
            to_units(self.width, factor, rounding)?,
            to_units(self.height, factor, rounding)?,
        ])
    }
}

/// A requester's delivery predicate. Absent fields are unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingCondition {
    /// ISO-3166-1 alpha-2 codes.
    #[serde(default)]
    pub allowed_countries: Option<Vec<String>>,
    /// First-level subdivision codes, as in the address `admin1`.
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    /// Kilograms.
    #[serde(default)]
    pub max_weight: Option<f64>,
    #[serde(default)]
    pub max_dimensions: Option<Dimensions>,
}

impl ShippingCondition {
    pub fn countries<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_countries = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn regions<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_regions = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_weight_kg(mut self, kg: f64) -> Self {
        self.max_weight = Some(kg);
        self
    }

    pub fn max_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.max_dimensions = Some(dimensions);
        self
    }

    /// Structural checks: list sizes, entry shape, finite non-negative limits.
    pub fn validate(&self) -> Result<(), ConditionError> {
        for (name, list) in [
            ("allowedCountries", &self.allowed_countries),
            ("allowedRegions", &self.allowed_regions),
        ] {
            let Some(list) = list else { continue };
            if list.len() > CONDITION_SLOTS {
                return Err(ConditionError::Invalid(format!(
                    "{name} has {} entries (max {CONDITION_SLOTS})",
                    list.len()
                )));
            }
            if list.iter().any(|code| code.trim().is_empty()) {
                return Err(ConditionError::Invalid(format!("{name} has an empty entry")));
            }
        }
        self.limits().map(|_| ())
    }

    /// Limits in grams and millimetres, rounded down. Absent limits are
    /// `u64::MAX`.
    pub fn limits(&self) -> Result<Limits, ConditionError> {
        let weight_g = match self.max_weight {
            Some(kg) => to_units(kg, 1000.0, Rounding::Down)
                .ok_or_else(|| ConditionError::Invalid("maxWeight must be finite and >= 0".into()))?,
            None => u64::MAX,
        };
        let dims_mm = match self.max_dimensions {
            Some(d) => d.to_mm(Rounding::Down).ok_or_else(|| {
                ConditionError::Invalid("maxDimensions must be finite and >= 0".into())
            })?,
            None => [u64::MAX; 3],
        };
        Ok(Limits { weight_g, dims_mm })
    }

    /// Does any field constrain the parcel?
    pub fn needs_parcel(&self) -> bool {
        self.max_weight.is_some() || self.max_dimensions.is_some()
    }

    /// Evaluate every predicate against the true address and parcel.
    pub fn evaluate(
        &self,
        address: &NormalizedAddress,
        parcel: &Measurement,
    ) -> Result<bool, ConditionError> {
        self.validate()?;
        let limits = self.limits()?;

        let country_ok = contains_code(&self.allowed_countries, &address.country);
        let region_ok = contains_code(
            &self.allowed_regions,
            address.admin1.as_deref().unwrap_or_default(),
        );
        let weight_ok = parcel.weight_g <= limits.weight_g;
        let dims_ok = parcel
            .dims_mm
            .iter()
            .zip(limits.dims_mm.iter())
            .all(|(value, max)| value <= max);

        Ok(country_ok && region_ok && weight_ok && dims_ok)
    }

    /// Field element committing to the exact conditions: the tagged hash of
    /// their canonical JSON.
    pub fn digest(&self) -> Result<Fr, ConditionError> {
        let bytes = canonical_bytes(self).map_err(|e| ConditionError::Invalid(e.to_string()))?;
        Ok(tagged_field(DOMAIN_CONDITIONS, &bytes))
    }
}

/// Condition limits in circuit units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub weight_g: u64,
    /// Length, width, height.
    pub dims_mm: [u64; 3],
}

/// Parcel as declared by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParcelInfo {
    /// Kilograms.
    pub weight: f64,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

impl ParcelInfo {
    pub fn new(weight_kg: f64, dimensions: Option<Dimensions>) -> Self {
        Self {
            weight: weight_kg,
            dimensions,
        }
    }

    /// Grams and millimetres, rounded up. Missing dimensions measure zero.
    pub fn measure(&self) -> Result<Measurement, ConditionError> {
        let weight_g = to_units(self.weight, 1000.0, Rounding::Up)
            .ok_or_else(|| ConditionError::InvalidParcel("weight must be finite and >= 0".into()))?;
        let dims_mm = match self.dimensions {
            Some(d) => d.to_mm(Rounding::Up).ok_or_else(|| {
                ConditionError::InvalidParcel("dimensions must be finite and >= 0".into())
            })?,
            None => [0; 3],
        };
        Ok(Measurement { weight_g, dims_mm })
    }
}

/// A parcel in circuit units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    pub weight_g: u64,
    pub dims_mm: [u64; 3],
}

#[derive(Clone, Copy)]
enum Rounding {
    Up,
    Down,
}

fn to_units(value: f64, factor: f64, rounding: Rounding) -> Option<u64> {
    let scaled = value * factor;
    if !scaled.is_finite() || scaled < 0.0 {
        return None;
    }
    let rounded = match rounding {
        Rounding::Up => scaled.ceil(),
        Rounding::Down => scaled.floor(),
    };
    // `as` saturates at u64::MAX.
    Some(rounded as u64)
}

/// Canonical form of a country or region code for comparison and hashing.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn contains_code(list: &Option<Vec<String>>, value: &str) -> bool {
    match list {
        None => true,
        Some(codes) => {
            let value = normalize_code(value);
            codes.iter().any(|code| normalize_code(code) == value)
        }
    }
}
