//! PID wire format.
//!
//! ```text
//! <country, lowercase> 1 <bech32 data> <6-char checksum>
//!
//! data = version(1) | precision(1) | collision(1)
//!      | for each level admin1..=precision: len(1) || bytes
//! ```
//!
//! The HRP *is* the country, so PIDs from different countries can never
//! be equal. Only the BIP-173 checksum is accepted; a bech32m spelling of
//! the same payload is malformed. A level missing below the precision is written with length 0.
//! Nothing finer than the precision is written at all, not even its length.
//! The payload is a pure function of the truncated address, the precision
//! and the collision suffix.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::address::{validate_component, validate_country, NormalizedAddress, Precision, LEVEL_NAMES};
use super::PidError;
use crate::config::{MAX_COLLISION_SUFFIX, MAX_COMPONENT_LENGTH, PID_CODEC_VERSION, SUPPORTED_PID_VERSIONS};

/// Bytes before the first component.
const HEADER_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Pid
// ---------------------------------------------------------------------------

/// An address identifier. Always held in canonical (lowercase) form, and
/// only constructed from a string that decodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pid(String);

impl Pid {
    /// Validate and canonicalize a PID string.
    pub fn parse(s: &str) -> Result<Self, PidError> {
        decode_raw(s)?;
        Ok(Pid(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Country namespace, uppercase. Read straight from the HRP.
    pub fn country(&self) -> String {
        self.0[..2].to_ascii_uppercase()
    }

    /// Decode back to the truncated address.
    pub fn decode(&self) -> Result<NormalizedAddress, PidError> {
        decode(self.as_str())
    }

    /// Decode with header information.
    pub fn inspect(&self) -> Result<DecodedPid, PidError> {
        inspect(self.as_str())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Pid {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pid::parse(s)
    }
}

impl TryFrom<String> for Pid {
    type Error = PidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Pid::parse(&s)
    }
}

impl From<Pid> for String {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

/// Everything a PID carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPid {
    pub address: NormalizedAddress,
    pub precision: Precision,
    /// `Some(n)` for a `Cnn` collision suffix.
    pub collision: Option<u8>,
    pub version: u8,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `address` truncated to `precision`.
pub fn encode(address: &NormalizedAddress, precision: Precision) -> Result<Pid, PidError> {
    encode_with_collision(address, precision, None)
}

/// Encode with an explicit collision suffix (1..=99).
pub fn encode_with_collision(
    address: &NormalizedAddress,
    precision: Precision,
    collision: Option<u8>,
) -> Result<Pid, PidError> {
    address.validate()?;
    if let Some(n) = collision {
        if n == 0 || n > MAX_COLLISION_SUFFIX {
            return Err(PidError::InvalidCollision(n));
        }
    }

    let truncated = address.truncate(precision);
    let mut data = Vec::with_capacity(HEADER_LEN + precision.depth() * (MAX_COMPONENT_LENGTH + 1));
    data.push(PID_CODEC_VERSION);
    data.push(precision.as_u8());
    data.push(collision.unwrap_or(0));
    for level in truncated.disclosed(precision) {
        let bytes = level.unwrap_or("").as_bytes();
        data.push(bytes.len() as u8);
        data.extend_from_slice(bytes);
    }

    let hrp = Hrp::parse(&truncated.country.to_ascii_lowercase())
        .map_err(|e| PidError::Malformed(e.to_string()))?;
    let encoded =
        bech32::encode::<Bech32>(hrp, &data).map_err(|e| PidError::Malformed(e.to_string()))?;
    Ok(Pid(encoded))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a PID string to its truncated address.
pub fn decode(pid: &str) -> Result<NormalizedAddress, PidError> {
    Ok(decode_raw(pid)?.address)
}

/// Decode a PID string together with its header fields.
pub fn inspect(pid: &str) -> Result<DecodedPid, PidError> {
    decode_raw(pid)
}

fn decode_raw(pid: &str) -> Result<DecodedPid, PidError> {
    // Plain bech32 only. `bech32::decode` would also take a bech32m
    // checksum, giving a second spelling of the same payload.
    let checked =
        CheckedHrpstring::new::<Bech32>(pid).map_err(|e| PidError::Malformed(e.to_string()))?;
    let hrp = checked.hrp();
    let data: Vec<u8> = checked.byte_iter().collect();

    let country = hrp.to_string().to_ascii_uppercase();
    validate_country(&country).map_err(|_| PidError::Malformed("bad country namespace".into()))?;

    if data.len() < HEADER_LEN {
        return Err(PidError::Malformed("payload too short".into()));
    }
    let version = data[0];
    if !SUPPORTED_PID_VERSIONS.contains(&version) {
        return Err(PidError::UnknownVersion(version));
    }
    let precision = Precision::from_u8(data[1])
        .ok_or_else(|| PidError::Malformed(format!("unknown precision {}", data[1])))?;
    let collision = match data[2] {
        0 => None,
        n if n <= MAX_COLLISION_SUFFIX => Some(n),
        n => return Err(PidError::Malformed(format!("collision suffix {n} out of range"))),
    };

    let mut levels: Vec<Option<String>> = Vec::with_capacity(precision.depth());
    let mut rest = &data[HEADER_LEN..];
    for name in LEVEL_NAMES.iter().take(precision.depth()) {
        let (&len, tail) = rest
            .split_first()
            .ok_or_else(|| PidError::Malformed(format!("truncated at {name}")))?;
        let len = len as usize;
        if len > MAX_COMPONENT_LENGTH || tail.len() < len {
            return Err(PidError::Malformed(format!("bad length for {name}")));
        }
        let (bytes, tail) = tail.split_at(len);
        rest = tail;
        if len == 0 {
            levels.push(None);
            continue;
        }
        let value = std::str::from_utf8(bytes)
            .map_err(|_| PidError::Malformed(format!("{name} is not UTF-8")))?;
        validate_component(name, value).map_err(|e| PidError::Malformed(e.to_string()))?;
        levels.push(Some(value.to_string()));
    }
    if !rest.is_empty() {
        return Err(PidError::Malformed("trailing bytes".into()));
    }

    levels.resize(5, None);
    let mut levels = levels.into_iter();
    let mut next = || levels.next().flatten();
    let address = NormalizedAddress {
        country,
        admin1: next(),
        admin2: next(),
        locality: next(),
        sublocality: next(),
        block: next(),
        building: None,
        unit: None,
    };
    address
        .validate()
        .map_err(|e| PidError::Malformed(e.to_string()))?;

    Ok(DecodedPid {
        address,
        precision,
        collision,
        version,
    })
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

    fn full() -> NormalizedAddress {
        NormalizedAddress::new("JP")
            .with_admin1("13")
            .with_admin2("113")
            .with_locality("01")
            .with_sublocality("T07")
            .with_block("B12")
            .with_building("BN02")
            .with_unit("R342")
    }

    #[test]
    fn roundtrip_at_every_precision() {
        for p in Precision::ALL {
            let pid = encode(&full(), p).unwrap();
            assert_eq!(decode(pid.as_str()).unwrap(), full().truncate(p), "precision {p}");
        }
    }

    #[test]
    fn roundtrip_with_gap_below_precision() {
        // admin2 and locality present, sublocality absent, block present.
        let addr = NormalizedAddress::new("JP")
            .with_admin1("13")
            .with_locality("01")
            .with_block("B12");
        let pid = encode(&addr, Precision::Block).unwrap();
        assert_eq!(pid.decode().unwrap(), addr);
    }

    #[test]
    fn deterministic() {
        let a = encode(&tokyo(), Precision::Block).unwrap();
        let b = encode(&tokyo(), Precision::Block).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn building_and_unit_do_not_affect_pid() {
        let a = encode(&tokyo(), Precision::Block).unwrap();
        let b = encode(&tokyo().with_building("12F").with_unit("1201"), Precision::Block).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn levels_beyond_precision_do_not_leak_through_length() {
        let short = full().with_block("B1");
        let long = full().with_block("B1234567890");
        let a = encode(&short, Precision::Sublocality).unwrap();
        let b = encode(&long, Precision::Sublocality).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), b.as_str().len());
    }

    #[test]
    fn country_namespacing() {
        let jp = encode(&NormalizedAddress::new("JP").with_admin1("13"), Precision::Admin1).unwrap();
        let cn = encode(&NormalizedAddress::new("CN").with_admin1("13"), Precision::Admin1).unwrap();
        assert_ne!(jp, cn);
        assert_eq!(jp.country(), "JP");
        assert_eq!(cn.country(), "CN");
        assert!(jp.as_str().starts_with("jp1"));
    }

    #[test]
    fn collision_suffix_changes_pid_and_roundtrips() {
        let base = encode(&tokyo(), Precision::Block).unwrap();
        let c1 = encode_with_collision(&tokyo(), Precision::Block, Some(1)).unwrap();
        assert_ne!(base, c1);
        let decoded = c1.inspect().unwrap();
        assert_eq!(decoded.collision, Some(1));
        assert_eq!(decoded.address, tokyo().truncate(Precision::Block));
        assert!(encode_with_collision(&tokyo(), Precision::Block, Some(0)).is_err());
        assert!(encode_with_collision(&tokyo(), Precision::Block, Some(100)).is_err());
    }

    #[test]
    fn inspect_reports_header() {
        let pid = encode(&tokyo(), Precision::Admin2).unwrap();
        let d = pid.inspect().unwrap();
        assert_eq!(d.version, PID_CODEC_VERSION);
        assert_eq!(d.precision, Precision::Admin2);
        assert_eq!(d.collision, None);
    }

    #[test]
    fn invalid_component_rejected() {
        let bad = NormalizedAddress::new("JP").with_admin1("99");
        assert!(matches!(
            encode(&bad, Precision::Block),
            Err(PidError::InvalidComponent { .. })
        ));
        assert!(matches!(
            encode(&NormalizedAddress::default(), Precision::Block),
            Err(PidError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn checksum_failure_is_malformed() {
        let pid = encode(&tokyo(), Precision::Block).unwrap();
        let mut chars: Vec<char> = pid.as_str().chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'q' { 'p' } else { 'q' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(decode(&tampered), Err(PidError::Malformed(_))));
    }

    #[test]
    fn bech32m_spelling_is_rejected() {
        let pid = encode(&tokyo(), Precision::Block).unwrap();
        let data: Vec<u8> = CheckedHrpstring::new::<Bech32>(pid.as_str())
            .unwrap()
            .byte_iter()
            .collect();
        let alias = bech32::encode::<bech32::Bech32m>(Hrp::parse("jp").unwrap(), &data).unwrap();
        assert_ne!(alias, pid.as_str());
        assert!(matches!(decode(&alias), Err(PidError::Malformed(_))));
        assert!(Pid::parse(&alias).is_err());
    }

    #[test]
    fn unknown_version_rejected() {
        let hrp = Hrp::parse("jp").unwrap();
        let data = [9u8, Precision::Country.as_u8(), 0];
        let s = bech32::encode::<Bech32>(hrp, &data).unwrap();
        assert_eq!(decode(&s).unwrap_err(), PidError::UnknownVersion(9));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let hrp = Hrp::parse("jp").unwrap();
        let data = [PID_CODEC_VERSION, Precision::Country.as_u8(), 0, 0xff];
        let s = bech32::encode::<Bech32>(hrp, &data).unwrap();
        assert!(matches!(decode(&s), Err(PidError::Malformed(_))));
    }

    #[test]
    fn non_country_hrp_rejected() {
        let hrp = Hrp::parse("xyz").unwrap();
        let data = [PID_CODEC_VERSION, Precision::Country.as_u8(), 0];
        let s = bech32::encode::<Bech32>(hrp, &data).unwrap();
        assert!(matches!(decode(&s), Err(PidError::Malformed(_))));
    }

    #[test]
    fn parse_canonicalizes_case() {
        let pid = encode(&tokyo(), Precision::Block).unwrap();
        let upper = pid.as_str().to_ascii_uppercase();
        assert_eq!(Pid::parse(&upper).unwrap(), pid);
    }

    #[test]
    fn serde_roundtrip_validates() {
        let pid = encode(&tokyo(), Precision::Block).unwrap();
        let json = serde_json::to_string(&pid).unwrap();
        let back: Pid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pid);
        assert!(serde_json::from_str::<Pid>("\"jp1notapid\"").is_err());
    }
}
