//! # Protocol Configuration & Constants
//!
//! Every magic number in VEY lives here. If a PID, a proof or a revocation
//! list depends on a value, that value is defined in this file and nowhere
//! else.
//!
//! Some of these are wire-format constants (codec version, domain tags,
//! slot counts). Changing them breaks every PID and proof already issued,
//! so they only move together with a codec or circuit version bump.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full crate-level protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Protocol fingerprint, embedded in the node's status endpoint.
pub const PROTOCOL_FINGERPRINT: &str = "VEY-ADDR-2026";

// ---------------------------------------------------------------------------
// PID Codec
// ---------------------------------------------------------------------------

/// Codec version written into every freshly encoded PID.
pub const PID_CODEC_VERSION: u8 = 1;

/// Every codec version this build can still decode. Older PIDs stay
/// decodable as long as their version is listed here.
pub const SUPPORTED_PID_VERSIONS: &[u8] = &[1];

/// Maximum length of a single address component, in bytes.
pub const MAX_COMPONENT_LENGTH: usize = 24;

/// Highest collision suffix the vault will hand out (`C01..C99`).
pub const MAX_COLLISION_SUFFIX: u8 = 99;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Signature scheme used for credentials, revocation lists and consent.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Signing key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Public (verifying) key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not sixteen.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Hash output length in bytes.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Multicodec prefix for an Ed25519 public key inside a `did:key`.
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

// ---------------------------------------------------------------------------
// Zero-Knowledge Proofs
// ---------------------------------------------------------------------------

/// Proof system family advertised in every circuit descriptor.
pub const PROOF_TYPE: &str = "groth16";

/// Pairing curve for the shipping circuit.
pub const ZKP_CURVE: &str = "BN254";

/// Default circuit identifier for the shipping-condition circuit.
pub const SHIPPING_CIRCUIT_ID: &str = "vey-shipping-condition-v1";

/// Circuit version. Bumped whenever the public input layout changes.
pub const SHIPPING_CIRCUIT_VERSION: &str = "1.0.0";

/// Number of membership slots for `allowedCountries` and `allowedRegions`.
/// Longer lists cannot be proven by the v1 circuit.
pub const CONDITION_SLOTS: usize = 16;

/// Bit width of the range proofs on weight and dimensions.
pub const RANGE_BITS: usize = 64;

// ---------------------------------------------------------------------------
// Domain Separation Tags
// ---------------------------------------------------------------------------

/// Prefix hashed together with a PID to form its circuit binding.
pub const DOMAIN_PID: &[u8] = b"pid:";

/// Prefix for country codes entering the circuit.
pub const DOMAIN_COUNTRY: &[u8] = b"country:";

/// Prefix for region (admin1) codes entering the circuit.
pub const DOMAIN_REGION: &[u8] = b"region:";

/// Prefix for the canonical shipping-condition digest.
pub const DOMAIN_CONDITIONS: &[u8] = b"conditions:";

/// Context string for deriving commitment generators.
pub const DOMAIN_COMMITMENT: &str = "vey commitment generators v1";

/// Prefix for the per-requester pidToken derivation.
pub const DOMAIN_PID_TOKEN: &[u8] = b"pid-token:v1";

/// Prefix of the message a user signs to consent to a shipping validation.
pub const SHIPPING_CONSENT_TAG: &[u8] = b"vey-shipping-consent:v1";

/// Prefix of the message a caller signs to authenticate a node API request.
pub const API_REQUEST_TAG: &[u8] = b"vey-api-request:v1";

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// A verifier must refetch its revocation list once the cached copy is
/// older than this.
pub const MAX_REVOCATION_STALENESS: Duration = Duration::from_secs(10 * 60);

/// Default lifetime of an address credential.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Shipping validation requests older than this are refused.
pub const MAX_REQUEST_AGE: Duration = Duration::from_secs(5 * 60);

/// Tolerated clock skew for request timestamps in the future.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Default on-disk location for the node database.
pub const DEFAULT_DATA_DIR: &str = "./vey-data";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_codec_version_is_supported() {
        assert!(SUPPORTED_PID_VERSIONS.contains(&PID_CODEC_VERSION));
    }

    #[test]
    fn aes_parameters() {
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
    }

    #[test]
    fn collision_suffix_fits_two_digits() {
        assert!(MAX_COLLISION_SUFFIX <= 99);
    }

    #[test]
    fn staleness_is_ten_minutes() {
        assert_eq!(MAX_REVOCATION_STALENESS.as_secs(), 600);
        assert!(MAX_REQUEST_AGE < MAX_REVOCATION_STALENESS);
    }

    #[test]
    fn domain_tags_are_distinct() {
        let tags = [
            DOMAIN_PID,
            DOMAIN_COUNTRY,
            DOMAIN_REGION,
            DOMAIN_CONDITIONS,
            DOMAIN_PID_TOKEN,
            SHIPPING_CONSENT_TAG,
            API_REQUEST_TAG,
        ];
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
