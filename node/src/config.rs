//! # Node Configuration
//!
//! [`NodeConfig`] is what `run` resolves its flags into. The data directory
//! layout:
//!
//! ```text
//! <data-dir>/
//!   db/             sled database
//!   vault.key       AES-256-GCM vault key (hex)
//!   issuer.key      Ed25519 credential issuer secret (hex)
//!   registry.key    Ed25519 revocation list signer secret (hex)
//!   token.key       pidToken derivation secret (hex)
//!   policies.json   access-control policies (optional)
//!   requesters.json requester DIDs and their roles (optional)
//! ```
//!
//! Key files are written once by `init` with mode 0600 and never rotated by
//! the node itself.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use vey_protocol::crypto::VeyKeypair;
use vey_protocol::identity::did_to_public_key;
use vey_protocol::resolver::{AccessControlPolicy, Requester};
use vey_protocol::ProviderSecrets;

use crate::cli::RunArgs;
use crate::logging::LogFormat;

const VAULT_KEY_FILE: &str = "vault.key";
const ISSUER_KEY_FILE: &str = "issuer.key";
const REGISTRY_KEY_FILE: &str = "registry.key";
const TOKEN_KEY_FILE: &str = "token.key";
const POLICIES_FILE: &str = "policies.json";
const REQUESTERS_FILE: &str = "requesters.json";

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub api_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub policies_path: PathBuf,
    pub requesters_path: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl NodeConfig {
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let api_addr = format!("{}:{}", args.host, args.api_port)
            .parse()
            .with_context(|| format!("invalid API bind address {}:{}", args.host, args.api_port))?;
        let metrics_addr = format!("{}:{}", args.host, args.metrics_port)
            .parse()
            .with_context(|| {
                format!("invalid metrics bind address {}:{}", args.host, args.metrics_port)
            })?;
        if args.api_port == args.metrics_port {
            bail!("API and metrics ports must differ (both {})", args.api_port);
        }
        Ok(Self {
            data_dir: args.data_dir.clone(),
            api_addr,
            metrics_addr,
            policies_path: args
                .policies
                .clone()
                .unwrap_or_else(|| args.data_dir.join(POLICIES_FILE)),
            requesters_path: args
                .requesters
                .clone()
                .unwrap_or_else(|| args.data_dir.join(REQUESTERS_FILE)),
            log_level: args.log_level.clone(),
            log_format: args.log_format,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }
}

// ---------------------------------------------------------------------------
// Key Files
// ---------------------------------------------------------------------------

/// Generate fresh provider secrets and write them under `data_dir`.
///
/// Refuses to touch an existing key file unless `force` is set.
pub fn write_secrets(data_dir: &Path, force: bool) -> Result<ProviderSecrets> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    if !force {
        for name in [VAULT_KEY_FILE, ISSUER_KEY_FILE, REGISTRY_KEY_FILE, TOKEN_KEY_FILE] {
            let path = data_dir.join(name);
            if path.exists() {
                bail!("{} already exists; pass --force to overwrite", path.display());
            }
        }
    }

    let secrets = ProviderSecrets::generate();
    write_key(&data_dir.join(VAULT_KEY_FILE), &hex::encode(secrets.vault_key))?;
    write_key(&data_dir.join(ISSUER_KEY_FILE), &secrets.issuer.secret_key_hex())?;
    write_key(&data_dir.join(REGISTRY_KEY_FILE), &secrets.registry.secret_key_hex())?;
    write_key(&data_dir.join(TOKEN_KEY_FILE), &hex::encode(secrets.token_secret))?;
    Ok(secrets)
}

/// Load the secrets `init` wrote.
pub fn load_secrets(data_dir: &Path) -> Result<ProviderSecrets> {
    Ok(ProviderSecrets {
        vault_key: read_key32(&data_dir.join(VAULT_KEY_FILE))?,
        issuer: read_keypair(&data_dir.join(ISSUER_KEY_FILE))?,
        registry: read_keypair(&data_dir.join(REGISTRY_KEY_FILE))?,
        token_secret: read_key32(&data_dir.join(TOKEN_KEY_FILE))?,
    })
}

/// Policies from `path`. A missing file means no policies, so every
/// resolution is denied.
pub fn load_policies(path: &Path) -> Result<Vec<AccessControlPolicy>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read policies from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse policies in {}", path.display()))
}

/// Requesters from `path`: `[{ "id": "did:key:z...", "roles": [...] }]`.
/// A missing file means nobody can call the gated endpoints. Every id must
/// be a `did:key`, since that is what requests are verified against.
pub fn load_requesters(path: &Path) -> Result<Vec<Requester>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read requesters from {}", path.display()))?;
    let requesters: Vec<Requester> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse requesters in {}", path.display()))?;
    for requester in &requesters {
        did_to_public_key(&requester.id).with_context(|| {
            format!("requester {} in {} is not a did:key", requester.id, path.display())
        })?;
    }
    Ok(requesters)
}

fn write_key(path: &Path, hex_value: &str) -> Result<()> {
    fs::write(path, hex_value)
        .with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

fn read_hex(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).with_context(|| {
        format!("failed to read {} (run `vey-node init` first)", path.display())
    })?;
    Ok(raw.trim().to_string())
}

fn read_key32(path: &Path) -> Result<[u8; 32]> {
    let bytes = hex::decode(read_hex(path)?)
        .with_context(|| format!("{} is not valid hex", path.display()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("{} holds {} bytes, expected 32", path.display(), b.len()))
}

fn read_keypair(path: &Path) -> Result<VeyKeypair> {
    VeyKeypair::from_hex(&read_hex(path)?)
        .with_context(|| format!("{} is not a valid Ed25519 secret", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn secrets_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_secrets(dir.path(), false).unwrap();
        let loaded = load_secrets(dir.path()).unwrap();
        assert_eq!(loaded.vault_key, written.vault_key);
        assert_eq!(loaded.token_secret, written.token_secret);
        assert_eq!(loaded.issuer.public_key(), written.issuer.public_key());
        assert_eq!(loaded.registry.public_key(), written.registry.public_key());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_secrets(dir.path(), false).unwrap();
        assert!(write_secrets(dir.path(), false).is_err());
        let second = write_secrets(dir.path(), true).unwrap();
        assert_ne!(first.vault_key, second.vault_key);
    }

    #[test]
    fn missing_keys_fail_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_secrets(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("vey-node init"));
    }

    #[test]
    fn missing_policy_file_means_no_policies() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_policies(&dir.path().join("policies.json")).unwrap().is_empty());
    }

    #[test]
    fn policies_parse_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.json");
        fs::write(
            &path,
            r#"[{
                "id": "carriers-jp",
                "subjectRole": "carrier",
                "resource": "JP-*",
                "allowedActions": ["resolve", "track"],
                "validFrom": "2026-01-01T00:00:00Z"
            }]"#,
        )
        .unwrap();
        let policies = load_policies(&path).unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].subject_role, "carrier");
        assert!(policies[0].valid_to.is_none());
    }

    #[test]
    fn requesters_parse_from_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_requesters(&dir.path().join("requesters.json")).unwrap().is_empty());

        let kp = VeyKeypair::generate();
        let did = vey_protocol::identity::VeyDid::from_public_key(&kp.public_key()).to_did_string();
        let path = dir.path().join("requesters.json");
        fs::write(&path, format!(r#"[{{"id": "{did}", "roles": ["carrier"]}}]"#)).unwrap();
        let requesters = load_requesters(&path).unwrap();
        assert_eq!(requesters.len(), 1);
        assert!(requesters[0].has_role("carrier"));
    }

    #[test]
    fn requester_ids_must_be_did_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requesters.json");
        fs::write(&path, r#"[{"id": "yamato", "roles": ["carrier"]}]"#).unwrap();
        let err = load_requesters(&path).unwrap_err();
        assert!(format!("{err:#}").contains("yamato"));
    }

    #[test]
    fn config_resolves_paths_and_addresses() {
        let cli = crate::cli::VeyNodeCli::parse_from([
            "vey-node", "run", "-d", "/tmp/vey", "--host", "127.0.0.1",
        ]);
        let crate::cli::Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = NodeConfig::from_args(&args).unwrap();
        assert_eq!(config.api_addr.port(), 8740);
        assert_eq!(config.policies_path, PathBuf::from("/tmp/vey/policies.json"));
        assert_eq!(config.requesters_path, PathBuf::from("/tmp/vey/requesters.json"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/vey/db"));
    }

    #[test]
    fn equal_ports_are_rejected() {
        let cli = crate::cli::VeyNodeCli::parse_from([
            "vey-node", "run", "--api-port", "9000", "--metrics-port", "9000",
        ]);
        let crate::cli::Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(NodeConfig::from_args(&args).is_err());
    }
}
