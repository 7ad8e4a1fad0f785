//! On-disk state of the `cdid` tool.
//!
//! ```text
//! {home}/
//! ├── keys/          one file per local identity
//! │   └── {name}.json
//! └── ledger.json    the simulated ledger
//! ```
//!
//! Key file format:
//! ```json
//! { "version": 1, "name": "...", "did": "...", "keyId": "...", "secret": "..." }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use chain_did::{Did, DidUrl, Ed25519KeyPair, InMemoryLedger, KeyRing};

const KEY_FILE_VERSION: u32 = 1;

const KEYS_DIR: &str = "keys";
const LEDGER_FILE: &str = "ledger.json";

/// Wrapper written to disk for each identity.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    version: u32,
    name: String,
    did: Did,
    key_id: DidUrl,
    /// Base58 Ed25519 secret.
    secret: String,
}

/// A local identity and its signing key.
pub struct Identity {
    pub name: String,
    pub did: Did,
    pub key_id: DidUrl,
    key_pair: Ed25519KeyPair,
}

impl Identity {
    /// A key ring holding this identity's default key.
    pub fn keys(&self) -> KeyRing {
        let mut keys = KeyRing::new();
        keys.insert(self.key_id.clone(), self.key_pair.clone());
        keys
    }
}

/// Filesystem-backed identities and ledger.
pub struct Store {
    home: PathBuf,
}

impl Store {
    /// Open `home`, creating `keys/` if needed.
    pub fn open(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        std::fs::create_dir_all(home.join(KEYS_DIR))
            .with_context(|| format!("failed to create {}", home.display()))?;
        Ok(Self { home })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn key_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            bail!("invalid identity name '{name}' (use letters, digits, '-' and '_')");
        }
        Ok(self.home.join(KEYS_DIR).join(format!("{name}.json")))
    }

    pub fn has_identity(&self, name: &str) -> Result<bool> {
        Ok(self.key_path(name)?.exists())
    }

    pub fn save_identity(
        &self,
        name: &str,
        did: &Did,
        key_id: &DidUrl,
        key_pair: &Ed25519KeyPair,
    ) -> Result<()> {
        let path = self.key_path(name)?;
        if path.exists() {
            bail!("identity '{name}' already exists at {}", path.display());
        }
        let file = KeyFile {
            version: KEY_FILE_VERSION,
            name: name.to_string(),
            did: did.clone(),
            key_id: key_id.clone(),
            secret: key_pair.secret_base58().to_string(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load_identity(&self, name: &str) -> Result<Identity> {
        let path = self.key_path(name)?;
        if !path.exists() {
            bail!("identity '{name}' not found (expected at {})", path.display());
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: KeyFile = serde_json::from_str(&json)
            .with_context(|| format!("malformed key file {}", path.display()))?;
        if file.version != KEY_FILE_VERSION {
            bail!(
                "unsupported key file version {} in {}",
                file.version,
                path.display()
            );
        }
        let key_pair = Ed25519KeyPair::from_secret_base58(&file.secret)
            .map_err(|e| anyhow!("invalid secret in {}: {e}", path.display()))?;
        Ok(Identity {
            name: file.name,
            did: file.did,
            key_id: file.key_id,
            key_pair,
        })
    }

    /// Names of all local identities, sorted.
    pub fn list_identities(&self) -> Result<Vec<String>> {
        let dir = self.home.join(KEYS_DIR);
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load the ledger, or start an empty one.
    pub fn load_ledger(&self) -> Result<InMemoryLedger> {
        let path = self.home.join(LEDGER_FILE);
        if !path.exists() {
            return Ok(InMemoryLedger::new());
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        InMemoryLedger::restore(&json)
            .with_context(|| format!("malformed ledger {}", path.display()))
    }

    pub fn save_ledger(&self, ledger: &InMemoryLedger) -> Result<()> {
        let path = self.home.join(LEDGER_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, ledger.snapshot()?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}
