//! Vault configuration: plain JSON next to the encrypted collections.
//!
//! Readable before unlock: it only tunes how the vault is opened and never
//! holds secrets.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sdm_crypto_core::{KdfParams, DEFAULT_ITERATIONS};
use serde::{Deserialize, Serialize};

/// Vault settings, persisted to `{data_dir}/config.json`.
///
/// All fields have defaults, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// PBKDF2 iteration count.
    ///
    /// Changing it changes the derived key: data written under one count
    /// will not unlock under another.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// How long unlock waits for the crypto capability, in milliseconds.
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_ms: u64,

    /// Endpoint receiving plaintext copies of added items. Disabled if unset.
    #[serde(default)]
    pub mirror_url: Option<String>,

    /// Where the session key is kept between runs. In-memory if unset.
    #[serde(default)]
    pub session_key_file: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: default_kdf_iterations(),
            readiness_timeout_ms: default_readiness_timeout(),
            mirror_url: None,
            session_key_file: None,
        }
    }
}

const fn default_kdf_iterations() -> u32 {
    DEFAULT_ITERATIONS
}
const fn default_readiness_timeout() -> u64 {
    5_000
}

const CONFIG_FILE: &str = "config.json";

impl VaultConfig {
    /// Load from `{data_dir}/config.json`.
    ///
    /// Falls back to [`Default::default()`] when the file is missing or is
    /// not valid JSON. A zero iteration count is replaced by the default.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        if config.kdf_iterations == 0 {
            tracing::warn!(
                "kdfIterations must be non-zero, using {}",
                default_kdf_iterations()
            );
            config.kdf_iterations = default_kdf_iterations();
        }
        config
    }

    /// Persist to `{data_dir}/config.json` (tmp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory cannot be created or the
    /// write/rename is rejected.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(CONFIG_FILE);
        let tmp = data_dir.join(".config.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Key-derivation parameters.
    #[must_use]
    pub const fn kdf_params(&self) -> KdfParams {
        KdfParams {
            iterations: self.kdf_iterations,
        }
    }

    /// Unlock readiness timeout.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}
