//! Configuration store: sole owner and sole writer of the persisted record.
//!
//! The whole [`Config`] lives in one postcard blob under `patcom::config`.
//! [`ConfigStore::apply`] merges a patch into a copy, validates it, writes
//! the copy, and only then swaps it in.  A reader holding `&Config` sees
//! either the old or the new record, never a mix.

use core::fmt;

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::config::{Config, ConfigPatch};
use crate::error::ValidationError;

pub const CONFIG_NAMESPACE: &str = "patcom";
pub const CONFIG_KEY: &str = "config";

const MAX_BLOB_SIZE: usize = 8192;

/// Result of a successful [`ConfigStore::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Network settings changed; the new values take effect after restart.
    pub restart_required: bool,
    /// Channel-scoped problems.  The channels were stored as invalid.
    pub warnings: Vec<ValidationError>,
    pub config_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// At least one fatal validation error; nothing changed.
    Invalid(Vec<ValidationError>),
    /// The candidate was valid but could not be persisted; nothing changed.
    Storage(StorageError),
}

impl ApplyError {
    /// Every validation error behind the rejection (empty for storage failures).
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            Self::Invalid(errors) => errors,
            Self::Storage(_) => &[],
        }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(errors) => {
                write!(f, "configuration rejected")?;
                for (i, e) in errors.iter().enumerate() {
                    write!(f, "{}{e}", if i == 0 { ": " } else { "; " })?;
                }
                Ok(())
            }
            Self::Storage(e) => write!(f, "configuration not saved: {e}"),
        }
    }
}

pub struct ConfigStore<S: StoragePort> {
    storage: S,
    config: Config,
}

impl<S: StoragePort> ConfigStore<S> {
    /// Load the persisted record, falling back to defaults when it is
    /// missing or undecodable.  Fields that fail validation are reset
    /// individually; the rest of the record survives.  Never fails.
    pub fn load(storage: S, device_id: &str) -> Self {
        let config = match Self::read_record(&storage) {
            Ok(mut cfg) => {
                let repaired = cfg.sanitize(device_id);
                if repaired > 0 {
                    warn!("ConfigStore: repaired {} stored field(s)", repaired);
                }
                match cfg.validate() {
                    Err(errors) if errors.iter().any(ValidationError::is_fatal) => {
                        warn!("ConfigStore: stored record invalid ({} errors), using defaults", errors.len());
                        Config::defaults_for(device_id)
                    }
                    _ => {
                        info!("ConfigStore: loaded config (hash {})", cfg.config_hash());
                        cfg
                    }
                }
            }
            Err(StorageError::NotFound) => {
                info!("ConfigStore: no stored config, using defaults");
                Config::defaults_for(device_id)
            }
            Err(e) => {
                warn!("ConfigStore: stored config unreadable ({}), using defaults", e);
                Config::defaults_for(device_id)
            }
        };
        Self { storage, config }
    }

    fn read_record(storage: &S) -> Result<Config, StorageError> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        let len = storage.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf)?;
        postcard::from_bytes(&buf[..len]).map_err(|_| StorageError::IoError)
    }

    /// The live record.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a candidate record, reporting every problem found.
    pub fn validate(candidate: &Config) -> Result<(), Vec<ValidationError>> {
        candidate.validate()
    }

    /// Merge, validate, persist and swap in a patch.
    ///
    /// On any error the live record is left untouched.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<Applied, ApplyError> {
        let (candidate, mut errors) = self.config.merged(patch);
        if let Err(more) = Self::validate(&candidate) {
            errors.extend(more);
        }

        if errors.iter().any(ValidationError::is_fatal) {
            warn!("ConfigStore: patch rejected ({} errors)", errors.len());
            return Err(ApplyError::Invalid(errors));
        }
        for w in &errors {
            warn!("ConfigStore: {}", w);
        }

        self.save(&candidate).map_err(ApplyError::Storage)?;

        let restart_required = candidate.network != self.config.network;
        self.config = candidate;
        let config_hash = self.config.config_hash();
        info!(
            "ConfigStore: applied patch (hash {}, restart_required={})",
            config_hash, restart_required
        );
        Ok(Applied {
            restart_required,
            warnings: errors,
            config_hash,
        })
    }

    fn save(&mut self, candidate: &Config) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(candidate).map_err(|_| StorageError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        self.storage.write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}
