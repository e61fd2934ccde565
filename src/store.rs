//! Pending Claim Storage Module
//!
//! Advisory, file-backed storage for links that are about to be claimed.
//! A link is saved before the claim is submitted and removed once the claim
//! settles, so an interrupted cash-out can still be recovered from its link.
//! Failures to persist are logged and never block a claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Prefix of every pending-claim key.
pub const PENDING_CLAIM_PREFIX: &str = "TEMP_CASHOUT_LINK_";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access pending claim file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Pending claim file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A link saved ahead of its claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingClaim {
    pub key: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// STORAGE IMPLEMENTATION
// ============================================================================

/// File-backed store of pending claims, keyed by `TEMP_CASHOUT_LINK_<uuid>`.
#[derive(Debug)]
pub struct PendingClaimStore {
    path: PathBuf,
    claims: RwLock<HashMap<String, PendingClaim>>,
}

impl PendingClaimStore {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Arguments
    ///
    /// * `path` - JSON file holding the pending claims
    ///
    /// # Returns
    ///
    /// * `Ok(PendingClaimStore)` - Store loaded
    /// * `Err(StoreError)` - File unreadable or corrupt
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let claims = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => {
                let list: Vec<PendingClaim> =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                        path: path.display().to_string(),
                        source,
                    })?;
                list.into_iter().map(|c| (c.key.clone(), c)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        Ok(Self {
            path,
            claims: RwLock::new(claims),
        })
    }

    /// Saves `link` and returns its key.
    ///
    /// A link whose write fails is not kept in memory either.
    pub async fn save(&self, link: &str, now: DateTime<Utc>) -> Result<String, StoreError> {
        let key = format!("{}{}", PENDING_CLAIM_PREFIX, Uuid::new_v4().simple());
        let mut claims = self.claims.write().await;
        claims.insert(
            key.clone(),
            PendingClaim {
                key: key.clone(),
                link: link.to_string(),
                created_at: now,
            },
        );
        if let Err(e) = self.persist(&claims).await {
            claims.remove(&key);
            return Err(e);
        }
        info!("Temporarily saved link under key {}", key);
        Ok(key)
    }

    /// Removes a saved link. Removing an unknown key is a no-op.
    pub async fn remove(&self, key: &str) -> Result<Option<PendingClaim>, StoreError> {
        let mut claims = self.claims.write().await;
        let removed = claims.remove(key);
        if removed.is_some() {
            self.persist(&claims).await?;
            info!("Removed temporary link {}", key);
        }
        Ok(removed)
    }

    /// All saved links, oldest first.
    pub async fn list(&self) -> Vec<PendingClaim> {
        let claims = self.claims.read().await;
        let mut list: Vec<PendingClaim> = claims.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        list
    }

    async fn persist(&self, claims: &HashMap<String, PendingClaim>) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let mut list: Vec<&PendingClaim> = claims.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let body = serde_json::to_vec_pretty(&list).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_error)?;
        Ok(())
    }
}
