//! sled-backed registry store
//!
//! Key layout (one tree, values are JSON):
//!
//! | key | value |
//! |---|---|
//! | `v/<name>/<version:010>` | `ModelVersion` |
//! | `a/<name>/<artifact_ref>` | version holding that artifact |
//! | `n/<name>` | last assigned version |
//! | `p/<name>` | current production version (absent when none) |
//! | `h/<name>/<seq:020>` | `StageTransition` |
//! | `hn/<name>` | last history sequence number |
//! | `m/<name>` | model marker, empty |
//!
//! Model names cannot contain `/`, so prefixes never overlap between models.
//! Every multi-key read or write runs inside one sled transaction.
//!
//! sled holds an exclusive lock on the database file for as long as any
//! handle is alive, and releases it from a background thread after the last
//! one is dropped. `open` therefore waits for the lock with bounded backoff,
//! which also queues concurrent service invocations on the same path.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError, TransactionResult, TransactionalTree};
use std::path::Path;
use tracing::{debug, info, warn};

use mlops_core::{retry_with_backoff, RetryConfig};

use super::{check_plan, check_transition, PromotionPlan, RegistryStore};
use crate::error::{RegistryError, Result};
use crate::stage::ModelStage;
use crate::transition::StageTransition;
use crate::version::{validate_model_name, ModelVersion, NewVersion};

type TxResult<T> = ConflictableTransactionResult<T, RegistryError>;

fn version_key(name: &str, version: u32) -> String { format!("v/{name}/{version:010}") }
fn artifact_key(name: &str, artifact_ref: &str) -> String { format!("a/{name}/{artifact_ref}") }
fn counter_key(name: &str) -> String { format!("n/{name}") }
fn production_key(name: &str) -> String { format!("p/{name}") }
fn history_key(name: &str, seq: u64) -> String { format!("h/{name}/{seq:020}") }
fn history_counter_key(name: &str) -> String { format!("hn/{name}") }
fn model_key(name: &str) -> String { format!("m/{name}") }

fn abort(err: RegistryError) -> ConflictableTransactionError<RegistryError> {
    ConflictableTransactionError::Abort(err)
}

fn tx_get<T: DeserializeOwned>(tx: &TransactionalTree, key: &str) -> TxResult<Option<T>> {
    match tx.get(key.as_bytes())? {
        Some(raw) => serde_json::from_slice(&raw).map(Some).map_err(|e| abort(e.into())),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(tx: &TransactionalTree, key: &str, value: &T) -> TxResult<()> {
    let raw = serde_json::to_vec(value).map_err(|e| abort(e.into()))?;
    tx.insert(key.as_bytes(), raw)?;
    Ok(())
}

fn tx_load(tx: &TransactionalTree, name: &str, version: u32) -> TxResult<ModelVersion> {
    tx_get(tx, &version_key(name, version))?.ok_or_else(|| abort(RegistryError::not_found(name, version)))
}

fn tx_set_stage(tx: &TransactionalTree, name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> TxResult<ModelVersion> {
    let mut record = tx_load(tx, name, version)?;
    let from = record.stage;
    record.stage = to;
    record.stage_changed_at = Some(Utc::now());
    tx_put(tx, &version_key(name, version), &record)?;

    let production_key = production_key(name);
    if to == ModelStage::Production {
        tx_put(tx, &production_key, &version)?;
    } else if tx_get::<u32>(tx, &production_key)? == Some(version) {
        tx.remove(production_key.as_bytes())?;
    }

    let seq = tx_get::<u64>(tx, &history_counter_key(name))?.unwrap_or(0) + 1;
    tx_put(tx, &history_key(name, seq), &StageTransition::new(name, version, from, to, reason))?;
    tx_put(tx, &history_counter_key(name), &seq)?;
    Ok(record)
}

fn finish<T>(res: TransactionResult<T, RegistryError>) -> Result<T> {
    res.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => RegistryError::Storage(err),
    })
}

/// Durable registry store on an embedded sled database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

/// Another handle, in this process or another one, owns the database file.
fn is_lock_contention(err: &sled::Error) -> bool {
    matches!(err, sled::Error::Io(io) if io.kind() == std::io::ErrorKind::WouldBlock)
}

impl SledStore {
    /// Roughly six seconds of backoff before giving up on a held file lock.
    pub fn default_lock_wait() -> RetryConfig {
        RetryConfig { max_retries: 30, ..RetryConfig::default() }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_retry(path, &Self::default_lock_wait())
    }

    /// Open, retrying only while the file lock is held elsewhere.
    pub fn open_with_retry(path: impl AsRef<Path>, retry: &RetryConfig) -> Result<Self> {
        let path = path.as_ref();
        let db = retry_with_backoff(retry, is_lock_contention, |attempt| {
            if attempt > 0 {
                debug!(attempt, path = %path.display(), "registry store locked, waiting");
            }
            sled::open(path)
        })
        .map_err(|err| {
            if is_lock_contention(&err) {
                warn!(path = %path.display(), "registry store still locked after retries");
            }
            RegistryError::Storage(err)
        })?;
        info!(path = %path.display(), recovered = db.was_recovered(), "registry store opened");
        Ok(Self { db })
    }

    /// Store removed from disk when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn commit<T>(&self, res: TransactionResult<T, RegistryError>) -> Result<T> {
        let value = finish(res)?;
        self.db.flush()?;
        Ok(value)
    }
}

impl RegistryStore for SledStore {
    fn register_version(&self, new: NewVersion) -> Result<ModelVersion> {
        new.validate()?;
        let name = new.model_name.as_str();
        let res = self.db.transaction(|tx| -> TxResult<ModelVersion> {
            if let Some(existing_version) = tx_get::<u32>(tx, &artifact_key(name, &new.artifact_ref))? {
                return Err(abort(RegistryError::DuplicateRegistration {
                    model_name: name.to_string(),
                    artifact_ref: new.artifact_ref.clone(),
                    existing_version,
                }));
            }
            let version = tx_get::<u32>(tx, &counter_key(name))?.unwrap_or(0) + 1;
            let record = new.clone().into_version(version);
            tx_put(tx, &version_key(name, version), &record)?;
            tx_put(tx, &artifact_key(name, &record.artifact_ref), &version)?;
            tx_put(tx, &counter_key(name), &version)?;
            tx.insert(model_key(name).as_bytes(), Vec::<u8>::new())?;
            Ok(record)
        });
        let record = self.commit(res)?;
        debug!(model = %record.model_name, version = record.version, "version registered");
        Ok(record)
    }

    fn get_version(&self, model_name: &str, version: u32) -> Result<ModelVersion> {
        match self.db.get(version_key(model_name, version).as_bytes())? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(RegistryError::not_found(model_name, version)),
        }
    }

    fn get_production(&self, model_name: &str) -> Result<Option<ModelVersion>> {
        finish(self.db.transaction(|tx| -> TxResult<Option<ModelVersion>> {
            match tx_get::<u32>(tx, &production_key(model_name))? {
                Some(version) => tx_load(tx, model_name, version).map(Some),
                None => Ok(None),
            }
        }))
    }

    fn transition_stage(&self, model_name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> Result<ModelVersion> {
        let res = self.db.transaction(|tx| -> TxResult<ModelVersion> {
            let from = tx_load(tx, model_name, version)?.stage;
            let production = tx_get::<u32>(tx, &production_key(model_name))?;
            check_transition(model_name, from, to, production).map_err(abort)?;
            tx_set_stage(tx, model_name, version, to, reason)
        });
        self.commit(res)
    }

    fn list_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        finish(self.db.transaction(|tx| -> TxResult<Vec<ModelVersion>> {
            let last = tx_get::<u32>(tx, &counter_key(model_name))?.unwrap_or(0);
            let mut versions = Vec::with_capacity(last as usize);
            for version in 1..=last {
                versions.push(tx_load(tx, model_name, version)?);
            }
            Ok(versions)
        }))
    }

    fn list_models(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for kv in self.db.scan_prefix(b"m/") {
            let (key, _) = kv?;
            names.push(String::from_utf8_lossy(&key[2..]).into_owned());
        }
        Ok(names)
    }

    fn transition_history(&self, model_name: &str) -> Result<Vec<StageTransition>> {
        finish(self.db.transaction(|tx| -> TxResult<Vec<StageTransition>> {
            let last = tx_get::<u64>(tx, &history_counter_key(model_name))?.unwrap_or(0);
            let mut history = Vec::with_capacity(last as usize);
            for seq in 1..=last {
                if let Some(record) = tx_get(tx, &history_key(model_name, seq))? {
                    history.push(record);
                }
            }
            Ok(history)
        }))
    }

    fn apply_promotion(&self, plan: &PromotionPlan) -> Result<ModelVersion> {
        validate_model_name(&plan.model_name)?;
        let name = plan.model_name.as_str();
        let res = self.db.transaction(|tx| -> TxResult<ModelVersion> {
            let candidate_stage = tx_load(tx, name, plan.candidate)?.stage;
            let production = tx_get::<u32>(tx, &production_key(name))?;
            check_plan(plan, candidate_stage, production).map_err(abort)?;
            if let Some(previous) = plan.expected_production {
                let reason = format!("replaced by v{}", plan.candidate);
                tx_set_stage(tx, name, previous, ModelStage::Archived, Some(&reason))?;
            }
            tx_set_stage(tx, name, plan.candidate, ModelStage::Production, Some(&plan.reason))
        });
        self.commit(res)
    }
}
