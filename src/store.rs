//! Sled-backed record store adapter
//!
//! One tree per logical collection, plus two secondary-index trees that are
//! maintained in the same transaction as the primary write:
//!
//! - `goods_records`: record id -> CBOR-encoded [`GoodsItemRecord`]
//! - `goods_trader_refs`: owner ++ 0x00 ++ trader ref -> record id (the
//!   compound uniqueness index)
//! - `goods_updated_idx`: owner ++ 0x00 ++ big-endian update time ++ 0x00 ++
//!   record id -> record id (the owner/time index driving listings; the key
//!   layout makes an owner-prefixed scan come back in ascending update order)
//! - `trader_profiles`: owner -> CBOR-encoded [`TraderProfile`]
//!
//! Record expiry is the store's own concern: `sweep_expired` removes
//! documents whose update time has aged past the configured TTL. Nothing in
//! the mutation or listing engines triggers or observes the sweep; a host
//! scheduler owns the cadence, and callers must treat expiry as eventually
//! consistent rather than synchronous deletion.

use crate::error::RecordError;
use crate::profile::TraderProfile;
use crate::record::{GoodsItemRecord, TimeStamp};
use chrono::Duration;
use sled::{Db, Tree};
use std::sync::Arc;
use tracing::debug;

pub const RECORDS_TREE: &str = "goods_records";
pub const TRADER_REFS_TREE: &str = "goods_trader_refs";
pub const UPDATED_IDX_TREE: &str = "goods_updated_idx";
pub const PROFILES_TREE: &str = "trader_profiles";

/// Expiry windows for the TTL sweep.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub record_ttl: Duration,
    pub profile_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::days(180),
            profile_ttl: Duration::days(180),
        }
    }
}

#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Db>,
    pub(crate) records: Tree,
    pub(crate) trader_refs: Tree,
    pub(crate) updated_idx: Tree,
    pub(crate) profiles: Tree,
    config: StoreConfig,
}

impl RecordStore {
    pub fn open(db: Arc<Db>, config: StoreConfig) -> Result<Self, RecordError> {
        let records = db.open_tree(RECORDS_TREE)?;
        let trader_refs = db.open_tree(TRADER_REFS_TREE)?;
        let updated_idx = db.open_tree(UPDATED_IDX_TREE)?;
        let profiles = db.open_tree(PROFILES_TREE)?;

        Ok(Self {
            db,
            records,
            trader_refs,
            updated_idx,
            profiles,
            config,
        })
    }

    /// Point lookup by record id, not owner-scoped.
    pub fn get_record(&self, record_id: &str) -> Result<Option<GoodsItemRecord>, RecordError> {
        match self.records.get(record_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record ids for an owner in ascending update order, optionally
    /// filtered to updates strictly after the watermark. The whole filtered
    /// set comes back so the caller can count before paginating.
    pub(crate) fn scan_owner(
        &self,
        eori: &str,
        since: Option<TimeStamp>,
    ) -> Result<Vec<String>, RecordError> {
        let prefix = owner_prefix(eori);
        let since_ord = since.map(ordered_nanos);

        let mut ids = Vec::new();
        for entry in self.updated_idx.scan_prefix(&prefix) {
            let (key, value) = entry?;
            if let Some(watermark) = since_ord {
                let ord = index_key_nanos(&key, prefix.len())
                    .ok_or_else(|| RecordError::Fatal("malformed updated index key".into()))?;
                if ord <= watermark {
                    continue;
                }
            }
            let id = String::from_utf8(value.to_vec())
                .map_err(|e| RecordError::Fatal(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// The store's TTL mechanism. Removes goods records and trader profiles
    /// whose last update is older than the configured TTL, together with
    /// their index entries. Returns how many documents were removed.
    pub fn sweep_expired(&self, now: TimeStamp) -> Result<usize, RecordError> {
        let record_cutoff = now.to_datetime_utc() - self.config.record_ttl;
        let profile_cutoff = now.to_datetime_utc() - self.config.profile_ttl;
        let mut removed = 0;

        for entry in self.records.iter() {
            let (key, value) = entry?;
            let record = decode_record(&value)?;
            if record.metadata.updated.to_datetime_utc() >= record_cutoff {
                continue;
            }
            self.trader_refs.remove(trader_ref_key(
                &record.goods_item.eori,
                &record.goods_item.trader_ref,
            ))?;
            self.updated_idx.remove(updated_key(
                &record.goods_item.eori,
                record.metadata.updated,
                &record.record_id,
            ))?;
            self.records.remove(key)?;
            removed += 1;
        }

        for entry in self.profiles.iter() {
            let (key, value) = entry?;
            let profile = decode_profile(&value)?;
            if profile.last_updated.to_datetime_utc() >= profile_cutoff {
                continue;
            }
            self.profiles.remove(key)?;
            removed += 1;
        }

        debug!(removed, "swept expired documents");
        Ok(removed)
    }

    /// Flushes dirty buffers to disk.
    pub fn flush(&self) -> Result<(), RecordError> {
        self.db.flush()?;
        Ok(())
    }
}

pub(crate) fn owner_prefix(eori: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(eori.len() + 1);
    key.extend_from_slice(eori.as_bytes());
    key.push(0);
    key
}

pub(crate) fn trader_ref_key(eori: &str, trader_ref: &str) -> Vec<u8> {
    let mut key = owner_prefix(eori);
    key.extend_from_slice(trader_ref.as_bytes());
    key
}

// Sign bit flipped so the big-endian byte order matches time order for all
// i64 values. Nanosecond precision, same as the persisted encoding, so a
// watermark never conflates two distinct update times.
fn ordered_nanos(ts: TimeStamp) -> u64 {
    (ts.index_nanos() as u64) ^ (1 << 63)
}

fn index_key_nanos(key: &[u8], prefix_len: usize) -> Option<u64> {
    let bytes = key.get(prefix_len..prefix_len + 8)?;
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

pub(crate) fn updated_key(eori: &str, updated: TimeStamp, record_id: &str) -> Vec<u8> {
    let mut key = owner_prefix(eori);
    key.extend_from_slice(&ordered_nanos(updated).to_be_bytes());
    key.push(0);
    key.extend_from_slice(record_id.as_bytes());
    key
}

pub(crate) fn encode_record(record: &GoodsItemRecord) -> Result<Vec<u8>, RecordError> {
    minicbor::to_vec(record).map_err(|e| RecordError::Fatal(e.to_string()))
}

pub(crate) fn decode_record(bytes: &[u8]) -> Result<GoodsItemRecord, RecordError> {
    minicbor::decode(bytes).map_err(|e| RecordError::Fatal(e.to_string()))
}

pub(crate) fn encode_profile(profile: &TraderProfile) -> Result<Vec<u8>, RecordError> {
    minicbor::to_vec(profile).map_err(|e| RecordError::Fatal(e.to_string()))
}

pub(crate) fn decode_profile(bytes: &[u8]) -> Result<TraderProfile, RecordError> {
    minicbor::decode(bytes).map_err(|e| RecordError::Fatal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updated_keys_sort_by_time_then_record_id() {
        let earlier = updated_key("GB1", TimeStamp::new_with(2024, 1, 1, 0, 0, 0), "rec_b");
        let later = updated_key("GB1", TimeStamp::new_with(2024, 1, 2, 0, 0, 0), "rec_a");
        assert!(earlier < later);

        let tie_a = updated_key("GB1", TimeStamp::new_with(2024, 1, 1, 0, 0, 0), "rec_a");
        let tie_b = updated_key("GB1", TimeStamp::new_with(2024, 1, 1, 0, 0, 0), "rec_b");
        assert!(tie_a < tie_b);
    }

    #[test]
    fn trader_ref_keys_separate_owner_and_reference() {
        // "GB1" + "23ref" must not collide with "GB12" + "3ref"
        assert_ne!(trader_ref_key("GB1", "23ref"), trader_ref_key("GB12", "3ref"));
    }
}
