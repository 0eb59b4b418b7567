//! Service layer API for goods record operations
//!
//! The mutation engine runs every guarded state transition inside a single
//! sled transaction spanning the record tree and both secondary-index trees,
//! so a concurrent lock-flip or deactivation cannot slip between the guard
//! read and the conditional write.
use crate::declarable;
use crate::error::RecordError;
use crate::record::{
    AccreditationStatus, CreateRecordRequest, GoodsItem, GoodsItemPatch, GoodsItemRecord,
    ReplaceRecordRequest, SupportPatch, TimeStamp,
};
use crate::store::{RecordStore, decode_record, encode_record, trader_ref_key, updated_key};
use crate::utils;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::{debug, warn};

/// One page of a time-ordered listing, with the exact total of the filtered
/// set before pagination was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub records: Vec<GoodsItemRecord>,
    pub total_count: usize,
}

pub struct RecordService {
    store: RecordStore,
}

fn abort<T>(err: RecordError) -> Result<T, ConflictableTransactionError<RecordError>> {
    Err(ConflictableTransactionError::Abort(err))
}

fn commit<T>(result: Result<T, TransactionError<RecordError>>) -> Result<T, RecordError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        // Storage-level aborts (including transient transaction conflicts)
        // surface as Fatal; retrying is the caller's decision.
        Err(TransactionError::Storage(err)) => Err(RecordError::Fatal(err.to_string())),
    }
}

impl RecordService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Creates a new goods record. The accreditation status comes from the
    /// owner-identity stub rule, the version starts at 1, and the
    /// `(owner, trader ref)` uniqueness index rejects duplicates with
    /// `Conflict` inside the same transaction as the write.
    pub fn create(&self, request: CreateRecordRequest) -> Result<GoodsItemRecord, RecordError> {
        let record_id =
            utils::new_record_id().map_err(|e| RecordError::Fatal(e.to_string()))?;
        let now = TimeStamp::now();
        let status = AccreditationStatus::initial_for_owner(&request.eori);

        let mut record = GoodsItemRecord::new(record_id, request, status, now);
        record.metadata.declarable = Some(declarable::evaluate(&record, now));

        let ref_key = trader_ref_key(&record.goods_item.eori, &record.goods_item.trader_ref);
        let upd_key = updated_key(
            &record.goods_item.eori,
            record.metadata.updated,
            &record.record_id,
        );
        let bytes = encode_record(&record)?;

        let result = (
            &self.store.records,
            &self.store.trader_refs,
            &self.store.updated_idx,
        )
            .transaction(|(records, refs, idx)| {
                if refs.get(ref_key.as_slice())?.is_some() {
                    return abort(RecordError::Conflict);
                }
                refs.insert(ref_key.as_slice(), record.record_id.as_bytes())?;
                idx.insert(upd_key.as_slice(), record.record_id.as_bytes())?;
                records.insert(record.record_id.as_bytes(), bytes.as_slice())?;
                Ok(())
            });

        match commit(result) {
            Ok(()) => {
                debug!(record_id = %record.record_id, eori = %record.goods_item.eori, "created goods record");
                Ok(record)
            }
            Err(err) => {
                warn!(eori = %record.goods_item.eori, %err, "create rejected");
                Err(err)
            }
        }
    }

    /// Partial update. Only the fields present in the patch are overlaid;
    /// the version increments and the update timestamp is re-stamped even
    /// when the patch carries nothing.
    pub fn patch(
        &self,
        record_id: &str,
        eori: &str,
        patch: GoodsItemPatch,
    ) -> Result<GoodsItemRecord, RecordError> {
        let now = TimeStamp::now();
        let result = self.guarded_update(record_id, eori, now, |item| item.apply_patch(&patch));

        match &result {
            Ok(record) => {
                debug!(record_id, eori, version = record.metadata.version, "patched goods record")
            }
            Err(err) => warn!(record_id, eori, %err, "patch rejected"),
        }
        result
    }

    /// Full overwrite. Every trader-supplied field is replaced; optional
    /// fields omitted from the request are cleared rather than retained.
    pub fn replace(
        &self,
        record_id: &str,
        eori: &str,
        request: ReplaceRecordRequest,
    ) -> Result<GoodsItemRecord, RecordError> {
        let now = TimeStamp::now();
        let result =
            self.guarded_update(record_id, eori, now, |item| item.replace_with(request.clone()));

        match &result {
            Ok(record) => {
                debug!(record_id, eori, version = record.metadata.version, "replaced goods record")
            }
            Err(err) => warn!(record_id, eori, %err, "replace rejected"),
        }
        result
    }

    /// The shared guard-then-write transaction for patch and replace.
    ///
    /// The record is first loaded by record id alone and its lock/active
    /// guards evaluated, then the write is owner-scoped. That order is
    /// deliberate: a record held by a different owner still answers Locked
    /// or Inactive ahead of NotFound, but the final write never touches a
    /// foreign record.
    fn guarded_update<F>(
        &self,
        record_id: &str,
        eori: &str,
        now: TimeStamp,
        mutate: F,
    ) -> Result<GoodsItemRecord, RecordError>
    where
        F: Fn(&mut GoodsItem),
    {
        let result = (
            &self.store.records,
            &self.store.trader_refs,
            &self.store.updated_idx,
        )
            .transaction(|(records, refs, idx)| {
                let Some(bytes) = records.get(record_id.as_bytes())? else {
                    return abort(RecordError::NotFound);
                };
                let mut record =
                    decode_record(&bytes).map_err(ConflictableTransactionError::Abort)?;

                if record.metadata.locked {
                    return abort(RecordError::Locked);
                }
                if !record.metadata.active {
                    return abort(RecordError::Inactive);
                }
                if record.goods_item.eori != eori {
                    return abort(RecordError::NotFound);
                }

                let old_ref_key = trader_ref_key(eori, &record.goods_item.trader_ref);
                let old_upd_key = updated_key(eori, record.metadata.updated, record_id);

                mutate(&mut record.goods_item);
                record.metadata.version += 1;
                record.metadata.updated = now;
                record.metadata.declarable = Some(declarable::evaluate(&record, now));

                let new_ref_key = trader_ref_key(eori, &record.goods_item.trader_ref);
                if new_ref_key != old_ref_key {
                    if refs.get(new_ref_key.as_slice())?.is_some() {
                        return abort(RecordError::Conflict);
                    }
                    refs.remove(old_ref_key.as_slice())?;
                    refs.insert(new_ref_key, record_id.as_bytes())?;
                }

                idx.remove(old_upd_key.as_slice())?;
                idx.insert(updated_key(eori, now, record_id), record_id.as_bytes())?;

                let bytes =
                    encode_record(&record).map_err(ConflictableTransactionError::Abort)?;
                records.insert(record_id.as_bytes(), bytes)?;

                Ok(record)
            });

        commit(result)
    }

    /// Soft-deletes a record. Always permitted, including against a locked
    /// or already-inactive record; the version still increments. Returns the
    /// record as it existed before the update, and stamps the new update
    /// time truncated to whole seconds per the wire contract, clamped so the
    /// stored update time never moves behind the prior write.
    pub fn deactivate(
        &self,
        record_id: &str,
        eori: &str,
        actor_id: &str,
    ) -> Result<GoodsItemRecord, RecordError> {
        let truncated_now = TimeStamp::now().truncate_to_seconds();

        let result = (&self.store.records, &self.store.updated_idx).transaction(
            |(records, idx)| {
                let Some(bytes) = records.get(record_id.as_bytes())? else {
                    return abort(RecordError::NotFound);
                };
                let prior =
                    decode_record(&bytes).map_err(ConflictableTransactionError::Abort)?;
                if prior.goods_item.eori != eori {
                    return abort(RecordError::NotFound);
                }

                // Truncation can land behind a sub-second prior write; the
                // update time must stay non-decreasing, so fall back to the
                // prior stamp in that case.
                let now = truncated_now.max(prior.metadata.updated);

                let mut updated = prior.clone();
                updated.metadata.active = false;
                updated.metadata.version += 1;
                updated.metadata.updated = now;
                updated.goods_item.actor_id = actor_id.to_string();
                updated.metadata.declarable =
                    Some(declarable::evaluate(&updated, now));

                idx.remove(updated_key(eori, prior.metadata.updated, record_id).as_slice())?;
                idx.insert(updated_key(eori, now, record_id), record_id.as_bytes())?;

                let bytes =
                    encode_record(&updated).map_err(ConflictableTransactionError::Abort)?;
                records.insert(record_id.as_bytes(), bytes)?;

                Ok(prior)
            },
        );

        match commit(result) {
            Ok(prior) => {
                debug!(record_id, eori, "deactivated goods record");
                Ok(prior)
            }
            Err(err) => {
                warn!(record_id, eori, %err, "deactivate rejected");
                Err(err)
            }
        }
    }

    /// Administrative overlay of sparse metadata fields for fixture seeding.
    /// No guard checks; an all-absent patch succeeds against an existing
    /// document. This is the one path allowed to set the stored declarable
    /// mirror directly.
    pub fn support_patch(
        &self,
        record_id: &str,
        eori: &str,
        patch: SupportPatch,
    ) -> Result<(), RecordError> {
        let Some(bytes) = self.store.records.get(record_id.as_bytes())? else {
            return Err(RecordError::NotFound);
        };
        let mut record = decode_record(&bytes)?;
        if record.goods_item.eori != eori {
            return Err(RecordError::NotFound);
        }
        if patch.is_empty() {
            return Ok(());
        }

        let old_updated = record.metadata.updated;
        record.metadata.apply_support_patch(&patch);

        if record.metadata.updated != old_updated {
            self.store
                .updated_idx
                .remove(updated_key(eori, old_updated, record_id))?;
            self.store.updated_idx.insert(
                updated_key(eori, record.metadata.updated, record_id),
                record_id.as_bytes(),
            )?;
        }
        self.store
            .records
            .insert(record_id.as_bytes(), encode_record(&record)?)?;

        debug!(record_id, eori, "applied support patch");
        Ok(())
    }

    /// Owner-scoped point lookup. The declarable value on the response is
    /// recomputed, never read back from storage.
    pub fn get(&self, eori: &str, record_id: &str) -> Result<GoodsItemRecord, RecordError> {
        let Some(mut record) = self.store.get_record(record_id)? else {
            return Err(RecordError::NotFound);
        };
        if record.goods_item.eori != eori {
            return Err(RecordError::NotFound);
        }
        record.metadata.declarable = Some(declarable::evaluate(&record, TimeStamp::now()));
        Ok(record)
    }

    /// Time-ordered, offset-paginated listing scoped to an owner, with the
    /// exact total of the filtered set computed in the same index scan as
    /// the page. A supplied watermark keeps only records updated strictly
    /// after it. Ordering within a shared update timestamp falls back to
    /// record id; callers comparing against wire-precision timestamps
    /// should expect ties at that boundary.
    pub fn list(
        &self,
        eori: &str,
        since: Option<TimeStamp>,
        page_index: usize,
        page_size: usize,
    ) -> Result<RecordPage, RecordError> {
        let now = TimeStamp::now();
        let ids = self.store.scan_owner(eori, since)?;
        let total_count = ids.len();

        let mut records = Vec::new();
        let offset = page_index.saturating_mul(page_size);
        for id in ids.into_iter().skip(offset).take(page_size) {
            let Some(mut record) = self.store.get_record(&id)? else {
                return Err(RecordError::Fatal(format!(
                    "updated index points at missing record {id}"
                )));
            };
            record.metadata.declarable = Some(declarable::evaluate(&record, now));
            records.push(record);
        }

        Ok(RecordPage {
            records,
            total_count,
        })
    }
}
