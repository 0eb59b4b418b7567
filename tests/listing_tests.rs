//! Listing engine coverage: owner scoping, watermark filtering, pagination
//! arithmetic and total counts.

use chrono::Duration;
use goods_record_store::{
    Category, CreateRecordRequest, RecordError, RecordService, RecordStore, StoreConfig,
    SupportPatch, TimeStamp,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn open_service(path: &Path) -> anyhow::Result<RecordService> {
    let db = sled::open(path)?;
    let store = RecordStore::open(Arc::new(db), StoreConfig::default())?;
    Ok(RecordService::new(store))
}

fn request(eori: &str, trader_ref: &str) -> CreateRecordRequest {
    CreateRecordRequest::new(
        eori,
        eori,
        trader_ref,
        "10410100",
        "Organic bananas",
        "EC",
        TimeStamp::new_with(2024, 1, 1, 0, 0, 0),
    )
    .set_category(Category::Standard)
}

/// Seeds ten records for the owner with update times one second apart, in a
/// deterministic order, and two records for a second owner as noise.
fn seed(service: &RecordService, eori: &str) -> anyhow::Result<Vec<String>> {
    let mut ids = Vec::new();
    for i in 0..10u32 {
        let record = service.create(request(eori, &format!("ref-{i}")))?;
        service.support_patch(
            &record.record_id,
            eori,
            SupportPatch::new().set_updated(TimeStamp::new_with(2025, 1, 1, 0, 0, i)),
        )?;
        ids.push(record.record_id);
    }

    let other = "GB000000000099";
    for i in 0..2u32 {
        service.create(request(other, &format!("ref-other-{i}")))?;
    }

    Ok(ids)
}

#[test]
fn pages_are_offset_by_index_times_size() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("pages_offset.db"))?;
    let eori = "GB000000000061";

    let ids = seed(&service, eori)?;

    let page = service.list(eori, None, 1, 3)?;
    assert_eq!(page.total_count, 10);
    assert_eq!(page.records.len(), 3);

    // records 4-6 of the time-ordered set
    let page_ids: Vec<_> = page.records.iter().map(|r| r.record_id.clone()).collect();
    assert_eq!(page_ids, ids[3..6].to_vec());

    Ok(())
}

#[test]
fn listing_is_ascending_by_update_time() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("ascending_order.db"))?;
    let eori = "GB000000000062";

    seed(&service, eori)?;

    let page = service.list(eori, None, 0, 10)?;
    assert_eq!(page.records.len(), 10);

    for window in page.records.windows(2) {
        assert!(window[0].metadata.updated < window[1].metadata.updated);
    }

    Ok(())
}

#[test]
fn watermark_excludes_records_at_or_before_it() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("watermark.db"))?;
    let eori = "GB000000000063";

    let ids = seed(&service, eori)?;

    // the watermark equals the fifth record's update time exactly; only the
    // strictly-later five may come back
    let watermark = TimeStamp::new_with(2025, 1, 1, 0, 0, 4);
    let page = service.list(eori, Some(watermark), 0, 10)?;

    assert_eq!(page.total_count, 5);
    let page_ids: Vec<_> = page.records.iter().map(|r| r.record_id.clone()).collect();
    assert_eq!(page_ids, ids[5..].to_vec());

    Ok(())
}

#[test]
fn watermark_separates_updates_within_the_same_microsecond() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("nanosecond_watermark.db"))?;
    let eori = "GB000000000068";

    let record = service.create(request(eori, "ref-nano"))?;
    let watermark = TimeStamp::new_with(2025, 1, 1, 0, 0, 0);
    let just_after =
        TimeStamp::from(watermark.to_datetime_utc() + Duration::nanoseconds(500));
    service.support_patch(
        &record.record_id,
        eori,
        SupportPatch::new().set_updated(just_after),
    )?;

    // 500ns past the watermark is strictly later and must be listed
    let page = service.list(eori, Some(watermark), 0, 10)?;
    assert_eq!(page.total_count, 1);
    assert_eq!(page.records[0].record_id, record.record_id);

    // a watermark at the exact update time still excludes it
    let page = service.list(eori, Some(just_after), 0, 10)?;
    assert_eq!(page.total_count, 0);

    Ok(())
}

#[test]
fn oversized_page_index_yields_an_empty_page() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("oversized_page_index.db"))?;
    let eori = "GB000000000069";

    seed(&service, eori)?;

    // the offset arithmetic must saturate rather than wrap
    let page = service.list(eori, None, usize::MAX, 3)?;
    assert_eq!(page.total_count, 10);
    assert!(page.records.is_empty());

    Ok(())
}

#[test]
fn empty_filtered_set_is_not_an_error() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("empty_set.db"))?;
    let eori = "GB000000000064";

    // unknown owner
    let page = service.list(eori, None, 0, 10)?;
    assert_eq!(page.total_count, 0);
    assert!(page.records.is_empty());

    // a page past the end of a non-empty set
    seed(&service, eori)?;
    let page = service.list(eori, None, 4, 3)?;
    assert_eq!(page.total_count, 10);
    assert!(page.records.is_empty());

    Ok(())
}

#[test]
fn listings_and_lookups_are_owner_scoped() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("owner_scoped.db"))?;
    let eori = "GB000000000065";

    seed(&service, eori)?;

    let other_record = service.create(request("GB000000000066", "ref-other-owner"))?;

    let page = service.list(eori, None, 0, 20)?;
    assert_eq!(page.total_count, 10);
    assert!(page.records.iter().all(|r| r.goods_item.eori == eori));

    let err = service.get(eori, &other_record.record_id).unwrap_err();
    assert_eq!(err, RecordError::NotFound);
    assert!(
        service
            .get("GB000000000066", &other_record.record_id)
            .is_ok()
    );

    Ok(())
}

#[test]
fn mutations_move_records_to_the_end_of_the_listing() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir.path().join("mutation_reorders.db"))?;
    let eori = "GB000000000067";

    let ids = seed(&service, eori)?;

    // patching the oldest record re-stamps it to now, pushing it last
    service.patch(
        &ids[0],
        eori,
        goods_record_store::GoodsItemPatch::new().set_goods_description("Refreshed"),
    )?;

    let page = service.list(eori, None, 0, 10)?;
    assert_eq!(page.records.last().map(|r| r.record_id.as_str()), Some(ids[0].as_str()));

    Ok(())
}
