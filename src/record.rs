//! Core goods item record types and the request/patch shapes that mutate them
use crate::declarable::Declarable;
use chrono::{DateTime, TimeZone, Utc};

/// Source system stamped into every record's metadata.
pub const SRC_SYSTEM_NAME: &str = "CDAP";

/// Categorisation of a goods item. The declarability thresholds hang off
/// these variants, so the enum is closed on purpose.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    #[n(0)]
    Standard,
    #[n(1)]
    Controlled,
    #[n(2)]
    Excluded,
}

/// Accreditation lifecycle state. Assigned at creation from the owner
/// identity and never trader-mutable afterwards.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccreditationStatus {
    #[n(0)]
    NotRequested,
    #[n(1)]
    Requested,
    #[n(2)]
    InProgress,
    #[n(3)]
    InformationRequested,
    #[n(4)]
    Withdrawn,
    #[n(5)]
    Approved,
    #[n(6)]
    Rejected,
}

impl AccreditationStatus {
    /// Stub rule keyed on the owner identity. A handful of well-known test
    /// identities preselect a status; anything unrecognised defaults to
    /// `NotRequested`.
    pub fn initial_for_owner(eori: &str) -> Self {
        match eori {
            "GB123456789001" => Self::Approved,
            "GB123456789002" => Self::Rejected,
            "GB123456789003" => Self::Requested,
            "GB123456789004" => Self::Withdrawn,
            "GB123456789005" => Self::InProgress,
            _ => Self::NotRequested,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq)]
pub struct Condition {
    #[n(0)]
    pub condition_type: Option<String>,
    #[n(1)]
    pub condition_id: Option<String>,
    #[n(2)]
    pub condition_description: Option<String>,
    #[n(3)]
    pub condition_trader_text: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq)]
pub struct Assessment {
    #[n(0)]
    pub assessment_id: Option<String>,
    #[n(1)]
    pub primary_category: Option<Category>,
    #[n(2)]
    pub condition: Option<Condition>,
}

/// UTC timestamp persisted as a nanosecond i64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Drops the sub-second component. The deactivation wire contract stamps
    /// whole seconds only.
    pub fn truncate_to_seconds(&self) -> Self {
        DateTime::from_timestamp(self.0.timestamp(), 0)
            .map(Self)
            .unwrap_or(*self)
    }
    /// Nanosecond value used for ordered index keys, matching the precision
    /// of the persisted encoding. Saturates outside the representable range;
    /// such timestamps fail CBOR encoding before any index key is written.
    pub fn index_nanos(&self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Trader-supplied content of a record. Replaced wholesale on a full update,
/// overlaid field-by-field on a partial one.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct GoodsItem {
    #[n(0)]
    pub eori: String,
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub trader_ref: String,
    #[n(3)]
    pub comcode: String,
    #[n(4)]
    pub goods_description: String,
    #[n(5)]
    pub country_of_origin: String,
    #[n(6)]
    pub category: Option<Category>,
    #[n(7)]
    pub assessments: Vec<Assessment>,
    #[n(8)]
    pub supplementary_unit: Option<f64>,
    #[n(9)]
    pub measurement_unit: Option<String>,
    #[n(10)]
    pub comcode_effective_from: TimeStamp,
    #[n(11)]
    pub comcode_effective_to: Option<TimeStamp>,
}

/// System-owned lifecycle state riding alongside the goods item.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct GoodsItemMetadata {
    #[n(0)]
    pub accreditation_status: AccreditationStatus,
    #[n(1)]
    pub version: u32,
    #[n(2)]
    pub active: bool,
    #[n(3)]
    pub locked: bool,
    #[n(4)]
    pub to_review: bool,
    #[n(5)]
    pub review_reason: Option<String>,
    #[n(6)]
    pub declarable: Option<Declarable>,
    #[n(7)]
    pub src_system_name: String,
    #[n(8)]
    pub created: TimeStamp,
    #[n(9)]
    pub updated: TimeStamp,
}

impl GoodsItemMetadata {
    pub fn initial(accreditation_status: AccreditationStatus, now: TimeStamp) -> Self {
        Self {
            accreditation_status,
            version: 1,
            active: true,
            locked: false,
            to_review: false,
            review_reason: None,
            declarable: None,
            src_system_name: SRC_SYSTEM_NAME.to_string(),
            created: now,
            updated: now,
        }
    }

    /// Administrative overlay. No guards, no version discipline; only the
    /// fields present in the patch are touched.
    pub fn apply_support_patch(&mut self, patch: &SupportPatch) {
        if let Some(status) = patch.accreditation_status {
            self.accreditation_status = status;
        }
        if let Some(version) = patch.version {
            self.version = version;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(locked) = patch.locked {
            self.locked = locked;
        }
        if let Some(to_review) = patch.to_review {
            self.to_review = to_review;
        }
        if let Some(reason) = &patch.review_reason {
            self.review_reason = Some(reason.clone());
        }
        if let Some(declarable) = patch.declarable {
            self.declarable = Some(declarable);
        }
        if let Some(updated) = patch.updated {
            self.updated = updated;
        }
    }
}

/// The aggregate persisted in the record store.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct GoodsItemRecord {
    #[n(0)]
    pub record_id: String,
    #[n(1)]
    pub goods_item: GoodsItem,
    #[n(2)]
    pub metadata: GoodsItemMetadata,
}

impl GoodsItemRecord {
    pub fn new(
        record_id: String,
        request: CreateRecordRequest,
        accreditation_status: AccreditationStatus,
        now: TimeStamp,
    ) -> Self {
        let goods_item = GoodsItem {
            eori: request.eori,
            actor_id: request.actor_id,
            trader_ref: request.trader_ref,
            comcode: request.comcode,
            goods_description: request.goods_description,
            country_of_origin: request.country_of_origin,
            category: request.category,
            assessments: request.assessments,
            supplementary_unit: request.supplementary_unit,
            measurement_unit: request.measurement_unit,
            comcode_effective_from: request.comcode_effective_from,
            comcode_effective_to: request.comcode_effective_to,
        };

        Self {
            record_id,
            goods_item,
            metadata: GoodsItemMetadata::initial(accreditation_status, now),
        }
    }
}

impl GoodsItem {
    /// Overlays only the fields the patch carries. Absent fields are left
    /// untouched, so an all-absent patch is a content no-op.
    pub fn apply_patch(&mut self, patch: &GoodsItemPatch) {
        if let Some(actor_id) = &patch.actor_id {
            self.actor_id = actor_id.clone();
        }
        if let Some(trader_ref) = &patch.trader_ref {
            self.trader_ref = trader_ref.clone();
        }
        if let Some(comcode) = &patch.comcode {
            self.comcode = comcode.clone();
        }
        if let Some(description) = &patch.goods_description {
            self.goods_description = description.clone();
        }
        if let Some(country) = &patch.country_of_origin {
            self.country_of_origin = country.clone();
        }
        if let Some(category) = patch.category {
            self.category = Some(category);
        }
        if let Some(assessments) = &patch.assessments {
            self.assessments = assessments.clone();
        }
        if let Some(unit) = patch.supplementary_unit {
            self.supplementary_unit = Some(unit);
        }
        if let Some(unit) = &patch.measurement_unit {
            self.measurement_unit = Some(unit.clone());
        }
        if let Some(from) = patch.comcode_effective_from {
            self.comcode_effective_from = from;
        }
        if let Some(to) = patch.comcode_effective_to {
            self.comcode_effective_to = Some(to);
        }
    }

    /// Full overwrite. Every field comes from the request; optional fields
    /// the request omitted are cleared, never retained. The owner identity
    /// is the one thing a replace cannot change.
    pub fn replace_with(&mut self, request: ReplaceRecordRequest) {
        self.actor_id = request.actor_id;
        self.trader_ref = request.trader_ref;
        self.comcode = request.comcode;
        self.goods_description = request.goods_description;
        self.country_of_origin = request.country_of_origin;
        self.category = request.category;
        self.assessments = request.assessments;
        self.supplementary_unit = request.supplementary_unit;
        self.measurement_unit = request.measurement_unit;
        self.comcode_effective_from = request.comcode_effective_from;
        self.comcode_effective_to = request.comcode_effective_to;
    }
}

/// Validated creation payload.
#[derive(Debug, Clone)]
pub struct CreateRecordRequest {
    pub eori: String,
    pub actor_id: String,
    pub trader_ref: String,
    pub comcode: String,
    pub goods_description: String,
    pub country_of_origin: String,
    pub category: Option<Category>,
    pub assessments: Vec<Assessment>,
    pub supplementary_unit: Option<f64>,
    pub measurement_unit: Option<String>,
    pub comcode_effective_from: TimeStamp,
    pub comcode_effective_to: Option<TimeStamp>,
}

impl CreateRecordRequest {
    pub fn new(
        eori: &str,
        actor_id: &str,
        trader_ref: &str,
        comcode: &str,
        goods_description: &str,
        country_of_origin: &str,
        comcode_effective_from: TimeStamp,
    ) -> Self {
        Self {
            eori: eori.to_string(),
            actor_id: actor_id.to_string(),
            trader_ref: trader_ref.to_string(),
            comcode: comcode.to_string(),
            goods_description: goods_description.to_string(),
            country_of_origin: country_of_origin.to_string(),
            category: None,
            assessments: vec![],
            supplementary_unit: None,
            measurement_unit: None,
            comcode_effective_from,
            comcode_effective_to: None,
        }
    }
    pub fn set_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
    pub fn set_assessments(mut self, assessments: Vec<Assessment>) -> Self {
        self.assessments = assessments;
        self
    }
    pub fn set_supplementary_unit(mut self, unit: f64) -> Self {
        self.supplementary_unit = Some(unit);
        self
    }
    pub fn set_measurement_unit(mut self, unit: &str) -> Self {
        self.measurement_unit = Some(unit.to_string());
        self
    }
    pub fn set_comcode_effective_to(mut self, to: TimeStamp) -> Self {
        self.comcode_effective_to = Some(to);
        self
    }
}

/// Partial update payload. Absent fields leave the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct GoodsItemPatch {
    pub actor_id: Option<String>,
    pub trader_ref: Option<String>,
    pub comcode: Option<String>,
    pub goods_description: Option<String>,
    pub country_of_origin: Option<String>,
    pub category: Option<Category>,
    pub assessments: Option<Vec<Assessment>>,
    pub supplementary_unit: Option<f64>,
    pub measurement_unit: Option<String>,
    pub comcode_effective_from: Option<TimeStamp>,
    pub comcode_effective_to: Option<TimeStamp>,
}

impl GoodsItemPatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_actor_id(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }
    pub fn set_trader_ref(mut self, trader_ref: &str) -> Self {
        self.trader_ref = Some(trader_ref.to_string());
        self
    }
    pub fn set_comcode(mut self, comcode: &str) -> Self {
        self.comcode = Some(comcode.to_string());
        self
    }
    pub fn set_goods_description(mut self, description: &str) -> Self {
        self.goods_description = Some(description.to_string());
        self
    }
    pub fn set_country_of_origin(mut self, country: &str) -> Self {
        self.country_of_origin = Some(country.to_string());
        self
    }
    pub fn set_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
    pub fn set_assessments(mut self, assessments: Vec<Assessment>) -> Self {
        self.assessments = Some(assessments);
        self
    }
    pub fn set_supplementary_unit(mut self, unit: f64) -> Self {
        self.supplementary_unit = Some(unit);
        self
    }
    pub fn set_measurement_unit(mut self, unit: &str) -> Self {
        self.measurement_unit = Some(unit.to_string());
        self
    }
    pub fn set_comcode_effective_from(mut self, from: TimeStamp) -> Self {
        self.comcode_effective_from = Some(from);
        self
    }
    pub fn set_comcode_effective_to(mut self, to: TimeStamp) -> Self {
        self.comcode_effective_to = Some(to);
        self
    }
}

/// Full update payload. Optional fields left out of the request are cleared
/// on the stored record.
#[derive(Debug, Clone)]
pub struct ReplaceRecordRequest {
    pub actor_id: String,
    pub trader_ref: String,
    pub comcode: String,
    pub goods_description: String,
    pub country_of_origin: String,
    pub category: Option<Category>,
    pub assessments: Vec<Assessment>,
    pub supplementary_unit: Option<f64>,
    pub measurement_unit: Option<String>,
    pub comcode_effective_from: TimeStamp,
    pub comcode_effective_to: Option<TimeStamp>,
}

impl ReplaceRecordRequest {
    pub fn new(
        actor_id: &str,
        trader_ref: &str,
        comcode: &str,
        goods_description: &str,
        country_of_origin: &str,
        comcode_effective_from: TimeStamp,
    ) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            trader_ref: trader_ref.to_string(),
            comcode: comcode.to_string(),
            goods_description: goods_description.to_string(),
            country_of_origin: country_of_origin.to_string(),
            category: None,
            assessments: vec![],
            supplementary_unit: None,
            measurement_unit: None,
            comcode_effective_from,
            comcode_effective_to: None,
        }
    }
    pub fn set_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
    pub fn set_assessments(mut self, assessments: Vec<Assessment>) -> Self {
        self.assessments = assessments;
        self
    }
    pub fn set_supplementary_unit(mut self, unit: f64) -> Self {
        self.supplementary_unit = Some(unit);
        self
    }
    pub fn set_measurement_unit(mut self, unit: &str) -> Self {
        self.measurement_unit = Some(unit.to_string());
        self
    }
    pub fn set_comcode_effective_to(mut self, to: TimeStamp) -> Self {
        self.comcode_effective_to = Some(to);
        self
    }
}

/// Sparse metadata overlay for fixture seeding by support tooling.
#[derive(Debug, Clone, Default)]
pub struct SupportPatch {
    pub accreditation_status: Option<AccreditationStatus>,
    pub version: Option<u32>,
    pub active: Option<bool>,
    pub locked: Option<bool>,
    pub to_review: Option<bool>,
    pub review_reason: Option<String>,
    pub declarable: Option<Declarable>,
    pub updated: Option<TimeStamp>,
}

impl SupportPatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_accreditation_status(mut self, status: AccreditationStatus) -> Self {
        self.accreditation_status = Some(status);
        self
    }
    pub fn set_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
    pub fn set_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
    pub fn set_locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }
    pub fn set_to_review(mut self, to_review: bool) -> Self {
        self.to_review = Some(to_review);
        self
    }
    pub fn set_review_reason(mut self, reason: &str) -> Self {
        self.review_reason = Some(reason.to_string());
        self
    }
    pub fn set_declarable(mut self, declarable: Declarable) -> Self {
        self.declarable = Some(declarable);
        self
    }
    pub fn set_updated(mut self, updated: TimeStamp) -> Self {
        self.updated = Some(updated);
        self
    }
    pub fn is_empty(&self) -> bool {
        self.accreditation_status.is_none()
            && self.version.is_none()
            && self.active.is_none()
            && self.locked.is_none()
            && self.to_review.is_none()
            && self.review_reason.is_none()
            && self.declarable.is_none()
            && self.updated.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> GoodsItemRecord {
        let request = CreateRecordRequest::new(
            "GB000000000001",
            "GB000000000001",
            "ref-001",
            "10410100",
            "Organic bananas",
            "EC",
            TimeStamp::new_with(2024, 1, 1, 0, 0, 0),
        )
        .set_category(Category::Standard)
        .set_supplementary_unit(13.5)
        .set_measurement_unit("Kilograms");

        GoodsItemRecord::new(
            "rec_test".to_string(),
            request,
            AccreditationStatus::NotRequested,
            TimeStamp::new_with(2024, 6, 1, 12, 0, 0),
        )
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn record_cbor_roundtrip() {
        let original = sample_record();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: GoodsItemRecord = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn empty_patch_leaves_content_unchanged() {
        let mut record = sample_record();
        let before = record.goods_item.clone();

        record.goods_item.apply_patch(&GoodsItemPatch::new());

        assert_eq!(before, record.goods_item);
    }

    #[test]
    fn replace_clears_omitted_optional_fields() {
        let mut record = sample_record();
        assert!(record.goods_item.supplementary_unit.is_some());

        record.goods_item.replace_with(ReplaceRecordRequest::new(
            "GB000000000001",
            "ref-001",
            "10410100",
            "Organic bananas",
            "EC",
            TimeStamp::new_with(2024, 1, 1, 0, 0, 0),
        ));

        assert!(record.goods_item.supplementary_unit.is_none());
        assert!(record.goods_item.measurement_unit.is_none());
        assert!(record.goods_item.category.is_none());
    }

    #[test]
    fn truncation_drops_subseconds() {
        let stamped = TimeStamp::now().truncate_to_seconds();
        assert_eq!(stamped.to_datetime_utc().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn stub_rule_defaults_to_not_requested() {
        assert_eq!(
            AccreditationStatus::initial_for_owner("GB123456789001"),
            AccreditationStatus::Approved
        );
        assert_eq!(
            AccreditationStatus::initial_for_owner("GB999999999999"),
            AccreditationStatus::NotRequested
        );
    }
}
