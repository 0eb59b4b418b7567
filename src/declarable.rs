//! Declarability evaluation for goods item records
use crate::record::{Category, GoodsItemRecord, TimeStamp};

/// Approval-readiness of a record for an IMMI declaration.
///
/// Derived at read time from the record's category, commodity code length,
/// effective date window and review/active flags. A raw copy of the last
/// computed value is mirrored onto the metadata for support tooling, but
/// responses never trust the stored value.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declarable {
    #[n(0)]
    ImmiReady,
    #[n(1)]
    ImmiNotReady,
    #[n(2)]
    NotReady,
}

impl std::fmt::Display for Declarable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::ImmiReady => "IMMI Ready",
            Self::ImmiNotReady => "Not Ready For IMMI",
            Self::NotReady => "Not Ready For Use",
        };
        write!(f, "{label}")
    }
}

/// Pure rule table. Inactive or under-review records are never ready; the
/// effective window is inclusive on both ends and unbounded when the upper
/// end is absent; Standard needs a 6-digit comcode, Controlled an 8-digit
/// one, Excluded is in-window but never IMMI-ready. A record without a
/// categorisation cannot be ready either.
pub fn evaluate(record: &GoodsItemRecord, now: TimeStamp) -> Declarable {
    let item = &record.goods_item;
    let metadata = &record.metadata;

    if !metadata.active || metadata.to_review {
        return Declarable::NotReady;
    }

    let now = now.to_datetime_utc();
    if now < item.comcode_effective_from.to_datetime_utc() {
        return Declarable::NotReady;
    }
    if let Some(to) = item.comcode_effective_to {
        if now > to.to_datetime_utc() {
            return Declarable::NotReady;
        }
    }

    match item.category {
        None => Declarable::NotReady,
        Some(Category::Standard) if item.comcode.len() >= 6 => Declarable::ImmiReady,
        Some(Category::Controlled) if item.comcode.len() >= 8 => Declarable::ImmiReady,
        Some(Category::Standard) | Some(Category::Controlled) => Declarable::NotReady,
        Some(Category::Excluded) => Declarable::ImmiNotReady,
    }
}
