//! Goods item record store: a guarded, transactional mutation engine over an
//! embedded document store, plus time-ordered owner-scoped listings and a
//! derived declarability status.

pub mod declarable;
pub mod error;
pub mod profile;
pub mod record;
pub mod service;
pub mod store;
pub mod utils;

pub use declarable::Declarable;
pub use error::RecordError;
pub use profile::{ProfileService, TraderProfile};
pub use record::{
    AccreditationStatus, Assessment, Category, Condition, CreateRecordRequest, GoodsItem,
    GoodsItemMetadata, GoodsItemPatch, GoodsItemRecord, ReplaceRecordRequest, SupportPatch,
    TimeStamp,
};
pub use service::{RecordPage, RecordService};
pub use store::{RecordStore, StoreConfig};
