//! Trader profile aggregate and its service
//!
//! Profiles are the simpler sibling of goods records: one document per
//! owner, unique on the owner identity, no lifecycle guards. `insert`
//! detects duplicates with a compare-and-swap against an absent key since
//! the key is the unique field itself.
use crate::error::RecordError;
use crate::record::TimeStamp;
use crate::store::{RecordStore, decode_profile, encode_profile};
use tracing::debug;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct TraderProfile {
    #[n(0)]
    pub eori: String,
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub ukims_number: Option<String>,
    #[n(3)]
    pub nirms_number: Option<String>,
    #[n(4)]
    pub niphl_number: Option<String>,
    #[n(5)]
    pub last_updated: TimeStamp,
}

impl TraderProfile {
    pub fn new(eori: &str, actor_id: &str) -> Self {
        Self {
            eori: eori.to_string(),
            actor_id: actor_id.to_string(),
            ukims_number: None,
            nirms_number: None,
            niphl_number: None,
            last_updated: TimeStamp::now(),
        }
    }
    pub fn set_ukims_number(mut self, number: &str) -> Self {
        self.ukims_number = Some(number.to_string());
        self
    }
    pub fn set_nirms_number(mut self, number: &str) -> Self {
        self.nirms_number = Some(number.to_string());
        self
    }
    pub fn set_niphl_number(mut self, number: &str) -> Self {
        self.niphl_number = Some(number.to_string());
        self
    }
}

pub struct ProfileService {
    store: RecordStore,
}

impl ProfileService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Unconditional write; creates or overwrites and re-stamps
    /// `last_updated`.
    pub fn upsert(&self, mut profile: TraderProfile) -> Result<TraderProfile, RecordError> {
        profile.last_updated = TimeStamp::now();
        let bytes = encode_profile(&profile)?;
        self.store.profiles.insert(profile.eori.as_bytes(), bytes)?;
        debug!(eori = %profile.eori, "upserted trader profile");
        Ok(profile)
    }

    /// Insert with duplicate detection; a second profile for the same owner
    /// is a `Conflict`.
    pub fn insert(&self, mut profile: TraderProfile) -> Result<TraderProfile, RecordError> {
        profile.last_updated = TimeStamp::now();
        let bytes = encode_profile(&profile)?;
        self.store
            .profiles
            .compare_and_swap(profile.eori.as_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| RecordError::Conflict)?;
        debug!(eori = %profile.eori, "inserted trader profile");
        Ok(profile)
    }

    pub fn get(&self, eori: &str) -> Result<TraderProfile, RecordError> {
        match self.store.profiles.get(eori.as_bytes())? {
            Some(bytes) => decode_profile(&bytes),
            None => Err(RecordError::NotFound),
        }
    }
}
