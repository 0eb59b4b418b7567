#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("no record matches the given record id and owner")]
    NotFound,
    #[error("record is locked and cannot be amended")]
    Locked,
    #[error("record has been removed and cannot be amended")]
    Inactive,
    #[error("a record already exists for this owner and trader reference")]
    Conflict,
    #[error("record store failure: {0}")]
    Fatal(String),
}

impl From<sled::Error> for RecordError {
    fn from(err: sled::Error) -> Self {
        RecordError::Fatal(err.to_string())
    }
}
