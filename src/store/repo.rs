use crate::domain::email::NormalizedEmail;
use crate::error::StoreError;

/// Durable, append-only home for normalized records.
pub trait RecordStore: Send + Sync {
    fn append(&self, email: &NormalizedEmail) -> Result<(), StoreError>;

    /// The last `count` records, oldest first.
    fn recent(&self, count: usize) -> Result<Vec<NormalizedEmail>, StoreError>;
}
