//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a stored identifier column.
///
/// A malformed stored id is an internal error, not a caller mistake.
pub fn parse_stored(entity: &'static str, column: &str, s: &str) -> Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| Error::Internal(format!("{} {} holds malformed uuid {:?}: {}", entity, column, s, e)))
}
