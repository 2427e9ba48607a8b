pub mod event;
pub mod index;
pub mod partition;

pub use event::Event;
pub use index::{IndexKey, IndexRecord, SortKey};
pub use partition::{TimePartition, WINDOW_MILLIS};

use crate::core::{EventLogError, Result};

/// Reserved separator between the fields of composite keys.
pub const KEY_DELIMITER: char = ',';

/// Checks that a namespace or event type can be embedded in a composite key.
pub fn validate_key_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EventLogError::validation(format!("{} must not be empty", kind)));
    }
    if value.contains(KEY_DELIMITER) {
        return Err(EventLogError::validation(format!(
            "invalid {} '{}': must not contain '{}'",
            kind, value, KEY_DELIMITER
        )));
    }
    Ok(())
}
