pub mod error;
pub mod value;

pub use error::{EventLogError, Result};
pub use value::{AttributeValue, Item, Key, item};
