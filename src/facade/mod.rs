pub mod database;
pub mod options;
pub mod scan;

pub use database::Database;
pub use options::{EventCursor, ReadOptions};
pub use scan::EventStream;
