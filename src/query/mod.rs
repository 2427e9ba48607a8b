pub mod builder;
pub mod descriptor;
pub mod executor;
pub mod fetcher;

pub use builder::{EventQueryBuilder, Order, PartitionQueryBuilder};
pub use descriptor::{KeyQuery, Projection, RenderedQuery, SortKeyCondition};
pub use executor::{PageStream, QueryExecutor};
pub use fetcher::EventFetcher;
