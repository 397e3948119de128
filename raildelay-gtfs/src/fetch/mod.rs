mod fetcher;

pub use fetcher::{GtfsFetcher, CANONICAL_ARCHIVE, REQUIRED_TABLES};
