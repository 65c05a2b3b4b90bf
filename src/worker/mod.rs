pub mod cache;
pub mod cache_worker;
pub mod fetcher;
