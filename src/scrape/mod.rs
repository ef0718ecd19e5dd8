pub mod extract;
pub mod fetcher;
