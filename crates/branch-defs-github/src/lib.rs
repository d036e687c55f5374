pub mod client;
pub mod fetcher;

pub use client::GitHubClient;
pub use fetcher::HttpSourceFetcher;
