//! HTTP adapters for the feed API

pub mod feed_client;

pub use feed_client::HttpFeedClient;
