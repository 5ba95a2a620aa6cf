//! Integration tests for the CEP crawler
//!
//! Providers are replaced by wiremock servers; the crawl store and the queue
//! live in temporary SQLite files.

mod common;
mod crawl_tests;
mod resolver_tests;
