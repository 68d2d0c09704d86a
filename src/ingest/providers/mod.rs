// src/ingest/providers/mod.rs
pub mod google_news;

pub use google_news::GoogleNewsRss;
