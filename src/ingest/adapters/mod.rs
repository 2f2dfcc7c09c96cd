// src/ingest/adapters/mod.rs
pub mod hackernews;
pub mod rss;
