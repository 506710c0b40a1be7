//! Newsdesk - A News Aggregation Backend
//!
//! This crate ingests articles from NewsAPI, The Guardian and BBC News into
//! SQLite and serves them over a JSON API with search, user accounts and a
//! personalized feed.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod pagination;
pub mod routes;
pub mod sources;
pub mod validation;
