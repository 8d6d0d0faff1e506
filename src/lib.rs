//! BevAlc Intelligence core
//!
//! Acquires the full historical record of COLA label approvals from the
//! TTB public registry, keeps a Cloudflare D1 database in sync with the
//! local record stores, and classifies every record's first-observation
//! signal (new company / new brand / new SKU / refile).

pub mod config;
pub mod db;
pub mod models;
pub mod services;
