//! # Repo Scout Core
//!
//! I/O-free logic for Repo Scout: data models, keyword normalization,
//! best-effort knowledge extraction, the in-memory knowledge store,
//! heuristic retrieval, and the synthetic fallback dataset.
//!
//! This crate contains no tokio, sqlx, reqwest, or filesystem access.
//! Fetching, persistence and orchestration live in the `repo-scout`
//! application crate.

pub mod extract;
pub mod keywords;
pub mod models;
pub mod search;
pub mod store;
pub mod synthetic;
