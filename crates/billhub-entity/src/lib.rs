//! # billhub-entity
//!
//! Persisted models for the BillHub plugin system. Every struct in this
//! crate represents a database table row or a domain value object. Row
//! types additionally derive `sqlx::FromRow`.

pub mod audit;
pub mod plugin;
