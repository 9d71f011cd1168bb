// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential persistence.
//!
//! The lifecycle logic only sees [`CredentialStore`]; Firestore backs it in
//! production and [`MemoryStore`] for local development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::Credential;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const CREDENTIALS: &str = "credentials";
}

/// Keyed store holding at most one credential per user.
///
/// Each operation is atomic for its single record; nothing spans records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, AppError>;

    /// Insert or replace the record keyed by `credential.user_id`.
    async fn upsert(&self, credential: &Credential) -> Result<(), AppError>;

    /// Delete the user's record. Deleting a missing record is not an error.
    async fn delete(&self, user_id: &str) -> Result<(), AppError>;

    /// Housekeeping: remove records whose `expires_at` is before `cutoff`.
    /// Returns the number of records removed.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError>;
}
