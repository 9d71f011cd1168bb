// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process credential store backed by a concurrent map.

use super::CredentialStore;
use crate::error::AppError;
use crate::models::Credential;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Credential store kept in memory. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        Ok(self.records.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), AppError> {
        self.records
            .insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), AppError> {
        self.records.remove(user_id);
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        let before = self.records.len();
        self.records.retain(|_, c| c.expires_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()))
    }
}
