use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{Storage, StorageSession};
use crate::error::StorageError;
use crate::models::{RefreshToken, User};

/// In-process storage used by tests and local runs.
///
/// Keeps counters of sessions and lookups so callers can assert how often
/// the store was consulted.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    refresh_tokens: Vec<RefreshToken>,
    lookups: usize,
    sessions: usize,
    fail_password_updates: bool,
}

fn lock(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
    state
        .lock()
        .map_err(|e| StorageError::Unavailable(format!("Memory storage mutex poisoned: {}", e)))
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_user(&self, user: User) {
        self.state().users.insert(user.user_id, user);
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.state().users.get(&user_id).cloned()
    }

    /// Committed refresh-token records, in insertion order.
    pub fn refresh_tokens(&self) -> Vec<RefreshToken> {
        self.state().refresh_tokens.clone()
    }

    /// Number of user lookups served, by email or by id.
    pub fn lookup_count(&self) -> usize {
        self.state().lookups
    }

    pub fn sessions_started(&self) -> usize {
        self.state().sessions
    }

    /// Make every password-hash update fail with `Unavailable`.
    pub fn fail_password_updates(&self, fail: bool) {
        self.state().fail_password_updates = fail;
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        lock(&self.state)?.sessions += 1;
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            active: true,
            staged_tokens: Vec::new(),
            staged_hashes: HashMap::new(),
        }))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        lock(&self.state).map(|_| ())
    }
}

pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    active: bool,
    staged_tokens: Vec<RefreshToken>,
    staged_hashes: HashMap<Uuid, String>,
}

impl MemorySession {
    fn ensure_active(&self) -> Result<(), StorageError> {
        if self.active {
            Ok(())
        } else {
            Err(StorageError::SessionClosed)
        }
    }

    /// Apply this session's uncommitted writes to a read.
    fn overlay(&self, user: Option<User>) -> Option<User> {
        user.map(|mut user| {
            if let Some(hash) = self.staged_hashes.get(&user.user_id) {
                user.password_hash = Some(hash.clone());
            }
            user
        })
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    fn is_active(&self) -> bool {
        self.active
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StorageError> {
        self.ensure_active()?;
        let email = email.to_lowercase();
        let found = {
            let mut state = lock(&self.state)?;
            state.lookups += 1;
            state
                .users
                .values()
                .find(|u| {
                    u.email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase() == email)
                })
                .cloned()
        };
        Ok(self.overlay(found))
    }

    async fn find_user_by_id(&mut self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        self.ensure_active()?;
        let found = {
            let mut state = lock(&self.state)?;
            state.lookups += 1;
            state.users.get(&user_id).cloned()
        };
        Ok(self.overlay(found))
    }

    async fn insert_refresh_token(&mut self, token: &RefreshToken) -> Result<(), StorageError> {
        self.ensure_active()?;
        let duplicate = self.staged_tokens.iter().any(|t| t.value == token.value)
            || lock(&self.state)?
                .refresh_tokens
                .iter()
                .any(|t| t.value == token.value);
        if duplicate {
            return Err(StorageError::Conflict("refresh token value".to_string()));
        }
        self.staged_tokens.push(token.clone());
        Ok(())
    }

    async fn update_password_hash(
        &mut self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StorageError> {
        self.ensure_active()?;
        {
            let state = lock(&self.state)?;
            if state.fail_password_updates {
                return Err(StorageError::Unavailable(
                    "password updates are disabled".to_string(),
                ));
            }
            if !state.users.contains_key(&user_id) {
                return Err(StorageError::Integrity(format!("User {} not found", user_id)));
            }
        }
        self.staged_hashes.insert(user_id, password_hash.to_string());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.ensure_active()?;
        let mut state = lock(&self.state)?;
        for token in &self.staged_tokens {
            if state.refresh_tokens.iter().any(|t| t.value == token.value) {
                return Err(StorageError::Conflict("refresh token value".to_string()));
            }
        }
        state.refresh_tokens.append(&mut self.staged_tokens);
        for (user_id, hash) in self.staged_hashes.drain() {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.password_hash = Some(hash);
            }
        }
        self.active = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.ensure_active()?;
        self.staged_tokens.clear();
        self.staged_hashes.clear();
        self.active = false;
        Ok(())
    }
}
