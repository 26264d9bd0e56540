use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::writer::ClientWriter;

/// Non-owning reference to a live, authenticated session: enough to target
/// its outbound channel and its forced-termination path. The session itself
/// is owned by its connection task.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub writer: Arc<ClientWriter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    AlreadyExists,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::AlreadyExists => write!(f, "username already registered"),
        }
    }
}

/// Registry of authenticated usernames. An entry exists exactly while its
/// session is CONNECTED; usernames are unique and case-sensitive.
#[derive(Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<String, SessionHandle>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        UserDirectory::default()
    }

    /// Claims `username` for `handle`. The existence check and the insert
    /// run under one write lock, so two concurrent handshakes can never both
    /// succeed with the same name.
    pub async fn register(
        &self,
        username: &str,
        handle: SessionHandle,
    ) -> Result<(), RegisterError> {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(RegisterError::AlreadyExists);
        }
        users.insert(username.to_string(), handle);
        Ok(())
    }

    pub async fn unregister(&self, username: &str) {
        self.users.write().await.remove(username);
    }

    pub async fn lookup(&self, username: &str) -> Option<SessionHandle> {
        self.users.read().await.get(username).cloned()
    }

    pub async fn exists(&self, username: &str) -> bool {
        self.users.read().await.contains_key(username)
    }

    /// Sorted usernames of every registered session.
    pub async fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handles of every registered session except `exclude`, for fan-out.
    pub async fn peers(&self, exclude: &str) -> Vec<(String, SessionHandle)> {
        self.users
            .read()
            .await
            .iter()
            .filter(|(name, _)| name.as_str() != exclude)
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect()
    }
}
