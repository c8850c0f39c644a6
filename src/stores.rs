//! Collaborator contracts the core consumes.
//!
//! Session and memory storage live outside the core; these traits are the
//! read/write surface it relies on. The file-backed implementations belong
//! to the host application.

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::error::CoreError;
use crate::types::{MemoryScope, Turn};

/// Summary row for a stored session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub project: String,
    #[serde(default)]
    pub title: Option<String>,
    pub started_at: Millis,
    pub turn_count: u32,
}

/// A fully loaded session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub meta: SessionMeta,
    pub turns: Vec<Turn>,
}

/// Read-only session storage.
pub trait SessionStore: Send + Sync {
    /// List sessions, optionally restricted to one project.
    fn list(&self, project: Option<&str>) -> Result<Vec<SessionMeta>, CoreError>;
    fn load(&self, id: &str, project: &str) -> Result<SessionRecord, CoreError>;
}

/// One appended memory-stream entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub heading: String,
    pub body: String,
    pub recorded_at: Millis,
}

/// Long-lived memory streams addressed by [`MemoryScope`].
pub trait MemoryStore: Send + Sync {
    fn get(&self, scope: &MemoryScope) -> Result<Option<String>, CoreError>;
    fn update(&self, scope: &MemoryScope, content: &str) -> Result<(), CoreError>;
    fn append(&self, scope: &MemoryScope, entry: &MemoryEntry) -> Result<(), CoreError>;
}
