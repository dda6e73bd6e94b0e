//! FlowBus pub/sub for tree change events.
//!
//! Every successful mutation publishes a [`VfsFlow`]. Publishing is
//! fire-and-forget: with no subscribers the event is simply dropped.
//! Subscribers filter by NATS-style subject patterns.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `vfs.*` matches `vfs.created`
//! - `>` matches one or more tokens (only at end): `vfs.>` matches everything under `vfs`
//! - Exact match: `vfs.deleted` only matches `vfs.deleted`

use std::time::Instant;

use hako_types::WorkspaceId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::path::Path;

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            // `>` must be last and swallows the rest
            ">" => return pi == pattern_tokens.len() - 1,
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

// ============================================================================
// Flow Message Types
// ============================================================================

/// Trait for payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// A message published to the flow bus.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    /// The subject (derived from payload).
    pub subject: String,
    pub payload: T,
    /// When this message was created.
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    pub fn new(payload: T) -> Self {
        let subject = payload.subject().to_string();
        Self {
            subject,
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// Tree Flow Events
// ============================================================================

/// Tree change events.
///
/// Each carries the workspace, the node's path after the change and whether
/// it is a folder. Moves and renames also carry the old path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VfsFlow {
    Created {
        workspace_id: WorkspaceId,
        path: Path,
        is_folder: bool,
    },
    ContentUpdated {
        workspace_id: WorkspaceId,
        path: Path,
    },
    PropertiesUpdated {
        workspace_id: WorkspaceId,
        path: Path,
        is_folder: bool,
    },
    AclUpdated {
        workspace_id: WorkspaceId,
        path: Path,
        is_folder: bool,
    },
    Moved {
        workspace_id: WorkspaceId,
        path: Path,
        old_path: Path,
        is_folder: bool,
    },
    Renamed {
        workspace_id: WorkspaceId,
        path: Path,
        old_path: Path,
        is_folder: bool,
    },
    Deleted {
        workspace_id: WorkspaceId,
        path: Path,
        is_folder: bool,
    },
}

impl VfsFlow {
    /// Path the event is about (the new path for moves and renames).
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path, .. }
            | Self::ContentUpdated { path, .. }
            | Self::PropertiesUpdated { path, .. }
            | Self::AclUpdated { path, .. }
            | Self::Moved { path, .. }
            | Self::Renamed { path, .. }
            | Self::Deleted { path, .. } => path,
        }
    }
}

impl HasSubject for VfsFlow {
    fn subject(&self) -> &str {
        match self {
            Self::Created { .. } => "vfs.created",
            Self::ContentUpdated { .. } => "vfs.content_updated",
            Self::PropertiesUpdated { .. } => "vfs.properties_updated",
            Self::AclUpdated { .. } => "vfs.acl_updated",
            Self::Moved { .. } => "vfs.moved",
            Self::Renamed { .. } => "vfs.renamed",
            Self::Deleted { .. } => "vfs.deleted",
        }
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Typed broadcast bus.
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// Create a new flow bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish a payload. Returns how many subscribers got it.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    /// Subscribe to messages whose subject matches `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for FlowBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for FlowBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A pattern-filtered subscription to a FlowBus.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Receive the next matching message, waiting if necessary.
    ///
    /// Returns None once the bus is gone.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(pattern = %self.pattern, lagged = n, "Flow subscription lagged behind");
                }
            }
        }
    }

    /// Receive the next matching message without blocking.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(pattern = %self.pattern, lagged = n, "Flow subscription lagged behind");
                }
            }
        }
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}
