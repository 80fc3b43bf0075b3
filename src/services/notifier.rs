use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::models::{AttendanceMethod, AttendanceRecord, AttendanceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceEventKind {
    Marked,
    Overridden,
    AbsenteesFinalized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEvent {
    pub kind: AttendanceEventKind,
    pub class_id: String,
    pub student_id: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub method: Option<AttendanceMethod>,
    pub count: Option<u64>,
    pub at: DateTime<Utc>,
}

impl AttendanceEvent {
    pub fn for_record(kind: AttendanceEventKind, record: &AttendanceRecord) -> Self {
        Self {
            kind,
            class_id: record.class_id.clone(),
            student_id: Some(record.student_id.clone()),
            status: Some(record.status),
            method: Some(record.method),
            count: None,
            at: record.updated_at,
        }
    }

    pub fn absentees(class_id: &str, count: u64, at: DateTime<Utc>) -> Self {
        Self {
            kind: AttendanceEventKind::AbsenteesFinalized,
            class_id: class_id.to_string(),
            student_id: None,
            status: Some(AttendanceStatus::Absent),
            method: Some(AttendanceMethod::Manual),
            count: Some(count),
            at,
        }
    }
}

pub fn class_topic(class_id: &str) -> String {
    format!("class:{}:attendance", class_id)
}

/// Fan-out of attendance changes to whoever watches a class.
/// Delivery is best effort; publishing never fails the caller.
#[async_trait]
pub trait AttendanceNotifier: Send + Sync {
    async fn publish(&self, event: AttendanceEvent);
}

/// In-process pub/sub: one broadcast channel per class topic, created on
/// first subscription.
#[derive(Clone)]
pub struct BroadcastNotifier {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<AttendanceEvent>>>>,
    capacity: usize,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, class_id: &str) -> broadcast::Receiver<AttendanceEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(class_topic(class_id))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl AttendanceNotifier for BroadcastNotifier {
    async fn publish(&self, event: AttendanceEvent) {
        let topic = class_topic(&event.class_id);
        let mut topics = self.topics.write().await;
        if let Some(sender) = topics.get(&topic) {
            let _ = sender.send(event);
            if sender.receiver_count() == 0 {
                debug!("dropping topic '{}' with no subscribers", topic);
                topics.remove(&topic);
            }
        }
    }
}

pub struct NoopNotifier;

#[async_trait]
impl AttendanceNotifier for NoopNotifier {
    async fn publish(&self, _event: AttendanceEvent) {}
}
