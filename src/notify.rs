use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    Created,
    Updated,
    Removed,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "job_created",
            Self::Updated => "job_updated",
            Self::Removed => "job_removed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub owner_key: String,
    pub job_id: String,
    pub payload: Option<Value>,
}

/// Push delivery boundary. The registry emits through a configured sink and
/// is a total no-op without one; it never knows which transport (websocket,
/// SSE, polling fan-out) sits behind this. Sinks own their own delivery
/// failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, event: JobEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_names() {
        assert_eq!(JobEventKind::Created.as_str(), "job_created");
        assert_eq!(JobEventKind::Updated.as_str(), "job_updated");
        assert_eq!(JobEventKind::Removed.as_str(), "job_removed");
    }
}
