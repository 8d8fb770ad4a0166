use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Identity of the operator driving this console plus the per-session
/// counter behind client-generated message ids.
#[derive(Debug)]
pub struct OperatorSession {
    operator_name: String,
    next_seq: AtomicU64,
}

impl OperatorSession {
    pub fn new(operator_name: impl Into<String>) -> Self {
        Self {
            operator_name: operator_name.into(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    /// `local-{millis}-{seq}`; the counter keeps ids unique within one session
    /// even when two sends land in the same millisecond.
    pub fn next_client_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("local-{}-{}", Utc::now().timestamp_millis(), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn client_ids_are_unique_within_a_session() {
        let session = OperatorSession::new("Admin");
        let ids: HashSet<String> = (0..500).map(|_| session.next_client_id()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.starts_with("local-")));
    }
}
