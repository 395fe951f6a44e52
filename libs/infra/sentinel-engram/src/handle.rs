use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::content::{RecordEntry, SessionDocument, SessionOutcome};
use crate::error::EngramError;

/// Default bound on how many records a session buffers in memory before
/// the object store has a chance to receive them. A discovery run with
/// more than this many decisions/actions/dead-ends in a single session is
/// already pathological; overflow is reported, not silently truncated.
pub const MAX_BUFFERED_RECORDS: usize = 10_000;

/// Emitted when a session's in-memory buffer overflows (spec §4.2). The
/// orchestrator's event bus subscribes to this channel and republishes it
/// as a domain event; `sentinel-engram` itself has no opinion about where
/// events end up, only that it announces the overflow somewhere.
#[derive(Debug, Clone)]
pub struct SessionDropped {
    pub session_id: String,
    pub tenant_id: String,
    pub buffered_records: usize,
}

/// Scoped acquisition of one unit of work's reasoning trail. `close` is the
/// only way a session is written out; there is no destructor-based flush,
/// since flushing is fallible I/O and a `Drop` impl can't propagate errors
/// — callers must call `close` on every exit path, including cancellation.
pub struct SessionHandle {
    session_id: String,
    tenant_id: String,
    agent_id: String,
    intent: String,
    context: serde_json::Value,
    opened_at: chrono::DateTime<Utc>,
    records: Vec<RecordEntry>,
    overflowed: bool,
    dropped_tx: Option<mpsc::UnboundedSender<SessionDropped>>,
}

impl SessionHandle {
    pub fn open(
        tenant_id: impl Into<String>,
        agent_id: impl Into<String>,
        intent: impl Into<String>,
        context: serde_json::Value,
        now: chrono::DateTime<Utc>,
        dropped_tx: Option<mpsc::UnboundedSender<SessionDropped>>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            agent_id: agent_id.into(),
            intent: intent.into(),
            context,
            opened_at: now,
            records: Vec::new(),
            overflowed: false,
            dropped_tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn push(&mut self, entry: RecordEntry) {
        if self.overflowed {
            return;
        }
        if self.records.len() >= MAX_BUFFERED_RECORDS {
            self.overflowed = true;
            warn!(
                session_id = %self.session_id,
                tenant_id = %self.tenant_id,
                "engram session buffer overflowed, dropping further records"
            );
            if let Some(tx) = &self.dropped_tx {
                let _ = tx.send(SessionDropped {
                    session_id: self.session_id.clone(),
                    tenant_id: self.tenant_id.clone(),
                    buffered_records: self.records.len(),
                });
            }
            return;
        }
        self.records.push(entry);
    }

    #[instrument(skip(self, alternatives, rationale))]
    pub fn record_decision(
        &mut self,
        description: impl Into<String>,
        alternatives: Vec<String>,
        chosen: impl Into<String>,
        rationale: impl Into<String>,
        now: chrono::DateTime<Utc>,
    ) {
        self.push(RecordEntry::Decision {
            description: description.into(),
            alternatives,
            chosen: chosen.into(),
            rationale: rationale.into(),
            recorded_at: now,
        });
    }

    #[instrument(skip(self, counts))]
    pub fn record_action(
        &mut self,
        action_kind: impl Into<String>,
        target: impl Into<String>,
        outcome: impl Into<String>,
        counts: serde_json::Value,
        now: chrono::DateTime<Utc>,
    ) {
        self.push(RecordEntry::Action {
            action_kind: action_kind.into(),
            target: target.into(),
            outcome: outcome.into(),
            counts,
            recorded_at: now,
        });
    }

    #[instrument(skip(self, evidence))]
    pub fn record_dead_end(
        &mut self,
        description: impl Into<String>,
        evidence: impl Into<String>,
        now: chrono::DateTime<Utc>,
    ) {
        self.push(RecordEntry::DeadEnd {
            description: description.into(),
            evidence: evidence.into(),
            recorded_at: now,
        });
    }

    pub fn action_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, RecordEntry::Action { .. }))
            .count()
    }

    /// Finalizes the reasoning trail into a document ready for canonical
    /// serialization. If the buffer overflowed, the effective outcome is
    /// forced to `failed` regardless of what the caller requested (spec
    /// §4.2: overflow "ends the run with failed").
    pub fn into_document(
        self,
        requested_outcome: SessionOutcome,
        summary: impl Into<String>,
        now: chrono::DateTime<Utc>,
    ) -> (SessionDocument, Result<(), EngramError>) {
        let overflow_result = if self.overflowed {
            Err(EngramError::BufferOverflow(self.session_id.clone()))
        } else {
            Ok(())
        };

        let outcome = if self.overflowed {
            SessionOutcome::Failed
        } else {
            requested_outcome
        };

        let doc = SessionDocument {
            session_id: self.session_id,
            tenant_id: self.tenant_id,
            agent_id: self.agent_id,
            intent: self.intent,
            context: self.context,
            opened_at: self.opened_at,
            records: self.records,
            outcome,
            summary: summary.into(),
            closed_at: now,
        };

        (doc, overflow_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn records_preserve_append_order() {
        let mut handle = SessionHandle::open("t1", "agent", "discover", serde_json::json!({}), t(0), None);
        handle.record_decision("pick region", vec!["us-east".into()], "us-east", "closest", t(1));
        handle.record_action("enumerate", "ec2", "ok", serde_json::json!({"count": 2}), t(2));
        handle.record_dead_end("no cpe mapping", "nginx 1.18.0", t(3));

        let (doc, result) = handle.into_document(SessionOutcome::Partial, "done", t(4));
        assert!(result.is_ok());
        assert_eq!(doc.records.len(), 3);
        assert!(matches!(doc.records[0], RecordEntry::Decision { .. }));
        assert!(matches!(doc.records[1], RecordEntry::Action { .. }));
        assert!(matches!(doc.records[2], RecordEntry::DeadEnd { .. }));
    }

    #[test]
    fn overflow_forces_failed_outcome_and_emits_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = SessionHandle::open(
            "t1",
            "agent",
            "discover",
            serde_json::json!({}),
            t(0),
            Some(tx),
        );
        for i in 0..(MAX_BUFFERED_RECORDS + 5) {
            handle.record_dead_end(format!("dead end {i}"), "evidence", t(0));
        }

        let (doc, result) = handle.into_document(SessionOutcome::Success, "done", t(1));
        assert!(matches!(result, Err(EngramError::BufferOverflow(_))));
        assert_eq!(doc.outcome, SessionOutcome::Failed);
        assert_eq!(doc.records.len(), MAX_BUFFERED_RECORDS);
        assert!(rx.try_recv().is_ok());
    }
}
