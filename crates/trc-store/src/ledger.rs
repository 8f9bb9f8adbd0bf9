//! The append-only ledger.

use crate::{is_constraint_violation, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use trc_core::{LedgerEvent, LedgerEventType};
use uuid::Uuid;

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEvent> {
    let ts_micros: i64 = row.get("ts")?;
    let event_type: String = row.get("event_type")?;
    let payload: String = row.get("payload")?;
    let parse_uuid = |v: Option<String>| v.and_then(|s| Uuid::parse_str(&s).ok());
    Ok(LedgerEvent {
        event_id: row.get("event_id")?,
        ts: DateTime::<Utc>::from_timestamp_micros(ts_micros).unwrap_or_default(),
        org_id: row.get("org_id")?,
        user_id: row.get("user_id")?,
        project_id: parse_uuid(row.get("project_id")?),
        run_id: parse_uuid(row.get("run_id")?),
        plan_id: parse_uuid(row.get("plan_id")?),
        task_id: row.get("task_id")?,
        event_type: serde_json::from_value(serde_json::Value::String(event_type))
            .unwrap_or(LedgerEventType::AnomalyDetected),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
    })
}

fn type_name(event_type: LedgerEventType) -> String {
    match serde_json::to_value(event_type) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl Store {
    /// Append one event. The only write operation on the ledger.
    ///
    /// Fails with [`StoreError::DuplicateEvent`] when `event_id` already
    /// exists.
    pub async fn append(&self, event: &LedgerEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&event.payload)?;
        let event_type = type_name(event.event_type);
        let event_id = event.event_id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO ledger_events
                 (event_id, ts, org_id, user_id, project_id, run_id, plan_id, task_id, event_type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.event_id,
                    event.ts.timestamp_micros(),
                    event.org_id,
                    event.user_id,
                    event.project_id.map(|u| u.to_string()),
                    event.run_id.map(|u| u.to_string()),
                    event.plan_id.map(|u| u.to_string()),
                    event.task_id,
                    event_type,
                    payload,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::DuplicateEvent(event_id.clone())
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
            Ok(())
        })
        .await
    }

    /// Events with `start <= ts < end`, ordered ascending.
    pub async fn list_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM ledger_events WHERE ts >= ?1 AND ts < ?2 ORDER BY ts ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(
                    params![start.timestamp_micros(), end.timestamp_micros()],
                    event_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// The most recent `limit` events of a run, newest first.
    pub async fn tail_for_run(
        &self,
        run_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LedgerEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM ledger_events WHERE run_id = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![run_id.to_string(), limit as i64], event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// All events of a run in emission order.
    pub async fn events_for_run(&self, run_id: Uuid) -> Result<Vec<LedgerEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM ledger_events WHERE run_id = ?1 ORDER BY ts ASC, rowid ASC")?;
            let rows = stmt
                .query_map(params![run_id.to_string()], event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Events of one type, optionally scoped to a project, newest first.
    pub async fn list_by_type(
        &self,
        project_id: Option<Uuid>,
        event_type: LedgerEventType,
        limit: usize,
    ) -> Result<Vec<LedgerEvent>, StoreError> {
        let type_name = type_name(event_type);
        self.with_conn(move |conn| {
            let rows = match project_id {
                Some(project_id) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM ledger_events
                         WHERE event_type = ?1 AND project_id = ?2
                         ORDER BY ts DESC, rowid DESC LIMIT ?3",
                    )?;
                    stmt.query_map(
                        params![type_name, project_id.to_string(), limit as i64],
                        event_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM ledger_events WHERE event_type = ?1
                         ORDER BY ts DESC, rowid DESC LIMIT ?2",
                    )?;
                    stmt.query_map(params![type_name, limit as i64], event_from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
        .await
    }

    /// The full ledger as JSON lines, ordered ascending by timestamp.
    pub async fn export_jsonl(&self) -> Result<String, StoreError> {
        let events = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT * FROM ledger_events ORDER BY ts ASC, rowid ASC")?;
                let rows = stmt
                    .query_map([], event_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        let mut out = String::new();
        for event in &events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(event_type: LedgerEventType) -> LedgerEvent {
        LedgerEvent::new(event_type, "org-1", "user-1")
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let store = Store::open_in_memory().await.unwrap();
        let run_id = Uuid::new_v4();
        let e = event(LedgerEventType::RunStarted).with_run(run_id);
        store.append(&e).await.unwrap();

        let events = store.events_for_run(run_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, e.event_id);
        assert_eq!(events[0].event_type, LedgerEventType::RunStarted);
    }

    #[tokio::test]
    async fn duplicate_event_id_fails_the_second_write() {
        let store = Store::open_in_memory().await.unwrap();
        let e = event(LedgerEventType::RunStarted);
        store.append(&e).await.unwrap();
        let err = store.append(&e).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEvent(id) if id == e.event_id));
    }

    #[tokio::test]
    async fn range_scan_is_sorted_ascending_and_half_open() {
        let store = Store::open_in_memory().await.unwrap();
        let base = Utc::now();
        for i in [3i64, 1, 2] {
            let mut e = event(LedgerEventType::LlmCallFinished);
            e.ts = base + Duration::seconds(i);
            store.append(&e).await.unwrap();
        }

        let events = store
            .list_in_range(base + Duration::seconds(1), base + Duration::seconds(3))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].ts <= events[1].ts);
    }

    #[tokio::test]
    async fn tail_for_run_is_newest_first_and_limited() {
        let store = Store::open_in_memory().await.unwrap();
        let run_id = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            let mut e = event(LedgerEventType::TaskStage).with_run(run_id);
            e.ts = base + Duration::seconds(i);
            store.append(&e).await.unwrap();
        }
        let tail = store.tail_for_run(run_id, 3).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert!(tail[0].ts >= tail[1].ts);
        assert!(tail[1].ts >= tail[2].ts);
    }

    #[tokio::test]
    async fn list_by_type_scopes_to_project() {
        let store = Store::open_in_memory().await.unwrap();
        let project_a = Uuid::new_v4();
        let project_b = Uuid::new_v4();
        store
            .append(&event(LedgerEventType::PlanCreated).with_project(project_a))
            .await
            .unwrap();
        store
            .append(&event(LedgerEventType::PlanCreated).with_project(project_b))
            .await
            .unwrap();

        let scoped = store
            .list_by_type(Some(project_a), LedgerEventType::PlanCreated, 10)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].project_id, Some(project_a));

        let all = store
            .list_by_type(None, LedgerEventType::PlanCreated, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn export_jsonl_one_line_per_event() {
        let store = Store::open_in_memory().await.unwrap();
        store.append(&event(LedgerEventType::RunStarted)).await.unwrap();
        store.append(&event(LedgerEventType::RunCompleted)).await.unwrap();
        let out = store.export_jsonl().await.unwrap();
        assert_eq!(out.lines().count(), 2);
        for line in out.lines() {
            let _: LedgerEvent = serde_json::from_str(line).unwrap();
        }
    }

    #[tokio::test]
    async fn payload_roundtrips_through_storage() {
        let store = Store::open_in_memory().await.unwrap();
        let e = event(LedgerEventType::LlmCallFinished)
            .with_payload(serde_json::json!({"model": "gpt-4.1", "provider_cost_usd": 1.5}));
        store.append(&e).await.unwrap();
        let back = store
            .list_by_type(None, LedgerEventType::LlmCallFinished, 1)
            .await
            .unwrap();
        assert_eq!(back[0].payload["model"], "gpt-4.1");
        assert_eq!(back[0].payload["provider_cost_usd"], 1.5);
    }
}
