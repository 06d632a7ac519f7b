//! Full-cycle tests of the device sync engine against a scripted server
//! transport and an in-memory host application.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use herd_core::conflict_log::{ConflictKind, ConflictLog};
use herd_core::engine::{CycleOutcome, SyncEngine};
use herd_core::error::Result;
use herd_core::models::{Todo, TodoFields, TodoStatus};
use herd_core::protocol::{
    DeltaResponse, DeltaTodos, HealthResponse, IdMapping, PushRequest, PushResponse,
    ResetResponse, StateBody, TombstoneEntry,
};
use herd_core::provider::{ProviderTodo, TaskProvider};
use herd_core::snapshot::SnapshotStore;
use herd_core::transport::Transport;

const PROJECT: &str = "inbox";

fn ts(value: &str) -> DateTime<Utc> {
    value.parse().unwrap()
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MemoryHost {
    inner: Arc<Mutex<MemoryHostState>>,
}

#[derive(Default)]
struct MemoryHostState {
    todos: Vec<ProviderTodo>,
    next_id: u32,
}

impl MemoryHost {
    fn with_items(titles: &[&str]) -> Self {
        let host = Self::default();
        for title in titles {
            host.insert(title);
        }
        host
    }

    fn insert(&self, title: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let local_id = format!("host-{}", inner.next_id);
        inner.todos.push(ProviderTodo {
            local_id: local_id.clone(),
            title: title.to_string(),
            notes: String::new(),
            due_date: None,
            tags: Vec::new(),
            status: TodoStatus::Open,
        });
        local_id
    }

    fn remove(&self, local_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.todos.retain(|todo| todo.local_id != local_id);
    }

    fn titles(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.todos.iter().map(|todo| todo.title.clone()).collect()
    }
}

#[async_trait]
impl TaskProvider for MemoryHost {
    async fn list_todos(&self, _project: &str) -> Result<Vec<ProviderTodo>> {
        Ok(self.inner.lock().unwrap().todos.clone())
    }

    async fn create_todo(&self, _project: &str, fields: &TodoFields) -> Result<()> {
        self.insert(&fields.title);
        Ok(())
    }

    async fn update_todo(&self, local_id: &str, fields: &TodoFields) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let todo = inner
            .todos
            .iter_mut()
            .find(|todo| todo.local_id == local_id)
            .ok_or_else(|| herd_core::Error::HostApp(format!("no todo {local_id}")))?;
        todo.title = fields.title.clone();
        todo.notes = fields.notes.clone();
        todo.due_date = fields.due_date;
        todo.tags = fields.tags.clone();
        todo.status = fields.status;
        Ok(())
    }
}

/// A transport that replays scripted responses and records every push.
#[derive(Clone, Default)]
struct ScriptedTransport {
    inner: Arc<Mutex<ScriptedState>>,
}

#[derive(Default)]
struct ScriptedState {
    pushes: Vec<PushRequest>,
    push_responses: VecDeque<PushResponse>,
    state_responses: VecDeque<StateBody>,
    delta_responses: VecDeque<DeltaResponse>,
}

impl ScriptedTransport {
    fn queue_push(&self, response: PushResponse) {
        self.inner.lock().unwrap().push_responses.push_back(response);
    }

    fn queue_state(&self, response: StateBody) {
        self.inner.lock().unwrap().state_responses.push_back(response);
    }

    fn queue_delta(&self, response: DeltaResponse) {
        self.inner.lock().unwrap().delta_responses.push_back(response);
    }

    fn pushes(&self) -> Vec<PushRequest> {
        self.inner.lock().unwrap().pushes.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn health(&self) -> Result<HealthResponse> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now(),
        })
    }

    async fn state(&self) -> Result<StateBody> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .state_responses
            .pop_front()
            .expect("unscripted /state call"))
    }

    async fn delta(&self, _since: DateTime<Utc>) -> Result<DeltaResponse> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .delta_responses
            .pop_front()
            .expect("unscripted /delta call"))
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        let mut inner = self.inner.lock().unwrap();
        inner.pushes.push(request.clone());
        Ok(inner.push_responses.pop_front().expect("unscripted /push call"))
    }

    async fn reset(&self) -> Result<ResetResponse> {
        Ok(ResetResponse {
            success: true,
            deleted: herd_core::protocol::ResetCounts { todos: 0 },
        })
    }
}

struct Fixture {
    dir: TempDir,
    host: MemoryHost,
    transport: ScriptedTransport,
}

impl Fixture {
    fn new(host: MemoryHost) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            host,
            transport: ScriptedTransport::default(),
        }
    }

    fn engine(&self) -> SyncEngine<MemoryHost, ScriptedTransport> {
        SyncEngine::new(
            self.host.clone(),
            self.transport.clone(),
            SnapshotStore::new(self.dir.path().join("state.json")),
            ConflictLog::new(self.dir.path().join("conflicts.json")),
            self.dir.path().join("sync.lock"),
            PROJECT,
        )
    }

    fn snapshot(&self) -> herd_core::DeviceSnapshot {
        SnapshotStore::new(self.dir.path().join("state.json"))
            .load()
            .unwrap()
    }

    fn conflict_log(&self) -> ConflictLog {
        ConflictLog::new(self.dir.path().join("conflicts.json"))
    }
}

fn remote_todo(id: &str, title: &str, edited_at: &str) -> Todo {
    Todo {
        id: id.to_string(),
        fields: TodoFields {
            title: title.to_string(),
            ..Default::default()
        },
        edited_at: ts(edited_at),
        updated_at: ts(edited_at),
        created_by: "user-A".to_string(),
        updated_by: "user-A".to_string(),
    }
}

fn empty_delta(synced_at: &str) -> DeltaResponse {
    DeltaResponse {
        todos: DeltaTodos::default(),
        synced_at: ts(synced_at),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_pulls_full_state_and_creates_locally() {
    let fixture = Fixture::new(MemoryHost::default());
    let mut first = remote_todo("s1", "First", "2026-01-03T12:00:00Z");
    first.fields.position = 0;
    let mut second = remote_todo("s2", "Second", "2026-01-03T12:00:30Z");
    second.fields.position = 1;
    fixture.transport.queue_state(StateBody {
        todos: vec![first, second],
        synced_at: ts("2026-01-03T12:01:00Z"),
    });

    let report = fixture.engine().run_cycle().await.unwrap();

    assert_eq!(report.outcome(), CycleOutcome::Completed);
    assert_eq!(report.applied_upserts, 2);
    assert_eq!(fixture.transport.pushes().len(), 0);

    let mut titles = fixture.host.titles();
    titles.sort();
    assert_eq!(titles, vec!["First", "Second"]);

    let snapshot = fixture.snapshot();
    assert_eq!(snapshot.server_id_to_local_id.len(), 2);
    assert_eq!(snapshot.todos.len(), 2);
    assert_eq!(snapshot.last_synced_at, ts("2026-01-03T12:01:00Z"));

    // A follow-up cycle with nothing new pushes nothing and applies nothing.
    fixture.transport.queue_delta(empty_delta("2026-01-03T12:02:00Z"));
    let report = fixture.engine().run_cycle().await.unwrap();
    assert_eq!(report.detected_changes, 0);
    assert_eq!(fixture.transport.pushes().len(), 0);
    assert_eq!(fixture.snapshot().last_synced_at, ts("2026-01-03T12:02:00Z"));
}

#[tokio::test]
async fn local_create_is_pushed_with_client_id_and_bound() {
    let host = MemoryHost::default();
    let local_id = host.insert("Write report");
    let fixture = Fixture::new(host);

    let server_todo = remote_todo("s-new", "Write report", "2026-01-03T12:00:00Z");
    fixture.transport.queue_push(PushResponse {
        state: StateBody {
            todos: vec![server_todo.clone()],
            synced_at: ts("2026-01-03T12:00:01Z"),
        },
        conflicts: vec![],
        mappings: vec![IdMapping {
            server_id: "s-new".to_string(),
            client_id: local_id.clone(),
        }],
    });
    fixture.transport.queue_delta(empty_delta("2026-01-03T12:00:02Z"));

    let report = fixture.engine().run_cycle().await.unwrap();

    assert_eq!(report.pushed_upserts, 1);
    let pushes = fixture.transport.pushes();
    let upsert = &pushes[0].todos.upserted[0];
    assert!(upsert.server_id.is_none());
    assert_eq!(upsert.client_id.as_deref(), Some(local_id.as_str()));

    let snapshot = fixture.snapshot();
    assert_eq!(
        snapshot.server_id_to_local_id.get("s-new"),
        Some(&local_id)
    );
    assert!(snapshot.dirty.is_empty());
}

#[tokio::test]
async fn remote_tombstone_against_newer_local_edit_is_logged_not_applied() {
    // Device knows s1 ↔ host item; local edit postdates the remote delete.
    let host = MemoryHost::with_items(&["Keep me"]);
    let fixture = Fixture::new(host.clone());

    // Seed a prior synced state on disk.
    let seed_store = SnapshotStore::new(fixture.dir.path().join("state.json"));
    let mut seed = herd_core::DeviceSnapshot {
        last_synced_at: ts("2026-01-03T12:00:00Z"),
        ..Default::default()
    };
    seed.todos.insert(
        "host-1".to_string(),
        herd_core::LocalTodo {
            fields: TodoFields {
                title: "Keep me".to_string(),
                ..Default::default()
            },
            edited_at: ts("2026-01-03T12:00:00Z"),
        },
    );
    seed.server_id_to_local_id
        .insert("s1".to_string(), "host-1".to_string());
    seed_store.persist(&seed).unwrap();

    // The user edits the title locally after the remote delete happened.
    host.inner.lock().unwrap().todos[0].title = "Keep me (edited)".to_string();

    // Push of the local edit succeeds without conflicts; the pulled delta
    // carries the older tombstone.
    fixture.transport.queue_push(PushResponse {
        state: StateBody {
            todos: vec![],
            synced_at: ts("2026-01-03T12:05:00Z"),
        },
        conflicts: vec![],
        mappings: vec![],
    });
    fixture.transport.queue_delta(DeltaResponse {
        todos: DeltaTodos {
            upserted: vec![],
            deleted: vec![TombstoneEntry {
                server_id: "s1".to_string(),
                deleted_at: ts("2026-01-03T12:01:00Z"),
            }],
        },
        synced_at: ts("2026-01-03T12:05:00Z"),
    });

    let report = fixture.engine().run_cycle().await.unwrap();

    assert_eq!(report.conflicts, 1);
    let entries = fixture.conflict_log().read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ConflictKind::DeleteVsLocalEdit);

    // Item survives on the host and the mapping is intact.
    assert_eq!(fixture.host.titles(), vec!["Keep me (edited)"]);
    assert_eq!(
        fixture.snapshot().server_id_to_local_id.get("s1"),
        Some(&"host-1".to_string())
    );
}

#[tokio::test]
async fn local_delete_is_pushed_as_deletion() {
    let host = MemoryHost::with_items(&["Doomed"]);
    let fixture = Fixture::new(host.clone());

    let seed_store = SnapshotStore::new(fixture.dir.path().join("state.json"));
    let mut seed = herd_core::DeviceSnapshot {
        last_synced_at: ts("2026-01-03T12:00:00Z"),
        ..Default::default()
    };
    seed.todos.insert(
        "host-1".to_string(),
        herd_core::LocalTodo {
            fields: TodoFields {
                title: "Doomed".to_string(),
                ..Default::default()
            },
            edited_at: ts("2026-01-03T12:00:00Z"),
        },
    );
    seed.server_id_to_local_id
        .insert("s1".to_string(), "host-1".to_string());
    seed_store.persist(&seed).unwrap();

    host.remove("host-1");

    fixture.transport.queue_push(PushResponse {
        state: StateBody {
            todos: vec![],
            synced_at: ts("2026-01-03T12:05:00Z"),
        },
        conflicts: vec![],
        mappings: vec![],
    });
    fixture.transport.queue_delta(empty_delta("2026-01-03T12:05:00Z"));

    let report = fixture.engine().run_cycle().await.unwrap();

    assert_eq!(report.pushed_deletions, 1);
    let pushes = fixture.transport.pushes();
    assert_eq!(pushes[0].todos.deleted[0].server_id, "s1");
    assert!(fixture.snapshot().dirty.is_empty());
}

#[tokio::test]
async fn held_lock_skips_cycle() {
    let fixture = Fixture::new(MemoryHost::default());
    std::fs::write(
        fixture.dir.path().join("sync.lock"),
        std::process::id().to_string(),
    )
    .unwrap();

    let report = fixture.engine().run_cycle().await.unwrap();
    assert_eq!(report.outcome(), CycleOutcome::Skipped);
    assert!(fixture.transport.pushes().is_empty());
}

#[tokio::test]
async fn corrupt_snapshot_aborts_cycle() {
    let fixture = Fixture::new(MemoryHost::default());
    std::fs::write(fixture.dir.path().join("state.json"), "{ broken").unwrap();

    let err = fixture.engine().run_cycle().await.unwrap_err();
    assert!(matches!(err, herd_core::Error::CorruptState(_)));
    // The lock must not leak after the failure.
    assert!(!fixture.dir.path().join("sync.lock").exists());
}

#[tokio::test]
async fn interrupted_apply_converges_on_next_cycle() {
    // A previous cycle created "Recovered" in the host app and then died
    // before persisting the snapshot. The device re-detects it as a local
    // insert; the server answers with the existing id, and the pulled
    // delta carries the server copy.
    let host = MemoryHost::default();
    let local_id = host.insert("Recovered");
    let fixture = Fixture::new(host);

    let server_copy = remote_todo("s1", "Recovered", "2026-01-03T12:00:00Z");
    fixture.transport.queue_push(PushResponse {
        state: StateBody {
            todos: vec![server_copy.clone()],
            synced_at: ts("2026-01-03T12:06:00Z"),
        },
        conflicts: vec![],
        mappings: vec![IdMapping {
            server_id: "s1".to_string(),
            client_id: local_id.clone(),
        }],
    });
    fixture.transport.queue_delta(DeltaResponse {
        todos: DeltaTodos {
            upserted: vec![server_copy],
            deleted: vec![],
        },
        synced_at: ts("2026-01-03T12:06:00Z"),
    });

    fixture.engine().run_cycle().await.unwrap();

    // No duplicate: one host item, one mapping, snapshot consistent.
    assert_eq!(fixture.host.titles(), vec!["Recovered"]);
    let snapshot = fixture.snapshot();
    assert_eq!(snapshot.server_id_to_local_id.len(), 1);
    assert_eq!(snapshot.todos.len(), 1);
}
