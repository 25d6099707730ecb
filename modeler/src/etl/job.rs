use std::collections::HashMap;
use std::time::Instant;

use axum::response::sse::Event;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ---------- SSE event type ----------

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Progress { phase: String, detail: String },
    Result { data: serde_json::Value },
    Error { message: String },
    Cancelled,
    Done,
}

impl RunEvent {
    pub fn to_sse_event(&self) -> Result<Event, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Event::default().data(json))
    }
}

pub fn progress(phase: &str, detail: impl Into<String>) -> RunEvent {
    RunEvent::Progress {
        phase: phase.to_string(),
        detail: detail.into(),
    }
}

// ---------- run status ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

// ---------- run ----------

pub struct EtlRun {
    pub id: String,
    pub task_id: i32,
    pub status: RunStatus,
    pub tx: broadcast::Sender<RunEvent>,
    pub cancel: CancellationToken,
    pub created_at: Instant,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl EtlRun {
    pub fn new(task_id: i32) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            id: Uuid::now_v7().to_string(),
            task_id,
            status: RunStatus::Running,
            tx,
            cancel: CancellationToken::new(),
            created_at: Instant::now(),
            result: None,
            error: None,
        }
    }

    /// Terminal events replayed to a subscriber that arrives after the run
    /// finished. `None` while the run is still going.
    pub fn final_events(&self) -> Option<Vec<RunEvent>> {
        let last = match self.status {
            RunStatus::Running => return None,
            RunStatus::Success => RunEvent::Result {
                data: self.result.clone().unwrap_or_default(),
            },
            RunStatus::Failed => RunEvent::Error {
                message: self.error.clone().unwrap_or_default(),
            },
            RunStatus::Cancelled => RunEvent::Cancelled,
        };
        Some(vec![last, RunEvent::Done])
    }
}

// ---------- run store ----------

/// Finished runs kept in memory for status polling.
const MAX_FINISHED_RUNS: usize = 256;

/// In-memory registry of ETL runs. At most one run per task is active.
pub struct RunStore {
    runs: HashMap<String, EtlRun>,
    /// task_id → run_id for the running run.
    active_by_task: HashMap<i32, String>,
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStore {
    pub fn new() -> Self {
        Self {
            runs: HashMap::new(),
            active_by_task: HashMap::new(),
        }
    }

    /// Register a run for its task.
    /// Returns Err(existing_run_id) if the task already has a running run.
    pub fn try_register(&mut self, run: EtlRun) -> Result<&EtlRun, String> {
        if let Some(existing_id) = self.active_by_task.get(&run.task_id) {
            let is_running = self
                .runs
                .get(existing_id.as_str())
                .map(|r| r.status == RunStatus::Running)
                .unwrap_or(false);
            if is_running {
                return Err(existing_id.clone());
            }
        }

        self.evict_finished();
        let task_id = run.task_id;
        let run_id = run.id.clone();
        self.active_by_task.insert(task_id, run_id.clone());
        Ok(self.runs.entry(run_id).or_insert(run))
    }

    pub fn get(&self, run_id: &str) -> Option<&EtlRun> {
        self.runs.get(run_id)
    }

    pub fn active_for_task(&self, task_id: i32) -> Option<&EtlRun> {
        self.active_by_task
            .get(&task_id)
            .and_then(|id| self.runs.get(id))
            .filter(|r| r.status == RunStatus::Running)
    }

    fn finish(&mut self, run_id: &str, status: RunStatus) -> Option<&mut EtlRun> {
        let run = self.runs.get_mut(run_id)?;
        run.status = status;
        if self.active_by_task.get(&run.task_id).map(String::as_str) == Some(run_id) {
            self.active_by_task.remove(&run.task_id);
        }
        Some(run)
    }

    pub fn complete(&mut self, run_id: &str, result: serde_json::Value) {
        if let Some(run) = self.finish(run_id, RunStatus::Success) {
            run.result = Some(result);
        }
    }

    pub fn fail(&mut self, run_id: &str, error: String) {
        if let Some(run) = self.finish(run_id, RunStatus::Failed) {
            run.error = Some(error);
        }
    }

    pub fn mark_cancelled(&mut self, run_id: &str) {
        if let Some(run) = self.finish(run_id, RunStatus::Cancelled) {
            run.error = Some("cancelled".to_string());
        }
    }

    /// Signal a running run to stop. The run stays active until its runner
    /// records the outcome, so a new run cannot overlap the one winding down.
    pub fn cancel(&mut self, run_id: &str) -> bool {
        match self.runs.get(run_id) {
            Some(run) if run.status == RunStatus::Running => {
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn subscribe(&self, run_id: &str) -> Option<broadcast::Receiver<RunEvent>> {
        self.runs.get(run_id).map(|r| r.tx.subscribe())
    }

    fn evict_finished(&mut self) {
        let finished = self
            .runs
            .values()
            .filter(|r| r.status != RunStatus::Running)
            .count();
        if finished < MAX_FINISHED_RUNS {
            return;
        }
        if let Some(oldest) = self
            .runs
            .values()
            .filter(|r| r.status != RunStatus::Running)
            .min_by_key(|r| r.created_at)
            .map(|r| r.id.clone())
        {
            self.runs.remove(&oldest);
        }
    }
}
