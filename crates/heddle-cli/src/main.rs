use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use heddle_core::app::TaskCounts;
use heddle_core::domain::WorkerStatus;
use heddle_core::impls::FileSnapshotStore;
use heddle_core::ports::SnapshotStore;
use heddle_core::{
    Orchestrator, Role, SchedulerConfig, SchedulerEvent, Task, TaskId, TaskSpec, TaskStatus,
    WorkerId,
};

#[derive(Debug, Parser)]
#[command(name = "heddle", version, about = "Run a task plan on a simulated worker pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Schedule every task in a plan and simulate the workers.
    Run {
        /// JSON plan: `{ "tasks": [{ "id", "title", "dependsOn", "files", ... }] }`
        #[arg(long)]
        plan: PathBuf,

        /// TOML scheduler config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Snapshot file; resumed from if it exists. Overrides `snapshot_path`.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Fail every Nth attempt to exercise retries.
        #[arg(long)]
        fail_every: Option<u32>,

        /// Simulated work per attempt, in milliseconds.
        #[arg(long, default_value_t = 50)]
        work_ms: u64,
    },

    /// Print the task counts recorded in a snapshot.
    Status {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct Plan {
    tasks: Vec<PlanTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanTask {
    #[serde(flatten)]
    spec: TaskSpec,
    #[serde(default)]
    depends_on: Vec<TaskId>,
    /// Files the producer locks while working.
    #[serde(default)]
    files: Vec<String>,
}

/// What the simulated workers share.
struct Sim {
    orch: Arc<Orchestrator>,
    files: HashMap<TaskId, Vec<String>>,
    fail_every: Option<u32>,
    work: Duration,
    attempts: AtomicU32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Run {
            plan,
            config,
            snapshot,
            fail_every,
            work_ms,
        } => run(&plan, config.as_deref(), snapshot, fail_every, work_ms).await,
        Command::Status { snapshot } => status(&snapshot).await,
    }
}

async fn run(
    plan_path: &Path,
    config_path: Option<&Path>,
    snapshot: Option<PathBuf>,
    fail_every: Option<u32>,
    work_ms: u64,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if snapshot.is_some() {
        config.snapshot_path = snapshot;
    }

    let text = std::fs::read_to_string(plan_path)
        .with_context(|| format!("reading plan {}", plan_path.display()))?;
    let plan: Plan = serde_json::from_str(&text).context("parsing plan")?;
    if let Some(n) = fail_every {
        if n == 0 {
            bail!("--fail-every must be at least 1");
        }
    }

    let previous = match &config.snapshot_path {
        Some(path) => FileSnapshotStore::new(path)
            .load()
            .await
            .with_context(|| format!("reading snapshot {}", path.display()))?,
        None => None,
    };

    let orch = Arc::new(Orchestrator::new(config)?);
    let sim = Arc::new(Sim {
        orch: orch.clone(),
        files: plan
            .tasks
            .iter()
            .map(|t| (t.spec.id.clone(), t.files.clone()))
            .collect(),
        fail_every,
        work: Duration::from_millis(work_ms),
        attempts: AtomicU32::new(0),
    });

    // Subscribe before anything can be assigned.
    let dispatcher = tokio::spawn(dispatch(sim.clone(), orch.subscribe()));

    if let Some(snapshot) = previous {
        info!(tasks = snapshot.tasks.len(), "resuming from snapshot");
        orch.restore_from_snapshot(snapshot).await?;
    }

    let mut known: HashSet<TaskId> = orch.tasks().await.into_iter().map(|t| t.id).collect();
    known.extend(plan.tasks.iter().map(|t| t.spec.id.clone()));
    for task in &plan.tasks {
        if let Some(missing) = task.depends_on.iter().find(|d| !known.contains(*d)) {
            bail!("task {} depends on unknown task {}", task.spec.id, missing);
        }
    }

    for task in plan.tasks {
        if orch.task(&task.spec.id).await.is_some() {
            continue;
        }
        orch.add_task(task.spec, task.depends_on).await?;
    }

    while !orch.is_complete().await {
        sleep(Duration::from_millis(20)).await;
    }
    orch.stop().await;
    if let Err(e) = dispatcher.await {
        warn!(error = %e, "dispatcher ended abnormally");
    }

    let status = orch.get_status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if status.tasks.failed > 0 {
        bail!("{} task(s) failed", status.tasks.failed);
    }
    Ok(())
}

/// One bound attempt: a retry or a hand-over to a verifier is a new one.
type Attempt = (TaskId, WorkerId, TaskStatus, u32);

fn attempt_of(task: &Task, worker: WorkerId) -> Attempt {
    (task.id.clone(), worker, task.status, task.retry_count)
}

/// Start a simulated worker for every assignment until the scheduler stops.
///
/// Assignments missed while lagging are recovered from the task list.
async fn dispatch(sim: Arc<Sim>, mut events: broadcast::Receiver<SchedulerEvent>) {
    let mut started: HashSet<Attempt> = HashSet::new();
    loop {
        match events.recv().await {
            Ok(SchedulerEvent::TaskAssigned { task, worker }) => {
                if started.insert(attempt_of(&task, worker)) {
                    tokio::spawn(work(sim.clone(), task, worker));
                }
            }
            Ok(SchedulerEvent::Stopped) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                warn!(missed = n, "dispatcher fell behind; rescanning assignments");
                if !reconcile(&sim, &mut started).await {
                    break;
                }
            }
        }
    }
}

/// Start work for every bound task not already started. False once the
/// scheduler has stopped.
async fn reconcile(sim: &Arc<Sim>, started: &mut HashSet<Attempt>) -> bool {
    let status = sim.orch.get_status().await;
    if status.workers.iter().all(|w| w.status == WorkerStatus::Done) {
        return false;
    }
    for task in sim.orch.tasks().await {
        let Some(worker) = task.assigned_worker else {
            continue;
        };
        if started.insert(attempt_of(&task, worker)) {
            info!(task = %task.id, worker = %worker, "starting missed assignment");
            tokio::spawn(work(sim.clone(), task, worker));
        }
    }
    true
}

async fn work(sim: Arc<Sim>, task: Task, worker: WorkerId) {
    let role = task.role();

    if role == Role::Producer {
        let files = sim.files.get(&task.id).map(Vec::as_slice).unwrap_or_default();
        for path in files {
            if !acquire_with_backoff(&sim.orch, path, &worker, &task.id).await {
                warn!(task = %task.id, path, "gave up waiting for file lock");
                sim.orch.complete_task(&task.id, false).await;
                return;
            }
        }
    }

    sleep(sim.work).await;

    let attempt = sim.attempts.fetch_add(1, Ordering::Relaxed) + 1;
    let failed = sim.fail_every.is_some_and(|n| attempt % n == 0);
    match (role, failed) {
        (_, true) => sim.orch.complete_task(&task.id, false).await,
        (Role::Producer, false) => sim.orch.move_to_testing(&task.id).await,
        (Role::Verifier, false) => sim.orch.complete_task(&task.id, true).await,
    }
}

async fn acquire_with_backoff(
    orch: &Orchestrator,
    path: &str,
    worker: &WorkerId,
    task: &TaskId,
) -> bool {
    let mut delay = Duration::from_millis(10);
    for _ in 0..8 {
        if orch.acquire_file_lock(path, worker, task).await {
            return true;
        }
        sleep(delay).await;
        delay *= 2;
    }
    false
}

async fn status(path: &Path) -> Result<()> {
    let Some(snapshot) = FileSnapshotStore::new(path)
        .load()
        .await
        .with_context(|| format!("reading snapshot {}", path.display()))?
    else {
        bail!("no snapshot at {}", path.display());
    };

    let counts = TaskCounts::tally(&snapshot.tasks);
    println!("last updated: {}", snapshot.last_updated.to_rfc3339());
    match &snapshot.foundation_task_id {
        Some(id) if snapshot.foundation_complete => println!("foundation:   {id} (complete)"),
        Some(id) => println!("foundation:   {id} (pending)"),
        None => println!("foundation:   none"),
    }
    println!(
        "tasks:        {} total, {} done, {} in progress, {} testing, {} backlog, {} failed",
        counts.total, counts.done, counts.in_progress, counts.testing, counts.backlog, counts.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(orch: Arc<Orchestrator>, fail_every: Option<u32>) -> Arc<Sim> {
        Arc::new(Sim {
            orch,
            files: HashMap::new(),
            fail_every,
            work: Duration::ZERO,
            attempts: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn dispatcher_recovers_assignments_lost_to_lag() {
        let config = SchedulerConfig {
            event_capacity: 2,
            foundation_gate: false,
            ..SchedulerConfig::default()
        };
        let orch = Arc::new(Orchestrator::new(config).unwrap());
        let events = orch.subscribe();

        // Three added and three assigned events overflow the buffer before
        // the dispatcher reads anything.
        for id in ["A", "B", "C"] {
            orch.add_task(TaskSpec::new(id, id), Vec::<TaskId>::new())
                .await
                .unwrap();
        }
        let dispatcher = tokio::spawn(dispatch(sim(orch.clone(), None), events));

        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            while !orch.is_complete().await {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        orch.stop().await;
        dispatcher.await.unwrap();

        assert!(finished.is_ok(), "run stalled after the dispatcher lagged");
        assert_eq!(orch.get_status().await.tasks.done, 3);
    }

    /// Every verifier attempt fails, so the lone producer gets A back after
    /// each failure until the retries run out.
    #[tokio::test]
    async fn retries_on_the_same_worker_are_started_again() {
        let config = SchedulerConfig {
            max_producers: 1,
            foundation_gate: false,
            ..SchedulerConfig::default()
        };
        let orch = Arc::new(Orchestrator::new(config).unwrap());
        let dispatcher = tokio::spawn(dispatch(sim(orch.clone(), Some(2)), orch.subscribe()));

        orch.add_task(TaskSpec::new("A", "a"), Vec::<TaskId>::new())
            .await
            .unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            while !orch.is_complete().await {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        orch.stop().await;
        dispatcher.await.unwrap();

        assert!(finished.is_ok(), "a retried attempt was never started");
        let a = orch.task(&TaskId::new("A")).await.unwrap();
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.retry_count, 3);
    }
}
