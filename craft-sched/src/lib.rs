use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use craft_types::PlanId;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

/// One unit of background pipeline work, always scoped to a single plan.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PipelineTask {
    DetectParts(PlanId),
    EstimatePlacement(PlanId),
    FabricationManual(PlanId),
    AssemblyManual(PlanId),
    RenderDocument(PlanId),
}

impl PipelineTask {
    pub fn plan(&self) -> PlanId {
        match *self {
            PipelineTask::DetectParts(p)
            | PipelineTask::EstimatePlacement(p)
            | PipelineTask::FabricationManual(p)
            | PipelineTask::AssemblyManual(p)
            | PipelineTask::RenderDocument(p) => p,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineTask::DetectParts(_) => "parts_detection",
            PipelineTask::EstimatePlacement(_) => "parts3d",
            PipelineTask::FabricationManual(_) => "parts_creation",
            PipelineTask::AssemblyManual(_) => "assembly_manual",
            PipelineTask::RenderDocument(_) => "manual_pdf",
        }
    }
}

impl fmt::Display for PipelineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.plan())
    }
}

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("task queue is full ({0} pending)")]
    Full(usize),
}

/// Submission side of the plan queue. Duplicate submissions are allowed.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, task: PipelineTask) -> Result<(), SchedError>;
    async fn next(&self) -> Option<PipelineTask>;
}

/// Runs one task to completion. Errors end the task; nothing is retried.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: PipelineTask) -> anyhow::Result<()>;
}

/// FIFO queue with an optional bound.
pub struct InMemoryTaskQueue {
    inner: Mutex<VecDeque<PipelineTask>>,
    capacity: usize,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub async fn pending(&self) -> Vec<PipelineTask> {
        self.inner.lock().await.iter().copied().collect()
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, task: PipelineTask) -> Result<(), SchedError> {
        let mut inner = self.inner.lock().await;
        if inner.len() >= self.capacity {
            return Err(SchedError::Full(inner.len()));
        }
        debug!(task = %task, "[queue] submitted");
        inner.push_back(task);
        Ok(())
    }

    async fn next(&self) -> Option<PipelineTask> {
        self.inner.lock().await.pop_front()
    }
}

/// Pop one task and run it inline. Returns `false` when the queue was empty.
pub async fn run_once(queue: &dyn TaskQueue, executor: &dyn TaskExecutor) -> bool {
    let Some(task) = queue.next().await else {
        return false;
    };
    if let Err(e) = executor.execute(task).await {
        error!(task = %task, error = %e, "[queue] task failed");
    }
    true
}

/// Run queued tasks inline until the queue is empty, including tasks they enqueue.
pub async fn drain(queue: &dyn TaskQueue, executor: &dyn TaskExecutor) -> usize {
    let mut ran = 0;
    while run_once(queue, executor).await {
        ran += 1;
    }
    ran
}

/// Background loop: every task runs on its own tokio task so siblings run independently.
/// Failures and panics are logged at the task boundary; the loop itself keeps going.
pub async fn run_worker_loop(queue: Arc<dyn TaskQueue>, executor: Arc<dyn TaskExecutor>) {
    let mut running = JoinSet::new();
    loop {
        while let Some(done) = running.try_join_next() {
            if let Err(e) = done {
                if e.is_panic() {
                    error!(error = %e, "[queue] task panicked");
                }
            }
        }
        match queue.next().await {
            Some(task) => {
                let executor = executor.clone();
                running.spawn(async move {
                    if let Err(e) = executor.execute(task).await {
                        error!(task = %task, error = %e, "[queue] task failed");
                    }
                });
            }
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
}

/// Start [`run_worker_loop`] on the runtime. The handle only resolves if the loop dies.
pub fn spawn_worker(queue: Arc<dyn TaskQueue>, executor: Arc<dyn TaskExecutor>) -> JoinHandle<()> {
    tokio::spawn(run_worker_loop(queue, executor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        ran: StdMutex<Vec<PipelineTask>>,
    }

    #[async_trait]
    impl TaskExecutor for Recorder {
        async fn execute(&self, task: PipelineTask) -> anyhow::Result<()> {
            self.ran.lock().unwrap().push(task);
            match task {
                PipelineTask::DetectParts(_) => anyhow::bail!("generation failed"),
                PipelineTask::FabricationManual(_) => panic!("executor bug"),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn fifo_and_duplicates_allowed() {
        let q = InMemoryTaskQueue::new();
        let plan = PlanId::new();
        q.submit(PipelineTask::FabricationManual(plan)).await.unwrap();
        q.submit(PipelineTask::AssemblyManual(plan)).await.unwrap();
        q.submit(PipelineTask::AssemblyManual(plan)).await.unwrap();
        assert_eq!(q.pending().await.len(), 3);
        assert_eq!(q.next().await, Some(PipelineTask::FabricationManual(plan)));
        assert_eq!(q.next().await, Some(PipelineTask::AssemblyManual(plan)));
    }

    #[tokio::test]
    async fn bounded_queue_rejects() {
        let q = InMemoryTaskQueue::with_capacity(1);
        let plan = PlanId::new();
        q.submit(PipelineTask::DetectParts(plan)).await.unwrap();
        assert!(matches!(
            q.submit(PipelineTask::DetectParts(plan)).await,
            Err(SchedError::Full(1))
        ));
    }

    #[tokio::test]
    async fn failures_do_not_stop_draining() {
        let q = InMemoryTaskQueue::new();
        let rec = Recorder::default();
        let plan = PlanId::new();
        q.submit(PipelineTask::DetectParts(plan)).await.unwrap();
        q.submit(PipelineTask::RenderDocument(plan)).await.unwrap();
        assert_eq!(drain(&q, &rec).await, 2);
        assert_eq!(rec.ran.lock().unwrap().len(), 2);
        assert!(!run_once(&q, &rec).await);
    }

    #[tokio::test]
    async fn worker_loop_executes_detached() {
        let q = Arc::new(InMemoryTaskQueue::new());
        let rec = Arc::new(Recorder::default());
        let plan = PlanId::new();
        q.submit(PipelineTask::EstimatePlacement(plan)).await.unwrap();
        let handle = tokio::spawn(run_worker_loop(q.clone(), rec.clone()));
        for _ in 0..200 {
            if !rec.ran.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert_eq!(
            rec.ran.lock().unwrap().as_slice(),
            &[PipelineTask::EstimatePlacement(plan)]
        );
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_the_worker() {
        let q = Arc::new(InMemoryTaskQueue::new());
        let rec = Arc::new(Recorder::default());
        let plan = PlanId::new();
        q.submit(PipelineTask::FabricationManual(plan)).await.unwrap();
        let handle = spawn_worker(q.clone(), rec.clone());
        for _ in 0..200 {
            if !rec.ran.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        q.submit(PipelineTask::AssemblyManual(plan)).await.unwrap();
        for _ in 0..200 {
            if rec.ran.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!handle.is_finished());
        handle.abort();
        assert_eq!(
            rec.ran.lock().unwrap().as_slice(),
            &[
                PipelineTask::FabricationManual(plan),
                PipelineTask::AssemblyManual(plan)
            ]
        );
    }
}
