//! Modelo de eventos del master.
//!
//! Cada evento apunta a una entidad (job, task, worker) o a un colaborador
//! externo (allocator, launcher). Los eventos se mueven a la cola al
//! enviarse y no se comparten después.

use std::fmt;

use common::{Container, ContainerId, EngineType, JobId, Resource, TaskId, WorkerId};
use tokio::sync::mpsc;
use tracing::warn;

/// Categoría de evento: decide a qué dispatcher se entrega.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Job,
    Task,
    Worker,
    Allocator,
    Launcher,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventCategory::Job => "job",
            EventCategory::Task => "task",
            EventCategory::Worker => "worker",
            EventCategory::Allocator => "allocator",
            EventCategory::Launcher => "launcher",
        };
        f.write_str(s)
    }
}

/* ---------------- Job ---------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventType {
    TaskCompleted,
    TaskFailed,
    TaskKilled,
    Kill,
}

impl fmt::Display for JobEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobEventType::TaskCompleted => "JOB_TASK_COMPLETED",
            JobEventType::TaskFailed => "JOB_TASK_FAILED",
            JobEventType::TaskKilled => "JOB_TASK_KILLED",
            JobEventType::Kill => "JOB_KILL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct JobEvent {
    job_id: JobId,
    event_type: JobEventType,
    task_id: Option<TaskId>,
}

impl JobEvent {
    pub fn new(job_id: JobId, event_type: JobEventType) -> Self {
        Self {
            job_id,
            event_type,
            task_id: None,
        }
    }

    /// Roll-up de una tarea que llegó a estado terminal.
    pub fn task_finished(task_id: TaskId, event_type: JobEventType) -> Self {
        Self {
            job_id: *task_id.job_id(),
            event_type,
            task_id: Some(task_id),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn event_type(&self) -> JobEventType {
        self.event_type
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }
}

/* ---------------- Task ---------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventType {
    Schedule,
    Setup,
    Launch,
    Running,
    Completed,
    Kill,
    Error,
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskEventType::Schedule => "TASK_SCHEDULE",
            TaskEventType::Setup => "TASK_SETUP",
            TaskEventType::Launch => "TASK_LAUNCH",
            TaskEventType::Running => "TASK_RUNNING",
            TaskEventType::Completed => "TASK_COMPLETED",
            TaskEventType::Kill => "TASK_KILL",
            TaskEventType::Error => "TASK_ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TaskEvent {
    task_id: TaskId,
    event_type: TaskEventType,
    container: Option<Container>,
    diagnostic: Option<String>,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, event_type: TaskEventType) -> Self {
        Self {
            task_id,
            event_type,
            container: None,
            diagnostic: None,
        }
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn event_type(&self) -> TaskEventType {
        self.event_type
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

/* ---------------- Worker ---------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEventType {
    Start,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for WorkerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerEventType::Start => "WORKER_START",
            WorkerEventType::Running => "WORKER_RUNNING",
            WorkerEventType::Completed => "WORKER_COMPLETED",
            WorkerEventType::Failed => "WORKER_FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerEvent {
    worker_id: WorkerId,
    event_type: WorkerEventType,
    diagnostic: Option<String>,
}

impl WorkerEvent {
    pub fn new(worker_id: WorkerId, event_type: WorkerEventType) -> Self {
        Self {
            worker_id,
            event_type,
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn event_type(&self) -> WorkerEventType {
        self.event_type
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

/* ---------------- Colaboradores ---------------- */

/// Qué ejecutar dentro del contenedor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: String,
    pub image: String,
    pub engine: EngineType,
}

#[derive(Debug, Clone)]
pub enum AllocatorEvent {
    Request {
        task_id: TaskId,
        resource: Resource,
        priority: u32,
    },
    Release {
        task_id: TaskId,
        container_id: ContainerId,
    },
}

#[derive(Debug, Clone)]
pub enum LauncherEvent {
    /// Protocolo completo: levantar el contenedor con el proceso de la tarea.
    Launch {
        task_id: TaskId,
        container: Container,
        spec: LaunchSpec,
    },
    /// Camino corto: la imagen ya está en el nodo, sólo arrancar el proceso.
    StartWorker {
        worker_id: WorkerId,
        container: Container,
        spec: LaunchSpec,
    },
    Stop {
        task_id: TaskId,
        container_id: ContainerId,
    },
}

/* ---------------- Evento genérico ---------------- */

#[derive(Debug, Clone)]
pub enum Event {
    Job(JobEvent),
    Task(TaskEvent),
    Worker(WorkerEvent),
    Allocator(AllocatorEvent),
    Launcher(LauncherEvent),
}

impl Event {
    pub fn category(&self) -> EventCategory {
        match self {
            Event::Job(_) => EventCategory::Job,
            Event::Task(_) => EventCategory::Task,
            Event::Worker(_) => EventCategory::Worker,
            Event::Allocator(_) => EventCategory::Allocator,
            Event::Launcher(_) => EventCategory::Launcher,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Job(e) => write!(f, "{} -> {}", e.event_type, e.job_id),
            Event::Task(e) => write!(f, "{} -> {}", e.event_type, e.task_id),
            Event::Worker(e) => write!(f, "{} -> {}", e.event_type, e.worker_id),
            Event::Allocator(AllocatorEvent::Request { task_id, .. }) => {
                write!(f, "CONTAINER_REQUEST -> {task_id}")
            }
            Event::Allocator(AllocatorEvent::Release { container_id, .. }) => {
                write!(f, "CONTAINER_RELEASE -> {container_id}")
            }
            Event::Launcher(LauncherEvent::Launch { task_id, .. }) => {
                write!(f, "CONTAINER_LAUNCH -> {task_id}")
            }
            Event::Launcher(LauncherEvent::StartWorker { worker_id, .. }) => {
                write!(f, "WORKER_PROCESS_START -> {worker_id}")
            }
            Event::Launcher(LauncherEvent::Stop { container_id, .. }) => {
                write!(f, "CONTAINER_STOP -> {container_id}")
            }
        }
    }
}

impl From<JobEvent> for Event {
    fn from(e: JobEvent) -> Self {
        Event::Job(e)
    }
}

impl From<TaskEvent> for Event {
    fn from(e: TaskEvent) -> Self {
        Event::Task(e)
    }
}

impl From<WorkerEvent> for Event {
    fn from(e: WorkerEvent) -> Self {
        Event::Worker(e)
    }
}

impl From<AllocatorEvent> for Event {
    fn from(e: AllocatorEvent) -> Self {
        Event::Allocator(e)
    }
}

impl From<LauncherEvent> for Event {
    fn from(e: LauncherEvent) -> Self {
        Event::Launcher(e)
    }
}

/// Handle para encolar eventos. Se puede clonar y usar desde cualquier hilo;
/// el único consumidor es el loop del dispatcher.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    /// Encola sin bloquear. Si el consumidor ya no existe el evento se pierde.
    pub fn submit(&self, event: impl Into<Event>) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event.into()) {
            warn!("cola de eventos cerrada, descartando {}", event);
        }
    }
}
