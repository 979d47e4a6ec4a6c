use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{JobId, JobReport, JobStatus, TaskId};
use tracing::{info, warn};

use crate::dispatcher::Handle;
use crate::error::TransitionError;
use crate::event::{EventSender, JobEvent, JobEventType, TaskEvent, TaskEventType};
use crate::registry::Registry;
use crate::task::{Task, TaskSpec};

/// Job: dueño de la colección de tareas. No tiene máquina de estados
/// propia más allá de los contadores que actualizan las tareas al terminar.
pub struct Job {
    id: JobId,
    name: String,
    tasks: Vec<Task>,
    status: JobStatus,
    completed: u32,
    failed: u32,
    killed: u32,
    kill_requested: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    events: EventSender,
}

impl Job {
    /// Crea el job con una tarea por spec. La colección queda fija.
    pub fn new(
        id: JobId,
        name: impl Into<String>,
        specs: Vec<TaskSpec>,
        registry: Arc<dyn Registry>,
        events: EventSender,
    ) -> Self {
        let tasks: Vec<Task> = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| {
                Task::new(
                    TaskId::new(id, i as u32),
                    spec,
                    registry.clone(),
                    events.clone(),
                )
            })
            .collect();

        let now = Utc::now();
        // un job sin tareas ya terminó
        let (status, finished_at) = if tasks.is_empty() {
            (JobStatus::Succeeded, Some(now))
        } else {
            (JobStatus::Running, None)
        };

        Self {
            id,
            name: name.into(),
            tasks,
            status,
            completed: 0,
            failed: 0,
            killed: 0,
            kill_requested: false,
            started_at: now,
            finished_at,
            events,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    pub fn report(&self) -> JobReport {
        JobReport {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            total_tasks: self.tasks.len() as u32,
            completed_tasks: self.completed,
            failed_tasks: self.failed,
            killed_tasks: self.killed,
            tasks: self.tasks.iter().map(Task::report).collect(),
        }
    }

    fn finished_tasks(&self) -> u32 {
        self.completed + self.failed + self.killed
    }

    /// Cierra el job cuando todas las tareas llegaron a estado terminal.
    fn check_finished(&mut self) {
        if self.finished_tasks() < self.tasks.len() as u32 {
            return;
        }

        self.status = if self.kill_requested {
            JobStatus::Killed
        } else if self.failed + self.killed == 0 {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        self.finished_at = Some(Utc::now());

        info!(
            "job {} terminado: {} (ok={}, fallidas={}, matadas={})",
            self.id, self.status, self.completed, self.failed, self.killed
        );
    }
}

impl Handle<JobEvent> for Job {
    fn handle(&mut self, event: JobEvent) -> Result<(), TransitionError> {
        if self.is_finished() {
            return Err(TransitionError::invalid(
                self.id,
                self.status,
                event.event_type(),
            ));
        }

        match event.event_type() {
            JobEventType::TaskCompleted => self.completed += 1,
            JobEventType::TaskFailed => self.failed += 1,
            JobEventType::TaskKilled => self.killed += 1,
            JobEventType::Kill => {
                self.kill_requested = true;
                let pending: Vec<TaskId> = self
                    .tasks
                    .iter()
                    .filter(|t| !t.state().is_terminal())
                    .map(|t| *t.id())
                    .collect();

                warn!("job {}: kill pedido, matando {} tareas", self.id, pending.len());
                for task_id in pending {
                    self.events
                        .submit(TaskEvent::new(task_id, TaskEventType::Kill));
                }
                return Ok(());
            }
        }

        if let Some(task_id) = event.task_id() {
            info!(
                "job {}: {} de {} ({}/{} tareas terminadas)",
                self.id,
                event.event_type(),
                task_id,
                self.finished_tasks(),
                self.tasks.len()
            );
        }

        self.check_finished();
        Ok(())
    }
}
