//! Task: una unidad planificable atada a un contenedor.
//!
//! La máquina de estados es una tabla explícita (estado, evento) ->
//! (siguiente estado, acción). Cualquier par que no esté en la tabla es una
//! transición inválida y deja la tarea como estaba.
//!
//! ```text
//! NEW --SCHEDULE--> SCHEDULED --SETUP--> RUNNING --COMPLETED--> SUCCEEDED
//!                       |  (imagen local: sigue en SCHEDULED hasta TASK_RUNNING)
//!                       +--COMPLETED--> SUCCEEDED
//! NEW|SCHEDULED|RUNNING --KILL--> KILLED, --ERROR--> FAILED
//! ```

use std::sync::Arc;

use common::{
    Container, EngineType, Resource, TaskId, TaskReport, TaskState, WorkerId, WorkerMode,
};
use tracing::{debug, info, warn};

use crate::dispatcher::Handle;
use crate::error::TransitionError;
use crate::event::{
    AllocatorEvent, EventSender, JobEvent, JobEventType, LaunchSpec, LauncherEvent, TaskEvent,
    TaskEventType, WorkerEvent, WorkerEventType,
};
use crate::registry::Registry;
use crate::worker::Worker;

/// Configuración de cada tarea del job (igual para todas las instancias).
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub resource: Resource,
    pub priority: u32,
    pub command: String,
    pub image: String,
    pub engine: EngineType,
    /// La imagen ya está en los nodos: se saltea el launch del contenedor.
    pub use_local_image: bool,
}

impl TaskSpec {
    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            image: self.image.clone(),
            engine: self.engine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    To(TaskState),
    /// Depende de `use_local_image`.
    ByImage { local: TaskState, launch: TaskState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskAction {
    RequestContainer,
    AssignContainer,
    StartLaunchedWorker,
    ConfirmRunning,
    Complete,
    Kill,
    Fail,
}

struct TaskTransition {
    from: TaskState,
    on: TaskEventType,
    next: Next,
    action: TaskAction,
}

const fn row(from: TaskState, on: TaskEventType, next: Next, action: TaskAction) -> TaskTransition {
    TaskTransition {
        from,
        on,
        next,
        action,
    }
}

use TaskState::{Failed, Killed, New, Running, Scheduled, Succeeded};

const TRANSITIONS: &[TaskTransition] = &[
    row(New, TaskEventType::Schedule, Next::To(Scheduled), TaskAction::RequestContainer),
    row(
        Scheduled,
        TaskEventType::Setup,
        Next::ByImage {
            local: Scheduled,
            launch: Running,
        },
        TaskAction::AssignContainer,
    ),
    row(Running, TaskEventType::Launch, Next::To(Running), TaskAction::StartLaunchedWorker),
    row(Scheduled, TaskEventType::Running, Next::To(Running), TaskAction::ConfirmRunning),
    row(Running, TaskEventType::Running, Next::To(Running), TaskAction::ConfirmRunning),
    row(Scheduled, TaskEventType::Completed, Next::To(Succeeded), TaskAction::Complete),
    row(Running, TaskEventType::Completed, Next::To(Succeeded), TaskAction::Complete),
    row(New, TaskEventType::Kill, Next::To(Killed), TaskAction::Kill),
    row(Scheduled, TaskEventType::Kill, Next::To(Killed), TaskAction::Kill),
    row(Running, TaskEventType::Kill, Next::To(Killed), TaskAction::Kill),
    row(New, TaskEventType::Error, Next::To(Failed), TaskAction::Fail),
    row(Scheduled, TaskEventType::Error, Next::To(Failed), TaskAction::Fail),
    row(Running, TaskEventType::Error, Next::To(Failed), TaskAction::Fail),
];

fn lookup(state: TaskState, on: TaskEventType) -> Option<&'static TaskTransition> {
    TRANSITIONS.iter().find(|t| t.from == state && t.on == on)
}

pub struct Task {
    id: TaskId,
    spec: TaskSpec,
    state: TaskState,
    container: Option<Container>,
    worker: Option<Worker>,
    /// Workers creados hasta ahora (también da el id del próximo)
    attempts: u32,
    diagnostics: Vec<String>,
    events: EventSender,
    registry: Arc<dyn Registry>,
}

impl Task {
    pub fn new(
        id: TaskId,
        spec: TaskSpec,
        registry: Arc<dyn Registry>,
        events: EventSender,
    ) -> Self {
        Self {
            id,
            spec,
            state: TaskState::New,
            container: None,
            worker: None,
            attempts: 0,
            diagnostics: Vec::new(),
            events,
            registry,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn worker(&self) -> Option<&Worker> {
        self.worker.as_ref()
    }

    /// El worker activo, sólo si es el que se pide.
    pub fn worker_mut(&mut self, id: &WorkerId) -> Option<&mut Worker> {
        self.worker.as_mut().filter(|w| w.id() == id)
    }

    pub fn report(&self) -> TaskReport {
        TaskReport {
            id: self.id,
            state: self.state,
            container: self.container.clone(),
            worker: self.worker.as_ref().map(Worker::report),
            attempts: self.attempts,
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Crea un worker nuevo para el contenedor asignado. El anterior, si lo
    /// había, se descarta tal cual.
    fn start_worker(&mut self, mode: WorkerMode, container: Container) -> WorkerId {
        self.attempts += 1;
        let worker_id = WorkerId::new(self.id, self.attempts);
        let worker = Worker::new(
            worker_id,
            container,
            mode,
            self.spec.launch_spec(),
            self.events.clone(),
        );

        if let Some(previous) = self.worker.replace(worker) {
            debug!("task {}: descartando worker previo {}", self.id, previous.id());
        }

        self.events
            .submit(WorkerEvent::new(worker_id, WorkerEventType::Start));
        worker_id
    }

    /// Baja del registry y devolución al allocator.
    fn release_container(&mut self, container: &Container) {
        if let Err(e) = self.registry.deregister_container(container.id.as_str()) {
            warn!("task {}: no se pudo dar de baja {} del registry: {}", self.id, container.id, e);
        }
        self.events.submit(AllocatorEvent::Release {
            task_id: self.id,
            container_id: container.id.clone(),
        });
    }

    /// Un setup que llega con la tarea ya terminada trae un contenedor que
    /// nadie va a usar: vuelve al allocator.
    fn reject_late(&self, event: &TaskEvent) {
        if !self.state.is_terminal() || event.event_type() != TaskEventType::Setup {
            return;
        }
        if let Some(container) = event.container() {
            warn!(
                "task {}: setup tardío en {}, devolviendo {}",
                self.id, self.state, container.id
            );
            self.events.submit(AllocatorEvent::Release {
                task_id: self.id,
                container_id: container.id.clone(),
            });
        }
    }

    fn apply(&mut self, action: TaskAction, event: TaskEvent) -> Result<(), TransitionError> {
        match action {
            TaskAction::RequestContainer => {
                self.events.submit(AllocatorEvent::Request {
                    task_id: self.id,
                    resource: self.spec.resource,
                    priority: self.spec.priority,
                });
            }

            TaskAction::AssignContainer => {
                let container = event.container().cloned().ok_or_else(|| {
                    TransitionError::missing(self.id, event.event_type(), "container")
                })?;

                if let Err(e) = self.registry.set_container_record(
                    container.id.as_str(),
                    &container.node_host,
                    container.node_port,
                ) {
                    warn!("task {}: no se pudo registrar {}: {}", self.id, container.id, e);
                }
                self.container = Some(container.clone());

                if self.spec.use_local_image {
                    let worker_id = self.start_worker(WorkerMode::ResidentImage, container);
                    info!(
                        "task {}: imagen local, arrancando worker {} sin launch",
                        self.id, worker_id
                    );
                } else {
                    self.events.submit(LauncherEvent::Launch {
                        task_id: self.id,
                        container,
                        spec: self.spec.launch_spec(),
                    });
                }
            }

            TaskAction::StartLaunchedWorker => {
                let container = self
                    .container
                    .clone()
                    .or_else(|| event.container().cloned())
                    .ok_or_else(|| {
                        TransitionError::missing(self.id, event.event_type(), "container")
                    })?;

                let worker_id = self.start_worker(WorkerMode::LaunchedContainer, container);
                // el proceso ya está corriendo dentro del contenedor
                self.events
                    .submit(WorkerEvent::new(worker_id, WorkerEventType::Running));
            }

            TaskAction::ConfirmRunning => {
                debug!("task {}: worker confirmado en ejecución", self.id);
            }

            TaskAction::Complete => {
                let container = event
                    .container()
                    .cloned()
                    .or_else(|| self.container.clone())
                    .ok_or_else(|| {
                        TransitionError::missing(self.id, event.event_type(), "container")
                    })?;

                self.container = None;
                self.release_container(&container);
                self.worker = None;
                self.events.submit(JobEvent::task_finished(
                    self.id,
                    JobEventType::TaskCompleted,
                ));
            }

            TaskAction::Kill => {
                if let Some(container) = self.container.take() {
                    self.events.submit(LauncherEvent::Stop {
                        task_id: self.id,
                        container_id: container.id.clone(),
                    });
                    self.release_container(&container);
                }
                self.worker = None;
                self.events
                    .submit(JobEvent::task_finished(self.id, JobEventType::TaskKilled));
            }

            TaskAction::Fail => {
                let cause = event.diagnostic().unwrap_or("sin diagnóstico").to_string();
                warn!("task {} falló: {}", self.id, cause);
                self.diagnostics.push(cause);

                if let Some(container) = self.container.take() {
                    self.release_container(&container);
                }
                self.worker = None;
                self.events
                    .submit(JobEvent::task_finished(self.id, JobEventType::TaskFailed));
            }
        }
        Ok(())
    }
}

impl Handle<TaskEvent> for Task {
    fn handle(&mut self, event: TaskEvent) -> Result<(), TransitionError> {
        let event_type = event.event_type();
        let transition = match lookup(self.state, event_type) {
            Some(transition) => transition,
            None => {
                self.reject_late(&event);
                return Err(TransitionError::invalid(self.id, self.state, event_type));
            }
        };

        let next = match transition.next {
            Next::To(state) => state,
            Next::ByImage { local, launch } => {
                if self.spec.use_local_image {
                    local
                } else {
                    launch
                }
            }
        };

        // si la acción falla (payload faltante) el estado no se toca
        self.apply(transition.action, event)?;

        info!("task {}: {} -> {} ({})", self.id, self.state, next, event_type);
        self.state = next;
        Ok(())
    }
}
