//! Worker: una ejecución de la tarea dentro de su contenedor.
//!
//! Lo crea la tarea dueña y sólo recibe eventos a través del
//! WorkerEventDispatcher. Cuando termina (bien o mal) lo avisa hacia arriba
//! como un TaskEvent.

use chrono::{DateTime, Utc};
use common::{Container, WorkerId, WorkerMode, WorkerReport, WorkerState};
use tracing::{debug, info};

use crate::dispatcher::Handle;
use crate::error::TransitionError;
use crate::event::{
    EventSender, LaunchSpec, LauncherEvent, TaskEvent, TaskEventType, WorkerEvent,
    WorkerEventType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerAction {
    Start,
    ReportRunning,
    ReportCompleted,
    ReportFailed,
}

struct WorkerTransition {
    from: WorkerState,
    on: WorkerEventType,
    to: WorkerState,
    action: WorkerAction,
}

const fn row(
    from: WorkerState,
    on: WorkerEventType,
    to: WorkerState,
    action: WorkerAction,
) -> WorkerTransition {
    WorkerTransition {
        from,
        on,
        to,
        action,
    }
}

const TRANSITIONS: &[WorkerTransition] = &[
    row(WorkerState::New, WorkerEventType::Start, WorkerState::Starting, WorkerAction::Start),
    row(WorkerState::Starting, WorkerEventType::Running, WorkerState::Running, WorkerAction::ReportRunning),
    row(WorkerState::Starting, WorkerEventType::Completed, WorkerState::Succeeded, WorkerAction::ReportCompleted),
    row(WorkerState::Running, WorkerEventType::Completed, WorkerState::Succeeded, WorkerAction::ReportCompleted),
    row(WorkerState::New, WorkerEventType::Failed, WorkerState::Failed, WorkerAction::ReportFailed),
    row(WorkerState::Starting, WorkerEventType::Failed, WorkerState::Failed, WorkerAction::ReportFailed),
    row(WorkerState::Running, WorkerEventType::Failed, WorkerState::Failed, WorkerAction::ReportFailed),
];

fn lookup(state: WorkerState, on: WorkerEventType) -> Option<&'static WorkerTransition> {
    TRANSITIONS.iter().find(|t| t.from == state && t.on == on)
}

pub struct Worker {
    id: WorkerId,
    container: Container,
    mode: WorkerMode,
    launch: LaunchSpec,
    state: WorkerState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    message: Option<String>,
    events: EventSender,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        container: Container,
        mode: WorkerMode,
        launch: LaunchSpec,
        events: EventSender,
    ) -> Self {
        Self {
            id,
            container,
            mode,
            launch,
            state: WorkerState::New,
            started_at: None,
            finished_at: None,
            message: None,
            events,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    pub fn report(&self) -> WorkerReport {
        WorkerReport {
            id: self.id,
            mode: self.mode,
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            message: self.message.clone(),
        }
    }

    fn apply(&mut self, action: WorkerAction, event: &WorkerEvent) {
        let task_id = *self.id.task_id();

        match action {
            WorkerAction::Start => {
                self.started_at = Some(Utc::now());
                match self.mode {
                    WorkerMode::ResidentImage => {
                        // Imagen local: el worker pide arrancar el proceso sin
                        // pasar por el protocolo de launch del contenedor.
                        self.events.submit(LauncherEvent::StartWorker {
                            worker_id: self.id,
                            container: self.container.clone(),
                            spec: self.launch.clone(),
                        });
                    }
                    WorkerMode::LaunchedContainer => {
                        debug!("worker {}: el launcher ya levantó el proceso", self.id);
                    }
                }
            }
            WorkerAction::ReportRunning => {
                self.events
                    .submit(TaskEvent::new(task_id, TaskEventType::Running));
            }
            WorkerAction::ReportCompleted => {
                self.finished_at = Some(Utc::now());
                self.events.submit(
                    TaskEvent::new(task_id, TaskEventType::Completed)
                        .with_container(self.container.clone()),
                );
            }
            WorkerAction::ReportFailed => {
                self.finished_at = Some(Utc::now());
                let cause = event.diagnostic().unwrap_or("sin diagnóstico").to_string();
                self.message = Some(cause.clone());
                self.events.submit(
                    TaskEvent::new(task_id, TaskEventType::Error)
                        .with_diagnostic(format!("worker {} falló: {}", self.id, cause)),
                );
            }
        }
    }
}

impl Handle<WorkerEvent> for Worker {
    fn handle(&mut self, event: WorkerEvent) -> Result<(), TransitionError> {
        let transition = lookup(self.state, event.event_type())
            .ok_or_else(|| TransitionError::invalid(self.id, self.state, event.event_type()))?;

        self.apply(transition.action, &event);

        info!(
            "worker {}: {} -> {} ({})",
            self.id,
            self.state,
            transition.to,
            event.event_type()
        );
        self.state = transition.to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use common::{
        ApplicationAttemptId, ContainerId, EngineType, JobId, Resource, TaskId,
    };
    use tokio::sync::mpsc;

    fn container() -> Container {
        Container {
            id: ContainerId::from("containerId"),
            node_host: "localhost".to_string(),
            node_port: 1234,
            resource: Resource::new(1.0, 32),
        }
    }

    fn new_worker(mode: WorkerMode) -> (Worker, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let job = JobId::new(ApplicationAttemptId::new(1465186316357, 1, 1));
        let id = WorkerId::new(TaskId::new(job, 1), 1);
        let launch = LaunchSpec {
            command: "cat /proc/1/cgroup".to_string(),
            image: "centos_yarn".to_string(),
            engine: EngineType::Docker,
        };
        let worker = Worker::new(id, container(), mode, launch, EventSender::new(tx));
        (worker, rx)
    }

    fn emitted(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[test]
    fn start_con_imagen_local_pide_arrancar_el_proceso() {
        let (mut worker, mut rx) = new_worker(WorkerMode::ResidentImage);
        worker
            .handle(WorkerEvent::new(*worker.id(), WorkerEventType::Start))
            .unwrap();

        assert_eq!(worker.state(), WorkerState::Starting);
        let events = emitted(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::Launcher(LauncherEvent::StartWorker { worker_id, .. }) if worker_id == worker.id()
        ));
    }

    #[test]
    fn start_con_contenedor_lanzado_no_emite_nada() {
        let (mut worker, mut rx) = new_worker(WorkerMode::LaunchedContainer);
        worker
            .handle(WorkerEvent::new(*worker.id(), WorkerEventType::Start))
            .unwrap();

        assert_eq!(worker.state(), WorkerState::Starting);
        assert!(emitted(&mut rx).is_empty());
        assert!(worker.report().started_at.is_some());
    }

    #[test]
    fn running_y_completed_se_propagan_a_la_tarea() {
        let (mut worker, mut rx) = new_worker(WorkerMode::LaunchedContainer);
        let id = *worker.id();
        worker.handle(WorkerEvent::new(id, WorkerEventType::Start)).unwrap();
        worker.handle(WorkerEvent::new(id, WorkerEventType::Running)).unwrap();
        worker.handle(WorkerEvent::new(id, WorkerEventType::Completed)).unwrap();

        assert_eq!(worker.state(), WorkerState::Succeeded);
        let events = emitted(&mut rx);
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::Task(e) => {
                assert_eq!(e.event_type(), TaskEventType::Running);
                assert_eq!(e.task_id(), id.task_id());
            }
            other => panic!("evento inesperado {other:?}"),
        }
        match &events[1] {
            Event::Task(e) => {
                assert_eq!(e.event_type(), TaskEventType::Completed);
                assert_eq!(e.container(), Some(&container()));
            }
            other => panic!("evento inesperado {other:?}"),
        }
    }

    #[test]
    fn failed_propaga_task_error_con_diagnostico() {
        let (mut worker, mut rx) = new_worker(WorkerMode::ResidentImage);
        let id = *worker.id();
        worker.handle(WorkerEvent::new(id, WorkerEventType::Start)).unwrap();
        emitted(&mut rx);

        worker
            .handle(WorkerEvent::new(id, WorkerEventType::Failed).with_diagnostic("exit 137"))
            .unwrap();

        assert_eq!(worker.state(), WorkerState::Failed);
        assert_eq!(worker.report().message.as_deref(), Some("exit 137"));
        let events = emitted(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Task(e) => {
                assert_eq!(e.event_type(), TaskEventType::Error);
                assert!(e.diagnostic().unwrap().contains("exit 137"));
            }
            other => panic!("evento inesperado {other:?}"),
        }
    }

    #[test]
    fn transicion_invalida_no_cambia_el_estado() {
        let (mut worker, mut rx) = new_worker(WorkerMode::ResidentImage);
        let id = *worker.id();

        let err = worker
            .handle(WorkerEvent::new(id, WorkerEventType::Completed))
            .unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
        assert_eq!(worker.state(), WorkerState::New);
        assert!(emitted(&mut rx).is_empty());

        worker.handle(WorkerEvent::new(id, WorkerEventType::Failed)).unwrap();
        // terminal: ya no acepta nada
        assert!(worker
            .handle(WorkerEvent::new(id, WorkerEventType::Start))
            .is_err());
        assert_eq!(worker.state(), WorkerState::Failed);
    }
}
