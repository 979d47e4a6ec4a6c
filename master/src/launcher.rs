//! Launcher local: corre el comando de la tarea como proceso hijo (shell o
//! `docker run`) y avisa el resultado con eventos.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use common::{Container, ContainerId, EngineType, TaskId, WorkerId};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::dispatcher::EventHandler;
use crate::error::DispatchError;
use crate::event::{
    Event, EventCategory, EventSender, LaunchSpec, LauncherEvent, TaskEvent, TaskEventType,
    WorkerEvent, WorkerEventType,
};

/// A quién se le reporta el proceso.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Launch completo: el resultado va a la tarea.
    Task(TaskId),
    /// Imagen local: el resultado va al worker.
    Worker(WorkerId),
}

impl Target {
    fn started(&self, events: &EventSender) {
        match *self {
            Target::Task(id) => events.submit(TaskEvent::new(id, TaskEventType::Launch)),
            Target::Worker(id) => events.submit(WorkerEvent::new(id, WorkerEventType::Running)),
        }
    }

    fn succeeded(&self, events: &EventSender, container: Container) {
        match *self {
            Target::Task(id) => events.submit(
                TaskEvent::new(id, TaskEventType::Completed).with_container(container),
            ),
            Target::Worker(id) => {
                events.submit(WorkerEvent::new(id, WorkerEventType::Completed))
            }
        }
    }

    fn failed(&self, events: &EventSender, diagnostic: String) {
        match *self {
            Target::Task(id) => events
                .submit(TaskEvent::new(id, TaskEventType::Error).with_diagnostic(diagnostic)),
            Target::Worker(id) => events
                .submit(WorkerEvent::new(id, WorkerEventType::Failed).with_diagnostic(diagnostic)),
        }
    }
}

type Running = Arc<Mutex<HashMap<ContainerId, oneshot::Sender<()>>>>;

pub struct LocalLauncher {
    events: EventSender,
    running: Running,
    /// Contenedores parados antes de que llegara su launch.
    stopped: HashSet<ContainerId>,
}

impl LocalLauncher {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            running: Arc::new(Mutex::new(HashMap::new())),
            stopped: HashSet::new(),
        }
    }

    /// Procesos vivos, por contenedor.
    pub fn running(&self) -> usize {
        self.running.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn command(container: &Container, spec: &LaunchSpec, worker: Option<WorkerId>) -> Command {
        let mut env = vec![
            ("CONTAINER_ID", container.id.to_string()),
            ("NODE_HOST", container.node_host.clone()),
            ("NODE_PORT", container.node_port.to_string()),
        ];
        if let Some(worker_id) = worker {
            env.push(("WORKER_ID", worker_id.to_string()));
        }

        let mut cmd = match spec.engine {
            EngineType::Process => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(&spec.command);
                cmd.envs(env.iter().map(|(k, v)| (*k, v.as_str())));
                cmd
            }
            EngineType::Docker => {
                let mut cmd = Command::new("docker");
                cmd.args(["run", "--rm", "--name", container.id.as_str()]);
                for (k, v) in &env {
                    cmd.arg("-e").arg(format!("{k}={v}"));
                }
                cmd.arg(&spec.image).arg("sh").arg("-c").arg(&spec.command);
                cmd
            }
        };

        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn start(&mut self, target: Target, container: Container, spec: LaunchSpec, worker: Option<WorkerId>) {
        if self.stopped.remove(&container.id) {
            info!("{:?}: {} ya fue detenido, no se lanza", target, container.id);
            return;
        }

        let child = match Self::command(&container, &spec, worker).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("no se pudo lanzar {:?} en {}: {}", target, container.id, e);
                target.failed(&self.events, format!("launch de {} falló: {}", container.id, e));
                return;
            }
        };

        info!(
            "proceso lanzado en {} ({:?}, pid {:?})",
            container.id,
            spec.engine,
            child.id()
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        if let Ok(mut running) = self.running.lock() {
            running.insert(container.id.clone(), stop_tx);
        }
        target.started(&self.events);

        let events = self.events.clone();
        let running = self.running.clone();
        tokio::spawn(supervise(child, stop_rx, target, container, events, running));
    }

    fn stop(&mut self, task_id: TaskId, container_id: ContainerId) {
        let stop_tx = self
            .running
            .lock()
            .ok()
            .and_then(|mut running| running.remove(&container_id));

        match stop_tx {
            Some(tx) => {
                info!("deteniendo {} de {}", container_id, task_id);
                let _ = tx.send(());
            }
            None => {
                debug!("stop de {}: no hay proceso vivo, se descarta su launch", container_id);
                self.stopped.insert(container_id);
            }
        }
    }
}

/// Espera a que el proceso termine o a que lo manden a parar.
async fn supervise(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    target: Target,
    container: Container,
    events: EventSender,
    running: Running,
) {
    tokio::select! {
        status = child.wait() => {
            if let Ok(mut running) = running.lock() {
                running.remove(&container.id);
            }
            match status {
                Ok(status) if status.success() => {
                    info!("{} terminó bien", container.id);
                    target.succeeded(&events, container);
                }
                Ok(status) => {
                    let diagnostic = match status.code() {
                        Some(code) => format!("{} salió con código {}", container.id, code),
                        None => format!("{} terminado por señal", container.id),
                    };
                    warn!("{}", diagnostic);
                    target.failed(&events, diagnostic);
                }
                Err(e) => target.failed(&events, format!("wait de {}: {}", container.id, e)),
            }
        }
        _ = stop_rx => {
            // parada pedida: no se reporta nada
            if let Err(e) = child.kill().await {
                warn!("no se pudo matar {}: {}", container.id, e);
            }
        }
    }
}

impl<C> EventHandler<C> for LocalLauncher {
    fn handle(&mut self, _ctx: &mut C, event: Event) -> Result<(), DispatchError> {
        match event {
            Event::Launcher(LauncherEvent::Launch {
                task_id,
                container,
                spec,
            }) => self.start(Target::Task(task_id), container, spec, None),
            Event::Launcher(LauncherEvent::StartWorker {
                worker_id,
                container,
                spec,
            }) => self.start(Target::Worker(worker_id), container, spec, Some(worker_id)),
            Event::Launcher(LauncherEvent::Stop {
                task_id,
                container_id,
            }) => self.stop(task_id, container_id),
            other => {
                return Err(DispatchError::UnexpectedCategory {
                    expected: EventCategory::Launcher,
                    got: other.category(),
                })
            }
        }
        Ok(())
    }
}
