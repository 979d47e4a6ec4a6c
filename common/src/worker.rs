use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::job::{parse_parts, to_u32, ApplicationAttemptId, IdParseError, JobId};
use crate::task::TaskId;

/// Una ejecución concreta de una tarea: (task, número de worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId {
    task_id: TaskId,
    id: u32,
}

impl WorkerId {
    pub fn new(task_id: TaskId, id: u32) -> Self {
        Self { task_id, id }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}_{:06}", self.task_id.suffix(), self.id)
    }
}

impl FromStr for WorkerId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = parse_parts("worker", s, 5)?;
        let attempt = ApplicationAttemptId::new(p[0], to_u32(s, p[1])?, to_u32(s, p[2])?);
        let task_id = TaskId::new(JobId::new(attempt), to_u32(s, p[3])?);
        Ok(Self::new(task_id, to_u32(s, p[4])?))
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for WorkerId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    New,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Succeeded | WorkerState::Failed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::New => "NEW",
            WorkerState::Starting => "STARTING",
            WorkerState::Running => "RUNNING",
            WorkerState::Succeeded => "SUCCEEDED",
            WorkerState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Cómo llegó el proceso del worker al contenedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// La imagen ya está en el nodo: el worker arranca su propio proceso.
    ResidentImage,
    /// El launcher ya levantó el contenedor con el proceso adentro.
    LaunchedContainer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub mode: WorkerMode,
    pub state: WorkerState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

/* --------- Reporte de estado que manda el proceso del worker --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Running,
    Completed,
    Failed,
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(WorkerStatus::Running),
            "completed" => Ok(WorkerStatus::Completed),
            "failed" => Ok(WorkerStatus::Failed),
            other => Err(format!("estado de worker desconocido: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusRequest {
    pub status: WorkerStatus,
    #[serde(default)]
    pub message: Option<String>,
}
