use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::container::Container;
use crate::job::{parse_parts, to_u32, ApplicationAttemptId, IdParseError, JobId};
use crate::worker::WorkerReport;

/// Una tarea por instancia pedida: (job, número de secuencia).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    job_id: JobId,
    id: u32,
}

impl TaskId {
    pub fn new(job_id: JobId, id: u32) -> Self {
        Self { job_id, id }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn suffix(&self) -> String {
        format!("{}_{:06}", self.job_id.suffix(), self.id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task_{}", self.suffix())
    }
}

impl FromStr for TaskId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = parse_parts("task", s, 4)?;
        let attempt = ApplicationAttemptId::new(p[0], to_u32(s, p[1])?, to_u32(s, p[2])?);
        Ok(Self::new(JobId::new(attempt), to_u32(s, p[3])?))
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    New,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Killed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Killed
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::New => "NEW",
            TaskState::Scheduled => "SCHEDULED",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Killed => "KILLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub state: TaskState,
    /// Contenedor asignado (None hasta el setup, o después de liberarlo)
    pub container: Option<Container>,
    pub worker: Option<WorkerReport>,
    /// Cuántos workers se crearon para esta tarea
    pub attempts: u32,
    pub diagnostics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::new(ApplicationAttemptId::new(1465186316357, 1, 1))
    }

    #[test]
    fn task_id_parse_and_display() {
        let id = TaskId::new(job(), 12);
        assert_eq!(id.to_string(), "task_1465186316357_0001_000001_000012");
        let back: TaskId = id.to_string().parse().unwrap();
        assert_eq!(back, id);
        assert_eq!(back.job_id(), &job());
    }

    #[test]
    fn task_id_no_acepta_ids_de_worker() {
        let err = "worker_1465186316357_0001_000001_000012_000001"
            .parse::<TaskId>()
            .unwrap_err();
        assert!(err.reason.contains("prefijo"));
    }

    #[test]
    fn estados_terminales() {
        assert!(!TaskState::New.is_terminal());
        assert!(!TaskState::Scheduled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Killed.is_terminal());
    }
}
