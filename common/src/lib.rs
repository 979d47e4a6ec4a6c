pub mod container;
pub mod job;
pub mod task;
pub mod worker;

pub use container::{Container, ContainerId, ContainerRecord, EngineType, Resource};
pub use job::{ApplicationAttemptId, IdParseError, JobId, JobReport, JobStatus, SubmitResponse};
pub use task::{TaskId, TaskReport, TaskState};
pub use worker::{WorkerId, WorkerMode, WorkerReport, WorkerState, WorkerStatus, WorkerStatusRequest};
