use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    ContainerRecord, JobReport, SubmitResponse, TaskId, TaskReport, WorkerId, WorkerStatus,
    WorkerStatusRequest,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::event::{
    Event, JobEvent, JobEventType, TaskEvent, TaskEventType, WorkerEvent, WorkerEventType,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/job", get(get_job))
        .route("/api/v1/job/kill", post(kill_job))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/tasks/:id/kill", post(kill_task))
        .route("/api/v1/workers/:id/status", post(worker_status))
        .route("/api/v1/registry", get(list_registry))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type Accepted = (StatusCode, Json<SubmitResponse>);

/// Encola el evento y contesta 202: el dispatcher lo procesa después.
fn submit(state: &AppState, event: impl Into<Event>) -> Accepted {
    let event = event.into();
    let label = event.to_string();
    state.events.submit(event);
    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            ok: true,
            event: label,
        }),
    )
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Foto completa del job con todas sus tareas
async fn get_job(State(state): State<AppState>) -> Json<JobReport> {
    Json(state.report())
}

// Pide matar el job entero; 409 si ya terminó
async fn kill_job(State(state): State<AppState>) -> Result<Accepted, StatusCode> {
    let report = state.report();
    if report.status.is_terminal() {
        warn!("kill del job {} ignorado: ya está {}", report.id, report.status);
        return Err(StatusCode::CONFLICT);
    }

    info!("kill del job {} pedido por HTTP", report.id);
    Ok(submit(&state, JobEvent::new(report.id, JobEventType::Kill)))
}

fn parse_task_id(raw: &str) -> Result<TaskId, StatusCode> {
    raw.parse::<TaskId>().map_err(|e| {
        warn!("task id inválido: {}", e);
        StatusCode::BAD_REQUEST
    })
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskReport>, StatusCode> {
    let task_id = parse_task_id(&id)?;
    let report = state.report();
    report
        .task(&task_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn kill_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Accepted, StatusCode> {
    let task_id = parse_task_id(&id)?;
    if state.report().task(&task_id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    info!("kill de {} pedido por HTTP", task_id);
    Ok(submit(&state, TaskEvent::new(task_id, TaskEventType::Kill)))
}

// El proceso del worker (o quien lo supervise) reporta su estado
async fn worker_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WorkerStatusRequest>,
) -> Result<Accepted, StatusCode> {
    let worker_id = id.parse::<WorkerId>().map_err(|e| {
        warn!("worker id inválido: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let event_type = match req.status {
        WorkerStatus::Running => WorkerEventType::Running,
        WorkerStatus::Completed => WorkerEventType::Completed,
        WorkerStatus::Failed => WorkerEventType::Failed,
    };

    let mut event = WorkerEvent::new(worker_id, event_type);
    if let Some(message) = req.message {
        event = event.with_diagnostic(message);
    }
    Ok(submit(&state, event))
}

async fn list_registry(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContainerRecord>>, StatusCode> {
    state.registry.records().map(Json).map_err(|e| {
        warn!("{}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSender;
    use crate::job::Job;
    use crate::registry::{InMemoryRegistry, Registry};
    use crate::task::TaskSpec;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use common::{ApplicationAttemptId, EngineType, JobId, JobStatus, Resource};
    use std::sync::Arc;
    use tokio::sync::{mpsc, watch};
    use tower::ServiceExt;

    struct Fixture {
        router: Router,
        events: mpsc::UnboundedReceiver<Event>,
        reports: watch::Sender<JobReport>,
        job_id: JobId,
    }

    fn fixture() -> Fixture {
        let (tx, events) = mpsc::unbounded_channel();
        let sender = EventSender::new(tx);
        let registry = Arc::new(InMemoryRegistry::default());
        registry
            .set_container_record("container_1465186316357_0001_01_000001", "localhost", 9001)
            .unwrap();

        let spec = TaskSpec {
            resource: Resource::new(1.0, 32),
            priority: 0,
            command: "true".to_string(),
            image: "centos_yarn".to_string(),
            engine: EngineType::Process,
            use_local_image: false,
        };
        let job_id = JobId::new(ApplicationAttemptId::new(1465186316357, 1, 1));
        let job = Job::new(job_id, "http", vec![spec; 2], registry.clone(), sender.clone());
        let (reports, rx) = watch::channel(job.report());

        Fixture {
            router: build_router(AppState::new(rx, sender, registry)),
            events,
            reports,
            job_id,
        }
    }

    async fn call(router: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = router.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_ok() {
        let f = fixture();
        let (status, body) = call(f.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn get_job_devuelve_el_ultimo_reporte() {
        let f = fixture();
        let (status, body) = call(f.router, "GET", "/api/v1/job", None).await;
        assert_eq!(status, StatusCode::OK);

        let report: JobReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.id, f.job_id);
        assert_eq!(report.total_tasks, 2);
        assert_eq!(report.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn get_task_valida_el_id() {
        let f = fixture();
        let task = TaskId::new(f.job_id, 1);

        let (status, body) =
            call(f.router.clone(), "GET", &format!("/api/v1/tasks/{task}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let report: TaskReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.id, task);

        let missing = TaskId::new(f.job_id, 9);
        let (status, _) =
            call(f.router.clone(), "GET", &format!("/api/v1/tasks/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(f.router, "GET", "/api/v1/tasks/basura", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn kill_task_encola_el_evento() {
        let mut f = fixture();
        let task = TaskId::new(f.job_id, 0);
        let (status, body) =
            call(f.router, "POST", &format!("/api/v1/tasks/{task}/kill"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let resp: SubmitResponse = serde_json::from_slice(&body).unwrap();
        assert!(resp.ok);
        assert!(resp.event.starts_with("TASK_KILL"));

        match f.events.try_recv() {
            Ok(Event::Task(e)) => {
                assert_eq!(e.task_id(), &task);
                assert_eq!(e.event_type(), TaskEventType::Kill);
            }
            other => panic!("evento inesperado {other:?}"),
        }
    }

    #[tokio::test]
    async fn kill_job_en_curso_y_terminado() {
        let mut f = fixture();
        let (status, _) = call(f.router.clone(), "POST", "/api/v1/job/kill", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(matches!(f.events.try_recv(), Ok(Event::Job(_))));

        f.reports.send_modify(|r| r.status = JobStatus::Succeeded);
        let (status, _) = call(f.router, "POST", "/api/v1/job/kill", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_status_traduce_a_worker_event() {
        let mut f = fixture();
        let worker = WorkerId::new(TaskId::new(f.job_id, 0), 1);
        let (status, _) = call(
            f.router.clone(),
            "POST",
            &format!("/api/v1/workers/{worker}/status"),
            Some(r#"{"status":"failed","message":"oom"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        match f.events.try_recv() {
            Ok(Event::Worker(e)) => {
                assert_eq!(e.worker_id(), &worker);
                assert_eq!(e.event_type(), WorkerEventType::Failed);
                assert_eq!(e.diagnostic(), Some("oom"));
            }
            other => panic!("evento inesperado {other:?}"),
        }

        let (status, _) = call(
            f.router,
            "POST",
            "/api/v1/workers/worker_x/status",
            Some(r#"{"status":"running"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn registry_lista_los_contenedores() {
        let f = fixture();
        let (status, body) = call(f.router, "GET", "/api/v1/registry", None).await;
        assert_eq!(status, StatusCode::OK);
        let records: Vec<ContainerRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].port, 9001);
    }
}
