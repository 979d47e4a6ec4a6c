mod allocator;
mod config;
mod context;
mod dispatcher;
mod dispatchers;
mod error;
mod event;
mod handlers;
mod job;
mod launcher;
mod monitor;
mod registry;
mod state;
mod task;
mod worker;

use std::sync::Arc;

use anyhow::{ensure, Context as _};
use common::{JobId, JobStatus};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::allocator::LocalAllocator;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::dispatcher::AsyncDispatcher;
use crate::dispatchers::{JobEventDispatcher, TaskEventDispatcher, WorkerEventDispatcher};
use crate::event::{EventCategory, TaskEvent, TaskEventType};
use crate::job::Job;
use crate::launcher::LocalLauncher;
use crate::registry::InMemoryRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,axum=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "master para {} ({} x {}, engine {:?}, imagen local: {})",
        config.attempt,
        config.instances,
        config.task.resource,
        config.task.engine,
        config.task.use_local_image
    );

    let registry = Arc::new(InMemoryRegistry::default());
    let mut dispatcher = AsyncDispatcher::new();
    let events = dispatcher.sender();

    let job = Job::new(
        JobId::new(config.attempt),
        config.job_name.clone(),
        vec![config.task.clone(); config.instances],
        registry.clone(),
        events.clone(),
    );
    let (ctx, reports) = AppContext::new(job, events.clone());

    dispatcher.register(EventCategory::Job, Box::new(JobEventDispatcher));
    dispatcher.register(EventCategory::Task, Box::new(TaskEventDispatcher));
    dispatcher.register(EventCategory::Worker, Box::new(WorkerEventDispatcher));
    dispatcher.register(
        EventCategory::Allocator,
        Box::new(LocalAllocator::new(config.attempt, config.base_port, events.clone())),
    );
    dispatcher.register(
        EventCategory::Launcher,
        Box::new(LocalLauncher::new(events.clone())),
    );

    // una TASK_SCHEDULE por tarea arranca todo
    for task in ctx.job().tasks() {
        ctx.event_sender()
            .submit(TaskEvent::new(*task.id(), TaskEventType::Schedule));
    }

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let consumer = tokio::spawn(dispatcher.run(ctx, async move {
        let _ = stop_rx.await;
    }));

    // router HTTP
    let app = handlers::build_router(AppState::new(reports.clone(), events, registry));
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind))?;
    info!("master escuchando en {}", listener.local_addr()?);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let report = monitor::wait_for_job(reports).await;
    let _ = stop_tx.send(());
    let ctx = consumer.await.context("el dispatcher de eventos terminó con pánico")?;
    server.abort();

    let job = ctx.job();
    info!(
        "job {} terminó {} ({} ok, {} fallidas, {} matadas de {})",
        job.id(),
        report.status,
        report.completed_tasks,
        report.failed_tasks,
        report.killed_tasks,
        report.total_tasks
    );

    ensure!(
        report.status == JobStatus::Succeeded,
        "job {} terminó {}",
        report.id,
        report.status
    );
    Ok(())
}
