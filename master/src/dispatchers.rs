//! Dispatchers por categoría: resuelven la entidad destino dentro del
//! contexto (job -> task -> worker) y le pasan el evento.

use crate::context::AppContext;
use crate::dispatcher::{EventHandler, Handle};
use crate::error::DispatchError;
use crate::event::{Event, EventCategory};

fn unexpected(expected: EventCategory, event: &Event) -> DispatchError {
    DispatchError::UnexpectedCategory {
        expected,
        got: event.category(),
    }
}

pub struct JobEventDispatcher;

impl EventHandler<AppContext> for JobEventDispatcher {
    fn handle(&mut self, ctx: &mut AppContext, event: Event) -> Result<(), DispatchError> {
        let event = match event {
            Event::Job(event) => event,
            other => return Err(unexpected(EventCategory::Job, &other)),
        };

        let job = ctx.job_for(event.job_id())?;
        job.handle(event)?;
        Ok(())
    }
}

pub struct TaskEventDispatcher;

impl EventHandler<AppContext> for TaskEventDispatcher {
    fn handle(&mut self, ctx: &mut AppContext, event: Event) -> Result<(), DispatchError> {
        let event = match event {
            Event::Task(event) => event,
            other => return Err(unexpected(EventCategory::Task, &other)),
        };

        let task_id = *event.task_id();
        let task = ctx
            .job_for(task_id.job_id())?
            .task_mut(&task_id)
            .ok_or(DispatchError::TaskNotFound(task_id))?;
        task.handle(event)?;
        Ok(())
    }
}

pub struct WorkerEventDispatcher;

impl EventHandler<AppContext> for WorkerEventDispatcher {
    fn handle(&mut self, ctx: &mut AppContext, event: Event) -> Result<(), DispatchError> {
        let event = match event {
            Event::Worker(event) => event,
            other => return Err(unexpected(EventCategory::Worker, &other)),
        };

        let worker_id = *event.worker_id();
        let task_id = worker_id.task_id();
        let worker = ctx
            .job_for(task_id.job_id())?
            .task_mut(task_id)
            .ok_or(DispatchError::TaskNotFound(*task_id))?
            .worker_mut(&worker_id)
            .ok_or(DispatchError::WorkerNotFound(worker_id))?;
        worker.handle(event)?;
        Ok(())
    }
}
