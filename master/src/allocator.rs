//! Allocator local: entrega contenedores sobre el nodo actual, acotados por
//! la CPU y la memoria reales de la máquina.

use std::collections::HashMap;

use common::{ApplicationAttemptId, Container, ContainerId, Resource, TaskId};
use sysinfo::{System, SystemExt};
use tracing::{debug, info, warn};

use crate::dispatcher::EventHandler;
use crate::error::DispatchError;
use crate::event::{AllocatorEvent, Event, EventCategory, EventSender, TaskEvent, TaskEventType};

pub struct LocalAllocator {
    attempt: ApplicationAttemptId,
    node_host: String,
    base_port: u16,
    capacity: Resource,
    in_use: HashMap<ContainerId, Resource>,
    next_seq: u64,
    events: EventSender,
}

/// Capacidad del nodo según sysinfo.
fn node_capacity() -> Resource {
    let mut sys = System::new();
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpus = sys.cpus().len().max(1) as f64;
    // total_memory viene en bytes
    let memory_mb = sys.total_memory() / (1024 * 1024);
    Resource::new(cpus, memory_mb)
}

fn node_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

impl LocalAllocator {
    pub fn new(attempt: ApplicationAttemptId, base_port: u16, events: EventSender) -> Self {
        let capacity = node_capacity();
        let host = node_host();
        info!("allocator local en {} con capacidad {}", host, capacity);
        Self::with_capacity(attempt, host, base_port, capacity, events)
    }

    pub fn with_capacity(
        attempt: ApplicationAttemptId,
        node_host: impl Into<String>,
        base_port: u16,
        capacity: Resource,
        events: EventSender,
    ) -> Self {
        Self {
            attempt,
            node_host: node_host.into(),
            base_port,
            capacity,
            in_use: HashMap::new(),
            next_seq: 1,
            events,
        }
    }

    fn used(&self) -> Resource {
        self.in_use
            .values()
            .fold(Resource::new(0.0, 0), |acc, r| {
                Resource::new(acc.cpus + r.cpus, acc.memory_mb + r.memory_mb)
            })
    }

    fn fits(&self, wanted: &Resource) -> bool {
        let used = self.used();
        used.cpus + wanted.cpus <= self.capacity.cpus
            && used.memory_mb + wanted.memory_mb <= self.capacity.memory_mb
    }

    fn allocate(&mut self, task_id: TaskId, resource: Resource, priority: u32) {
        if !self.fits(&resource) {
            let reason = format!(
                "sin recursos para {}: pedido {}, en uso {} de {}",
                task_id,
                resource,
                self.used(),
                self.capacity
            );
            warn!("{}", reason);
            self.events
                .submit(TaskEvent::new(task_id, TaskEventType::Error).with_diagnostic(reason));
            return;
        }

        let seq = self.next_seq;
        let node_port = match u16::try_from(seq)
            .ok()
            .and_then(|offset| self.base_port.checked_add(offset))
        {
            Some(port) => port,
            None => {
                let reason = format!(
                    "sin puertos para {}: base {} + contenedor {} se sale de rango",
                    task_id, self.base_port, seq
                );
                warn!("{}", reason);
                self.events
                    .submit(TaskEvent::new(task_id, TaskEventType::Error).with_diagnostic(reason));
                return;
            }
        };
        self.next_seq += 1;

        let container = Container {
            id: ContainerId::new(&self.attempt, seq),
            node_host: self.node_host.clone(),
            node_port,
            resource,
        };
        info!(
            "asignando {} a {} (prioridad {}) en {}:{}",
            container.id, task_id, priority, container.node_host, container.node_port
        );

        self.in_use.insert(container.id.clone(), resource);
        self.events
            .submit(TaskEvent::new(task_id, TaskEventType::Setup).with_container(container));
    }

    fn release(&mut self, task_id: TaskId, container_id: ContainerId) {
        match self.in_use.remove(&container_id) {
            Some(resource) => debug!("liberado {} ({}) de {}", container_id, resource, task_id),
            None => warn!("release de {} desconocido ({})", container_id, task_id),
        }
    }
}

impl<C> EventHandler<C> for LocalAllocator {
    fn handle(&mut self, _ctx: &mut C, event: Event) -> Result<(), DispatchError> {
        match event {
            Event::Allocator(AllocatorEvent::Request {
                task_id,
                resource,
                priority,
            }) => self.allocate(task_id, resource, priority),
            Event::Allocator(AllocatorEvent::Release {
                task_id,
                container_id,
            }) => self.release(task_id, container_id),
            other => {
                return Err(DispatchError::UnexpectedCategory {
                    expected: EventCategory::Allocator,
                    got: other.category(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::JobId;
    use tokio::sync::mpsc;

    struct NoCtx;

    fn allocator(capacity: Resource) -> (LocalAllocator, mpsc::UnboundedReceiver<Event>) {
        allocator_on_port(capacity, 9000)
    }

    fn allocator_on_port(
        capacity: Resource,
        base_port: u16,
    ) -> (LocalAllocator, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempt = ApplicationAttemptId::new(1465186316357, 1, 1);
        let alloc = LocalAllocator::with_capacity(
            attempt,
            "node-a",
            base_port,
            capacity,
            EventSender::new(tx),
        );
        (alloc, rx)
    }

    fn request(n: u32, resource: Resource) -> Event {
        let job = JobId::new(ApplicationAttemptId::new(1465186316357, 1, 1));
        AllocatorEvent::Request {
            task_id: TaskId::new(job, n),
            resource,
            priority: 0,
        }
        .into()
    }

    fn next_task_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> TaskEvent {
        match rx.try_recv() {
            Ok(Event::Task(e)) => e,
            other => panic!("se esperaba un TaskEvent, llegó {other:?}"),
        }
    }

    #[test]
    fn request_contesta_setup_con_contenedor() {
        let (mut alloc, mut rx) = allocator(Resource::new(4.0, 1024));
        alloc.handle(&mut NoCtx, request(0, Resource::new(1.0, 256))).unwrap();

        let e = next_task_event(&mut rx);
        assert_eq!(e.event_type(), TaskEventType::Setup);
        let container = e.container().unwrap();
        assert_eq!(container.id.as_str(), "container_1465186316357_0001_01_000001");
        assert_eq!(container.node_host, "node-a");
        assert_eq!(container.node_port, 9001);
        assert_eq!(container.resource, Resource::new(1.0, 256));
    }

    #[test]
    fn sin_capacidad_contesta_error() {
        let (mut alloc, mut rx) = allocator(Resource::new(2.0, 512));
        alloc.handle(&mut NoCtx, request(0, Resource::new(2.0, 256))).unwrap();
        assert_eq!(next_task_event(&mut rx).event_type(), TaskEventType::Setup);

        alloc.handle(&mut NoCtx, request(1, Resource::new(1.0, 128))).unwrap();
        let e = next_task_event(&mut rx);
        assert_eq!(e.event_type(), TaskEventType::Error);
        assert!(e.diagnostic().unwrap().contains("sin recursos"));
    }

    #[test]
    fn release_libera_capacidad() {
        let (mut alloc, mut rx) = allocator(Resource::new(1.0, 512));
        alloc.handle(&mut NoCtx, request(0, Resource::new(1.0, 256))).unwrap();
        let first = next_task_event(&mut rx);
        let container_id = first.container().unwrap().id.clone();

        alloc
            .handle(
                &mut NoCtx,
                AllocatorEvent::Release {
                    task_id: *first.task_id(),
                    container_id,
                }
                .into(),
            )
            .unwrap();

        alloc.handle(&mut NoCtx, request(1, Resource::new(1.0, 256))).unwrap();
        let second = next_task_event(&mut rx);
        assert_eq!(second.event_type(), TaskEventType::Setup);
        assert_eq!(second.container().unwrap().node_port, 9002);
    }

    #[test]
    fn puerto_fuera_de_rango_contesta_error_sin_reservar() {
        let (mut alloc, mut rx) = allocator_on_port(Resource::new(4.0, 1024), u16::MAX - 1);
        alloc.handle(&mut NoCtx, request(0, Resource::new(1.0, 128))).unwrap();
        assert_eq!(next_task_event(&mut rx).container().unwrap().node_port, u16::MAX);

        alloc.handle(&mut NoCtx, request(1, Resource::new(1.0, 128))).unwrap();
        let e = next_task_event(&mut rx);
        assert_eq!(e.event_type(), TaskEventType::Error);
        assert!(e.diagnostic().unwrap().contains("sin puertos"));
        assert_eq!(alloc.used(), Resource::new(1.0, 128));
    }

    #[test]
    fn capacidad_del_nodo_no_es_vacia() {
        let capacity = node_capacity();
        assert!(capacity.cpus >= 1.0);
    }
}
