use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{
    ContainerRecord, JobReport, SubmitResponse, TaskId, TaskReport, WorkerId, WorkerStatus,
    WorkerStatusRequest,
};
use reqwest::{Client, Response, StatusCode};
use std::env;

/// Igual que en los contenedores:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estado del job y de cada tarea
    Status,
    /// Detalle de una tarea
    Task {
        #[arg(value_name = "TASK_ID")]
        id: TaskId,
    },
    /// Mata una tarea
    Kill {
        #[arg(value_name = "TASK_ID")]
        id: TaskId,
    },
    /// Mata el job entero
    KillJob,
    /// Reporta el estado de un worker (running, completed, failed)
    WorkerStatus {
        #[arg(value_name = "WORKER_ID")]
        id: WorkerId,

        #[arg(value_name = "ESTADO")]
        status: WorkerStatus,

        #[arg(long)]
        message: Option<String>,
    },
    /// Contenedores publicados en el registry
    Registry,
}

fn print_task(task: &TaskReport) {
    println!("Tarea {}", task.id);
    println!("  estado    : {}", task.state);
    println!("  intentos  : {}", task.attempts);
    match &task.container {
        Some(c) => println!(
            "  contenedor: {} en {}:{} {}",
            c.id, c.node_host, c.node_port, c.resource
        ),
        None => println!("  contenedor: (sin asignar)"),
    }
    if let Some(w) = &task.worker {
        println!("  worker    : {} ({:?}, {})", w.id, w.mode, w.state);
        if let Some(msg) = &w.message {
            println!("    mensaje : {}", msg);
        }
    }
    for d in &task.diagnostics {
        println!("  error     : {}", d);
    }
}

/// 202 -> muestra el evento encolado; cualquier otra cosa es error.
async fn print_submit(resp: Response, what: &str) -> Result<()> {
    match resp.status() {
        StatusCode::ACCEPTED => {
            let body: SubmitResponse = resp.json().await?;
            println!("Encolado: {}", body.event);
            Ok(())
        }
        StatusCode::NOT_FOUND => bail!("{what}: no existe"),
        StatusCode::CONFLICT => bail!("{what}: el job ya terminó"),
        other => bail!("{what}: el master contestó {other}"),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Status => {
            let url = format!("{}/api/v1/job", base_url);
            let job: JobReport = client.get(&url).send().await?.error_for_status()?.json().await?;

            println!("Job {}", job.id);
            println!("  nombre: {}", job.name);
            println!("  estado: {}", job.status);
            println!(
                "  tareas: total={}, completadas={}, fallidas={}, matadas={}",
                job.total_tasks, job.completed_tasks, job.failed_tasks, job.killed_tasks
            );

            // progreso calculado localmente
            if job.total_tasks > 0 {
                let pct = (job.finished_tasks() as f64 / job.total_tasks as f64) * 100.0;
                println!("  progreso: {:.1}%", pct);
            } else {
                println!("  progreso: (sin tareas)");
            }
            println!("  iniciado: {}", job.started_at);
            if let Some(done) = job.finished_at {
                println!("  finalizado: {}", done);
            }

            for task in &job.tasks {
                println!(
                    "  - {} {} (intentos={})",
                    task.id, task.state, task.attempts
                );
            }
        }

        Commands::Task { id } => {
            let url = format!("{}/api/v1/tasks/{id}", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let task: TaskReport = resp.json().await?;
                print_task(&task);
            } else {
                println!("No se encontró la tarea {id} (status {})", resp.status());
            }
        }

        Commands::Kill { id } => {
            let url = format!("{}/api/v1/tasks/{id}/kill", base_url);
            let resp = client.post(&url).send().await?;
            print_submit(resp, &format!("kill de {id}")).await?;
        }

        Commands::KillJob => {
            let url = format!("{}/api/v1/job/kill", base_url);
            let resp = client.post(&url).send().await?;
            print_submit(resp, "kill del job").await?;
        }

        Commands::WorkerStatus {
            id,
            status,
            message,
        } => {
            let url = format!("{}/api/v1/workers/{id}/status", base_url);
            let resp = client
                .post(&url)
                .json(&WorkerStatusRequest { status, message })
                .send()
                .await?;
            print_submit(resp, &format!("estado de {id}")).await?;
        }

        Commands::Registry => {
            let url = format!("{}/api/v1/registry", base_url);
            let records: Vec<ContainerRecord> =
                client.get(&url).send().await?.error_for_status()?.json().await?;
            if records.is_empty() {
                println!("No hay contenedores registrados.");
            } else {
                for r in records {
                    println!("{} -> {}:{}", r.key, r.host, r.port);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_es_valida() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parsea_worker_status() {
        let cli = Cli::try_parse_from([
            "client",
            "worker-status",
            "worker_1465186316357_0001_000001_000000_000001",
            "failed",
            "--message",
            "oom",
        ])
        .unwrap();

        match cli.command {
            Commands::WorkerStatus {
                id,
                status,
                message,
            } => {
                assert_eq!(id.id(), 1);
                assert_eq!(status, WorkerStatus::Failed);
                assert_eq!(message.as_deref(), Some("oom"));
            }
            _ => panic!("subcomando equivocado"),
        }
    }

    #[test]
    fn task_id_invalido_no_parsea() {
        assert!(Cli::try_parse_from(["client", "task", "basura"]).is_err());
        assert!(Cli::try_parse_from(["client", "kill-job"]).is_ok());
    }
}
