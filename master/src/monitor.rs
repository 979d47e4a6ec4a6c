use common::JobReport;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Espera a que el job llegue a estado terminal y devuelve el reporte final.
/// Mientras tanto loguea el avance cada tanto.
pub async fn wait_for_job(mut reports: watch::Receiver<JobReport>) -> JobReport {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;

    loop {
        {
            let report = reports.borrow_and_update();
            if report.status.is_terminal() {
                return report.clone();
            }
        }

        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    // el dispatcher se fue: lo último publicado es lo que hay
                    return reports.borrow().clone();
                }
            }
            _ = ticker.tick() => {
                let report = reports.borrow();
                info!(
                    "job {}: {}/{} tareas terminadas (ok={}, fallidas={}, matadas={})",
                    report.id,
                    report.finished_tasks(),
                    report.total_tasks,
                    report.completed_tasks,
                    report.failed_tasks,
                    report.killed_tasks
                );
            }
        }
    }
}
