use event_warden::Result;
use event_warden::scheduler::{Collaborators, Scheduler};
use event_warden::settings::Settings;
use event_warden::validate::validate_window;
use miette::IntoDiagnostic;
use std::time::Duration;
use tokio::time;

/// Schedules one event window and waits in the foreground until it closes
#[derive(Debug, clap::Args)]
#[clap(
    verbatim_doc_comment,
    long_about = "\
Schedules one event window and waits in the foreground until it closes

The backend starts shortly before --start (immediately if that is already
past) and is stopped at --end. Times are RFC 3339.

Examples:
  warden run match-42 --start 2026-11-02T18:00:00+02:00 --end 2026-11-02T20:00:00+02:00"
)]
pub struct Run {
    /// Event identifier passed to the backend
    event_id: String,
    /// When the window opens
    #[clap(long)]
    start: String,
    /// When the window closes
    #[clap(long)]
    end: String,
}

impl Run {
    pub async fn run(&self) -> Result<()> {
        let settings = Settings::load()?;
        let window = validate_window(
            &self.event_id,
            &self.start,
            &self.end,
            &settings.schedule,
            chrono::Utc::now(),
        )?;
        let collaborators = Collaborators::from_settings(&settings)?;
        let (scheduler, registry) = Scheduler::spawn((&settings).into(), collaborators);
        scheduler
            .schedule_job(&window.event_id, window.start, window.end)
            .await?;

        let shutdown = super::shutdown_signal();
        tokio::pin!(shutdown);
        let mut interval = time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if scheduler.jobs().await?.is_empty() {
                        info!("event {} finished", window.event_id);
                        break;
                    }
                }
                _ = &mut shutdown => {
                    if let Some(job) = scheduler.jobs().await?.first()
                        && let Some(pid) = job.pid
                    {
                        warn!("leaving backend pid {pid} for event {} running", job.event_id);
                    }
                    break;
                }
            }
        }
        drop(scheduler);
        registry.await.into_diagnostic()?;
        Ok(())
    }
}
