use event_warden::Result;
use event_warden::scheduler::{Collaborators, Scheduler};
use event_warden::settings::{Settings, format_duration};
use event_warden::web::{self, AppState};
use miette::IntoDiagnostic;
use std::net::{IpAddr, SocketAddr};

/// Runs the scheduler and accepts schedule requests over HTTP
#[derive(Debug, clap::Args)]
#[clap(
    verbatim_doc_comment,
    long_about = "\
Runs the scheduler and accepts schedule requests over HTTP

Endpoints:
  POST   /jobs            {\"eventId\", \"startTime\", \"endTime\"} (RFC 3339)
  GET    /jobs            list registered jobs
  DELETE /jobs/<eventId>  stop a job now
  GET    /health

Scheduled jobs live in memory only. On exit, pending jobs are forgotten and
running backends are left running.

Examples:
  warden serve                  Listen on the configured address
  warden serve --port 9000      Override the listen port"
)]
pub struct Serve {
    /// Port to listen on (default: [web].port)
    #[clap(long, short)]
    port: Option<u16>,
    /// Address to bind (default: [web].bind)
    #[clap(long)]
    bind: Option<IpAddr>,
}

impl Serve {
    pub async fn run(&self) -> Result<()> {
        let settings = Settings::load()?;
        let collaborators = Collaborators::from_settings(&settings)?;
        let bind = match self.bind {
            Some(bind) => bind,
            None => settings.web.bind.parse().into_diagnostic()?,
        };
        let addr = SocketAddr::new(bind, self.port.unwrap_or(settings.web.port));

        info!(
            "backend port {}, timezone {}, lead time {}",
            settings.backend.port,
            settings.schedule.timezone,
            format_duration(settings.schedule.lead_time)
        );
        let (scheduler, registry) = Scheduler::spawn((&settings).into(), collaborators);
        let state = AppState {
            scheduler: scheduler.clone(),
            limits: settings.schedule.clone(),
        };
        web::serve(addr, state, super::shutdown_signal()).await?;

        let jobs = scheduler.jobs().await?;
        let running = jobs.iter().filter(|j| j.pid.is_some()).count();
        if running > 0 {
            warn!("{running} backend(s) keep running and are no longer managed");
        }
        if jobs.len() > running {
            warn!("{} pending job(s) forgotten", jobs.len() - running);
        }
        drop(scheduler);
        registry.await.into_diagnostic()?;
        Ok(())
    }
}
