pub mod routes;
mod server;

pub use server::{router, serve};

use crate::scheduler::Scheduler;
use crate::settings::ScheduleSettings;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub limits: ScheduleSettings,
}
