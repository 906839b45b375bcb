#![cfg(unix)]

mod common;

use chrono::Utc;
use common::{minutes, now};
use event_warden::launcher::CommandLauncher;
use event_warden::port::TcpPortProbe;
use event_warden::procs::PROCS;
use event_warden::scheduler::{Collaborators, Scheduler, SchedulerConfig};
use event_warden::terminate::SignalTerminator;
use event_warden::trigger::CalendarTrigger;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

fn real_scheduler(port: u16) -> (Scheduler, tokio::task::JoinHandle<()>) {
    let config = SchedulerConfig {
        backend_port: port,
        ..common::config()
    };
    let collaborators = Collaborators {
        trigger: Arc::new(CalendarTrigger::new(Duration::from_millis(200))),
        probe: Arc::new(TcpPortProbe),
        launcher: Arc::new(CommandLauncher::new("sh -c 'sleep 30; true'").unwrap()),
        terminator: Arc::new(SignalTerminator),
    };
    Scheduler::spawn(config, collaborators)
}

async fn wait_until_gone(pids: &[u32], timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        PROCS.refresh_processes();
        if pids.iter().all(|pid| !PROCS.is_running(*pid)) {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// A window that is already open starts a real backend immediately, and the
/// stop trigger takes down the whole process tree when the window closes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backend_tree_runs_for_window() {
    let (scheduler, registry) = real_scheduler(free_port());
    let end = now() + chrono::Duration::seconds(3);

    scheduler
        .schedule_job("E2E", now() - minutes(1), end)
        .await
        .unwrap();
    let jobs = scheduler.jobs().await.unwrap();
    let pid = jobs[0].pid.expect("backend was not started");

    // give sh a moment to fork sleep
    tokio::time::sleep(Duration::from_millis(500)).await;
    PROCS.refresh_processes();
    assert!(PROCS.is_running(pid));
    assert!(PROCS.title(pid).is_some());
    let mut tree = PROCS.descendants(pid);
    assert!(!tree.is_empty(), "expected sleep under sh");
    tree.push(pid);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while !scheduler.jobs().await.unwrap().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stop trigger never fired"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(Utc::now() >= end);

    assert!(
        wait_until_gone(&tree, Duration::from_secs(10)).await,
        "backend tree still running: {tree:?}"
    );

    drop(scheduler);
    registry.await.unwrap();
}

/// A foreign listener on the backend port keeps the backend from starting.
#[tokio::test]
async fn test_busy_port_blocks_start() {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let (scheduler, _registry) = real_scheduler(port);

    scheduler
        .schedule_job("BUSY", now() - minutes(1), now() + minutes(10))
        .await
        .unwrap();

    let jobs = scheduler.jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].pid, None);

    assert!(scheduler.stop_job("BUSY").await.unwrap());
    drop(listener);
}
