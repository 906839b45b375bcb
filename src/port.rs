//! Port availability probe used to guard against starting a second backend
//! on a port that is already bound.

use std::net::{Ipv4Addr, TcpListener};

pub trait PortProbe: Send + Sync {
    /// Whether nothing on the host is currently listening on `port`.
    fn is_available(&self, port: u16) -> bool;
}

/// Binds a throwaway listener on the port and releases it immediately.
///
/// The result is only a snapshot: another process may grab the port between
/// this check and the backend binding it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn is_available(&self, port: u16) -> bool {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                trace!("port {port} bind probe failed: {e}");
                false
            }
        }
    }
}

/// Best-effort description of whoever holds `port`, for log messages.
pub fn port_owner(port: u16) -> Option<String> {
    match listeners::get_all() {
        Ok(all) => all
            .into_iter()
            .find(|l| l.socket.port() == port)
            .map(|l| format!("{} (pid {})", l.process.name, l.process.pid)),
        Err(e) => {
            trace!("could not list listeners: {e}");
            None
        }
    }
}
