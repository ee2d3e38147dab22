use crate::{MemoryServer, MemorySession, codes};
use sluice_core::{ConnectOptions, Driver, Session, WireError, WireResult};

/// Driver opening sessions with a [`MemoryServer`], the url scheme is `memory`.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    server: MemoryServer,
}

impl MemoryDriver {
    pub fn new(server: &MemoryServer) -> Self {
        Self {
            server: server.clone(),
        }
    }

    pub fn server(&self) -> &MemoryServer {
        &self.server
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(&self, options: &ConnectOptions) -> WireResult<Box<dyn Session>> {
        let host = options.host.as_deref().unwrap_or("localhost");
        let mut state = self.server.lock();
        if state.down {
            return Err(WireError::new(
                codes::CANNOT_CONNECT,
                format!("Can't connect to server on '{}'", host),
            ));
        }
        let refused = state.credentials.as_ref().is_some_and(|(user, password)| {
            options.user.as_ref() != Some(user) || options.password.as_ref() != Some(password)
        });
        if refused {
            return Err(WireError::new(
                codes::ACCESS_DENIED,
                format!(
                    "Access denied for user '{}'@'{}' (using password: {})",
                    options.user.as_deref().unwrap_or_default(),
                    host,
                    if options.password.is_some() { "YES" } else { "NO" }
                ),
            ));
        }
        state.sessions += 1;
        log::debug!("Memory session {} opened for `{}`", state.sessions, host);
        Ok(Box::new(MemorySession::new(
            self.server.clone(),
            state.epoch,
            state.sessions,
        )))
    }
}
