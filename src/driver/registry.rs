use crate::driver::config::Config;
use crate::driver::error::Error;
use crate::driver::process::{LaunchSpec, Mode};
use crate::driver::session::{DebugSession, SessionInfo};
use crate::mux_info;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of all debug sessions.
///
/// Session ids are `session_N` with a counter that never goes back, so an id is
/// never given to two sessions. Ids of stopped sessions are remembered to make
/// [`SessionRegistry::stop`] idempotent.
pub struct SessionRegistry {
    config: Config,
    counter: AtomicU64,
    sessions: Mutex<HashMap<String, Arc<DebugSession>>>,
    retired: Mutex<HashSet<String>>,
}

impl SessionRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            counter: AtomicU64::new(0),
            sessions: Mutex::default(),
            retired: Mutex::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn next_id(&self) -> String {
        format!("session_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Start a new session for a target using configured interpreter, working
    /// directory and environment.
    pub fn start(
        &self,
        target: &str,
        mode: Mode,
        args: Vec<String>,
    ) -> Result<Arc<DebugSession>, Error> {
        let spec = self.config.launch_spec(target, mode, args);
        self.start_with(spec, 0)
    }

    /// Start a new session from an explicit launch specification.
    pub fn start_with(
        &self,
        spec: LaunchSpec,
        breakpoint_base: u32,
    ) -> Result<Arc<DebugSession>, Error> {
        let id = self.next_id();
        let session = Arc::new(DebugSession::start(
            id.clone(),
            spec,
            self.config.timeouts(),
            breakpoint_base,
        )?);
        lock(&self.sessions).insert(id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Arc<DebugSession>, Error> {
        lock(&self.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Stop a session and forget it. Stopping an already stopped session is not an error.
    pub fn stop(&self, id: &str) -> Result<(), Error> {
        let removed = lock(&self.sessions).remove(id);
        match removed {
            Some(session) => {
                lock(&self.retired).insert(id.to_string());
                session.stop();
                mux_info!(target: "driver", "session {id} stopped");
                Ok(())
            }
            None if lock(&self.retired).contains(id) => Ok(()),
            None => Err(Error::SessionNotFound(id.to_string())),
        }
    }

    /// Stop a session and start the same program in a new session with a new id.
    /// Breakpoints are not carried over, ids of the new session breakpoints continue
    /// after the old ones.
    pub fn restart(&self, id: &str) -> Result<Arc<DebugSession>, Error> {
        let old = self.get(id)?;
        self.stop(id)?;
        let breakpoint_base = old.next_breakpoint_base();
        let spec = old.spec().clone();
        drop(old);

        let session = self.start_with(spec, breakpoint_base)?;
        mux_info!(target: "driver", "session {id} restarted as {}", session.id());
        Ok(session)
    }

    /// Snapshots of live sessions ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<_> = lock(&self.sessions).values().cloned().collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    /// Stop all sessions.
    pub fn shutdown(&self) {
        let ids: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        for id in ids {
            _ = self.stop(&id);
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown()
    }
}
