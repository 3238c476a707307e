//! In-memory radio connecting clients to simulated locks.
//!
//! Each [`SimLock`] wraps a real [`Lock`] state machine and executes its
//! actions: notifications are queued per characteristic for the current
//! link, releases and access decisions are recorded for oracles, and a
//! disconnect ends the link. A link is only valid for the connection
//! generation it was opened on, so a stale link from an earlier connection
//! can never read or write the current one.
//!
//! Faults are injected per lock through [`Faults`].

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use keyway_core::{
    AuthOutcome, Environment, Lock, LockAction, LockConfig, LockIdentity, Radio, RadioLink,
    TransportError,
};
use keyway_proto::Characteristic;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::sim_env::SimEnv;

/// Default usable write size (BLE 4.0 ATT MTU minus header).
pub const DEFAULT_MTU: usize = 20;

/// Faults injected on one lock's radio.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Refuse this many upcoming connection attempts
    pub fail_connects: u32,
    /// Notifications on these characteristics are never delivered
    pub muted: Vec<Characteristic>,
    /// Drop the link instead of delivering the write after this many writes
    /// on one connection
    pub drop_after_writes: Option<u32>,
}

#[derive(Debug)]
struct LockState {
    lock: Lock,
    generation: u64,
    connected: bool,
    inbox: HashMap<Characteristic, VecDeque<Vec<u8>>>,
    writes: u32,
    connects: u32,
    releases: Vec<Duration>,
    decisions: Vec<AuthOutcome>,
    faults: Faults,
}

impl LockState {
    fn apply(&mut self, actions: Vec<LockAction>) {
        for action in actions {
            match action {
                LockAction::Notify { characteristic, value } => {
                    if self.faults.muted.contains(&characteristic) {
                        trace!(?characteristic, "notification muted");
                    } else if self.connected {
                        self.inbox.entry(characteristic).or_default().push_back(value);
                    }
                },
                LockAction::Release { window } => self.releases.push(window),
                LockAction::Disconnect { reason } => {
                    debug!(lock_id = self.lock.lock_id(), %reason, "lock dropped link");
                    self.connected = false;
                },
                LockAction::AccessDecision(outcome) => self.decisions.push(outcome),
            }
        }
    }

    fn drop_link(&mut self) {
        if self.connected {
            self.connected = false;
            self.lock.on_disconnect();
        }
    }
}

/// A lock on the simulated radio.
pub struct SimLock {
    state: Mutex<LockState>,
    changed: Notify,
    env: SimEnv,
}

impl SimLock {
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock identifier
    pub fn lock_id(&self) -> u32 {
        self.state().lock.lock_id()
    }

    /// Snapshot of the lock state machine.
    pub fn snapshot(&self) -> Lock {
        self.state().lock.clone()
    }

    /// Current ACL version
    pub fn acl_version(&self) -> u32 {
        self.state().lock.acl_version()
    }

    /// True once claimed
    pub fn is_owned(&self) -> bool {
        self.state().lock.is_owned()
    }

    /// True while a client link is up
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Every access decision so far, oldest first.
    pub fn decisions(&self) -> Vec<AuthOutcome> {
        self.state().decisions.clone()
    }

    /// Every latch release so far.
    pub fn releases(&self) -> Vec<Duration> {
        self.state().releases.clone()
    }

    /// Connections accepted so far.
    pub fn connects(&self) -> u32 {
        self.state().connects
    }

    /// Replace the injected faults.
    pub fn set_faults(&self, faults: Faults) {
        self.state().faults = faults;
    }

    /// Run the lock's timeout check at the current virtual time.
    pub fn tick(&self) {
        let mut state = self.state();
        let actions = state.lock.tick(self.env.now());
        if !actions.is_empty() {
            state.apply(actions);
            drop(state);
            self.changed.notify_waiters();
        }
    }
}

impl std::fmt::Debug for SimLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimLock").field("state", &*self.state()).finish_non_exhaustive()
    }
}

/// Simulated radio reaching every lock added to it.
#[derive(Clone)]
pub struct SimRadio {
    locks: Arc<Mutex<HashMap<u32, Arc<SimLock>>>>,
    env: SimEnv,
    mtu: usize,
}

impl SimRadio {
    /// Radio with the default MTU.
    pub fn new(env: SimEnv) -> Self {
        Self::with_mtu(env, DEFAULT_MTU)
    }

    /// Radio whose links carry at most `mtu` bytes per write.
    pub fn with_mtu(env: SimEnv, mtu: usize) -> Self {
        Self { locks: Arc::new(Mutex::new(HashMap::new())), env, mtu }
    }

    /// Put a factory-fresh lock in range.
    pub fn add_lock(&self, identity: LockIdentity, config: LockConfig) -> Arc<SimLock> {
        let lock_id = identity.lock_id;
        let sim = Arc::new(SimLock {
            state: Mutex::new(LockState {
                lock: Lock::new(identity, config),
                generation: 0,
                connected: false,
                inbox: HashMap::new(),
                writes: 0,
                connects: 0,
                releases: Vec::new(),
                decisions: Vec::new(),
                faults: Faults::default(),
            }),
            changed: Notify::new(),
            env: self.env.clone(),
        });
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).insert(lock_id, sim.clone());
        sim
    }

    /// Lock in range with this id.
    pub fn lock(&self, lock_id: u32) -> Option<Arc<SimLock>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).get(&lock_id).cloned()
    }

    /// Tick every lock in range.
    pub fn tick_all(&self) {
        let locks: Vec<_> =
            self.locks.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
        for lock in locks {
            lock.tick();
        }
    }
}

impl std::fmt::Debug for SimRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRadio").field("mtu", &self.mtu).finish_non_exhaustive()
    }
}

#[async_trait]
impl Radio for SimRadio {
    type Link = SimLink;

    async fn connect(&self, lock_id: u32) -> Result<SimLink, TransportError> {
        let sim = self
            .lock(lock_id)
            .ok_or_else(|| TransportError::ConnectFailed(format!("lock {lock_id} not in range")))?;

        let generation = {
            let mut state = sim.state();
            if state.faults.fail_connects > 0 {
                state.faults.fail_connects -= 1;
                return Err(TransportError::ConnectFailed("simulated connect failure".into()));
            }
            state.generation += 1;
            state.connected = true;
            state.inbox.clear();
            state.writes = 0;
            state.connects += 1;
            let actions = state.lock.on_connect(&sim.env);
            state.apply(actions);
            state.generation
        };
        sim.changed.notify_waiters();
        debug!(lock_id, generation, "link up");

        Ok(SimLink { lock: Some(sim), generation, mtu: self.mtu })
    }
}

/// One simulated connection.
pub struct SimLink {
    lock: Option<Arc<SimLock>>,
    generation: u64,
    mtu: usize,
}

impl SimLink {
    fn close(&mut self) {
        let Some(sim) = self.lock.take() else {
            return;
        };
        {
            let mut state = sim.state();
            if state.generation == self.generation {
                state.drop_link();
            }
        }
        sim.changed.notify_waiters();
    }
}

impl Drop for SimLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl RadioLink for SimLink {
    fn mtu(&self) -> usize {
        self.mtu
    }

    async fn write(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let sim = self.lock.as_ref().ok_or(TransportError::Disconnected)?;
        if value.len() > self.mtu {
            return Err(TransportError::Io(format!(
                "write of {} bytes exceeds mtu {}",
                value.len(),
                self.mtu
            )));
        }

        {
            let mut state = sim.state();
            if state.generation != self.generation || !state.connected {
                return Err(TransportError::Disconnected);
            }
            if state.faults.drop_after_writes.is_some_and(|limit| state.writes >= limit) {
                debug!(lock_id = state.lock.lock_id(), "simulated link loss");
                state.drop_link();
                drop(state);
                sim.changed.notify_waiters();
                return Err(TransportError::Disconnected);
            }
            state.writes += 1;
            let actions = state.lock.on_write(characteristic, value, sim.env.now());
            state.apply(actions);
        }
        sim.changed.notify_waiters();
        Ok(())
    }

    async fn next_notification(
        &mut self,
        characteristic: Characteristic,
    ) -> Result<Vec<u8>, TransportError> {
        let sim = self.lock.clone().ok_or(TransportError::Disconnected)?;
        loop {
            let notified = sim.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = sim.state();
                if state.generation != self.generation {
                    return Err(TransportError::Disconnected);
                }
                let queued = state.inbox.get_mut(&characteristic).and_then(VecDeque::pop_front);
                if let Some(value) = queued {
                    return Ok(value);
                }
                if !state.connected {
                    return Err(TransportError::Disconnected);
                }
            }

            notified.await;
        }
    }

    async fn disconnect(&mut self) {
        self.close();
    }
}
