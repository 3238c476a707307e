//! Scenario builder API.
//!
//! Declares a deployment (users, locks, group grants) and brings it up the
//! way a real rollout does: every user registers a device key, the first
//! admin claims each lock and pushes its first ACL. The oracle then checks
//! the resulting world.

use keyway_core::LockConfig;
use keyway_server::WorkspaceRole;
use tracing::debug;

use crate::scenario::{OracleFn, World};

/// Seed used unless the scenario sets one.
pub const DEFAULT_SEED: u64 = 0x6b65_7977_6179;

struct LockSpec {
    lock_id: u32,
    claim_code: String,
    config: LockConfig,
    claimed: bool,
}

/// Scenario builder.
///
/// Must call `.oracle()` to get a [`RunnableScenario`].
pub struct Scenario {
    name: String,
    seed: u64,
    workspace_id: String,
    users: Vec<(String, Option<WorkspaceRole>)>,
    locks: Vec<LockSpec>,
    grants: Vec<(u32, Vec<String>)>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: DEFAULT_SEED,
            workspace_id: "acme".to_owned(),
            users: Vec::new(),
            locks: Vec::new(),
            grants: Vec::new(),
        }
    }

    /// Replay a different seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Workspace every actor joins.
    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    /// Add a workspace admin. The first admin claims every lock.
    pub fn admin(mut self, name: impl Into<String>) -> Self {
        self.users.push((name.into(), Some(WorkspaceRole::Admin)));
        self
    }

    /// Add a workspace member.
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.users.push((name.into(), Some(WorkspaceRole::Member)));
        self
    }

    /// Add a user with no role in the workspace.
    pub fn outsider(mut self, name: impl Into<String>) -> Self {
        self.users.push((name.into(), None));
        self
    }

    /// Add a lock that the first admin claims during setup.
    pub fn lock(self, lock_id: u32, claim_code: impl Into<String>) -> Self {
        self.lock_with_config(lock_id, claim_code, LockConfig::default())
    }

    /// Add a claimed lock with custom configuration.
    pub fn lock_with_config(
        mut self,
        lock_id: u32,
        claim_code: impl Into<String>,
        config: LockConfig,
    ) -> Self {
        let claim_code = claim_code.into();
        self.locks.push(LockSpec { lock_id, claim_code, config, claimed: true });
        self
    }

    /// Add a lock that stays factory-fresh.
    pub fn unclaimed_lock(mut self, lock_id: u32, claim_code: impl Into<String>) -> Self {
        let claim_code = claim_code.into();
        self.locks.push(LockSpec {
            lock_id,
            claim_code,
            config: LockConfig::default(),
            claimed: false,
        });
        self
    }

    /// Grant `members` access to `lock_id`. Setup rebuilds and pushes the
    /// lock's ACL once all grants are recorded.
    pub fn grant(mut self, lock_id: u32, members: &[&str]) -> Self {
        self.grants.push((lock_id, members.iter().map(|m| (*m).to_owned()).collect()));
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Bring the deployment up, then run the oracle.
    ///
    /// 1. Every user registers a device key
    /// 2. The first admin claims each claimed lock with its printed payload
    /// 3. Each granted lock gets one group, one rebuild and one push
    ///
    /// Returns the world so tests can keep driving it.
    pub async fn run(self) -> Result<World, String> {
        let Self { scenario, oracle } = self;
        let name = scenario.name;
        let fail = |step: &str, err: &dyn std::fmt::Display| format!("{name}: {step}: {err}");

        let mut world = World::new(scenario.seed, &scenario.workspace_id)?;
        for lock in &scenario.locks {
            world.add_lock(lock.lock_id, &lock.claim_code, lock.config.clone());
        }
        for (user, role) in &scenario.users {
            world.add_user(user, *role)?;
            world.register(user).await.map_err(|e| fail(&format!("register {user}"), &e))?;
        }

        let admin = scenario
            .users
            .iter()
            .find(|(_, role)| *role == Some(WorkspaceRole::Admin))
            .map(|(user, _)| user.clone());

        for lock in scenario.locks.iter().filter(|lock| lock.claimed) {
            let admin = admin.as_deref().ok_or_else(|| format!("{name}: no admin to claim"))?;
            world
                .claim(admin, lock.lock_id)
                .await
                .map_err(|e| fail(&format!("claim {}", lock.lock_id), &e))?;
        }

        for (lock_id, members) in &scenario.grants {
            let admin = admin.as_deref().ok_or_else(|| format!("{name}: no admin to rebuild"))?;
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            world.grant(&format!("lock-{lock_id}"), &[*lock_id], &members)?;
            world.rebuild(admin, *lock_id).map_err(|e| fail(&format!("rebuild {lock_id}"), &e))?;
            world.sync(admin, *lock_id).await.map_err(|e| fail(&format!("sync {lock_id}"), &e))?;
        }
        debug!(scenario = %name, "setup complete");

        oracle(&world).map_err(|e| format!("{name}: oracle: {e}"))?;
        Ok(world)
    }
}
