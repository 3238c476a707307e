//! Reusable oracles.

use keyway_core::AuthOutcome;

use crate::scenario::OracleFn;

/// Passes when every oracle passes, reporting the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// Every lock in the world has been claimed.
pub fn all_owned() -> OracleFn {
    Box::new(|world| {
        for lock_id in world.lock_ids() {
            let owned = world.lock(lock_id).is_some_and(|lock| lock.is_owned());
            if !owned {
                return Err(format!("lock {lock_id} is not owned"));
            }
        }
        Ok(())
    })
}

/// `lock_id` runs ACL version `version`.
pub fn acl_version(lock_id: u32, version: u32) -> OracleFn {
    Box::new(move |world| {
        let lock = world.lock(lock_id).ok_or_else(|| format!("no lock {lock_id}"))?;
        match lock.acl_version() {
            v if v == version => Ok(()),
            v => Err(format!("lock {lock_id} at acl version {v}, expected {version}")),
        }
    })
}

/// The lock's ACL lists exactly the device keys of `users`.
pub fn acl_holds(lock_id: u32, users: &[&str]) -> OracleFn {
    let users: Vec<String> = users.iter().map(|u| (*u).to_owned()).collect();
    Box::new(move |world| {
        let lock = world.lock(lock_id).ok_or_else(|| format!("no lock {lock_id}"))?;
        let snapshot = lock.snapshot();
        let mut expected = Vec::new();
        for user in &users {
            expected.push(world.key_id(user).ok_or_else(|| format!("{user} has no key"))?);
        }
        expected.sort();
        let actual: Vec<String> = snapshot.acl().key_ids().map(str::to_owned).collect();
        if actual == expected {
            Ok(())
        } else {
            Err(format!("lock {lock_id} acl holds {actual:?}, expected {expected:?}"))
        }
    })
}

/// No unlock attempt has been granted on any lock.
pub fn nothing_granted() -> OracleFn {
    Box::new(|world| {
        for lock_id in world.lock_ids() {
            let granted = world
                .lock(lock_id)
                .map(|lock| lock.decisions())
                .unwrap_or_default()
                .into_iter()
                .any(|d| matches!(d, AuthOutcome::Granted { .. }));
            if granted {
                return Err(format!("lock {lock_id} granted access"));
            }
        }
        Ok(())
    })
}
