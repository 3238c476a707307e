//! Mobile-side orchestration over a radio.
//!
//! [`LockClient`] drives the sans-IO session machines from `keyway-core`
//! against a [`Radio`]: it opens one link per operation, bounds every wait,
//! and always tears the link down afterwards, whether the operation
//! succeeded, failed, timed out or was cancelled.
//!
//! # Cancellation
//!
//! The `*_until` variants take a future that cancels the operation when it
//! completes. Cancellation wins over progress made in the same poll. The
//! link is then disconnected. The lock only commits a
//! message after whole-message verification, so a cancelled push leaves
//! the lock exactly as it was.

use std::{future::Future, time::Duration};

use keyway_core::{
    AuthAction, AuthSession, Environment, Radio, RadioLink, Transfer, TransportError,
    beacon::encode_frame,
};
use keyway_proto::{
    AclEnvelope, AuthResult, BeaconFrame, Characteristic, ClaimPayload, OwnershipSet, StatusCode,
};
use tracing::{debug, info, warn};

use crate::{
    backend::Backend,
    config::ClientConfig,
    device::{DeviceKeyInfo, DeviceKeyStore},
    error::{ClientError, Result},
    store::SecureStore,
};

/// What to do once the link is up.
enum Job<'a> {
    Unlock,
    Push { characteristic: Characteristic, message: &'a [u8], expect: StatusCode },
}

/// Client for one device.
pub struct LockClient<R, E, S> {
    radio: R,
    env: E,
    keys: DeviceKeyStore<S>,
    config: ClientConfig,
}

impl<R: Radio, E: Environment, S: SecureStore> LockClient<R, E, S> {
    /// Client keeping its device key in `store`.
    pub fn new(radio: R, env: E, store: S, config: ClientConfig) -> Self {
        Self { radio, env, keys: DeviceKeyStore::new(store), config }
    }

    /// Device key store
    pub fn keys(&self) -> &DeviceKeyStore<S> {
        &self.keys
    }

    /// Radio this client dials with
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// This device's key, created on first use.
    pub fn device_key(&self) -> Result<DeviceKeyInfo> {
        self.keys.get_or_create(&self.env, &self.config.key_label)
    }

    /// Register this device's key with the backend. Returns the key id.
    pub async fn register_device<B: Backend + ?Sized>(
        &self,
        backend: &B,
        label: &str,
    ) -> Result<String> {
        let info = self.device_key()?;
        backend.register_key(&info.public_key_b64, label).await
    }

    /// Presence beacon for `user_id`, stamped with the current time.
    pub fn beacon(&self, user_id: &str) -> [u8; BeaconFrame::SIZE] {
        encode_frame(&self.env, user_id, None, None)
    }

    /// Prove possession of the device key to `lock_id`.
    ///
    /// # Errors
    ///
    /// - `NoPrivateKey` before dialing if this device has no key
    /// - `Denied` if the lock refused
    /// - `TransportTimeout` or `Transport` if the link failed (retryable)
    pub async fn unlock(&self, lock_id: u32) -> Result<()> {
        self.unlock_until(lock_id, std::future::pending()).await
    }

    /// [`Self::unlock`], abandoned when `cancel` completes.
    pub async fn unlock_until(
        &self,
        lock_id: u32,
        cancel: impl Future<Output = ()>,
    ) -> Result<()> {
        if self.keys.key_info(&self.config.key_label)?.is_none() {
            return Err(ClientError::NoPrivateKey { label: self.config.key_label.clone() });
        }
        self.run(lock_id, Job::Unlock, cancel).await
    }

    /// Write a signed ACL to the lock it names.
    ///
    /// # Errors
    ///
    /// `Rejected(code)` with the lock's status byte if it refused the
    /// envelope; the lock keeps its previous ACL.
    pub async fn push_acl(&self, envelope: &AclEnvelope) -> Result<()> {
        self.push_acl_until(envelope, std::future::pending()).await
    }

    /// [`Self::push_acl`], abandoned when `cancel` completes.
    pub async fn push_acl_until(
        &self,
        envelope: &AclEnvelope,
        cancel: impl Future<Output = ()>,
    ) -> Result<()> {
        let message = envelope.to_json()?;
        let job = Job::Push {
            characteristic: Characteristic::AclWrite,
            message: &message,
            expect: StatusCode::Accepted,
        };
        self.run(envelope.payload.lock_id, job, cancel).await?;
        let payload = &envelope.payload;
        info!(lock_id = payload.lock_id, version = payload.version, "acl pushed");
        Ok(())
    }

    /// Pin `admin_public_key` as the lock's trust root.
    ///
    /// # Errors
    ///
    /// `Rejected(Unauthorized)` on a wrong claim code or an already owned
    /// lock.
    pub async fn send_ownership(
        &self,
        lock_id: u32,
        admin_public_key: &str,
        claim_code: &str,
    ) -> Result<()> {
        let message = OwnershipSet {
            lock_id,
            admin_public_key: admin_public_key.to_owned(),
            claim_code: claim_code.to_owned(),
        }
        .to_json()?;
        let job = Job::Push {
            characteristic: Characteristic::OwnershipWrite,
            message: &message,
            expect: StatusCode::OwnershipAccepted,
        };
        self.run(lock_id, job, std::future::pending()).await?;
        info!(lock_id, "ownership set");
        Ok(())
    }

    /// Claim a lock from its scanned or typed claim payload, pinning the
    /// admin key the backend holds for it. Returns the lock id.
    pub async fn claim<B: Backend + ?Sized>(
        &self,
        backend: &B,
        workspace_id: &str,
        claim_text: &str,
    ) -> Result<u32> {
        let claim = ClaimPayload::parse(claim_text)?;
        let admin = backend.admin_key(workspace_id, claim.lock_id).await?;
        self.send_ownership(claim.lock_id, &admin, &claim.code).await?;
        Ok(claim.lock_id)
    }

    /// Fetch the latest ACL from the backend and push it. Returns the
    /// version now on the lock.
    pub async fn sync_acl<B: Backend + ?Sized>(
        &self,
        backend: &B,
        workspace_id: &str,
        lock_id: u32,
    ) -> Result<u32> {
        let envelope = backend.latest_acl(workspace_id, lock_id).await?;
        if envelope.payload.lock_id != lock_id {
            return Err(ClientError::EnvelopeMismatch {
                expected: lock_id,
                actual: envelope.payload.lock_id,
            });
        }
        self.push_acl(&envelope).await?;
        Ok(envelope.payload.version)
    }

    /// Connect, do `job`, disconnect.
    async fn run(
        &self,
        lock_id: u32,
        job: Job<'_>,
        cancel: impl Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(cancel);

        let limit = self.config.connect_timeout;
        let connect = bounded(&self.env, limit, "connection", self.radio.connect(lock_id));
        let mut link = tokio::select! {
            biased;
            () = &mut cancel => return Err(ClientError::Cancelled),
            link = connect => link?,
        };

        let result = {
            let work = self.work(&mut link, lock_id, job);
            tokio::select! {
                biased;
                () = &mut cancel => {
                    info!(lock_id, "operation cancelled");
                    Err(ClientError::Cancelled)
                },
                result = work => result,
            }
        };
        link.disconnect().await;

        if let Err(err) = &result {
            debug!(lock_id, %err, retryable = err.is_retryable(), "link operation failed");
        }
        result
    }

    async fn work(&self, link: &mut R::Link, lock_id: u32, job: Job<'_>) -> Result<()> {
        match job {
            Job::Unlock => self.authenticate(link, lock_id).await,
            Job::Push { characteristic, message, expect } => {
                let code = self.transfer(link, characteristic, message).await?;
                if code == expect {
                    Ok(())
                } else {
                    warn!(lock_id, ?code, "lock rejected write");
                    Err(ClientError::Rejected(code))
                }
            },
        }
    }

    async fn authenticate(&self, link: &mut R::Link, lock_id: u32) -> Result<()> {
        let mut session = AuthSession::new(lock_id, self.env.now(), self.config.auth.clone());

        let limit = self.remaining(session.deadline());
        let bytes = bounded(
            &self.env,
            limit,
            "challenge",
            link.next_notification(Characteristic::ChallengeNotify),
        )
        .await
        .inspect_err(|_| session.on_disconnect())?;
        let challenge = session.on_challenge(&bytes, self.env.now())?;

        let (kid, signature) = self.keys.answer(&self.config.key_label, &challenge)?;
        let actions = session.respond(&kid, &signature, link.mtu(), self.env.now())?;
        for action in actions {
            match action {
                AuthAction::Write { characteristic, chunks } => {
                    for chunk in chunks {
                        link.write(characteristic, &chunk).await?;
                    }
                },
                AuthAction::Disconnect { reason } => {
                    debug!(lock_id, %reason, "session closed link");
                    return Err(TransportError::Disconnected.into());
                },
            }
        }

        let limit = self.remaining(session.deadline());
        let result = link.next_notification(Characteristic::ResultNotify);
        let bytes = bounded(&self.env, limit, "result", result)
            .await
            .inspect_err(|_| session.on_disconnect())?;

        match session.on_result(&bytes)? {
            AuthResult::Granted => {
                info!(lock_id, kid = %kid, "unlocked");
                Ok(())
            },
            AuthResult::Denied => {
                warn!(lock_id, kid = %kid, "unlock denied");
                Err(ClientError::Denied)
            },
        }
    }

    async fn transfer(
        &self,
        link: &mut R::Link,
        characteristic: Characteristic,
        message: &[u8],
    ) -> Result<StatusCode> {
        let mut transfer = Transfer::new(
            characteristic,
            message,
            link.mtu(),
            self.env.now(),
            self.config.transfer.clone(),
        )?;

        while let Some(chunk) = transfer.next_chunk(self.env.now()) {
            if let Err(err) = link.write(characteristic, &chunk).await {
                transfer.on_disconnect();
                return Err(err.into());
            }
            if transfer.remaining() > 0 {
                self.env.sleep(transfer.inter_chunk_delay()).await;
            }
        }

        let limit = self.remaining(transfer.deadline());
        let status = link.next_notification(Characteristic::AclStatusNotify);
        let bytes = bounded(&self.env, limit, "status", status)
            .await
            .inspect_err(|_| transfer.on_disconnect())?;
        Ok(transfer.on_status(&bytes)?)
    }

    fn remaining(&self, deadline: Option<std::time::Instant>) -> Duration {
        deadline.map_or(Duration::ZERO, |d| d.saturating_duration_since(self.env.now()))
    }
}

/// Race `work` against the environment's clock.
async fn bounded<E, T, Err>(
    env: &E,
    limit: Duration,
    stage: &'static str,
    work: impl Future<Output = std::result::Result<T, Err>>,
) -> Result<T>
where
    E: Environment,
    Err: Into<ClientError>,
{
    tokio::select! {
        result = work => result.map_err(Into::into),
        () = env.sleep(limit) => {
            debug!(stage, ?limit, "wait expired");
            Err(ClientError::TransportTimeout { stage })
        },
    }
}
