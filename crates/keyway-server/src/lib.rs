//! Keyway backend.
//!
//! Issues and revokes per-user device credentials and turns workspace group
//! membership into signed ACL envelopes that a lock will accept.
//!
//! # Architecture
//!
//! - [`storage`]: document store boundary, in-memory and redb backed
//! - [`KeyRegistry`]: device key registration and revocation
//! - [`KeyCustodian`]: per-lock admin keys, sealed at rest
//! - [`AclBuilder`]: group resolution, versioning and signing
//! - [`AccessService`]: the above behind workspace-scoped roles
//! - [`identity`]: bearer token verification
//! - [`http`]: axum router over the service
//!
//! The service layer is synchronous and I/O-agnostic apart from the
//! [`Storage`] trait. Only [`http`] and [`identity`] are async.

pub mod acl_builder;
pub mod config;
pub mod custodian;
pub mod error;
pub mod http;
pub mod identity;
pub mod keyed;
pub mod registry;
pub mod service;
pub mod storage;

pub use acl_builder::AclBuilder;
pub use config::{BootstrapAdmin, BuilderConfig, ProviderConfig};
pub use custodian::KeyCustodian;
pub use error::{AuthError, ServiceError, StorageError};
pub use http::build_router;
pub use identity::{Principal, ProviderContext, StaticTokens, TokenVerifier};
pub use registry::KeyRegistry;
pub use service::AccessService;
pub use storage::{
    Group, LockAdminRecord, MemoryStorage, RedbStorage, Storage, StoredAcl, UserKeyRecord,
    WorkspaceRole,
};
