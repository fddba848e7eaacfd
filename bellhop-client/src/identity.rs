//! Client identity resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use shared::ClientIdentity;

use crate::error::{PipelineError, PipelineResult};

const IDENTITY_FILE: &str = "client_identity.json";

/// Resolves and persists the stable anonymous client identifier.
///
/// Idempotent: the first call creates and persists the identity, every
/// later call returns the same value, including across restarts. When
/// the state directory is unavailable the resolver degrades to an
/// in-memory identity scoped to this process; reconciliation weakens
/// but nothing crashes.
#[derive(Debug)]
pub struct IdentityResolver {
    state_dir: Option<PathBuf>,
    cached: Mutex<Option<ClientIdentity>>,
}

impl IdentityResolver {
    /// Resolver backed by a durable state directory.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: Some(state_dir.into()),
            cached: Mutex::new(None),
        }
    }

    /// Resolver with no durable storage (degraded mode).
    pub fn in_memory() -> Self {
        Self {
            state_dir: None,
            cached: Mutex::new(None),
        }
    }

    /// Resolve the client identity.
    pub fn resolve(&self) -> ClientIdentity {
        let mut cached = self.cached.lock().unwrap();
        if let Some(identity) = cached.as_ref() {
            return identity.clone();
        }
        let identity = self.load_or_create();
        *cached = Some(identity.clone());
        identity
    }

    fn load_or_create(&self) -> ClientIdentity {
        let Some(dir) = &self.state_dir else {
            tracing::warn!("No state directory configured, using in-memory identity");
            return ClientIdentity::generate();
        };
        match Self::load(dir) {
            Ok(Some(identity)) => return identity,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted identity, regenerating");
            }
        }
        let identity = ClientIdentity::generate();
        if let Err(e) = Self::persist(dir, &identity) {
            tracing::warn!(error = %e, "Identity not persisted, continuing in-memory");
        }
        identity
    }

    fn load(dir: &Path) -> PipelineResult<Option<ClientIdentity>> {
        let path = dir.join(IDENTITY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| PipelineError::Storage(e.to_string()))?;
        let identity = serde_json::from_slice(&bytes)?;
        Ok(Some(identity))
    }

    fn persist(dir: &Path, identity: &ClientIdentity) -> PipelineResult<()> {
        fs::create_dir_all(dir).map_err(|e| PipelineError::Storage(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(identity)?;
        fs::write(dir.join(IDENTITY_FILE), bytes)
            .map_err(|e| PipelineError::Storage(e.to_string()))
    }
}
