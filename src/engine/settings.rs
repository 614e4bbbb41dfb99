//! Shared agent settings.
//!
//! Readers take an `Arc` snapshot; writers are serialized, persist first and
//! then swap the snapshot, so a pipeline run sees either the old or the new
//! settings in full.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::domain::{AgentSettings, UpdateSettingsRequest};
use crate::error::GovernanceResult;
use crate::storage::InteractionStore;

#[derive(Clone)]
pub struct SharedSettings {
    current: Arc<RwLock<Arc<AgentSettings>>>,
    writer: Arc<Mutex<()>>,
}

impl SharedSettings {
    pub fn new(initial: AgentSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Load persisted settings, falling back to `defaults` when none are saved.
    pub async fn load(store: &dyn InteractionStore, defaults: AgentSettings) -> GovernanceResult<Self> {
        let settings = match store.get_settings().await? {
            Some(saved) => {
                saved.validate()?;
                tracing::info!("Loaded persisted agent settings");
                saved
            }
            None => defaults,
        };
        Ok(Self::new(settings))
    }

    /// The latest settings.
    pub async fn snapshot(&self) -> Arc<AgentSettings> {
        self.current.read().await.clone()
    }

    /// Apply a partial update, persist it, then publish it.
    pub async fn update(
        &self,
        request: &UpdateSettingsRequest,
        store: &dyn InteractionStore,
    ) -> GovernanceResult<Arc<AgentSettings>> {
        let _writer = self.writer.lock().await;

        let next = Arc::new(self.snapshot().await.apply(request)?);
        store.save_settings(&next).await?;
        *self.current.write().await = next.clone();

        tracing::info!(
            severity_threshold = next.severity_threshold,
            policy_enforcer = next.policy_enforcer,
            verifier = next.verifier,
            "Agent settings updated"
        );
        Ok(next)
    }
}
