//! Persistence seam for [`State`].

use async_trait::async_trait;

use super::types::State;
use crate::error::Result;

/// Where a [`State`] snapshot is read from and written back to.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the latest snapshot, or `None` before the first apply.
    async fn load(&self) -> Result<Option<State>>;

    /// Replaces the stored snapshot.
    ///
    /// Implementations refuse to overwrite a snapshot of another lineage.
    async fn save(&self, state: &State) -> Result<()>;

    /// Short backend name recorded in plans, e.g. `local`.
    fn backend_type(&self) -> &'static str;

    /// Describes where the state lives, for display and plan metadata.
    fn location(&self) -> String;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<State>> {
        (**self).load().await
    }

    async fn save(&self, state: &State) -> Result<()> {
        (**self).save(state).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }

    fn location(&self) -> String {
        (**self).location()
    }
}
