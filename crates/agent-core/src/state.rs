use std::sync::Arc;

use async_trait::async_trait;
use soulbrowser_core_types::BrowserStateSnapshot;

/// Produces point-in-time page snapshots. Implemented by the DOM indexer.
#[async_trait]
pub trait BrowserStateProvider: Send + Sync {
    async fn get_state(&self) -> anyhow::Result<Arc<BrowserStateSnapshot>>;
}

/// Pause predicate polled at every plan boundary.
pub type PauseCheck<'a> = &'a (dyn Fn() -> bool + Send + Sync);

/// A pause predicate that never fires.
pub fn never_pause() -> bool {
    false
}
