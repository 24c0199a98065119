//! Local edits to an imported site.

use anyhow::{Context, Result, ensure};

use airq_core::SharedStore;
use airq_store::StoredSite;
use airq_types::SiteStatus;

/// Changes requested by `airq site`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteEdit {
    pub enabled: Option<bool>,
    /// `Some(None)` clears the override.
    pub status: Option<Option<SiteStatus>>,
}

/// Apply `edit` to a site and return it as stored afterwards.
///
/// With an empty edit this just shows the site.
pub async fn cmd_site(store: &SharedStore, site_code: &str, edit: SiteEdit) -> Result<StoredSite> {
    let store = store.lock().await;
    let site = store
        .get_site(site_code)?
        .with_context(|| format!("Site not found: {site_code}"))?;

    if let Some(enabled) = edit.enabled {
        store.set_site_enabled(&site.site_code, enabled)?;
    }
    if let Some(status) = edit.status {
        ensure!(
            status != Some(SiteStatus::Unknown),
            "status override must be a known status"
        );
        store.set_status_override(&site.site_code, status)?;
    }

    store
        .get_site(site_code)?
        .with_context(|| format!("Site not found: {site_code}"))
}
