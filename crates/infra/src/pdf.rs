//! Write-through cache of rendered invoice PDFs.
//!
//! Each artifact is stored at `{prefix}/{invoice_id}.pdf` next to a JSON
//! sidecar `{prefix}/{invoice_id}.meta.json` recording when it was rendered.
//! Freshness is judged from the sidecar, or from the object's modification
//! time when the sidecar is missing or unreadable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use billing_core::InvoiceId;

use crate::config::PdfCacheConfig;
use crate::error::PdfError;
use crate::storage::ObjectStorage;

/// TTLs above a century are treated as a century.
const MAX_TTL_HOURS: u64 = 100 * 366 * 24;

/// Produces the PDF bytes of an invoice.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, PdfError>;
}

impl<R> PdfRenderer for Arc<R>
where
    R: PdfRenderer + ?Sized,
{
    fn render(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, PdfError> {
        (**self).render(invoice_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfArtifact {
    pub bytes: Vec<u8>,
    pub path: String,
    pub from_cache: bool,
}

/// Sidecar metadata written next to each artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfSidecar {
    pub invoice_id: InvoiceId,
    pub generated_at: DateTime<Utc>,
    pub ttl_hours: u64,
}

#[derive(Debug, Clone)]
pub struct PdfArtifactCache<S, R> {
    storage: S,
    renderer: R,
    config: PdfCacheConfig,
}

impl<S: ObjectStorage, R: PdfRenderer> PdfArtifactCache<S, R> {
    pub fn new(storage: S, renderer: R, config: PdfCacheConfig) -> Self {
        Self {
            storage,
            renderer,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn content_path(&self, invoice_id: InvoiceId) -> String {
        self.path_for(invoice_id, "pdf")
    }

    pub fn sidecar_path(&self, invoice_id: InvoiceId) -> String {
        self.path_for(invoice_id, "meta.json")
    }

    fn path_for(&self, invoice_id: InvoiceId, extension: &str) -> String {
        let prefix = self.config.path_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{invoice_id}.{extension}")
        } else {
            format!("{prefix}/{invoice_id}.{extension}")
        }
    }

    fn caching_enabled(&self) -> bool {
        self.config.enabled && self.config.ttl_hours > 0
    }

    pub fn get(&self, invoice_id: InvoiceId, force_regenerate: bool) -> Result<PdfArtifact, PdfError> {
        self.get_at(invoice_id, force_regenerate, Utc::now())
    }

    /// [`get`](Self::get) with an explicit notion of "now".
    #[instrument(skip(self, now), fields(invoice_id = %invoice_id, disk = %self.config.disk), err)]
    pub fn get_at(
        &self,
        invoice_id: InvoiceId,
        force_regenerate: bool,
        now: DateTime<Utc>,
    ) -> Result<PdfArtifact, PdfError> {
        let path = self.content_path(invoice_id);

        if self.caching_enabled() && !force_regenerate {
            if let Some(bytes) = self.cached_bytes(invoice_id, &path, now) {
                tracing::debug!(%path, "pdf cache hit");
                return Ok(PdfArtifact {
                    bytes,
                    path,
                    from_cache: true,
                });
            }
        }

        tracing::debug!(%path, force_regenerate, "rendering pdf");
        let bytes = self.renderer.render(invoice_id)?;
        self.store(invoice_id, &path, &bytes, now);

        Ok(PdfArtifact {
            bytes,
            path,
            from_cache: false,
        })
    }

    /// Remove the artifact and its sidecar.
    pub fn invalidate(&self, invoice_id: InvoiceId) -> Result<(), PdfError> {
        self.storage.delete(&self.content_path(invoice_id))?;
        self.storage.delete(&self.sidecar_path(invoice_id))?;
        Ok(())
    }

    /// Storage failures on the read path count as misses.
    fn cached_bytes(&self, invoice_id: InvoiceId, path: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let generated_at = self.generated_at(invoice_id, path)?;
        let ttl = Duration::hours(self.config.ttl_hours.min(MAX_TTL_HOURS) as i64);
        if now.signed_duration_since(generated_at) >= ttl {
            tracing::debug!(%path, %generated_at, "pdf cache entry expired");
            return None;
        }

        match self.storage.get(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%path, error = %e, "pdf cache read failed");
                None
            }
        }
    }

    fn generated_at(&self, invoice_id: InvoiceId, path: &str) -> Option<DateTime<Utc>> {
        let sidecar_path = self.sidecar_path(invoice_id);
        match self.storage.get(&sidecar_path) {
            Ok(Some(raw)) => match serde_json::from_slice::<PdfSidecar>(&raw) {
                Ok(sidecar) => return Some(sidecar.generated_at),
                Err(e) => tracing::debug!(path = %sidecar_path, error = %e, "pdf sidecar unreadable"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %sidecar_path, error = %e, "pdf sidecar read failed"),
        }

        match self.storage.last_modified(path) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(%path, error = %e, "pdf modification time unavailable");
                None
            }
        }
    }

    /// Failures are logged; the caller still gets the fresh bytes.
    fn store(&self, invoice_id: InvoiceId, path: &str, bytes: &[u8], now: DateTime<Utc>) {
        if let Err(e) = self.storage.put(path, bytes) {
            tracing::warn!(%path, error = %e, "failed to store rendered pdf");
            return;
        }

        let sidecar = PdfSidecar {
            invoice_id,
            generated_at: now,
            ttl_hours: self.config.ttl_hours,
        };
        let sidecar_path = self.sidecar_path(invoice_id);
        let written = serde_json::to_vec(&sidecar)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.storage.put(&sidecar_path, &raw).map_err(|e| e.to_string()));
        if let Err(error) = written {
            tracing::warn!(path = %sidecar_path, %error, "failed to store pdf sidecar");
        }
    }
}
