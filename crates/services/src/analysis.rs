use models::AnalysisSession;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::{Result, ServiceError};

/// Fixed key of the mirrored session (file `<dir>/savr_analysis_data.json`).
pub const ANALYSIS_STORAGE_KEY: &str = "savr_analysis_data";

/// Holds the analysis for the goal → analysis → customize → start flow.
///
/// Nothing expires on its own; the flow calls [`AnalysisStore::clear`] once
/// the plan has been started or abandoned.
pub struct AnalysisStore {
    session: RwLock<Option<AnalysisSession>>,
    mirror: Option<PathBuf>,
}

impl AnalysisStore {
    pub fn in_memory() -> Self {
        Self {
            session: RwLock::new(None),
            mirror: None,
        }
    }

    /// Store mirrored to a JSON file in `dir`, preloaded from it if present.
    /// An unreadable mirror file is ignored and will be overwritten.
    pub fn with_mirror<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| ServiceError::Storage(format!("creating {}: {e}", dir.display())))?;
        let path = dir.join(format!("{ANALYSIS_STORAGE_KEY}.json"));

        let session = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<AnalysisSession>(&raw) {
                Ok(session) => Some(session),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable analysis cache");
                    None
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(ServiceError::Storage(format!("reading {}: {err}", path.display())));
            }
        };

        Ok(Self {
            session: RwLock::new(session),
            mirror: Some(path),
        })
    }

    pub async fn get(&self) -> Option<AnalysisSession> {
        self.session.read().await.clone()
    }

    /// Replaces the session. A failing mirror write is logged; the in-memory
    /// copy is still updated.
    pub async fn set(&self, session: AnalysisSession) {
        if let Some(path) = &self.mirror {
            match serde_json::to_string_pretty(&session) {
                Ok(raw) => {
                    if let Err(err) = tokio::fs::write(path, raw).await {
                        tracing::warn!(path = %path.display(), error = %err, "failed to mirror analysis");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "failed to serialize analysis"),
            }
        }
        *self.session.write().await = Some(session);
    }

    pub async fn clear(&self) {
        *self.session.write().await = None;
        if let Some(path) = &self.mirror {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to remove analysis mirror")
                }
            }
        }
    }
}
