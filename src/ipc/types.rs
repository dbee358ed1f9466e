use crate::config::Config;
use crate::engine::ReplicaEngine;
use crate::remote::SqliteRemote;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub engine: Option<ReplicaEngine<SqliteRemote>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            engine: None,
        }
    }

    /// Closes the current engine, if any, then opens `path` and loads it.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        self.close_engine();
        let remote = SqliteRemote::open(path)?;
        let engine = ReplicaEngine::open(remote)?;
        info!(workspace = %path.display(), "workspace selected");
        self.workspace = Some(path.to_path_buf());
        self.engine = Some(engine);
        Ok(())
    }

    fn close_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.close() {
                warn!(error = %e, "closing previous workspace was incomplete");
            }
        }
        self.workspace = None;
    }

    /// Applies whatever the change feeds queued since the last request.
    pub fn pump(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.pump();
        }
    }
}
