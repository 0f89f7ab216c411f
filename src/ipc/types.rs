use std::path::PathBuf;

use serde::Deserialize;

use crate::config::Config;
use crate::credentials::AUTH_DATA_FILE;
use crate::store::RESULTS_FILE;

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
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let workspace = config.workspace.clone();
        Self { config, workspace }
    }

    /// True while the active workspace is the one fixed at startup.
    pub fn on_startup_workspace(&self) -> bool {
        self.workspace.is_some() && self.workspace == self.config.workspace
    }

    /// `<workspace>/data/resultados.json`
    pub fn results_path(&self) -> Option<PathBuf> {
        self.workspace
            .as_ref()
            .map(|w| w.join("data").join(RESULTS_FILE))
    }

    /// `<workspace>/auth-data.json`
    pub fn auth_path(&self) -> Option<PathBuf> {
        self.workspace.as_ref().map(|w| w.join(AUTH_DATA_FILE))
    }

    /// `<workspace>/exports`
    pub fn exports_dir(&self) -> Option<PathBuf> {
        self.workspace.as_ref().map(|w| w.join("exports"))
    }
}
