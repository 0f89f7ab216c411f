use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_super};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "mode": state.config.mode.as_str(),
            "authConfigured": state.config.secret().is_ok(),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        })),
    )
}

fn workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    // Switching away from a loaded workspace is a super action.
    if state.workspace.is_some() {
        require_super(state, &req.params)?;
    }
    let path = PathBuf::from(get_required_str(&req.params, "path")?);
    std::fs::create_dir_all(path.join("data")).map_err(|e| {
        HandlerErr::new("workspace_open_failed", e.to_string())
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    tracing::info!(path = %path.display(), "workspace selected");
    state.workspace = Some(path.clone());
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "hasResults": state.results_path().is_some_and(|p| p.exists()),
        "hasAuthData": state.auth_path().is_some_and(|p| p.exists()),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(respond(&req.id, workspace_select(state, req))),
        _ => None,
    }
}
