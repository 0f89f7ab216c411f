use std::path::PathBuf;

use crate::config::AuthSecret;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::token::{token_from_cookie_header, verify_token, Session};

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{key}")))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn secret(state: &AppState) -> Result<&AuthSecret, HandlerErr> {
    state.config.secret().map_err(|e| {
        tracing::error!(error = %e, "auth secret unavailable");
        HandlerErr::server_not_configured()
    })
}

/// Raw token from `params.token`, or the session cookie out of `params.cookie`.
pub fn presented_token(params: &serde_json::Value) -> Option<String> {
    if let Some(t) = get_optional_str(params, "token") {
        return Some(t);
    }
    let header = get_optional_str(params, "cookie")?;
    token_from_cookie_header(&header).map(str::to_string)
}

pub fn require_session(state: &AppState, params: &serde_json::Value) -> Result<Session, HandlerErr> {
    let secret = secret(state)?;
    let token = presented_token(params).ok_or_else(HandlerErr::invalid_session)?;
    verify_token(&token, secret).map_err(|_| HandlerErr::invalid_session())
}

pub fn require_super(state: &AppState, params: &serde_json::Value) -> Result<(), HandlerErr> {
    match require_session(state, params)? {
        Session::Super => Ok(()),
        Session::School { .. } => Err(HandlerErr::forbidden()),
    }
}

pub fn results_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state.results_path().ok_or_else(HandlerErr::no_workspace)
}

pub fn auth_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state.auth_path().ok_or_else(HandlerErr::no_workspace)
}
