use crate::credentials::{
    generate_credentials, sync_school_credentials, verify_password, AuthData, SuperOverrides,
};
use crate::gate::{authorize, home_path};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    auth_path, get_optional_str, get_required_str, presented_token, require_session,
    require_super, results_path, secret,
};
use crate::ipc::types::{AppState, Request};
use crate::store::load_results;
use crate::token::{issue_token, verify_token, Session, SESSION_COOKIE_NAME, SESSION_TTL_DAYS};
use serde_json::json;

fn session_json(session: &Session) -> serde_json::Value {
    json!({
        "role": session.role().as_str(),
        "cct": session.scope(),
        "home": home_path(session),
    })
}

fn cookie_json(state: &AppState, value: &str, max_age_secs: i64) -> serde_json::Value {
    json!({
        "name": SESSION_COOKIE_NAME,
        "value": value,
        "httpOnly": true,
        "sameSite": "Lax",
        "path": "/",
        "maxAge": max_age_secs,
        "secure": state.config.is_production(),
    })
}

fn load_auth(state: &AppState) -> AuthData {
    state
        .auth_path()
        .map(|p| AuthData::load_or_empty(&p))
        .unwrap_or_default()
}

fn login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    // Secret is checked before the password.
    let secret = secret(state)?;
    let password = get_required_str(&req.params, "password")?;

    let auth = load_auth(state);
    let overrides = SuperOverrides::from_config(&state.config);
    let Some(session) = verify_password(&password, &auth, &overrides) else {
        tracing::info!("login rejected");
        return Err(HandlerErr::new("invalid_credentials", "wrong password"));
    };

    let token = issue_token(&session, secret).map_err(|e| {
        tracing::error!(error = %e, "token issue failed");
        HandlerErr::server_not_configured()
    })?;
    tracing::info!(role = session.role().as_str(), cct = session.scope(), "login accepted");

    let mut out = session_json(&session);
    out["redirect"] = json!(home_path(&session));
    out["cookie"] = cookie_json(state, &token, SESSION_TTL_DAYS * 24 * 60 * 60);
    Ok(out)
}

fn session(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, &req.params)?;
    Ok(session_json(&session))
}

fn authorize_path(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = get_optional_str(&req.params, "path").unwrap_or_else(|| "/".to_string());
    // Anything that does not verify is treated as no session at all.
    let session = match (state.config.secret(), presented_token(&req.params)) {
        (Ok(secret), Some(token)) => verify_token(&token, secret).ok(),
        _ => None,
    };
    let access = authorize(session.as_ref(), &path);
    serde_json::to_value(access).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn logout(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "cookie": cookie_json(state, "", 0) }))
}

fn ccts_param(state: &AppState, params: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    if let Some(list) = params.get("ccts") {
        let arr = list
            .as_array()
            .ok_or_else(|| HandlerErr::bad_params("params.ccts must be an array of strings"))?;
        return Ok(arr
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect());
    }
    let results = load_results(&results_path(state)?);
    Ok(results.schools.into_iter().map(|s| s.cct).collect())
}

/// Replaces every account. Without a super session this only works once: on
/// the startup workspace, before any super credential exists.
fn generate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = auth_path(state)?;
    let existing = AuthData::load_or_empty(&path);
    let overrides = SuperOverrides::from_config(&state.config);
    let bootstrap = state.on_startup_workspace()
        && existing.super_usuario.is_empty()
        && overrides.password.is_none()
        && overrides.hash.is_none();
    if bootstrap {
        tracing::info!("bootstrapping credentials on the startup workspace");
    } else {
        require_super(state, &req.params)?;
    }

    let ccts = ccts_param(state, &req.params)?;
    let generated = generate_credentials(&ccts, &mut rand::thread_rng());
    generated
        .auth
        .save(&path)
        .map_err(|e| HandlerErr::io("auth_write_failed", e))?;
    tracing::info!(schools = generated.school_passwords.len(), "credentials generated");

    let schools: Vec<serde_json::Value> = generated
        .school_passwords
        .iter()
        .map(|(cct, password)| json!({ "cct": cct, "password": password }))
        .collect();
    Ok(json!({
        "superPassword": generated.super_password,
        "schools": schools,
    }))
}

fn sync(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_super(state, &req.params)?;
    let path = auth_path(state)?;
    let mut auth = AuthData::load(&path).map_err(|e| HandlerErr::io("auth_read_failed", e))?;
    let ccts = ccts_param(state, &req.params)?;
    let report = sync_school_credentials(&mut auth, &ccts, &mut rand::thread_rng());
    auth.save(&path)
        .map_err(|e| HandlerErr::io("auth_write_failed", e))?;
    tracing::info!(
        added = report.added.len(),
        removed = report.removed.len(),
        "school credentials synced"
    );

    let added: Vec<serde_json::Value> = report
        .added
        .iter()
        .map(|(cct, password)| json!({ "cct": cct, "password": password }))
        .collect();
    Ok(json!({
        "added": added,
        "removed": report.removed,
        "schools": auth.escuelas.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.login" => login(state, req),
        "auth.session" => session(state, req),
        "auth.authorize" => authorize_path(state, req),
        "auth.logout" => logout(state, req),
        "auth.generate" => generate(state, req),
        "auth.sync" => sync(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
