use crate::gate::{can_view_school, visible_schools};
use crate::groups::normalize_group;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_session, results_path};
use crate::ipc::types::{AppState, Request};
use crate::model::{ResultsFile, SchoolSummary, Tier};
use crate::store::{load_results, students_by_tier};
use crate::token::Session;
use serde_json::json;

fn load(state: &AppState) -> Result<ResultsFile, HandlerErr> {
    Ok(load_results(&results_path(state)?))
}

fn school_overview(s: &SchoolSummary) -> serde_json::Value {
    let groups: Vec<serde_json::Value> = s
        .groups
        .iter()
        .map(|g| json!({ "nombre": g.group_code, "total": g.total }))
        .collect();
    json!({
        "cct": s.cct,
        "totalEstudiantes": s.total,
        "porcentajesReactivos": s.item_success_rates,
        "requiereApoyo": s.tier_counts.requires_support,
        "enDesarrollo": s.tier_counts.developing,
        "esperado": s.tier_counts.on_track,
        "sinExamen": s.tier_counts.no_exam,
        "grupos": groups,
        "buscador": s.directory,
    })
}

fn scoped_school<'a>(
    session: &Session,
    results: &'a ResultsFile,
    cct: &str,
) -> Result<&'a SchoolSummary, HandlerErr> {
    if !can_view_school(session, cct) {
        tracing::warn!(requested = cct, own = session.scope(), "school outside session scope");
        return Err(HandlerErr::forbidden());
    }
    results.school(cct).ok_or_else(|| {
        HandlerErr::new("not_found", "school not found").with_details(json!({ "cct": cct }))
    })
}

fn schools(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, &req.params)?;
    let results = load(state)?;
    let list: Vec<serde_json::Value> = visible_schools(&session, &results.schools)
        .into_iter()
        .map(school_overview)
        .collect();
    Ok(json!({ "escuelas": list, "generado": results.generated_at }))
}

fn school(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, &req.params)?;
    let cct = get_required_str(&req.params, "cct")?;
    let results = load(state)?;
    let school = scoped_school(&session, &results, cct.trim())?;
    serde_json::to_value(school).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn group(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, &req.params)?;
    let cct = get_required_str(&req.params, "cct")?;
    let raw_group = get_required_str(&req.params, "group")?;
    let results = load(state)?;
    let school = scoped_school(&session, &results, cct.trim())?;

    let code = normalize_group(Some(&raw_group));
    let group = school
        .groups
        .iter()
        .find(|g| g.group_code == code)
        .ok_or_else(|| {
            HandlerErr::new("not_found", "group not found")
                .with_details(json!({ "cct": school.cct, "group": code }))
        })?;
    let mut out =
        serde_json::to_value(group).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    out["cct"] = json!(school.cct);
    Ok(out)
}

fn by_tier(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, &req.params)?;
    let raw = get_required_str(&req.params, "tier")?;
    let tier = Tier::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("unknown tier").with_details(json!({
            "tier": raw,
            "expected": Tier::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        }))
    })?;
    let results = load(state)?;
    let entries = students_by_tier(visible_schools(&session, &results.schools), tier);
    Ok(json!({
        "nivel": tier.as_str(),
        "total": entries.len(),
        "alumnos": entries,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.schools" => schools(state, req),
        "results.school" => school(state, req),
        "results.group" => group(state, req),
        "results.byTier" => by_tier(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
