use std::path::PathBuf;

use crate::ingest::{build_results, read_exports};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_super, results_path};
use crate::ipc::types::{AppState, Request};
use crate::merge::{apply_directory, merge_roster, parse_directory_csv, renormalize_groups, ExamIndex};
use crate::model::ResultsFile;
use crate::store::{read_results, save_results};
use serde_json::json;

fn save(state: &AppState, results: &ResultsFile) -> Result<PathBuf, HandlerErr> {
    let path = results_path(state)?;
    save_results(&path, results).map_err(|e| HandlerErr::io("results_write_failed", e))?;
    Ok(path)
}

fn read_existing(path: &std::path::Path) -> Result<ResultsFile, HandlerErr> {
    read_results(path).map_err(|e| {
        HandlerErr::io("results_read_failed", e)
            .with_details(json!({ "path": path.to_string_lossy() }))
    })
}

fn build(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_super(state, &req.params)?;
    let dir = match get_optional_str(&req.params, "dir") {
        Some(d) => PathBuf::from(d),
        None => state.exports_dir().ok_or_else(HandlerErr::no_workspace)?,
    };
    let (results, report) = build_results(&dir).map_err(|e| {
        HandlerErr::io("exports_read_failed", e)
            .with_details(json!({ "dir": dir.to_string_lossy() }))
    })?;
    let path = save(state, &results)?;
    Ok(json!({
        "path": path.to_string_lossy(),
        "schools": results.schools.len(),
        "report": report,
    }))
}

/// Roster from `params.rosterPath`; exams from `params.examsDir` (exports) or
/// `params.examsPath` (results file, defaults to the workspace results).
fn merge(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_super(state, &req.params)?;
    let roster_path = PathBuf::from(get_required_str(&req.params, "rosterPath")?);
    let roster = read_existing(&roster_path)?;

    let exams = match get_optional_str(&req.params, "examsDir") {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            let (exports, _) = read_exports(&dir).map_err(|e| {
                HandlerErr::io("exports_read_failed", e)
                    .with_details(json!({ "dir": dir.to_string_lossy() }))
            })?;
            ExamIndex::from_exports(&exports)
        }
        None => {
            let path = match get_optional_str(&req.params, "examsPath") {
                Some(p) => PathBuf::from(p),
                None => results_path(state)?,
            };
            ExamIndex::from_results(&read_existing(&path)?)
        }
    };

    let (merged, stats) = merge_roster(roster, &exams);
    let path = save(state, &merged)?;
    Ok(json!({ "path": path.to_string_lossy(), "stats": stats }))
}

fn normalize_groups(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_super(state, &req.params)?;
    let current = read_existing(&results_path(state)?)?;
    let before: usize = current.schools.iter().map(|s| s.groups.len()).sum();
    let fixed = renormalize_groups(current);
    let after: usize = fixed.schools.iter().map(|s| s.groups.len()).sum();
    save(state, &fixed)?;
    tracing::info!(before, after, "groups renormalized");
    Ok(json!({ "groupsBefore": before, "groupsAfter": after }))
}

fn merge_directory(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_super(state, &req.params)?;
    let csv_path = PathBuf::from(get_required_str(&req.params, "path")?);
    let bytes = std::fs::read(&csv_path).map_err(|e| {
        HandlerErr::new("directory_read_failed", e.to_string())
            .with_details(json!({ "path": csv_path.to_string_lossy() }))
    })?;
    let directory = parse_directory_csv(&String::from_utf8_lossy(&bytes));

    let mut results = read_existing(&results_path(state)?)?;
    let updated = apply_directory(&mut results, &directory);
    save(state, &results)?;
    tracing::info!(entries = directory.len(), updated, "school directory merged");
    Ok(json!({
        "directoryEntries": directory.len(),
        "schools": results.schools.len(),
        "updated": updated,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "data.build" => build(state, req),
        "data.merge" => merge(state, req),
        "data.normalizeGroups" => normalize_groups(state, req),
        "data.mergeDirectory" => merge_directory(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
