use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::model::{ResultsFile, StudentRecord, Tier};
use crate::text::{fix_json_strings, strip_bom};

pub const RESULTS_FILE: &str = "resultados.json";

/// Strict variant of [`load_results`]: every failure is returned.
pub fn read_results(path: &Path) -> anyhow::Result<ResultsFile> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let text = String::from_utf8_lossy(&bytes);
    let mut value: serde_json::Value =
        serde_json::from_str(strip_bom(&text)).context("results file is invalid JSON")?;
    fix_json_strings(&mut value);
    serde_json::from_value(value).context("results file has an unexpected shape")
}

/// Reads the whole file on every call. Missing or unreadable data reads as an
/// empty result set.
pub fn load_results(path: &Path) -> ResultsFile {
    match read_results(path) {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "results unavailable");
            ResultsFile {
                schools: Vec::new(),
                generated_at: String::new(),
            }
        }
    }
}

pub fn save_results(path: &Path, results: &ResultsFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.to_string_lossy()))?;
    }
    let text = serde_json::to_string_pretty(results).context("failed to serialize results")?;

    let tmp = path.with_extension("json.writing");
    if tmp.exists() {
        let _ = std::fs::remove_file(&tmp);
    }
    let mut out = File::create(&tmp)
        .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
    out.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
    out.flush().context("failed to flush results")?;
    drop(out);

    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move results to {}", path.to_string_lossy()))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierEntry<'a> {
    pub cct: &'a str,
    #[serde(flatten)]
    pub student: &'a StudentRecord,
}

/// Every student in `tier`, in file order, tagged with their school.
pub fn students_by_tier<'a, I>(schools: I, tier: Tier) -> Vec<TierEntry<'a>>
where
    I: IntoIterator<Item = &'a crate::model::SchoolSummary>,
{
    schools
        .into_iter()
        .flat_map(|school| {
            school
                .students()
                .filter(move |s| s.tier == tier)
                .map(move |student| TierEntry {
                    cct: &school.cct,
                    student,
                })
        })
        .collect()
}
