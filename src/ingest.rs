use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::aggregate::group_students;
use crate::calc::{
    compute_score, derive_tier, item_marks, item_outcomes, ItemRecord, MissingScore,
};
use crate::groups::normalize_group;
use crate::model::{ResultsFile, StudentRecord, ITEM_COUNT};
use crate::text::{fix_mojibake, parse_csv_record, strip_bom};

pub const EXPORT_SUFFIX: &str = "_actualizado.csv";
pub const DEFAULT_GROUP: &str = "UNICO";

/// Per-school exports in `dir`, sorted by file name.
pub fn find_exports(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.to_string_lossy()))?;
    let mut out = Vec::new();
    for ent in entries {
        let ent = ent?;
        let p = ent.path();
        if !p.is_file() {
            continue;
        }
        let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
        // Example: 26DES0001X_actualizado.csv
        let Some(cct) = name.strip_suffix(EXPORT_SUFFIX) else {
            continue;
        };
        if cct.trim().is_empty() {
            continue;
        }
        out.push((cct.trim().to_string(), p));
    }
    out.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(out)
}

struct Columns {
    first_name: Option<usize>,
    last_name: Option<usize>,
    quiz_class: Option<usize>,
    points: [Option<usize>; ITEM_COUNT],
    marks: [Option<usize>; ITEM_COUNT],
    width: usize,
}

impl Columns {
    fn from_header(header: &[String]) -> Option<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let cols = Self {
            first_name: find("FirstName"),
            last_name: find("LastName"),
            quiz_class: find("QuizClass"),
            points: std::array::from_fn(|i| find(&format!("Points{}", i + 1))),
            marks: std::array::from_fn(|i| find(&format!("Mark{}", i + 1))),
            width: header.len(),
        };
        if cols.first_name.is_none() && cols.last_name.is_none() {
            return None;
        }
        Some(cols)
    }
}

fn cell(fields: &[String], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| fields.get(i)).map(String::as_str)
}

fn clean_name(raw: Option<&str>) -> String {
    fix_mojibake(raw.unwrap_or("")).trim().to_string()
}

/// Students and row-level warnings from one export. Fails only when the text
/// has no usable header.
pub fn parse_export_text(text: &str) -> anyhow::Result<(Vec<StudentRecord>, Vec<String>)> {
    let mut lines = strip_bom(text)
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        anyhow::bail!("export is empty");
    };
    let cols = Columns::from_header(&parse_csv_record(header_line))
        .ok_or_else(|| anyhow::anyhow!("missing FirstName/LastName header"))?;

    let mut students = Vec::new();
    let mut warnings = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let fields = parse_csv_record(line);
        if fields.len() != cols.width {
            warnings.push(format!(
                "line {line_no}: expected {} fields, got {}",
                cols.width,
                fields.len()
            ));
            continue;
        }
        let given = clean_name(cell(&fields, cols.first_name));
        let family = clean_name(cell(&fields, cols.last_name));
        if given.is_empty() && family.is_empty() {
            warnings.push(format!("line {line_no}: row has no student name"));
            continue;
        }

        let group = match cell(&fields, cols.quiz_class).map(str::trim) {
            Some(g) if !g.is_empty() => normalize_group(Some(g)),
            _ => DEFAULT_GROUP.to_string(),
        };

        let mut record = ItemRecord::default();
        for i in 0..ITEM_COUNT {
            record.set(
                i + 1,
                cell(&fields, cols.points[i]),
                cell(&fields, cols.marks[i]),
            );
        }
        let score = compute_score(&record);
        tracing::debug!(
            line = line_no,
            attempted = score.attempted,
            correct = score.correct,
            "row scored"
        );
        let percent = Some(score.percent);
        let student = StudentRecord::new(
            &given,
            &family,
            &group,
            percent,
            derive_tier(percent, MissingScore::RequiresSupport),
            item_marks(&record),
        )
        .with_outcomes(Some(item_outcomes(&record)));
        students.push(student);
    }
    Ok((students, warnings))
}

#[derive(Debug, Clone)]
pub struct SchoolExport {
    pub cct: String,
    pub students: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub files: usize,
    pub students: usize,
    pub skipped_rows: usize,
    pub broken_files: Vec<String>,
    pub warnings: Vec<String>,
}

/// Reads every export in `dir`. A broken file becomes a school with no
/// students; only an unreadable directory is an error.
pub fn read_exports(dir: &Path) -> anyhow::Result<(Vec<SchoolExport>, IngestReport)> {
    let mut report = IngestReport::default();
    let mut exports = Vec::new();
    for (cct, path) in find_exports(dir)? {
        report.files += 1;
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let parsed = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))
            .and_then(|bytes| parse_export_text(&String::from_utf8_lossy(&bytes)));
        let students = match parsed {
            Ok((students, warnings)) => {
                for w in warnings {
                    tracing::warn!(file = %file_name, "{w}");
                    report.skipped_rows += 1;
                    report.warnings.push(format!("{file_name}: {w}"));
                }
                students
            }
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "export unreadable; school kept with no data");
                report.broken_files.push(file_name.clone());
                report.warnings.push(format!("{file_name}: {e}"));
                Vec::new()
            }
        };
        report.students += students.len();
        exports.push(SchoolExport { cct, students });
    }
    Ok((exports, report))
}

/// Full pipeline: exports in `dir` to an aggregated results file.
pub fn build_results(dir: &Path) -> anyhow::Result<(ResultsFile, IngestReport)> {
    let (exports, report) = read_exports(dir)?;
    let schools = exports
        .into_iter()
        .map(|e| group_students(&e.cct, e.students))
        .collect();
    tracing::info!(
        files = report.files,
        students = report.students,
        skipped = report.skipped_rows,
        "exports ingested"
    );
    Ok((ResultsFile::new(schools), report))
}
