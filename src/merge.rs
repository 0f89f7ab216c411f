use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::aggregate::group_students;
use crate::calc::{derive_tier, ItemOutcome, MissingScore};
use crate::groups::normalize_group;
use crate::ingest::SchoolExport;
use crate::model::{
    ResultsFile, SchoolDirectoryInfo, SchoolSummary, StudentRecord, Tier, ITEM_COUNT,
};
use crate::text::{fix_mojibake, parse_csv_record, strip_bom};

/// (school, canonical group, GIVEN, FAMILY).
pub type StudentKey = (String, String, String, String);

pub fn student_key(cct: &str, group: &str, given: &str, family: &str) -> StudentKey {
    (
        cct.trim().to_string(),
        normalize_group(Some(group)),
        given.trim().to_uppercase(),
        family.trim().to_uppercase(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamEntry {
    pub score_percent: Option<f64>,
    pub tier: Tier,
    pub item_results: Vec<String>,
    pub item_outcomes: Option<[ItemOutcome; ITEM_COUNT]>,
}

/// Exam outcomes by student. The first entry for a key wins.
#[derive(Debug, Clone, Default)]
pub struct ExamIndex {
    entries: HashMap<StudentKey, ExamEntry>,
}

impl ExamIndex {
    pub fn insert(&mut self, cct: &str, s: &StudentRecord) {
        let key = student_key(cct, &s.group_code, &s.given_name, &s.family_name);
        self.entries.entry(key).or_insert_with(|| ExamEntry {
            score_percent: s.score_percent,
            tier: s.tier,
            item_results: s.item_results.clone(),
            item_outcomes: s.item_outcomes,
        });
    }

    pub fn from_results(results: &ResultsFile) -> Self {
        let mut idx = Self::default();
        for school in &results.schools {
            for s in school.students() {
                idx.insert(&school.cct, s);
            }
        }
        idx
    }

    pub fn from_exports(exports: &[SchoolExport]) -> Self {
        let mut idx = Self::default();
        for e in exports {
            for s in &e.students {
                idx.insert(&e.cct, s);
            }
        }
        idx
    }

    pub fn get(&self, key: &StudentKey) -> Option<&ExamEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub schools: usize,
    pub roster_students: usize,
    pub with_exam: usize,
    pub without_exam: usize,
    pub unmatched_exams: usize,
}

fn rebuild_school(school: SchoolSummary, students: Vec<StudentRecord>) -> SchoolSummary {
    let directory = school.directory;
    let mut rebuilt = group_students(&school.cct, students);
    rebuilt.directory = directory;
    rebuilt
}

/// A student's own label, or the label of the group it was filed under.
fn take_students(school: &mut SchoolSummary) -> Vec<StudentRecord> {
    let mut out = Vec::new();
    for group in std::mem::take(&mut school.groups) {
        for mut s in group.students {
            if s.group_code.trim().is_empty() {
                s.group_code = group.group_code.clone();
            }
            out.push(s);
        }
    }
    out
}

/// Keeps the roster's schools, groups and students and fills in exam results
/// where a student matches. Students without a match stay on the roll as
/// `SIN EXAMEN`.
pub fn merge_roster(roster: ResultsFile, exams: &ExamIndex) -> (ResultsFile, MergeStats) {
    if exams.is_empty() {
        tracing::warn!("no exam results to merge; every roster student will be SIN EXAMEN");
    }
    let mut stats = MergeStats::default();
    let mut used: HashSet<StudentKey> = HashSet::new();
    let mut schools = Vec::with_capacity(roster.schools.len());

    for mut school in roster.schools {
        let mut students = Vec::new();
        for s in take_students(&mut school) {
            stats.roster_students += 1;
            let key = student_key(&school.cct, &s.group_code, &s.given_name, &s.family_name);
            match exams.get(&key) {
                Some(exam) => {
                    stats.with_exam += 1;
                    used.insert(key);
                    let matched = StudentRecord::new(
                        &s.given_name,
                        &s.family_name,
                        &s.group_code,
                        exam.score_percent,
                        exam.tier,
                        exam.item_results.clone(),
                    )
                    .with_outcomes(exam.item_outcomes);
                    students.push(matched);
                }
                None => {
                    stats.without_exam += 1;
                    students.push(StudentRecord::new(
                        &s.given_name,
                        &s.family_name,
                        &s.group_code,
                        None,
                        derive_tier(None, MissingScore::NoExam),
                        Vec::new(),
                    ));
                }
            }
        }
        schools.push(rebuild_school(school, students));
    }

    stats.schools = schools.len();
    stats.unmatched_exams = exams.len().saturating_sub(used.len());
    tracing::info!(
        schools = stats.schools,
        with_exam = stats.with_exam,
        without_exam = stats.without_exam,
        unmatched = stats.unmatched_exams,
        "roster merged"
    );
    (ResultsFile::new(schools), stats)
}

/// Re-applies the group normalizer everywhere. Groups whose labels collapse to
/// the same code are merged and every summary is recomputed.
pub fn renormalize_groups(results: ResultsFile) -> ResultsFile {
    let schools = results
        .schools
        .into_iter()
        .map(|mut school| {
            let students = take_students(&mut school);
            rebuild_school(school, students)
        })
        .collect();
    ResultsFile {
        schools,
        generated_at: results.generated_at,
    }
}

const DIRECTORY_COLUMNS: &[&str] = &[
    "CCT",
    "NOMBRE",
    "TURNO",
    "NIVEL EDUCATIVO",
    "ZONA",
    "DOMICILIO",
    "TELÉFONO",
    "COLONIA",
    "LOCALIDAD",
    "MUNICIPIO",
];

/// School directory rows by CCT. The header is the first row with a `CCT`
/// cell; exports usually carry a title row above it.
pub fn parse_directory_csv(text: &str) -> BTreeMap<String, SchoolDirectoryInfo> {
    let mut out = BTreeMap::new();
    let mut idx: Option<HashMap<&'static str, usize>> = None;

    for line in strip_bom(text).lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<String> = parse_csv_record(line)
            .into_iter()
            .map(|f| fix_mojibake(f.trim()))
            .collect();

        if idx.is_none() {
            let upper: Vec<String> = fields.iter().map(|f| f.to_uppercase()).collect();
            if upper.iter().any(|f| f == "CCT") {
                let mut cols = HashMap::new();
                for name in DIRECTORY_COLUMNS {
                    let alt = name.replace('É', "E");
                    if let Some(i) = upper.iter().position(|h| h.as_str() == *name || *h == alt) {
                        cols.insert(*name, i);
                    }
                }
                idx = Some(cols);
            }
            continue;
        }
        let Some(cols) = idx.as_ref() else {
            continue;
        };

        let get = |col: &str| {
            cols.get(col)
                .and_then(|&i| fields.get(i))
                .filter(|v| !v.is_empty())
                .cloned()
        };
        let Some(cct) = get("CCT") else {
            continue;
        };
        out.insert(
            cct,
            SchoolDirectoryInfo {
                nombre: get("NOMBRE"),
                turno: get("TURNO"),
                nivel_educativo: get("NIVEL EDUCATIVO"),
                zona: get("ZONA"),
                domicilio: get("DOMICILIO"),
                telefono: get("TELÉFONO"),
                colonia: get("COLONIA"),
                localidad: get("LOCALIDAD"),
                municipio: get("MUNICIPIO"),
            },
        );
    }
    out
}

/// Attaches directory info by CCT; returns how many schools were updated.
pub fn apply_directory(
    results: &mut ResultsFile,
    directory: &BTreeMap<String, SchoolDirectoryInfo>,
) -> usize {
    let mut updated = 0;
    for school in &mut results.schools {
        if let Some(info) = directory.get(school.cct.trim()) {
            school.directory = Some(info.clone());
            updated += 1;
        }
    }
    updated
}
