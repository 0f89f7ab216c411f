use serde::{Deserialize, Deserializer, Serialize};

use crate::calc::ItemOutcome;

pub const ITEM_COUNT: usize = 12;
pub const NO_MARK: &str = "-";
pub const NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "REQUIERE APOYO")]
    RequiresSupport,
    #[serde(rename = "EN DESARROLLO")]
    Developing,
    #[serde(rename = "ESPERADO")]
    OnTrack,
    #[serde(rename = "SIN EXAMEN")]
    NoExam,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::RequiresSupport,
        Tier::Developing,
        Tier::OnTrack,
        Tier::NoExam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::RequiresSupport => "REQUIERE APOYO",
            Tier::Developing => "EN DESARROLLO",
            Tier::OnTrack => "ESPERADO",
            Tier::NoExam => "SIN EXAMEN",
        }
    }

    /// Accepts the wire label or a short ascii alias (`requires_support`, `on_track`, ...).
    pub fn parse(s: &str) -> Option<Tier> {
        let t = s.trim();
        if let Some(tier) = Tier::ALL.iter().copied().find(|x| x.as_str() == t) {
            return Some(tier);
        }
        match t.to_ascii_lowercase().replace('-', "_").as_str() {
            "requires_support" | "requiere_apoyo" => Some(Tier::RequiresSupport),
            "developing" | "en_desarrollo" => Some(Tier::Developing),
            "on_track" | "esperado" => Some(Tier::OnTrack),
            "no_exam" | "sin_examen" => Some(Tier::NoExam),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(rename = "nombre")]
    pub given_name: String,
    #[serde(rename = "apellido")]
    pub family_name: String,
    #[serde(rename = "grupo")]
    pub group_code: String,
    #[serde(rename = "porcentaje")]
    pub score_percent: Option<f64>,
    #[serde(rename = "nivel")]
    pub tier: Tier,
    #[serde(
        rename = "respuestas",
        default = "empty_marks",
        deserialize_with = "deserialize_marks"
    )]
    pub item_results: Vec<String>,
    /// Scored outcomes when the record came from an export with points. Records
    /// read back from JSON only have their marks.
    #[serde(skip)]
    pub item_outcomes: Option<[ItemOutcome; ITEM_COUNT]>,
}

impl StudentRecord {
    pub fn new(
        given_name: &str,
        family_name: &str,
        group_code: &str,
        score_percent: Option<f64>,
        tier: Tier,
        item_results: Vec<String>,
    ) -> Self {
        Self {
            given_name: truncate_chars(given_name, NAME_MAX_CHARS),
            family_name: truncate_chars(family_name, NAME_MAX_CHARS),
            group_code: group_code.to_string(),
            score_percent,
            tier,
            item_results: pad_marks(item_results),
            item_outcomes: None,
        }
    }

    pub fn with_outcomes(mut self, outcomes: Option<[ItemOutcome; ITEM_COUNT]>) -> Self {
        self.item_outcomes = outcomes;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    #[serde(rename = "requiereApoyo")]
    pub requires_support: usize,
    #[serde(rename = "enDesarrollo")]
    pub developing: usize,
    #[serde(rename = "esperado")]
    pub on_track: usize,
    #[serde(rename = "sinExamen", default)]
    pub no_exam: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::RequiresSupport => self.requires_support += 1,
            Tier::Developing => self.developing += 1,
            Tier::OnTrack => self.on_track += 1,
            Tier::NoExam => self.no_exam += 1,
        }
    }

    pub fn sum(&self) -> usize {
        self.requires_support + self.developing + self.on_track + self.no_exam
    }
}

impl std::ops::AddAssign for TierCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.requires_support += rhs.requires_support;
        self.developing += rhs.developing;
        self.on_track += rhs.on_track;
        self.no_exam += rhs.no_exam;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(rename = "nombre")]
    pub group_code: String,
    #[serde(rename = "alumnos", default)]
    pub students: Vec<StudentRecord>,
    #[serde(rename = "porcentajesReactivos", default)]
    pub item_success_rates: Vec<f64>,
    #[serde(flatten)]
    pub tier_counts: TierCounts,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolDirectoryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turno: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nivel_educativo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domicilio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colonia: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localidad: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolSummary {
    pub cct: String,
    #[serde(rename = "totalEstudiantes")]
    pub total: usize,
    #[serde(rename = "porcentajesReactivos", default)]
    pub item_success_rates: Vec<f64>,
    #[serde(flatten)]
    pub tier_counts: TierCounts,
    #[serde(rename = "grupos", default)]
    pub groups: Vec<GroupSummary>,
    #[serde(rename = "buscador", default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<SchoolDirectoryInfo>,
}

impl SchoolSummary {
    pub fn students(&self) -> impl Iterator<Item = &StudentRecord> {
        self.groups.iter().flat_map(|g| g.students.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    #[serde(rename = "escuelas", default)]
    pub schools: Vec<SchoolSummary>,
    #[serde(rename = "generado", default)]
    pub generated_at: String,
}

impl ResultsFile {
    pub fn new(schools: Vec<SchoolSummary>) -> Self {
        Self {
            schools,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn school(&self, cct: &str) -> Option<&SchoolSummary> {
        self.schools.iter().find(|s| s.cct == cct)
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn pad_marks(mut marks: Vec<String>) -> Vec<String> {
    marks.truncate(ITEM_COUNT);
    while marks.len() < ITEM_COUNT {
        marks.push(NO_MARK.to_string());
    }
    marks
}

fn empty_marks() -> Vec<String> {
    pad_marks(Vec::new())
}

fn deserialize_marks<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<String>>> = Option::deserialize(deserializer)?;
    let marks = raw
        .unwrap_or_default()
        .into_iter()
        .map(|m| {
            m.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NO_MARK.to_string())
        })
        .collect();
    Ok(pad_marks(marks))
}
