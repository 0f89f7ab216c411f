use crate::model::{Tier, ITEM_COUNT, NO_MARK};

pub const REQUIRES_SUPPORT_MAX: f64 = 50.0;
pub const DEVELOPING_MAX: f64 = 80.0;

/// `100 * hits / total` rounded half-up to one decimal; 0 when nothing was counted.
pub fn rate_1_decimal(hits: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // Scale to tenths before the half-up step: 1/16 must land on 6.3.
    ((hits as f64 / total as f64) * 1000.0 + 0.5).floor() / 10.0
}

/// One `Points<n>` / `Mark<n>` pair as it came out of the spreadsheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCell {
    pub points: Option<String>,
    pub mark: Option<String>,
}

impl ItemCell {
    pub fn new(points: Option<&str>, mark: Option<&str>) -> Self {
        Self {
            points: points.map(str::to_string),
            mark: mark.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Points or mark missing, or points not numeric. Excluded from the score.
    Skipped,
    /// Counted in the denominator only.
    Incorrect,
    Correct,
}

/// Per-item cells for one student row, items 1..=12 stored at index 0..12.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRecord {
    pub items: [ItemCell; ITEM_COUNT],
}

impl ItemRecord {
    /// `item` is 1-based; out-of-range items are ignored.
    pub fn set(&mut self, item: usize, points: Option<&str>, mark: Option<&str>) {
        if let Some(cell) = item.checked_sub(1).and_then(|i| self.items.get_mut(i)) {
            *cell = ItemCell::new(points, mark);
        }
    }
}

pub fn item_outcome(cell: &ItemCell) -> ItemOutcome {
    let (Some(points), Some(mark)) = (cell.points.as_deref(), cell.mark.as_deref()) else {
        return ItemOutcome::Skipped;
    };
    let points = points.trim();
    if points.is_empty() {
        return ItemOutcome::Skipped;
    }
    let Ok(p) = points.parse::<f64>() else {
        return ItemOutcome::Skipped;
    };
    if p.is_nan() {
        return ItemOutcome::Skipped;
    }
    if p > 0.0 && mark.trim() == "C" {
        ItemOutcome::Correct
    } else {
        ItemOutcome::Incorrect
    }
}

pub fn item_outcomes(record: &ItemRecord) -> [ItemOutcome; ITEM_COUNT] {
    std::array::from_fn(|i| item_outcome(&record.items[i]))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub percent: f64,
    pub attempted: usize,
    pub correct: usize,
}

pub fn compute_score(record: &ItemRecord) -> Score {
    let mut attempted: usize = 0;
    let mut correct: usize = 0;
    for outcome in item_outcomes(record) {
        match outcome {
            ItemOutcome::Skipped => {}
            ItemOutcome::Incorrect => attempted += 1,
            ItemOutcome::Correct => {
                attempted += 1;
                correct += 1;
            }
        }
    }
    Score {
        percent: rate_1_decimal(correct, attempted),
        attempted,
        correct,
    }
}

/// What a missing score means at a given call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingScore {
    /// Single-source data: a student without a score is treated as needing support.
    RequiresSupport,
    /// Roster joins: the student is on the roll but did not sit the exam.
    NoExam,
}

pub fn derive_tier(percent: Option<f64>, missing: MissingScore) -> Tier {
    let Some(p) = percent else {
        return match missing {
            MissingScore::RequiresSupport => Tier::RequiresSupport,
            MissingScore::NoExam => Tier::NoExam,
        };
    };
    if p <= REQUIRES_SUPPORT_MAX {
        Tier::RequiresSupport
    } else if p <= DEVELOPING_MAX {
        Tier::Developing
    } else {
        Tier::OnTrack
    }
}

/// Trimmed marks for items 1..=12, `"-"` where the mark is missing or blank.
pub fn item_marks(record: &ItemRecord) -> Vec<String> {
    record
        .items
        .iter()
        .map(|cell| {
            cell.mark
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(NO_MARK)
                .to_string()
        })
        .collect()
}
