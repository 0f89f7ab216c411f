use std::collections::BTreeMap;

use crate::calc::{rate_1_decimal, ItemOutcome};
use crate::groups::normalize_group;
use crate::model::{
    GroupSummary, SchoolSummary, StudentRecord, Tier, TierCounts, ITEM_COUNT, NO_MARK,
};

/// Raw per-item counts. Rates are always derived from these, never averaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemTally {
    pub correct: [usize; ITEM_COUNT],
    pub attempted: [usize; ITEM_COUNT],
}

impl ItemTally {
    pub fn add_student(&mut self, student: &StudentRecord) {
        // On the roll without an exam: adds nothing to numerators or denominators.
        if student.tier == Tier::NoExam {
            return;
        }
        if let Some(outcomes) = &student.item_outcomes {
            for (i, outcome) in outcomes.iter().enumerate() {
                match outcome {
                    ItemOutcome::Skipped => {}
                    ItemOutcome::Incorrect => self.attempted[i] += 1,
                    ItemOutcome::Correct => {
                        self.attempted[i] += 1;
                        self.correct[i] += 1;
                    }
                }
            }
            return;
        }
        // Read back from JSON: the marks are all there is.
        for (i, mark) in student.item_results.iter().take(ITEM_COUNT).enumerate() {
            let m = mark.trim();
            if m.is_empty() || m == NO_MARK {
                continue;
            }
            self.attempted[i] += 1;
            if m == "C" {
                self.correct[i] += 1;
            }
        }
    }

    pub fn rates(&self) -> Vec<f64> {
        (0..ITEM_COUNT)
            .map(|i| rate_1_decimal(self.correct[i], self.attempted[i]))
            .collect()
    }
}

pub fn tally_students<'a, I>(students: I) -> (ItemTally, TierCounts)
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let mut tally = ItemTally::default();
    let mut counts = TierCounts::default();
    for s in students {
        tally.add_student(s);
        counts.add(s.tier);
    }
    (tally, counts)
}

pub fn aggregate_group(group_code: &str, students: Vec<StudentRecord>) -> GroupSummary {
    let (tally, tier_counts) = tally_students(&students);
    debug_assert_eq!(tier_counts.sum(), students.len());
    GroupSummary {
        group_code: group_code.to_string(),
        total: students.len(),
        item_success_rates: tally.rates(),
        tier_counts,
        students,
    }
}

/// Rolls groups up into a school. Statistics are recomputed from the students
/// the groups contain, so unequal group sizes weigh correctly.
pub fn aggregate_school(cct: &str, mut groups: Vec<GroupSummary>) -> SchoolSummary {
    groups.sort_by(|a, b| a.group_code.cmp(&b.group_code));
    let (tally, tier_counts) = tally_students(groups.iter().flat_map(|g| g.students.iter()));
    let total = groups.iter().map(|g| g.students.len()).sum();
    debug_assert_eq!(tier_counts.sum(), total);
    SchoolSummary {
        cct: cct.to_string(),
        total,
        item_success_rates: tally.rates(),
        tier_counts,
        groups,
        directory: None,
    }
}

/// Partitions students by canonical group code, then aggregates both levels.
/// Raw labels that normalize to the same code end up in one group.
pub fn group_students(cct: &str, students: Vec<StudentRecord>) -> SchoolSummary {
    let mut by_group: BTreeMap<String, Vec<StudentRecord>> = BTreeMap::new();
    for mut s in students {
        let code = normalize_group(Some(&s.group_code));
        s.group_code = code.clone();
        by_group.entry(code).or_default().push(s);
    }
    let groups = by_group
        .into_iter()
        .map(|(code, students)| aggregate_group(&code, students))
        .collect();
    aggregate_school(cct, groups)
}
