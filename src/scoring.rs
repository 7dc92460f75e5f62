use crate::models::Level;

/// The portal historically leveled people two different ways: test completion
/// uses 50/80 cutoffs, while the HR and manager cohort views use 34/67. Both
/// are kept as named policies; callers pick one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelPolicy {
    /// Applied when an attempt is completed and in owner-facing results.
    Completion,
    /// Applied in HR and manager aggregate listings.
    Cohort,
}

impl LevelPolicy {
    /// (senior_cutoff, middle_cutoff) in percent, inclusive at the lower bound.
    pub fn thresholds(&self) -> (f64, f64) {
        match self {
            LevelPolicy::Completion => (80.0, 50.0),
            LevelPolicy::Cohort => (67.0, 34.0),
        }
    }

    pub fn level_for_percentage(&self, percentage: f64) -> Level {
        let (senior, middle) = self.thresholds();
        if percentage >= senior {
            Level::Senior
        } else if percentage >= middle {
            Level::Middle
        } else {
            Level::Junior
        }
    }

    pub fn level(&self, score: i64, max_score: i64) -> Level {
        self.level_for_percentage(percentage(score, max_score))
    }
}

/// Score as a percentage of the attempt's fixed maximum. A zero or negative
/// maximum yields 0 rather than dividing by it.
pub fn percentage(score: i64, max_score: i64) -> f64 {
    if max_score <= 0 {
        return 0.0;
    }
    score as f64 / max_score as f64 * 100.0
}
