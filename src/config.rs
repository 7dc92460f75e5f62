use crate::error::AppError;
use tracing::info;

/// Weights and thresholds for the blended final score. Loaded from the
/// environment at startup and validated before the server accepts requests.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Share of the objective test percentage in the weighted score.
    pub test_weight: f64,
    /// Share of the averaged manager ratings.
    pub manager_weight: f64,
    /// Share of the averaged self-assessment ratings.
    pub self_weight: f64,
    /// Competencies at or above this importance count as "top" and are the
    /// only ones eligible for self-assessment.
    pub top_competency_threshold: i64,
    /// Advisory attempt time limit recorded on each new attempt.
    pub time_limit_minutes: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            test_weight: 0.5,
            manager_weight: 0.4,
            self_weight: 0.1,
            top_competency_threshold: 70,
            time_limit_minutes: 40,
        }
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64, AppError> {
    match dotenvy::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|_| AppError::Validation(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64, AppError> {
    match dotenvy::var(key) {
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|_| AppError::Validation(format!("{} must be an integer, got '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

impl ScoringConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let config = Self {
            test_weight: env_f64("TEST_WEIGHT", defaults.test_weight)?,
            manager_weight: env_f64("MANAGER_WEIGHT", defaults.manager_weight)?,
            self_weight: env_f64("SELF_WEIGHT", defaults.self_weight)?,
            top_competency_threshold: env_i64(
                "TOP_COMPETENCY_THRESHOLD",
                defaults.top_competency_threshold,
            )?,
            time_limit_minutes: env_i64("TEST_TIME_LIMIT_MINUTES", defaults.time_limit_minutes)?,
        };
        config.validate()?;
        info!(
            test_weight = config.test_weight,
            manager_weight = config.manager_weight,
            self_weight = config.self_weight,
            "Scoring configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (name, weight) in [
            ("TEST_WEIGHT", self.test_weight),
            ("MANAGER_WEIGHT", self.manager_weight),
            ("SELF_WEIGHT", self.self_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(AppError::Validation(format!(
                    "{} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }

        let sum = self.test_weight + self.manager_weight + self.self_weight;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(AppError::Validation(format!(
                "Score weights must sum to 1.0, got {}",
                sum
            )));
        }

        if !(0..=100).contains(&self.top_competency_threshold) {
            return Err(AppError::Validation(format!(
                "TOP_COMPETENCY_THRESHOLD must be within [0, 100], got {}",
                self.top_competency_threshold
            )));
        }

        if self.time_limit_minutes <= 0 {
            return Err(AppError::Validation(format!(
                "TEST_TIME_LIMIT_MINUTES must be positive, got {}",
                self.time_limit_minutes
            )));
        }

        Ok(())
    }

    /// Blends the test percentage with averaged ratings. Ratings are on a
    /// 1-10 scale and are rescaled to percent; an absent component
    /// contributes 0 rather than poisoning the whole score.
    pub fn weighted_score(
        &self,
        test_percentage: f64,
        avg_manager_rating: Option<f64>,
        avg_self_rating: Option<f64>,
    ) -> f64 {
        let manager_pct = avg_manager_rating.map(|r| r * 10.0).unwrap_or(0.0);
        let self_pct = avg_self_rating.map(|r| r * 10.0).unwrap_or(0.0);
        test_percentage * self.test_weight
            + manager_pct * self.manager_weight
            + self_pct * self.self_weight
    }
}
