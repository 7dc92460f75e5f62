use anyhow::Error;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Difficulty of a question, doubling as the tier derived from a test score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Level {
    Junior,
    Middle,
    Senior,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Junior => "Junior",
            Level::Middle => "Middle",
            Level::Senior => "Senior",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "Junior" => Ok(Level::Junior),
            "Middle" => Ok(Level::Middle),
            "Senior" => Ok(Level::Senior),
            _ => Err(Error::msg(format!("Unknown level: {}", s))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Clone)]
pub struct Specialization {
    pub id: i64,
    pub name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSpecialization {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl From<DbSpecialization> for Specialization {
    fn from(db: DbSpecialization) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct Competency {
    pub id: i64,
    pub specialization_id: i64,
    pub name: String,
    pub importance: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCompetency {
    pub id: Option<i64>,
    pub specialization_id: Option<i64>,
    pub name: Option<String>,
    pub importance: Option<i64>,
}

impl From<DbCompetency> for Competency {
    fn from(db: DbCompetency) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            specialization_id: db.specialization_id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            importance: db.importance.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct Question {
    pub id: i64,
    pub topic_id: i64,
    pub level: Level,
    pub question_text: String,
    pub options: [String; 4],
    pub correct_answer: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbQuestion {
    pub id: Option<i64>,
    pub topic_id: Option<i64>,
    pub level: Option<String>,
    pub question_text: Option<String>,
    pub var_1: Option<String>,
    pub var_2: Option<String>,
    pub var_3: Option<String>,
    pub var_4: Option<String>,
    pub correct_answer: Option<i64>,
}

impl From<DbQuestion> for Question {
    fn from(db: DbQuestion) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            topic_id: db.topic_id.unwrap_or_default(),
            level: Level::from_str(&db.level.unwrap_or_default()).unwrap_or(Level::Junior),
            question_text: db.question_text.unwrap_or_default(),
            options: [
                db.var_1.unwrap_or_default(),
                db.var_2.unwrap_or_default(),
                db.var_3.unwrap_or_default(),
                db.var_4.unwrap_or_default(),
            ],
            correct_answer: db.correct_answer.unwrap_or_default(),
        }
    }
}

/// One user's run at a specialization test. `score` stays null until the
/// attempt is completed; `max_score` is fixed when the topic set is assigned.
#[derive(Serialize, Clone)]
pub struct TestAttempt {
    pub id: i64,
    pub user_id: i64,
    pub specialization_id: i64,
    pub score: Option<i64>,
    pub max_score: i64,
    pub current_question_number: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_limit_minutes: i64,
    pub time_started_at: Option<DateTime<Utc>>,
    pub time_expired: bool,
}

impl TestAttempt {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTestAttempt {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub specialization_id: Option<i64>,
    pub score: Option<i64>,
    pub max_score: Option<i64>,
    pub current_question_number: Option<i64>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub time_limit_minutes: Option<i64>,
    pub time_started_at: Option<NaiveDateTime>,
    pub time_expired: Option<bool>,
}

fn to_utc(dt: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

impl From<DbTestAttempt> for TestAttempt {
    fn from(db: DbTestAttempt) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            specialization_id: db.specialization_id.unwrap_or_default(),
            score: db.score,
            max_score: db.max_score.unwrap_or_default(),
            current_question_number: db.current_question_number.unwrap_or_default(),
            started_at: to_utc(db.started_at).unwrap_or_else(Utc::now),
            completed_at: to_utc(db.completed_at),
            time_limit_minutes: db.time_limit_minutes.unwrap_or(40),
            time_started_at: to_utc(db.time_started_at),
            time_expired: db.time_expired.unwrap_or_default(),
        }
    }
}

/// Topic assigned to one attempt at generation time. Written once inside the
/// start-test transaction and never mutated afterwards.
#[derive(Serialize, Clone)]
pub struct AssignedTopic {
    pub id: i64,
    pub user_test_id: i64,
    pub topic_id: i64,
    pub competency_id: i64,
    pub topic_order: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAssignedTopic {
    pub id: Option<i64>,
    pub user_test_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub competency_id: Option<i64>,
    pub topic_order: Option<i64>,
}

impl From<DbAssignedTopic> for AssignedTopic {
    fn from(db: DbAssignedTopic) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_test_id: db.user_test_id.unwrap_or_default(),
            topic_id: db.topic_id.unwrap_or_default(),
            competency_id: db.competency_id.unwrap_or_default(),
            topic_order: db.topic_order.unwrap_or_default(),
        }
    }
}

/// A question as presented inside one attempt, joined with its topic,
/// competency and any answer already recorded for it.
#[derive(Serialize, Clone)]
pub struct AttemptQuestion {
    pub question_id: i64,
    pub competency_id: i64,
    pub competency_name: String,
    pub topic_name: String,
    pub topic_order: i64,
    pub level: Level,
    pub question_text: String,
    pub options: [String; 4],
    pub is_answered: bool,
    pub user_answer: Option<i64>,
    pub is_correct: Option<bool>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAttemptQuestion {
    pub question_id: Option<i64>,
    pub competency_id: Option<i64>,
    pub competency_name: Option<String>,
    pub topic_name: Option<String>,
    pub topic_order: Option<i64>,
    pub level: Option<String>,
    pub question_text: Option<String>,
    pub var_1: Option<String>,
    pub var_2: Option<String>,
    pub var_3: Option<String>,
    pub var_4: Option<String>,
    pub user_answer: Option<i64>,
    pub is_correct: Option<bool>,
}

impl From<DbAttemptQuestion> for AttemptQuestion {
    fn from(db: DbAttemptQuestion) -> Self {
        Self {
            question_id: db.question_id.unwrap_or_default(),
            competency_id: db.competency_id.unwrap_or_default(),
            competency_name: db.competency_name.unwrap_or_default(),
            topic_name: db.topic_name.unwrap_or_default(),
            topic_order: db.topic_order.unwrap_or_default(),
            level: Level::from_str(&db.level.unwrap_or_default()).unwrap_or(Level::Junior),
            question_text: db.question_text.unwrap_or_default(),
            options: [
                db.var_1.unwrap_or_default(),
                db.var_2.unwrap_or_default(),
                db.var_3.unwrap_or_default(),
                db.var_4.unwrap_or_default(),
            ],
            is_answered: db.user_answer.is_some(),
            user_answer: db.user_answer,
            is_correct: db.is_correct,
        }
    }
}

/// Completed-attempt row for HR and manager listings. `level` is derived with
/// the cohort policy, not the completion policy.
#[derive(Serialize, Clone)]
pub struct AttemptSummary {
    pub test_id: i64,
    pub user_id: i64,
    pub name: String,
    pub surname: String,
    pub job_title: String,
    pub specialization: String,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub level: Level,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAttemptSummary {
    pub test_id: Option<i64>,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub job_title: Option<String>,
    pub specialization: Option<String>,
    pub score: Option<i64>,
    pub max_score: Option<i64>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl DbAttemptSummary {
    pub fn into_summary(self, policy: crate::scoring::LevelPolicy) -> AttemptSummary {
        let score = self.score.unwrap_or_default();
        let max_score = self.max_score.unwrap_or_default();
        let percentage = crate::scoring::percentage(score, max_score);
        AttemptSummary {
            test_id: self.test_id.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            surname: self.surname.unwrap_or_default(),
            job_title: self.job_title.unwrap_or_default(),
            specialization: self.specialization.unwrap_or_default(),
            score,
            max_score,
            percentage,
            level: policy.level(score, max_score),
            started_at: to_utc(self.started_at),
            completed_at: to_utc(self.completed_at),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct Recommendation {
    pub user_test_id: i64,
    pub recommendation_text: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbRecommendation {
    pub user_test_id: Option<i64>,
    pub recommendation_text: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbRecommendation> for Recommendation {
    fn from(db: DbRecommendation) -> Self {
        Self {
            user_test_id: db.user_test_id.unwrap_or_default(),
            recommendation_text: db.recommendation_text.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}
