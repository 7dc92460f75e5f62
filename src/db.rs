use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::auth::{Permission, Role, User};
use crate::auth::session::{DbUserSession, UserSession};
use crate::auth::user::DbUser;
use crate::config::ScoringConfig;
use crate::error::AppError;
use crate::generator;
use crate::models::{
    AssignedTopic, AttemptQuestion, Competency, DbAssignedTopic, DbAttemptQuestion,
    DbAttemptSummary, DbCompetency, DbQuestion, DbRecommendation, DbSpecialization, DbTestAttempt,
    Level, Question, Recommendation, Specialization, TestAttempt,
};
use crate::recommend::{FALLBACK_RECOMMENDATION, RecommendationContext, Recommender};
use crate::scoring::{self, LevelPolicy};
use crate::validation::{check_answer_range, check_rating_range};

const SESSION_TTL_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Users and sessions

#[instrument(skip(db))]
pub async fn get_user(db: &Pool<Sqlite>, user_id: i64) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, surname, phone, company, job_title, role, department_id
         FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    Ok(user.into())
}

#[instrument(skip(db))]
pub async fn find_user_by_phone(db: &Pool<Sqlite>, phone: &str) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, surname, phone, company, job_title, role, department_id
         FROM users WHERE phone = ?",
    )
    .bind(phone)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::Authentication("No account registered for this phone".to_string()))?;

    Ok(user.into())
}

#[instrument(skip(db))]
#[allow(clippy::too_many_arguments)]
pub async fn create_user(
    db: &Pool<Sqlite>,
    name: &str,
    surname: &str,
    phone: &str,
    company: &str,
    job_title: &str,
    role: Role,
    department_id: Option<i64>,
) -> Result<User, AppError> {
    let result = sqlx::query(
        "INSERT INTO users (name, surname, phone, company, job_title, role, department_id)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(surname)
    .bind(phone)
    .bind(company)
    .bind(job_title)
    .bind(role.as_str())
    .bind(department_id)
    .execute(db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(format!("Phone {} is already registered", phone))
        }
        _ => AppError::Database(e),
    })?;

    info!(user_id = result.last_insert_rowid(), "Created user");
    get_user(db, result.last_insert_rowid()).await
}

#[instrument(skip(db))]
pub async fn create_user_session(db: &Pool<Sqlite>, user_id: i64) -> Result<UserSession, AppError> {
    let token = UserSession::generate_token();
    let expires_at = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).naive_utc();

    sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .execute(db)
        .await?;

    info!(user_id, "Created session");
    get_session_by_token(db, &token).await
}

#[instrument(skip(db, token))]
pub async fn get_session_by_token(db: &Pool<Sqlite>, token: &str) -> Result<UserSession, AppError> {
    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::Authentication("Unknown session token".to_string()))?;

    Ok(session.into())
}

#[instrument(skip(db, token))]
pub async fn invalidate_session(db: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(db)
        .await?;
    Ok(())
}

#[instrument(skip(db))]
pub async fn clean_expired_sessions(db: &Pool<Sqlite>) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
        .bind(Utc::now().naive_utc())
        .execute(db)
        .await?;

    if result.rows_affected() > 0 {
        info!(removed = result.rows_affected(), "Removed expired sessions");
    }
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Question bank

#[instrument(skip(db))]
pub async fn get_specializations(db: &Pool<Sqlite>) -> Result<Vec<Specialization>, AppError> {
    let rows = sqlx::query_as::<_, DbSpecialization>(
        "SELECT id, name FROM specializations ORDER BY name",
    )
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[instrument(skip(db))]
pub async fn create_specialization(
    db: &Pool<Sqlite>,
    name: &str,
) -> Result<Specialization, AppError> {
    let result = sqlx::query("INSERT INTO specializations (name) VALUES (?)")
        .bind(name)
        .execute(db)
        .await?;

    Ok(Specialization {
        id: result.last_insert_rowid(),
        name: name.to_string(),
    })
}

#[instrument(skip(db))]
pub async fn create_competency(
    db: &Pool<Sqlite>,
    specialization_id: i64,
    name: &str,
    importance: i64,
) -> Result<Competency, AppError> {
    if !(0..=100).contains(&importance) {
        return Err(AppError::Validation(format!(
            "Competency importance must be within [0, 100], got {}",
            importance
        )));
    }

    let result =
        sqlx::query("INSERT INTO competencies (specialization_id, name, importance) VALUES (?, ?, ?)")
            .bind(specialization_id)
            .bind(name)
            .bind(importance)
            .execute(db)
            .await?;

    Ok(Competency {
        id: result.last_insert_rowid(),
        specialization_id,
        name: name.to_string(),
        importance,
    })
}

#[instrument(skip(db))]
pub async fn create_topic(
    db: &Pool<Sqlite>,
    competency_id: i64,
    name: &str,
) -> Result<i64, AppError> {
    let result = sqlx::query("INSERT INTO topics (competency_id, name) VALUES (?, ?)")
        .bind(competency_id)
        .bind(name)
        .execute(db)
        .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(db, question_text, options))]
pub async fn create_question(
    db: &Pool<Sqlite>,
    topic_id: i64,
    level: Level,
    question_text: &str,
    options: &[String; 4],
    correct_answer: i64,
) -> Result<i64, AppError> {
    check_answer_range(correct_answer)?;

    let result = sqlx::query(
        "INSERT INTO questions (topic_id, level, question_text, var_1, var_2, var_3, var_4, correct_answer)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(topic_id)
    .bind(level.as_str())
    .bind(question_text)
    .bind(&options[0])
    .bind(&options[1])
    .bind(&options[2])
    .bind(&options[3])
    .bind(correct_answer)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

// ---------------------------------------------------------------------------
// Attempt lifecycle

#[instrument(skip(db))]
pub async fn get_attempt(db: &Pool<Sqlite>, test_id: i64) -> Result<TestAttempt, AppError> {
    let attempt = sqlx::query_as::<_, DbTestAttempt>(
        "SELECT id, user_id, specialization_id, score, max_score, current_question_number,
                started_at, completed_at, time_limit_minutes, time_started_at, time_expired
         FROM user_specialization_tests WHERE id = ?",
    )
    .bind(test_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Test attempt {} not found", test_id)))?;

    Ok(attempt.into())
}

#[instrument(skip(db))]
pub async fn get_user_attempts(db: &Pool<Sqlite>, user_id: i64) -> Result<Vec<TestAttempt>, AppError> {
    let rows = sqlx::query_as::<_, DbTestAttempt>(
        "SELECT id, user_id, specialization_id, score, max_score, current_question_number,
                started_at, completed_at, time_limit_minutes, time_started_at, time_expired
         FROM user_specialization_tests WHERE user_id = ? ORDER BY started_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn find_existing_attempt(
    db: &Pool<Sqlite>,
    user_id: i64,
    specialization_id: i64,
) -> Result<Option<TestAttempt>, AppError> {
    let attempt = sqlx::query_as::<_, DbTestAttempt>(
        "SELECT id, user_id, specialization_id, score, max_score, current_question_number,
                started_at, completed_at, time_limit_minutes, time_started_at, time_expired
         FROM user_specialization_tests WHERE user_id = ? AND specialization_id = ?",
    )
    .bind(user_id)
    .bind(specialization_id)
    .fetch_optional(db)
    .await?;

    Ok(attempt.map(Into::into))
}

/// Starts (or resumes) the single attempt a user gets per specialization.
/// Generation and the topic assignment happen in one transaction; a second
/// start for the same pair returns the existing attempt untouched.
#[instrument(skip(db, config))]
pub async fn start_test(
    db: &Pool<Sqlite>,
    user_id: i64,
    specialization_id: i64,
    config: &ScoringConfig,
) -> Result<TestAttempt, AppError> {
    if let Some(existing) = find_existing_attempt(db, user_id, specialization_id).await? {
        info!(test_id = existing.id, "Returning existing attempt");
        return Ok(existing);
    }

    let generated = generator::generate_test(db, specialization_id).await?;
    if generated.topics.is_empty() {
        return Err(AppError::Validation(format!(
            "Specialization {} has no questions to build a test from",
            specialization_id
        )));
    }

    let mut tx = db.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO user_specialization_tests
             (user_id, specialization_id, max_score, current_question_number,
              time_limit_minutes, time_started_at)
         VALUES (?, ?, ?, 0, ?, CURRENT_TIMESTAMP)",
    )
    .bind(user_id)
    .bind(specialization_id)
    .bind(generated.question_count as i64)
    .bind(config.time_limit_minutes)
    .execute(&mut *tx)
    .await;

    let test_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            // Lost the race to a concurrent start; the winner's attempt stands.
            tx.rollback().await?;
            return find_existing_attempt(db, user_id, specialization_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal("Attempt vanished after unique violation".to_string())
                });
        }
        Err(e) => return Err(e.into()),
    };

    for topic in &generated.topics {
        sqlx::query(
            "INSERT INTO user_test_topics (user_test_id, topic_id, competency_id, topic_order)
             VALUES (?, ?, ?, ?)",
        )
        .bind(test_id)
        .bind(topic.topic_id)
        .bind(topic.competency_id)
        .bind(topic.topic_order)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(
        test_id,
        topic_count = generated.topics.len(),
        max_score = generated.question_count,
        "Started new test attempt"
    );
    get_attempt(db, test_id).await
}

#[instrument(skip(db))]
pub async fn get_assigned_topics(
    db: &Pool<Sqlite>,
    test_id: i64,
) -> Result<Vec<AssignedTopic>, AppError> {
    let rows = sqlx::query_as::<_, DbAssignedTopic>(
        "SELECT id, user_test_id, topic_id, competency_id, topic_order
         FROM user_test_topics WHERE user_test_id = ? ORDER BY topic_order",
    )
    .bind(test_id)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(Serialize)]
pub struct AttemptProgress {
    pub test_id: i64,
    pub max_score: i64,
    pub answered: i64,
    pub current_question_number: i64,
    pub completed: bool,
    pub time_limit_minutes: i64,
    pub time_expired: bool,
    pub questions: Vec<AttemptQuestion>,
}

/// All questions belonging to the attempt's assigned topics, in topic order
/// and then ascending difficulty, each joined with any recorded answer.
#[instrument(skip(db))]
pub async fn get_attempt_questions(
    db: &Pool<Sqlite>,
    user: &User,
    test_id: i64,
) -> Result<AttemptProgress, AppError> {
    let attempt = get_attempt(db, test_id).await?;
    let owner = get_user(db, attempt.user_id).await?;
    user.require_result_access(owner.id, owner.department_id)?;

    let rows = sqlx::query_as::<_, DbAttemptQuestion>(
        "SELECT q.id AS question_id, c.id AS competency_id, c.name AS competency_name,
                t.name AS topic_name, utt.topic_order, q.level, q.question_text,
                q.var_1, q.var_2, q.var_3, q.var_4,
                a.user_answer, a.is_correct
         FROM user_test_topics utt
         JOIN topics t ON t.id = utt.topic_id
         JOIN competencies c ON c.id = utt.competency_id
         JOIN questions q ON q.topic_id = utt.topic_id
         LEFT JOIN test_answers a ON a.user_test_id = utt.user_test_id AND a.question_id = q.id
         WHERE utt.user_test_id = ?
         ORDER BY utt.topic_order,
                  CASE q.level WHEN 'Junior' THEN 1 WHEN 'Middle' THEN 2 ELSE 3 END",
    )
    .bind(test_id)
    .fetch_all(db)
    .await?;

    let questions: Vec<AttemptQuestion> = rows.into_iter().map(Into::into).collect();
    let answered = questions.iter().filter(|q| q.is_answered).count() as i64;

    Ok(AttemptProgress {
        test_id,
        max_score: attempt.max_score,
        answered,
        current_question_number: attempt.current_question_number,
        completed: attempt.is_completed(),
        time_limit_minutes: attempt.time_limit_minutes,
        time_expired: attempt.time_expired,
        questions,
    })
}

#[derive(Serialize)]
pub struct AnswerOutcome {
    pub test_id: i64,
    pub question_id: i64,
    pub is_correct: bool,
    pub already_answered: bool,
    pub current_question_number: i64,
    pub time_expired: bool,
}

/// Records one answer. A question can only be answered once per attempt;
/// resubmitting returns the stored verdict and leaves the progress counter
/// alone. The time limit is advisory and only flips the expiry flag.
#[instrument(skip(db))]
pub async fn submit_answer(
    db: &Pool<Sqlite>,
    user_id: i64,
    test_id: i64,
    question_id: i64,
    answer: i64,
) -> Result<AnswerOutcome, AppError> {
    check_answer_range(answer)?;

    let attempt = get_attempt(db, test_id).await?;
    if attempt.user_id != user_id {
        return Err(AppError::AccessDenied(
            "Test attempt belongs to another user".to_string(),
        ));
    }

    let question: Question = sqlx::query_as::<_, DbQuestion>(
        "SELECT q.id, q.topic_id, q.level, q.question_text,
                q.var_1, q.var_2, q.var_3, q.var_4, q.correct_answer
         FROM questions q
         JOIN user_test_topics utt ON utt.topic_id = q.topic_id
         WHERE utt.user_test_id = ? AND q.id = ?",
    )
    .bind(test_id)
    .bind(question_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "Question {} is not part of test {}",
            question_id, test_id
        ))
    })?
    .into();

    let time_expired = match attempt.time_started_at {
        Some(started) if !attempt.time_expired => {
            Utc::now() - started > Duration::minutes(attempt.time_limit_minutes)
        }
        _ => attempt.time_expired,
    };
    if time_expired && !attempt.time_expired {
        sqlx::query("UPDATE user_specialization_tests SET time_expired = TRUE WHERE id = ?")
            .bind(test_id)
            .execute(db)
            .await?;
        warn!(test_id, "Attempt passed its advisory time limit");
    }

    let is_correct = answer == question.correct_answer;
    let inserted = sqlx::query(
        "INSERT INTO test_answers (user_test_id, question_id, user_answer, is_correct)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (user_test_id, question_id) DO NOTHING",
    )
    .bind(test_id)
    .bind(question_id)
    .bind(answer)
    .bind(is_correct)
    .execute(db)
    .await?;

    if inserted.rows_affected() == 0 {
        let stored = sqlx::query_scalar::<_, bool>(
            "SELECT is_correct FROM test_answers WHERE user_test_id = ? AND question_id = ?",
        )
        .bind(test_id)
        .bind(question_id)
        .fetch_one(db)
        .await?;

        info!(test_id, question_id, "Duplicate answer ignored");
        return Ok(AnswerOutcome {
            test_id,
            question_id,
            is_correct: stored,
            already_answered: true,
            current_question_number: attempt.current_question_number,
            time_expired,
        });
    }

    sqlx::query(
        "UPDATE user_specialization_tests
         SET current_question_number = current_question_number + 1 WHERE id = ?",
    )
    .bind(test_id)
    .execute(db)
    .await?;

    Ok(AnswerOutcome {
        test_id,
        question_id,
        is_correct,
        already_answered: false,
        current_question_number: attempt.current_question_number + 1,
        time_expired,
    })
}

#[derive(Serialize)]
pub struct CompletedTest {
    pub test_id: i64,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub level: Level,
    pub recommendation: String,
}

/// Finalizes an attempt: counts correct answers into the immutable score and
/// produces the recommendation exactly once. Completing an already-completed
/// attempt returns the stored outcome.
#[instrument(skip(db, recommender))]
pub async fn complete_test(
    db: &Pool<Sqlite>,
    user_id: i64,
    test_id: i64,
    recommender: &dyn Recommender,
) -> Result<CompletedTest, AppError> {
    let attempt = get_attempt(db, test_id).await?;
    if attempt.user_id != user_id {
        return Err(AppError::AccessDenied(
            "Test attempt belongs to another user".to_string(),
        ));
    }

    if attempt.is_completed() {
        let score = attempt.score.unwrap_or_default();
        let recommendation = get_recommendation(db, test_id)
            .await?
            .map(|r| r.recommendation_text)
            .unwrap_or_else(|| FALLBACK_RECOMMENDATION.to_string());

        return Ok(CompletedTest {
            test_id,
            score,
            max_score: attempt.max_score,
            percentage: scoring::percentage(score, attempt.max_score),
            level: LevelPolicy::Completion.level(score, attempt.max_score),
            recommendation,
        });
    }

    let score = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM test_answers WHERE user_test_id = ? AND is_correct = TRUE",
    )
    .bind(test_id)
    .fetch_one(db)
    .await?;

    let updated = sqlx::query(
        "UPDATE user_specialization_tests
         SET score = ?, completed_at = CURRENT_TIMESTAMP
         WHERE id = ? AND completed_at IS NULL",
    )
    .bind(score)
    .bind(test_id)
    .execute(db)
    .await?;

    if updated.rows_affected() == 0 {
        // Concurrent completion won; report what it stored.
        return Box::pin(complete_test(db, user_id, test_id, recommender)).await;
    }

    let level = LevelPolicy::Completion.level(score, attempt.max_score);
    let user = get_user(db, user_id).await?;
    let specialization = sqlx::query_scalar::<_, String>(
        "SELECT name FROM specializations WHERE id = ?",
    )
    .bind(attempt.specialization_id)
    .fetch_optional(db)
    .await?
    .unwrap_or_default();

    let ctx = RecommendationContext {
        employee_name: user.name.clone(),
        specialization,
        score,
        max_score: attempt.max_score,
        level,
    };
    let recommendation = match recommender.recommend(&ctx) {
        Ok(text) => text,
        Err(err) => {
            err.log_and_record("Recommendation generation");
            FALLBACK_RECOMMENDATION.to_string()
        }
    };

    sqlx::query(
        "INSERT OR IGNORE INTO ai_recommendations (user_test_id, recommendation_text) VALUES (?, ?)",
    )
    .bind(test_id)
    .bind(&recommendation)
    .execute(db)
    .await?;

    info!(test_id, score, max_score = attempt.max_score, level = %level, "Completed test");
    Ok(CompletedTest {
        test_id,
        score,
        max_score: attempt.max_score,
        percentage: scoring::percentage(score, attempt.max_score),
        level,
        recommendation,
    })
}

#[instrument(skip(db))]
pub async fn get_recommendation(
    db: &Pool<Sqlite>,
    test_id: i64,
) -> Result<Option<Recommendation>, AppError> {
    let row = sqlx::query_as::<_, DbRecommendation>(
        "SELECT user_test_id, recommendation_text, created_at
         FROM ai_recommendations WHERE user_test_id = ?",
    )
    .bind(test_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(Into::into))
}

#[derive(Serialize)]
pub struct TestResults {
    pub test_id: i64,
    pub user_id: i64,
    pub specialization_id: i64,
    pub completed: bool,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub level: Level,
    pub recommendation: Option<String>,
    pub questions: Vec<AttemptQuestion>,
}

/// Per-question breakdown plus the stored outcome. Access follows the usual
/// rule: owners always, HR anywhere, managers inside their department.
#[instrument(skip(db))]
pub async fn get_results(
    db: &Pool<Sqlite>,
    user: &User,
    test_id: i64,
) -> Result<TestResults, AppError> {
    let attempt = get_attempt(db, test_id).await?;
    let owner = get_user(db, attempt.user_id).await?;
    user.require_result_access(owner.id, owner.department_id)?;

    let progress = get_attempt_questions(db, user, test_id).await?;
    let score = if attempt.is_completed() {
        attempt.score.unwrap_or_default()
    } else {
        progress.questions.iter().filter(|q| q.is_correct == Some(true)).count() as i64
    };
    let recommendation = get_recommendation(db, test_id)
        .await?
        .map(|r| r.recommendation_text);

    Ok(TestResults {
        test_id,
        user_id: attempt.user_id,
        specialization_id: attempt.specialization_id,
        completed: attempt.is_completed(),
        score,
        max_score: attempt.max_score,
        percentage: scoring::percentage(score, attempt.max_score),
        level: LevelPolicy::Completion.level(score, attempt.max_score),
        recommendation,
        questions: progress.questions,
    })
}

// ---------------------------------------------------------------------------
// Ratings

/// Competencies of the attempt's specialization important enough for
/// self-assessment.
#[instrument(skip(db))]
pub async fn get_top_competencies(
    db: &Pool<Sqlite>,
    test_id: i64,
    threshold: i64,
) -> Result<Vec<Competency>, AppError> {
    let attempt = get_attempt(db, test_id).await?;
    let rows = sqlx::query_as::<_, DbCompetency>(
        "SELECT id, specialization_id, name, importance
         FROM competencies
         WHERE specialization_id = ? AND importance >= ?
         ORDER BY importance DESC, name",
    )
    .bind(attempt.specialization_id)
    .bind(threshold)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn competency_importance(
    db: &Pool<Sqlite>,
    competency_id: i64,
    specialization_id: i64,
) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT importance FROM competencies WHERE id = ? AND specialization_id = ?",
    )
    .bind(competency_id)
    .bind(specialization_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "Competency {} does not belong to this specialization",
            competency_id
        ))
    })
}

/// Upserts one self-assessment. Only the attempt owner may write, and only
/// against the top competencies of the attempt's specialization.
#[instrument(skip(db))]
pub async fn submit_self_assessment(
    db: &Pool<Sqlite>,
    user_id: i64,
    test_id: i64,
    competency_id: i64,
    rating: i64,
    threshold: i64,
) -> Result<(), AppError> {
    check_rating_range(rating)?;

    let attempt = get_attempt(db, test_id).await?;
    if attempt.user_id != user_id {
        return Err(AppError::AccessDenied(
            "Test attempt belongs to another user".to_string(),
        ));
    }

    let importance = competency_importance(db, competency_id, attempt.specialization_id).await?;
    if importance < threshold {
        return Err(AppError::Validation(format!(
            "Competency {} is below the self-assessment importance threshold",
            competency_id
        )));
    }

    sqlx::query(
        "INSERT INTO competency_self_assessments (user_test_id, user_id, competency_id, self_rating)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (user_test_id, competency_id)
         DO UPDATE SET self_rating = excluded.self_rating, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(test_id)
    .bind(user_id)
    .bind(competency_id)
    .bind(rating)
    .execute(db)
    .await?;

    info!(test_id, competency_id, rating, "Recorded self-assessment");
    Ok(())
}

/// Upserts one manager rating. Managers may only rate employees inside their
/// own department unless they hold the all-results permission.
#[instrument(skip(db, manager))]
pub async fn submit_manager_rating(
    db: &Pool<Sqlite>,
    manager: &User,
    test_id: i64,
    competency_id: i64,
    rating: i64,
) -> Result<(), AppError> {
    check_rating_range(rating)?;

    let attempt = get_attempt(db, test_id).await?;
    if attempt.user_id == manager.id {
        return Err(AppError::Validation(
            "Managers cannot rate their own attempt".to_string(),
        ));
    }

    let employee = get_user(db, attempt.user_id).await?;
    if !manager.has_permission(Permission::ViewAllResults) {
        let same_department =
            manager.department_id.is_some() && manager.department_id == employee.department_id;
        if !same_department {
            return Err(AppError::AccessDenied(
                "Employee is outside your department".to_string(),
            ));
        }
    }

    competency_importance(db, competency_id, attempt.specialization_id).await?;

    sqlx::query(
        "INSERT INTO manager_competency_ratings
             (employee_id, manager_id, user_test_id, competency_id, rating)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (user_test_id, competency_id, manager_id)
         DO UPDATE SET rating = excluded.rating, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(employee.id)
    .bind(manager.id)
    .bind(test_id)
    .bind(competency_id)
    .bind(rating)
    .execute(db)
    .await?;

    info!(test_id, competency_id, rating, manager_id = manager.id, "Recorded manager rating");
    Ok(())
}

#[derive(Serialize)]
pub struct WeightedScore {
    pub test_id: i64,
    pub test_percentage: f64,
    pub avg_manager_rating: Option<f64>,
    pub avg_self_rating: Option<f64>,
    pub weighted_score: f64,
}

/// The blended score: test percentage plus averaged manager and self ratings,
/// combined with the configured weights. Missing rating components count as
/// zero. For an attempt still in progress the live correct count is used.
#[instrument(skip(db, config))]
pub async fn weighted_score(
    db: &Pool<Sqlite>,
    user: &User,
    test_id: i64,
    config: &ScoringConfig,
) -> Result<WeightedScore, AppError> {
    let attempt = get_attempt(db, test_id).await?;
    let owner = get_user(db, attempt.user_id).await?;
    user.require_result_access(owner.id, owner.department_id)?;

    let score = if attempt.is_completed() {
        attempt.score.unwrap_or_default()
    } else {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM test_answers WHERE user_test_id = ? AND is_correct = TRUE",
        )
        .bind(test_id)
        .fetch_one(db)
        .await?
    };
    let test_percentage = scoring::percentage(score, attempt.max_score);

    let avg_manager_rating = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(rating) FROM manager_competency_ratings WHERE user_test_id = ?",
    )
    .bind(test_id)
    .fetch_one(db)
    .await?;

    let avg_self_rating = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(self_rating) FROM competency_self_assessments WHERE user_test_id = ?",
    )
    .bind(test_id)
    .fetch_one(db)
    .await?;

    Ok(WeightedScore {
        test_id,
        test_percentage,
        avg_manager_rating,
        avg_self_rating,
        weighted_score: config.weighted_score(test_percentage, avg_manager_rating, avg_self_rating),
    })
}

// ---------------------------------------------------------------------------
// Aggregate views

const SUMMARY_SELECT: &str =
    "SELECT t.id AS test_id, u.id AS user_id, u.name, u.surname, u.job_title,
            s.name AS specialization, t.score, t.max_score, t.started_at, t.completed_at
     FROM user_specialization_tests t
     JOIN users u ON u.id = t.user_id
     JOIN specializations s ON s.id = t.specialization_id
     WHERE t.completed_at IS NOT NULL";

/// Completed attempts across the whole company, leveled with the cohort
/// policy.
#[instrument(skip(db))]
pub async fn all_completed_attempts(
    db: &Pool<Sqlite>,
) -> Result<Vec<crate::models::AttemptSummary>, AppError> {
    let rows = sqlx::query_as::<_, DbAttemptSummary>(&format!(
        "{} ORDER BY t.completed_at DESC",
        SUMMARY_SELECT
    ))
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.into_summary(LevelPolicy::Cohort))
        .collect())
}

/// Completed attempts restricted to one department.
#[instrument(skip(db))]
pub async fn department_completed_attempts(
    db: &Pool<Sqlite>,
    department_id: i64,
) -> Result<Vec<crate::models::AttemptSummary>, AppError> {
    let rows = sqlx::query_as::<_, DbAttemptSummary>(&format!(
        "{} AND u.department_id = ? ORDER BY t.completed_at DESC",
        SUMMARY_SELECT
    ))
    .bind(department_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.into_summary(LevelPolicy::Cohort))
        .collect())
}

#[derive(Serialize)]
pub struct CohortStats {
    pub completed_attempts: i64,
    pub average_percentage: f64,
    pub junior_count: i64,
    pub middle_count: i64,
    pub senior_count: i64,
}

#[instrument(skip(db))]
pub async fn cohort_stats(db: &Pool<Sqlite>) -> Result<CohortStats, AppError> {
    let summaries = all_completed_attempts(db).await?;

    let completed_attempts = summaries.len() as i64;
    let average_percentage = if summaries.is_empty() {
        0.0
    } else {
        summaries.iter().map(|s| s.percentage).sum::<f64>() / summaries.len() as f64
    };

    let mut junior_count = 0;
    let mut middle_count = 0;
    let mut senior_count = 0;
    for summary in &summaries {
        match summary.level {
            Level::Junior => junior_count += 1,
            Level::Middle => middle_count += 1,
            Level::Senior => senior_count += 1,
        }
    }

    Ok(CohortStats {
        completed_attempts,
        average_percentage,
        junior_count,
        middle_count,
        senior_count,
    })
}
