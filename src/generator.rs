use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Level;

pub const MAX_TOPICS_PER_TEST: usize = 8;
pub const QUESTIONS_PER_TOPIC: usize = 3;
pub const MAX_QUESTIONS_PER_TEST: usize = MAX_TOPICS_PER_TEST * QUESTIONS_PER_TOPIC;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicCandidate {
    pub topic_id: i64,
    pub competency_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionCandidate {
    pub question_id: i64,
    pub topic_id: i64,
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedTopic {
    pub topic_id: i64,
    pub competency_id: i64,
    pub topic_order: i64,
    pub question_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct GeneratedTest {
    pub topics: Vec<GeneratedTopic>,
    pub question_count: usize,
}

/// Assembles a test for one specialization: up to eight random topics, one
/// random question per difficulty level within each topic. Topics without a
/// question at some level simply contribute fewer questions.
#[instrument(skip(db))]
pub async fn generate_test(
    db: &Pool<Sqlite>,
    specialization_id: i64,
) -> Result<GeneratedTest, AppError> {
    let topics = sqlx::query_as::<_, TopicCandidate>(
        "SELECT t.id AS topic_id, t.competency_id
         FROM topics t
         JOIN competencies c ON c.id = t.competency_id
         WHERE c.specialization_id = ?",
    )
    .bind(specialization_id)
    .fetch_all(db)
    .await?;

    let questions = sqlx::query_as::<_, QuestionCandidate>(
        "SELECT q.id AS question_id, q.topic_id, q.level
         FROM questions q
         JOIN topics t ON t.id = q.topic_id
         JOIN competencies c ON c.id = t.competency_id
         WHERE c.specialization_id = ?",
    )
    .bind(specialization_id)
    .fetch_all(db)
    .await?;

    let generated = assemble(topics, &questions, &mut rand::rng());
    info!(
        specialization_id,
        topic_count = generated.topics.len(),
        question_count = generated.question_count,
        "Generated test"
    );
    Ok(generated)
}

/// Pure selection step, split out so randomized picking stays testable with a
/// seeded rng. Topic order is the shuffled draw order and is preserved in the
/// output; topics that have no questions at all are dropped.
pub fn assemble(
    mut topics: Vec<TopicCandidate>,
    questions: &[QuestionCandidate],
    rng: &mut impl Rng,
) -> GeneratedTest {
    topics.shuffle(rng);
    topics.truncate(MAX_TOPICS_PER_TEST);

    let mut generated = Vec::new();
    let mut question_count = 0;
    let mut topic_order = 0;

    for topic in topics {
        let mut question_ids = Vec::new();
        for level in [Level::Junior, Level::Middle, Level::Senior] {
            if question_count + question_ids.len() >= MAX_QUESTIONS_PER_TEST {
                break;
            }
            let pool: Vec<i64> = questions
                .iter()
                .filter(|q| q.topic_id == topic.topic_id && q.level == level.as_str())
                .map(|q| q.question_id)
                .collect();
            if let Some(id) = pool.choose(rng) {
                question_ids.push(*id);
            }
        }

        if question_ids.is_empty() {
            continue;
        }

        question_count += question_ids.len();
        generated.push(GeneratedTopic {
            topic_id: topic.topic_id,
            competency_id: topic.competency_id,
            topic_order,
            question_ids,
        });
        topic_order += 1;
    }

    GeneratedTest {
        topics: generated,
        question_count,
    }
}
