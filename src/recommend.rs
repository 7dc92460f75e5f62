use crate::error::AppError;
use crate::models::Level;

/// Text stored when the recommendation producer fails. Completion must never
/// fail because of it.
pub const FALLBACK_RECOMMENDATION: &str =
    "Recommendation unavailable. Please contact your HR partner for a personal development plan.";

pub struct RecommendationContext {
    pub employee_name: String,
    pub specialization: String,
    pub score: i64,
    pub max_score: i64,
    pub level: Level,
}

/// Produces the development recommendation stored once per completed attempt.
/// The default implementation is a template; an external text service can be
/// swapped in behind this trait without touching the completion flow.
pub trait Recommender: Send + Sync {
    fn recommend(&self, ctx: &RecommendationContext) -> Result<String, AppError>;
}

pub struct TemplateRecommender;

impl Recommender for TemplateRecommender {
    fn recommend(&self, ctx: &RecommendationContext) -> Result<String, AppError> {
        let advice = match ctx.level {
            Level::Junior => {
                "Focus on closing fundamentals first: review the topics answered incorrectly and \
                 schedule regular practice with a mentor from your team."
            }
            Level::Middle => {
                "Strengthen the weaker competency areas and take on tasks that stretch them; a \
                 targeted course for the lowest-scoring topics is a good next step."
            }
            Level::Senior => {
                "Keep depth sharp and invest in breadth: mentoring colleagues and leading design \
                 reviews are the most effective growth levers at this level."
            }
        };
        Ok(format!(
            "{}, you scored {}/{} on the {} assessment ({} level). {}",
            ctx.employee_name, ctx.score, ctx.max_score, ctx.specialization, ctx.level, advice
        ))
    }
}
