use rocket::State;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, Role, SessionToken, User};
use crate::config::ScoringConfig;
use crate::db::{
    self, AnswerOutcome, AttemptProgress, CohortStats, CompletedTest, TestResults, WeightedScore,
};
use crate::error::AppError;
use crate::models::{AttemptSummary, Competency, Specialization, TestAttempt};
use crate::recommend::Recommender;
use crate::validation::ValidateExt;

#[derive(Serialize)]
pub struct UserData {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub company: String,
    pub job_title: String,
    pub role: String,
    pub department_id: Option<i64>,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            surname: user.surname,
            phone: user.phone,
            company: user.company,
            job_title: user.job_title,
            role: user.role.to_string(),
            department_id: user.department_id,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 5, max = 20, message = "Phone must be 5 to 20 characters"))]
    phone: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserData,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, AppError> {
    login.validate_app()?;

    let user = db::find_user_by_phone(db, &login.phone).await?;
    let session = db::create_user_session(db, user.id).await?;

    Ok(Json(LoginResponse {
        token: session.token,
        user: user.into(),
    }))
}

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    name: String,
    #[validate(length(min = 1, max = 100, message = "Surname is required"))]
    surname: String,
    #[validate(length(min = 5, max = 20, message = "Phone must be 5 to 20 characters"))]
    phone: String,
    #[validate(length(max = 200, message = "Company name is too long"))]
    company: String,
    #[validate(length(max = 200, message = "Job title is too long"))]
    job_title: String,
}

#[post("/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegisterRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, AppError> {
    registration.validate_app()?;

    let user = db::create_user(
        db,
        &registration.name,
        &registration.surname,
        &registration.phone,
        &registration.company,
        &registration.job_title,
        Role::Employee,
        None,
    )
    .await?;
    let session = db::create_user_session(db, user.id).await?;

    Ok(Json(LoginResponse {
        token: session.token,
        user: user.into(),
    }))
}

#[post("/logout")]
pub async fn api_logout(
    _user: User,
    token: SessionToken,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<serde_json::Value>, AppError> {
    db::invalidate_session(db, &token.0).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(user.into())
}

#[get("/specializations")]
pub async fn api_get_specializations(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Specialization>>, AppError> {
    Ok(Json(db::get_specializations(db).await?))
}

#[get("/my-tests")]
pub async fn api_get_my_tests(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<TestAttempt>>, AppError> {
    Ok(Json(db::get_user_attempts(db, user.id).await?))
}

#[derive(Deserialize)]
pub struct StartTestRequest {
    specialization_id: i64,
}

#[post("/start-test", data = "<request>")]
pub async fn api_start_test(
    request: Json<StartTestRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<ScoringConfig>,
) -> Result<Json<TestAttempt>, AppError> {
    user.require_permission(Permission::TakeTests)?;
    let attempt = db::start_test(db, user.id, request.specialization_id, config).await?;
    Ok(Json(attempt))
}

#[get("/test/<test_id>/questions")]
pub async fn api_get_test_questions(
    test_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AttemptProgress>, AppError> {
    Ok(Json(db::get_attempt_questions(db, &user, test_id).await?))
}

#[derive(Deserialize)]
pub struct SubmitAnswerRequest {
    test_id: i64,
    question_id: i64,
    answer: i64,
}

#[post("/submit-answer", data = "<request>")]
pub async fn api_submit_answer(
    request: Json<SubmitAnswerRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AnswerOutcome>, AppError> {
    let outcome = db::submit_answer(
        db,
        user.id,
        request.test_id,
        request.question_id,
        request.answer,
    )
    .await?;
    Ok(Json(outcome))
}

#[post("/complete-test/<test_id>")]
pub async fn api_complete_test(
    test_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    recommender: &State<Box<dyn Recommender>>,
) -> Result<Json<CompletedTest>, AppError> {
    let completed = db::complete_test(db, user.id, test_id, recommender.inner().as_ref()).await?;
    Ok(Json(completed))
}

#[get("/results/<test_id>")]
pub async fn api_get_results(
    test_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TestResults>, AppError> {
    Ok(Json(db::get_results(db, &user, test_id).await?))
}

#[get("/test/<test_id>/top-competencies")]
pub async fn api_get_top_competencies(
    test_id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<ScoringConfig>,
) -> Result<Json<Vec<Competency>>, AppError> {
    let competencies =
        db::get_top_competencies(db, test_id, config.top_competency_threshold).await?;
    Ok(Json(competencies))
}

#[derive(Deserialize)]
pub struct RatingRequest {
    competency_id: i64,
    rating: i64,
}

#[post("/test/<test_id>/self-assessment", data = "<request>")]
pub async fn api_submit_self_assessment(
    test_id: i64,
    request: Json<RatingRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<ScoringConfig>,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_permission(Permission::SubmitSelfAssessment)?;
    db::submit_self_assessment(
        db,
        user.id,
        test_id,
        request.competency_id,
        request.rating,
        config.top_competency_threshold,
    )
    .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[post("/test/<test_id>/manager-rating", data = "<request>")]
pub async fn api_submit_manager_rating(
    test_id: i64,
    request: Json<RatingRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_permission(Permission::RateEmployees)?;
    db::submit_manager_rating(db, &user, test_id, request.competency_id, request.rating).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[get("/test/<test_id>/weighted-score")]
pub async fn api_get_weighted_score(
    test_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<ScoringConfig>,
) -> Result<Json<WeightedScore>, AppError> {
    Ok(Json(db::weighted_score(db, &user, test_id, config).await?))
}

#[get("/hr/results")]
pub async fn api_hr_results(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<AttemptSummary>>, AppError> {
    user.require_permission(Permission::ViewAllResults)?;
    Ok(Json(db::all_completed_attempts(db).await?))
}

#[get("/hr/stats")]
pub async fn api_hr_stats(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CohortStats>, AppError> {
    user.require_permission(Permission::ViewAllResults)?;
    Ok(Json(db::cohort_stats(db).await?))
}

#[get("/manager/results")]
pub async fn api_manager_results(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<AttemptSummary>>, AppError> {
    user.require_permission(Permission::ViewDepartmentResults)?;
    let department_id = user.department_id.ok_or_else(|| {
        AppError::Validation("Your account is not assigned to a department".to_string())
    })?;
    Ok(Json(db::department_completed_attempts(db, department_id).await?))
}

#[get("/health")]
pub async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
