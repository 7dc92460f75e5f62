#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod database;
mod db;
mod env;
mod error;
mod generator;
mod models;
mod recommend;
mod scoring;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_complete_test, api_get_my_tests, api_get_results, api_get_specializations,
    api_get_test_questions, api_get_top_competencies, api_get_weighted_score, api_health,
    api_hr_results, api_hr_stats, api_login, api_logout, api_manager_results, api_me,
    api_register, api_start_test, api_submit_answer, api_submit_manager_rating,
    api_submit_self_assessment,
};
use auth::unauthorized_api;
use config::ScoringConfig;
use database::{CURRENT_SCHEMA, sync_schema};
use db::clean_expired_sessions;
use recommend::{Recommender, TemplateRecommender};
use rocket::{Build, Rocket, tokio};
use rocket::fairing::AdHoc;
use telemetry::{TelemetryFairing, init_telemetry, shutdown_telemetry};

use sqlx::SqlitePool;
use tracing::info;

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_telemetry();

    let config = ScoringConfig::from_env().expect("Invalid scoring configuration");

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();
    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Synchronizing database schema...");
    sync_schema(pool.clone(), CURRENT_SCHEMA, false)
        .await
        .expect("Database schema sync failed");

    let pool_clone = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    init_rocket(pool, config, Box::new(TemplateRecommender))
}

pub fn init_rocket(
    pool: SqlitePool,
    config: ScoringConfig,
    recommender: Box<dyn Recommender>,
) -> Rocket<Build> {
    info!("Starting competency portal");

    rocket::build()
        .manage(pool)
        .manage(config)
        .manage(recommender)
        .mount(
            "/api",
            routes![
                api_login,
                api_register,
                api_logout,
                api_me,
                api_get_specializations,
                api_get_my_tests,
                api_start_test,
                api_get_test_questions,
                api_submit_answer,
                api_complete_test,
                api_get_results,
                api_get_top_competencies,
                api_submit_self_assessment,
                api_submit_manager_rating,
                api_get_weighted_score,
                api_hr_results,
                api_hr_stats,
                api_manager_results,
                api_health,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async {
                shutdown_telemetry();
            })
        }))
}
