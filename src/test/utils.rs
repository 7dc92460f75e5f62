#[cfg(test)]
pub mod test_db {
    use crate::auth::{Role, User};
    use crate::database::{CURRENT_SCHEMA, sync_schema};
    use crate::db::{
        create_competency, create_question, create_specialization, create_topic, create_user,
        get_user,
    };
    use crate::error::AppError;
    use crate::models::Level;
    use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub struct TestUser {
        pub phone: String,
        pub name: String,
        pub role: Role,
        pub department: Option<String>,
    }

    pub struct TestCompetency {
        pub specialization: String,
        pub name: String,
        pub importance: i64,
    }

    pub struct TestTopic {
        pub competency: String,
        pub name: String,
    }

    pub struct TestQuestion {
        pub topic: String,
        pub level: Level,
        pub correct_answer: i64,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        departments: Vec<String>,
        users: Vec<TestUser>,
        specializations: Vec<String>,
        competencies: Vec<TestCompetency>,
        topics: Vec<TestTopic>,
        questions: Vec<TestQuestion>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn department(mut self, name: &str) -> Self {
            self.departments.push(name.to_string());
            self
        }

        pub fn user(mut self, phone: &str, name: &str, role: Role, department: Option<&str>) -> Self {
            self.users.push(TestUser {
                phone: phone.to_string(),
                name: name.to_string(),
                role,
                department: department.map(String::from),
            });
            self
        }

        pub fn employee(self, phone: &str, name: &str, department: Option<&str>) -> Self {
            self.user(phone, name, Role::Employee, department)
        }

        pub fn manager(self, phone: &str, name: &str, department: Option<&str>) -> Self {
            self.user(phone, name, Role::Manager, department)
        }

        pub fn hr(self, phone: &str, name: &str) -> Self {
            self.user(phone, name, Role::Hr, None)
        }

        pub fn specialization(mut self, name: &str) -> Self {
            self.specializations.push(name.to_string());
            self
        }

        pub fn competency(mut self, specialization: &str, name: &str, importance: i64) -> Self {
            self.competencies.push(TestCompetency {
                specialization: specialization.to_string(),
                name: name.to_string(),
                importance,
            });
            self
        }

        pub fn topic(mut self, competency: &str, name: &str) -> Self {
            self.topics.push(TestTopic {
                competency: competency.to_string(),
                name: name.to_string(),
            });
            self
        }

        pub fn question(mut self, topic: &str, level: Level, correct_answer: i64) -> Self {
            self.questions.push(TestQuestion {
                topic: topic.to_string(),
                level,
                correct_answer,
            });
            self
        }

        /// A topic with one question per level, correct answer always 1.
        pub fn leveled_topic(self, competency: &str, name: &str) -> Self {
            self.topic(competency, name)
                .question(name, Level::Junior, 1)
                .question(name, Level::Middle, 1)
                .question(name, Level::Senior, 1)
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            // A single connection keeps every handle on the same in-memory
            // database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            sync_schema(pool.clone(), CURRENT_SCHEMA, false).await?;

            let mut department_ids = HashMap::new();
            for name in &self.departments {
                let result = sqlx::query("INSERT INTO departments (name) VALUES (?)")
                    .bind(name)
                    .execute(&pool)
                    .await?;
                department_ids.insert(name.clone(), result.last_insert_rowid());
            }

            let mut user_ids = HashMap::new();
            for user in &self.users {
                let department_id = user
                    .department
                    .as_ref()
                    .and_then(|name| department_ids.get(name).copied());
                let created = create_user(
                    &pool,
                    &user.name,
                    "Tester",
                    &user.phone,
                    "Test Co",
                    "Engineer",
                    user.role.clone(),
                    department_id,
                )
                .await?;
                user_ids.insert(user.phone.clone(), created.id);
            }

            let mut specialization_ids = HashMap::new();
            for name in &self.specializations {
                let created = create_specialization(&pool, name).await?;
                specialization_ids.insert(name.clone(), created.id);
            }

            let mut competency_ids = HashMap::new();
            for competency in &self.competencies {
                let specialization_id = specialization_ids[&competency.specialization];
                let created =
                    create_competency(&pool, specialization_id, &competency.name, competency.importance)
                        .await?;
                competency_ids.insert(competency.name.clone(), created.id);
            }

            let mut topic_ids = HashMap::new();
            for topic in &self.topics {
                let competency_id = competency_ids[&topic.competency];
                let id = create_topic(&pool, competency_id, &topic.name).await?;
                topic_ids.insert(topic.name.clone(), id);
            }

            let mut question_ids = HashMap::new();
            for question in &self.questions {
                let topic_id = topic_ids[&question.topic];
                let options = [
                    "Option 1".to_string(),
                    "Option 2".to_string(),
                    "Option 3".to_string(),
                    "Option 4".to_string(),
                ];
                let id = create_question(
                    &pool,
                    topic_id,
                    question.level,
                    &format!("{} {} question", question.topic, question.level),
                    &options,
                    question.correct_answer,
                )
                .await?;
                question_ids.insert(
                    (question.topic.clone(), question.level.as_str().to_string()),
                    id,
                );
            }

            Ok(TestDb {
                pool,
                department_ids,
                user_ids,
                specialization_ids,
                competency_ids,
                topic_ids,
                question_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub department_ids: HashMap<String, i64>,
        pub user_ids: HashMap<String, i64>,
        pub specialization_ids: HashMap<String, i64>,
        pub competency_ids: HashMap<String, i64>,
        pub topic_ids: HashMap<String, i64>,
        pub question_ids: HashMap<(String, String), i64>,
    }

    impl TestDb {
        pub fn user_id(&self, phone: &str) -> i64 {
            self.user_ids[phone]
        }

        pub async fn user(&self, phone: &str) -> User {
            get_user(&self.pool, self.user_id(phone))
                .await
                .expect("Seeded user missing")
        }

        pub fn specialization_id(&self, name: &str) -> i64 {
            self.specialization_ids[name]
        }

        pub fn competency_id(&self, name: &str) -> i64 {
            self.competency_ids[name]
        }

        pub fn question_id(&self, topic: &str, level: crate::models::Level) -> i64 {
            self.question_ids[&(topic.to_string(), level.as_str().to_string())]
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::test_db::{TestDb, TestDbBuilder};
    use crate::config::ScoringConfig;
    use crate::init_rocket;
    use crate::recommend::TemplateRecommender;
    use rocket::http::{ContentType, Header};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    pub const EMPLOYEE_PHONE: &str = "+10000000001";
    pub const MANAGER_PHONE: &str = "+10000000002";
    pub const HR_PHONE: &str = "+10000000003";
    pub const OUTSIDER_PHONE: &str = "+10000000004";

    /// One department, one specialization with two competencies of different
    /// importance, each competency with one fully leveled topic.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .department("Engineering")
            .department("Finance")
            .employee(EMPLOYEE_PHONE, "Erin", Some("Engineering"))
            .manager(MANAGER_PHONE, "Morgan", Some("Engineering"))
            .hr(HR_PHONE, "Harper")
            .manager(OUTSIDER_PHONE, "Oakley", Some("Finance"))
            .specialization("Backend")
            .competency("Backend", "Databases", 80)
            .competency("Backend", "Networking", 40)
            .leveled_topic("Databases", "Indexes")
            .leveled_topic("Networking", "TCP")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(
            test_db.pool.clone(),
            ScoringConfig::default(),
            Box::new(TemplateRecommender),
        );
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build test client");
        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, phone: &str) -> String {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "phone": phone }).to_string())
            .dispatch()
            .await;
        let body: serde_json::Value =
            serde_json::from_str(&response.into_string().await.expect("Empty login body"))
                .expect("Login response was not JSON");
        body["token"]
            .as_str()
            .expect("Login response had no token")
            .to_string()
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }
}
