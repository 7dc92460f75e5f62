pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS departments (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    surname TEXT NOT NULL,
    phone TEXT NOT NULL UNIQUE,
    company TEXT,
    job_title TEXT,
    role TEXT NOT NULL DEFAULT 'employee',
    department_id INTEGER,
    registered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (department_id) REFERENCES departments (id)
);

CREATE TABLE IF NOT EXISTS user_sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at TIMESTAMP NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS specializations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS competencies (
    id INTEGER PRIMARY KEY,
    specialization_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    importance INTEGER NOT NULL DEFAULT 0 CHECK (importance >= 0 AND importance <= 100),
    FOREIGN KEY (specialization_id) REFERENCES specializations (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY,
    competency_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    FOREIGN KEY (competency_id) REFERENCES competencies (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY,
    topic_id INTEGER NOT NULL,
    level TEXT NOT NULL CHECK (level IN ('Junior', 'Middle', 'Senior')),
    question_text TEXT NOT NULL,
    var_1 TEXT NOT NULL,
    var_2 TEXT NOT NULL,
    var_3 TEXT NOT NULL,
    var_4 TEXT NOT NULL,
    correct_answer INTEGER NOT NULL CHECK (correct_answer >= 1 AND correct_answer <= 4),
    FOREIGN KEY (topic_id) REFERENCES topics (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_specialization_tests (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    specialization_id INTEGER NOT NULL,
    score INTEGER,
    max_score INTEGER NOT NULL DEFAULT 24,
    current_question_number INTEGER NOT NULL DEFAULT 0,
    started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    completed_at TIMESTAMP,
    time_limit_minutes INTEGER NOT NULL DEFAULT 40,
    time_started_at TIMESTAMP,
    time_expired BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (user_id, specialization_id),
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (specialization_id) REFERENCES specializations (id)
);

CREATE TABLE IF NOT EXISTS user_test_topics (
    id INTEGER PRIMARY KEY,
    user_test_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    competency_id INTEGER NOT NULL,
    topic_order INTEGER NOT NULL,
    UNIQUE (user_test_id, topic_id),
    FOREIGN KEY (user_test_id) REFERENCES user_specialization_tests (id) ON DELETE CASCADE,
    FOREIGN KEY (topic_id) REFERENCES topics (id),
    FOREIGN KEY (competency_id) REFERENCES competencies (id)
);

CREATE TABLE IF NOT EXISTS test_answers (
    id INTEGER PRIMARY KEY,
    user_test_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    user_answer INTEGER NOT NULL,
    is_correct BOOLEAN NOT NULL,
    answered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_test_id, question_id),
    FOREIGN KEY (user_test_id) REFERENCES user_specialization_tests (id) ON DELETE CASCADE,
    FOREIGN KEY (question_id) REFERENCES questions (id)
);

CREATE TABLE IF NOT EXISTS competency_self_assessments (
    id INTEGER PRIMARY KEY,
    user_test_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    competency_id INTEGER NOT NULL,
    self_rating INTEGER NOT NULL CHECK (self_rating >= 1 AND self_rating <= 10),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_test_id, competency_id),
    FOREIGN KEY (user_test_id) REFERENCES user_specialization_tests (id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (competency_id) REFERENCES competencies (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS manager_competency_ratings (
    id INTEGER PRIMARY KEY,
    employee_id INTEGER NOT NULL,
    manager_id INTEGER NOT NULL,
    user_test_id INTEGER NOT NULL,
    competency_id INTEGER NOT NULL,
    rating INTEGER NOT NULL CHECK (rating >= 1 AND rating <= 10),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_test_id, competency_id, manager_id),
    FOREIGN KEY (employee_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (manager_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (user_test_id) REFERENCES user_specialization_tests (id) ON DELETE CASCADE,
    FOREIGN KEY (competency_id) REFERENCES competencies (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS ai_recommendations (
    id INTEGER PRIMARY KEY,
    user_test_id INTEGER NOT NULL UNIQUE,
    recommendation_text TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_test_id) REFERENCES user_specialization_tests (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_topics_competency ON topics (competency_id);
CREATE INDEX IF NOT EXISTS idx_questions_topic_level ON questions (topic_id, level);
CREATE INDEX IF NOT EXISTS idx_test_answers_test ON test_answers (user_test_id);
CREATE INDEX IF NOT EXISTS idx_self_assessments_test ON competency_self_assessments (user_test_id);
CREATE INDEX IF NOT EXISTS idx_manager_ratings_test ON manager_competency_ratings (user_test_id);
CREATE INDEX IF NOT EXISTS idx_manager_ratings_manager ON manager_competency_ratings (manager_id);
"#;
