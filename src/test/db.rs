#[cfg(test)]
mod tests {
    use crate::config::ScoringConfig;
    use crate::db::{
        complete_test, get_assigned_topics, get_attempt_questions, get_recommendation, get_results,
        start_test, submit_answer,
    };
    use crate::error::AppError;
    use crate::models::Level;
    use crate::recommend::TemplateRecommender;
    use crate::test::utils::test_db::TestDbBuilder;
    use crate::test::utils::test_utils::{EMPLOYEE_PHONE, MANAGER_PHONE, create_standard_test_db};
    use rocket::tokio;

    #[tokio::test]
    async fn test_start_test_assigns_topics_and_fixes_max_score() {
        let test_db = create_standard_test_db().await;
        let config = ScoringConfig::default();
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let specialization_id = test_db.specialization_id("Backend");

        let attempt = start_test(&test_db.pool, user_id, specialization_id, &config)
            .await
            .expect("Failed to start test");

        // Two topics with one question per level each.
        assert_eq!(attempt.max_score, 6);
        assert_eq!(attempt.current_question_number, 0);
        assert_eq!(attempt.score, None);
        assert!(!attempt.is_completed());
        assert_eq!(attempt.time_limit_minutes, config.time_limit_minutes);

        let topics = get_assigned_topics(&test_db.pool, attempt.id)
            .await
            .expect("Failed to load assigned topics");
        assert_eq!(topics.len(), 2);
        let orders: Vec<i64> = topics.iter().map(|t| t.topic_order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_start_test_is_idempotent() {
        let test_db = create_standard_test_db().await;
        let config = ScoringConfig::default();
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let specialization_id = test_db.specialization_id("Backend");

        let first = start_test(&test_db.pool, user_id, specialization_id, &config)
            .await
            .expect("Failed to start test");
        let second = start_test(&test_db.pool, user_id, specialization_id, &config)
            .await
            .expect("Failed to restart test");

        assert_eq!(first.id, second.id);
        assert_eq!(first.max_score, second.max_score);

        let attempt_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_specialization_tests WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&test_db.pool)
        .await
        .expect("Failed to count attempts");
        assert_eq!(attempt_count, 1);
    }

    #[tokio::test]
    async fn test_start_test_rejects_empty_specialization() {
        let test_db = TestDbBuilder::new()
            .employee("+15550001111", "Erin", None)
            .specialization("Empty")
            .build()
            .await
            .expect("Failed to build test database");

        let result = start_test(
            &test_db.pool,
            test_db.user_id("+15550001111"),
            test_db.specialization_id("Empty"),
            &ScoringConfig::default(),
        )
        .await;

        match result {
            Err(AppError::Validation(_)) => {}
            other => panic!("Expected validation error, got {:?}", other.map(|a| a.id)),
        }
    }

    #[tokio::test]
    async fn test_submit_answer_records_verdict_and_advances_counter() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let attempt = start_test(
            &test_db.pool,
            user_id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");

        let correct = submit_answer(
            &test_db.pool,
            user_id,
            attempt.id,
            test_db.question_id("Indexes", Level::Junior),
            1,
        )
        .await
        .expect("Failed to submit answer");
        assert!(correct.is_correct);
        assert!(!correct.already_answered);
        assert_eq!(correct.current_question_number, 1);

        let wrong = submit_answer(
            &test_db.pool,
            user_id,
            attempt.id,
            test_db.question_id("Indexes", Level::Middle),
            2,
        )
        .await
        .expect("Failed to submit answer");
        assert!(!wrong.is_correct);
        assert_eq!(wrong.current_question_number, 2);
    }

    #[tokio::test]
    async fn test_duplicate_answer_keeps_first_verdict_and_counter() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let attempt = start_test(
            &test_db.pool,
            user_id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");
        let question_id = test_db.question_id("TCP", Level::Junior);

        let first = submit_answer(&test_db.pool, user_id, attempt.id, question_id, 2)
            .await
            .expect("Failed to submit answer");
        assert!(!first.is_correct);
        assert_eq!(first.current_question_number, 1);

        // Resubmitting with the correct option must not overwrite the stored
        // verdict nor move the progress counter.
        let duplicate = submit_answer(&test_db.pool, user_id, attempt.id, question_id, 1)
            .await
            .expect("Failed to resubmit answer");
        assert!(duplicate.already_answered);
        assert!(!duplicate.is_correct);
        assert_eq!(duplicate.current_question_number, 1);

        let stored_answer = sqlx::query_scalar::<_, i64>(
            "SELECT user_answer FROM test_answers WHERE user_test_id = ? AND question_id = ?",
        )
        .bind(attempt.id)
        .bind(question_id)
        .fetch_one(&test_db.pool)
        .await
        .expect("Failed to read stored answer");
        assert_eq!(stored_answer, 2);
    }

    #[tokio::test]
    async fn test_submit_answer_rejects_bad_input() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let attempt = start_test(
            &test_db.pool,
            user_id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");
        let question_id = test_db.question_id("Indexes", Level::Junior);

        for out_of_range in [0, 5] {
            let result =
                submit_answer(&test_db.pool, user_id, attempt.id, question_id, out_of_range).await;
            assert!(
                matches!(result, Err(AppError::Validation(_))),
                "Answer {} should be rejected",
                out_of_range
            );
        }

        let unknown = submit_answer(&test_db.pool, user_id, attempt.id, 99999, 1).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        let manager_id = test_db.user_id(MANAGER_PHONE);
        let foreign = submit_answer(&test_db.pool, manager_id, attempt.id, question_id, 1).await;
        assert!(matches!(foreign, Err(AppError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_complete_test_scores_once() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let attempt = start_test(
            &test_db.pool,
            user_id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");

        // Four correct answers out of a possible six.
        for (topic, level, answer) in [
            ("Indexes", Level::Junior, 1),
            ("Indexes", Level::Middle, 1),
            ("Indexes", Level::Senior, 3),
            ("TCP", Level::Junior, 1),
            ("TCP", Level::Middle, 1),
        ] {
            submit_answer(
                &test_db.pool,
                user_id,
                attempt.id,
                test_db.question_id(topic, level),
                answer,
            )
            .await
            .expect("Failed to submit answer");
        }

        let completed = complete_test(&test_db.pool, user_id, attempt.id, &TemplateRecommender)
            .await
            .expect("Failed to complete test");
        assert_eq!(completed.score, 4);
        assert_eq!(completed.max_score, 6);
        assert_eq!(completed.level, Level::Middle);
        assert!(!completed.recommendation.is_empty());

        let recommendation = get_recommendation(&test_db.pool, attempt.id)
            .await
            .expect("Failed to read recommendation")
            .expect("Recommendation was not stored");
        assert_eq!(recommendation.recommendation_text, completed.recommendation);

        // A late answer never changes the stored score.
        submit_answer(
            &test_db.pool,
            user_id,
            attempt.id,
            test_db.question_id("TCP", Level::Senior),
            1,
        )
        .await
        .expect("Failed to submit late answer");

        let again = complete_test(&test_db.pool, user_id, attempt.id, &TemplateRecommender)
            .await
            .expect("Failed to re-complete test");
        assert_eq!(again.score, 4);
        assert_eq!(again.recommendation, completed.recommendation);
    }

    #[tokio::test]
    async fn test_complete_test_requires_ownership() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(EMPLOYEE_PHONE);
        let attempt = start_test(
            &test_db.pool,
            user_id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");

        let manager_id = test_db.user_id(MANAGER_PHONE);
        let result =
            complete_test(&test_db.pool, manager_id, attempt.id, &TemplateRecommender).await;
        assert!(matches!(result, Err(AppError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_attempt_questions_follow_topic_then_level_order() {
        let test_db = create_standard_test_db().await;
        let user = test_db.user(EMPLOYEE_PHONE).await;
        let attempt = start_test(
            &test_db.pool,
            user.id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");

        let progress = get_attempt_questions(&test_db.pool, &user, attempt.id)
            .await
            .expect("Failed to load questions");
        assert_eq!(progress.questions.len(), 6);
        assert_eq!(progress.answered, 0);
        assert!(!progress.completed);

        let ordering: Vec<(i64, Level)> = progress
            .questions
            .iter()
            .map(|q| (q.topic_order, q.level))
            .collect();
        let mut sorted = ordering.clone();
        sorted.sort();
        assert_eq!(ordering, sorted, "Questions must be grouped by topic order then level");
    }

    #[tokio::test]
    async fn test_results_include_breakdown_and_recommendation() {
        let test_db = create_standard_test_db().await;
        let user = test_db.user(EMPLOYEE_PHONE).await;
        let attempt = start_test(
            &test_db.pool,
            user.id,
            test_db.specialization_id("Backend"),
            &ScoringConfig::default(),
        )
        .await
        .expect("Failed to start test");

        submit_answer(
            &test_db.pool,
            user.id,
            attempt.id,
            test_db.question_id("Indexes", Level::Junior),
            1,
        )
        .await
        .expect("Failed to submit answer");
        complete_test(&test_db.pool, user.id, attempt.id, &TemplateRecommender)
            .await
            .expect("Failed to complete test");

        let results = get_results(&test_db.pool, &user, attempt.id)
            .await
            .expect("Failed to load results");
        assert!(results.completed);
        assert_eq!(results.score, 1);
        assert_eq!(results.max_score, 6);
        assert_eq!(results.questions.len(), 6);
        assert!(results.recommendation.is_some());
        assert_eq!(
            results
                .questions
                .iter()
                .filter(|q| q.is_correct == Some(true))
                .count(),
            1
        );
    }
}
