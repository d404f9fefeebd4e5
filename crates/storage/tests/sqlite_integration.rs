use std::collections::BTreeMap;

use chrono::Duration;
use tryout_core::model::{
    Answer, AttemptStatus, LearnerId, Package, PackageId, Question, QuestionId, Section,
    SectionId, SessionId, TryoutSession,
};
use tryout_core::time::fixed_now;
use storage::repository::{
    AnswerRepository, AttemptRepository, NewAttemptRecord, PackageRepository,
    QuestionRepository, SectionRepository, SessionRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn seed_catalog(repo: &SqliteRepository) -> (PackageId, SessionId) {
    let now = fixed_now();
    let package_id = PackageId::new(1);
    let package = Package::new(package_id, "UTBK Saintek", None, now).unwrap();
    repo.upsert_package(&package).await.unwrap();

    let session_id = SessionId::new(1);
    let session = TryoutSession::new(
        session_id,
        "May Tryout",
        package_id,
        now - Duration::hours(1),
        now + Duration::hours(1),
    )
    .unwrap();
    repo.upsert_session(&session).await.unwrap();

    (package_id, session_id)
}

#[tokio::test]
async fn sections_and_questions_come_back_ordered() {
    let repo = connect("memdb_ordering").await;
    let (package_id, _) = seed_catalog(&repo).await;
    let now = fixed_now();

    for (id, order) in [(1_u64, 3_u32), (2, 1), (3, 2)] {
        let section = Section::new(
            SectionId::new(id),
            package_id,
            format!("Section {id}"),
            10,
            order,
        )
        .unwrap();
        repo.upsert_section(&section).await.unwrap();
    }

    let sections = repo.sections_for_package(package_id).await.unwrap();
    let orders: Vec<u32> = sections.iter().map(Section::order_index).collect();
    assert_eq!(orders, vec![1, 2, 3]);

    let section_id = sections[0].id();
    for (id, minutes_ago) in [(10_u64, 1_i64), (11, 3), (12, 2)] {
        let question = Question::short_answer(
            QuestionId::new(id),
            section_id,
            format!("Q{id}"),
            "answer",
            now - Duration::minutes(minutes_ago),
        )
        .unwrap();
        repo.upsert_question(&question).await.unwrap();
    }

    let questions = repo.questions_for_section(section_id).await.unwrap();
    let ids: Vec<u64> = questions.iter().map(|q| q.id().value()).collect();
    assert_eq!(ids, vec![11, 12, 10]);
}

#[tokio::test]
async fn question_options_round_trip_as_json() {
    let repo = connect("memdb_options").await;
    let (package_id, _) = seed_catalog(&repo).await;

    let section = Section::new(SectionId::new(1), package_id, "Math", 30, 1).unwrap();
    repo.upsert_section(&section).await.unwrap();

    let options = BTreeMap::from([
        ("A".to_string(), "3".to_string()),
        ("B".to_string(), "4".to_string()),
        ("C".to_string(), "5".to_string()),
    ]);
    let question = Question::multiple_choice(
        QuestionId::new(1),
        section.id(),
        "2 + 2 = ?",
        options.clone(),
        "B",
        fixed_now(),
    )
    .unwrap();
    repo.upsert_question(&question).await.unwrap();

    let fetched = repo.questions_for_section(section.id()).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].options(), Some(&options));
    assert_eq!(fetched[0].correct_answer(), "B");
}

#[tokio::test]
async fn attempt_lifecycle_persists_status_and_score() {
    let repo = connect("memdb_attempts").await;
    let (package_id, session_id) = seed_catalog(&repo).await;

    let new = NewAttemptRecord {
        learner_id: LearnerId::random(),
        package_id,
        session_id,
        created_at: fixed_now(),
    };
    let attempt = repo.insert_attempt(&new).await.unwrap();
    assert_eq!(attempt.status(), AttemptStatus::InProgress);

    repo.set_status(attempt.id(), AttemptStatus::Completed)
        .await
        .unwrap();
    let completed = repo.completed_for_session(session_id).await.unwrap();
    assert_eq!(completed.len(), 1);

    repo.record_score(attempt.id(), 750).await.unwrap();
    let scored = repo.get_attempt(attempt.id()).await.unwrap();
    assert_eq!(scored.status(), AttemptStatus::Scored);
    assert_eq!(scored.final_score(), Some(750));

    // Scored attempts no longer match the completed filter.
    let completed = repo.completed_for_session(session_id).await.unwrap();
    assert!(completed.is_empty());
}

#[tokio::test]
async fn answer_upsert_keeps_one_row_per_question() {
    let repo = connect("memdb_answers").await;
    let (package_id, session_id) = seed_catalog(&repo).await;

    let section = Section::new(SectionId::new(1), package_id, "Math", 30, 1).unwrap();
    repo.upsert_section(&section).await.unwrap();
    let question = Question::short_answer(
        QuestionId::new(1),
        section.id(),
        "Velocity formula?",
        "v = s/t",
        fixed_now(),
    )
    .unwrap();
    repo.upsert_question(&question).await.unwrap();

    let new = NewAttemptRecord {
        learner_id: LearnerId::random(),
        package_id,
        session_id,
        created_at: fixed_now(),
    };
    let attempt = repo.insert_attempt(&new).await.unwrap();

    let mut answer = Answer::blank(attempt.id(), question.id());
    answer.set_text("v");
    repo.upsert_answer(&answer).await.unwrap();
    answer.toggle_flag();
    answer.set_text("w");
    repo.upsert_answer(&answer).await.unwrap();

    let answers = repo.answers_for_attempt(attempt.id()).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].text(), Some("w"));
    assert!(answers[0].is_flagged());
}

#[tokio::test]
async fn open_session_listing_excludes_ended_and_inactive() {
    let repo = connect("memdb_open_sessions").await;
    let now = fixed_now();

    let package = Package::new(PackageId::new(1), "Bundle", None, now).unwrap();
    repo.upsert_package(&package).await.unwrap();

    let open = TryoutSession::new(
        SessionId::new(1),
        "Open",
        package.id(),
        now - Duration::hours(1),
        now + Duration::hours(1),
    )
    .unwrap();
    let ended = TryoutSession::new(
        SessionId::new(2),
        "Ended",
        package.id(),
        now - Duration::hours(3),
        now - Duration::hours(2),
    )
    .unwrap();
    let mut inactive = TryoutSession::new(
        SessionId::new(3),
        "Inactive",
        package.id(),
        now - Duration::hours(1),
        now + Duration::hours(1),
    )
    .unwrap();
    inactive.set_active(false);

    for session in [&open, &ended, &inactive] {
        repo.upsert_session(session).await.unwrap();
    }

    let listed = repo.list_open_sessions(now).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), open.id());
}
