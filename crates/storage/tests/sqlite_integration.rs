use chrono::{Duration, NaiveDate};
use storage::repository::{CourseRepository, GoalRepository, StorageError};
use storage::sqlite::SqliteRepository;
use study_core::model::{
    Certificate, CourseDraft, CourseId, CoursePatch, CourseUpdate, ModuleChange, ModuleDraft,
    ModuleId, ModulePatch, NewCourse, NewModule, StudyGoal,
};
use study_core::time::fixed_now;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn new_course(title: &str) -> NewCourse {
    CourseDraft::new(title)
        .with_module(ModuleDraft::new("Intro", 3, 1, 15))
        .with_module(ModuleDraft::new("Deep dive", 7, 2, 0).completed(true))
        .validate()
        .expect("valid draft")
}

#[tokio::test]
async fn sqlite_roundtrip_preserves_module_fields() {
    let repo = connect("memdb_course_roundtrip").await;

    let created = repo
        .create_course(new_course("Databases"), fixed_now())
        .await
        .expect("create");
    let fetched = repo.get_course(created.id()).await.expect("get");

    assert_eq!(fetched, created);
    assert_eq!(fetched.title(), "Databases");
    let intro = &fetched.modules()[0];
    assert_eq!(
        (intro.title(), intro.lessons(), intro.hours(), intro.minutes(), intro.completed()),
        ("Intro", 3, 1, 15, false)
    );
    assert_eq!(intro.completed_at(), None);
    let deep = &fetched.modules()[1];
    assert!(deep.completed());
    assert_eq!(deep.completed_at(), Some(fixed_now()));
}

#[tokio::test]
async fn sqlite_lists_courses_by_creation_time() {
    let repo = connect("memdb_course_order").await;

    let later = repo
        .create_course(new_course("Later"), fixed_now() + Duration::hours(1))
        .await
        .unwrap();
    let earlier = repo
        .create_course(new_course("Earlier"), fixed_now())
        .await
        .unwrap();

    let ids: Vec<_> = repo
        .list_courses()
        .await
        .unwrap()
        .iter()
        .map(|c| c.id())
        .collect();
    assert_eq!(ids, [earlier.id(), later.id()]);
}

#[tokio::test]
async fn sqlite_toggle_stamps_and_clears_completion() {
    let repo = connect("memdb_course_toggle").await;
    let course = repo
        .create_course(new_course("Networks"), fixed_now())
        .await
        .unwrap();
    let intro = course.modules()[0].id();
    let at = fixed_now() + Duration::days(2);

    repo.toggle_module_completion(course.id(), intro, at)
        .await
        .unwrap();
    let module = repo.get_course(course.id()).await.unwrap().module(intro).cloned().unwrap();
    assert!(module.completed());
    assert_eq!(module.completed_at(), Some(at));

    repo.toggle_module_completion(course.id(), intro, at)
        .await
        .unwrap();
    let module = repo.get_course(course.id()).await.unwrap().module(intro).cloned().unwrap();
    assert!(!module.completed());
    assert_eq!(module.completed_at(), None);

    let missing = repo
        .toggle_module_completion(CourseId::new(999), intro, at)
        .await;
    assert!(matches!(missing, Err(StorageError::NotFound)));
}

#[tokio::test]
async fn sqlite_update_reconciles_modules_and_certificate() {
    let repo = connect("memdb_course_update").await;
    let course = repo
        .create_course(new_course("Compilers"), fixed_now())
        .await
        .unwrap();
    let intro = &course.modules()[0];
    let issued = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

    let update = CourseUpdate {
        patch: CoursePatch {
            title: Some("Compilers II".into()),
            certificate: Some(Some(Certificate::from_persisted(
                "https://example.com/compilers.pdf",
                Some(issued),
            ))),
        },
        modules: Some(vec![
            ModuleChange {
                id: Some(intro.id()),
                module: NewModule {
                    title: "Intro".into(),
                    lessons: 4,
                    hours: 1,
                    minutes: 15,
                    completed: true,
                },
            },
            ModuleChange {
                id: None,
                module: NewModule {
                    title: "Codegen".into(),
                    lessons: 6,
                    hours: 3,
                    minutes: 0,
                    completed: false,
                },
            },
        ]),
    };
    let at = fixed_now() + Duration::hours(5);
    let returned = repo.update_course(course.id(), &update, at).await.unwrap();

    let stored = repo.get_course(course.id()).await.unwrap();
    assert_eq!(returned, stored);
    assert_eq!(stored.title(), "Compilers II");
    let certificate = stored.certificate().unwrap();
    assert_eq!(certificate.url(), "https://example.com/compilers.pdf");
    assert_eq!(certificate.issued_at(), Some(issued));

    let titles: Vec<_> = stored.modules().iter().map(|m| m.title()).collect();
    assert_eq!(titles, ["Intro", "Codegen"]);
    assert_eq!(stored.modules()[0].lessons(), 4);
    assert_eq!(stored.modules()[0].completed_at(), Some(at));

    repo.update_course(
        course.id(),
        &CourseUpdate::from(CoursePatch {
            title: None,
            certificate: Some(None),
        }),
        at,
    )
    .await
    .unwrap();
    let stored = repo.get_course(course.id()).await.unwrap();
    assert!(stored.certificate().is_none());
    assert_eq!(stored.title(), "Compilers II");
    assert_eq!(stored.modules().len(), 2);
}

#[tokio::test]
async fn sqlite_module_patch_touches_only_given_fields() {
    let repo = connect("memdb_module_patch").await;
    let course = repo
        .create_course(new_course("Operating Systems"), fixed_now())
        .await
        .unwrap();
    let (intro, deep) = (course.modules()[0].clone(), course.modules()[1].clone());
    let at = fixed_now() + Duration::hours(3);

    let rename = ModulePatch {
        title: Some("Scheduling".into()),
        hours: Some(4),
        ..ModulePatch::default()
    };
    repo.update_module(course.id(), deep.id(), &rename, at)
        .await
        .unwrap();

    let stored = repo.get_course(course.id()).await.unwrap();
    assert_eq!(stored.module(intro.id()), Some(&intro));
    let renamed = stored.module(deep.id()).unwrap();
    assert_eq!(
        (renamed.title(), renamed.lessons(), renamed.hours(), renamed.minutes()),
        ("Scheduling", 7, 4, 0)
    );
    assert_eq!(renamed.completed_at(), deep.completed_at());

    let finish = ModulePatch {
        completed: Some(true),
        ..ModulePatch::default()
    };
    repo.update_module(course.id(), intro.id(), &finish, at)
        .await
        .unwrap();
    let reopen = ModulePatch {
        completed: Some(false),
        ..ModulePatch::default()
    };
    repo.update_module(course.id(), deep.id(), &reopen, at)
        .await
        .unwrap();

    let stored = repo.get_course(course.id()).await.unwrap();
    assert_eq!(stored.module(intro.id()).unwrap().completed_at(), Some(at));
    assert_eq!(stored.module(deep.id()).unwrap().completed_at(), None);

    let missing = repo
        .update_module(course.id(), ModuleId::new(9_999), &finish, at)
        .await;
    assert!(matches!(missing, Err(StorageError::NotFound)));
}

#[tokio::test]
async fn sqlite_connections_enforce_foreign_keys() {
    let repo = connect("memdb_pragmas").await;

    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(enabled, 1);

    let orphan = sqlx::query(
        "INSERT INTO modules (course_id, title, lessons, hours, minutes, completed, created_at) \
         VALUES (424242, 'Orphan', 0, 0, 0, 0, ?1)",
    )
    .bind(fixed_now())
    .execute(repo.pool())
    .await;
    assert!(orphan.is_err());
}

#[tokio::test]
async fn sqlite_delete_cascades_to_modules() {
    let repo = connect("memdb_course_delete").await;
    let course = repo
        .create_course(new_course("Graphics"), fixed_now())
        .await
        .unwrap();

    repo.delete_course(course.id()).await.unwrap();

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM modules WHERE course_id = ?1")
        .bind(i64::try_from(course.id().value()).unwrap())
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(orphans, 0);
    assert!(matches!(
        repo.get_course(course.id()).await,
        Err(StorageError::NotFound)
    ));
    assert!(matches!(
        repo.delete_course(course.id()).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_goal_upsert_keeps_single_row() {
    let repo = connect("memdb_goal").await;
    assert_eq!(repo.get_goal().await.unwrap(), None);

    repo.upsert_goal(&StudyGoal::from_persisted(1.5, false))
        .await
        .unwrap();
    repo.upsert_goal(&StudyGoal::from_persisted(3.0, true))
        .await
        .unwrap();

    assert_eq!(
        repo.get_goal().await.unwrap(),
        Some(StudyGoal::from_persisted(3.0, true))
    );
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM study_goal")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
