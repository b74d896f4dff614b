use std::sync::Arc;
use travelmap_core::db::open_db_in_memory;
use travelmap_core::{
    AccessError, Category, Destination, DestinationDraft, DestinationPatch, DestinationService,
    DestinationValidationError, Identity, Operation, SessionIdentity, SqliteDestinationRepository,
};
use uuid::Uuid;

type LocalService = DestinationService<Arc<SqliteDestinationRepository>, SessionIdentity>;

fn shared_repo() -> Arc<SqliteDestinationRepository> {
    Arc::new(SqliteDestinationRepository::open_in_memory().unwrap())
}

fn user() -> Identity {
    Identity::new(Uuid::new_v4(), "token")
}

fn service_as(repo: &Arc<SqliteDestinationRepository>, identity: &Identity) -> LocalService {
    DestinationService::new(Arc::clone(repo), SessionIdentity::signed_in(identity.clone()))
}

#[tokio::test]
async fn create_applies_defaults_for_minimal_draft() {
    let repo = shared_repo();
    let alice = user();
    let service = service_as(&repo, &alice);

    let created = service
        .create(DestinationDraft::new("Louvre", 48.8606, 2.3376).with_category(Category::Museum))
        .await
        .unwrap();

    assert_eq!(created.owner_id, alice.user_id);
    assert_eq!(created.name, "Louvre");
    assert_eq!(created.latitude, 48.8606);
    assert_eq!(created.longitude, 2.3376);
    assert_eq!(created.category, Category::Museum);
    assert!(!created.visited);
    assert_eq!(created.rating, None);
    assert_eq!(created.notes, None);
    assert_eq!(created.visit_date, None);
    assert!(created.photos.is_empty());
    assert!(created.tags.is_empty());
    assert_eq!(created.created_at, created.updated_at);
}

#[tokio::test]
async fn create_ignores_payload_owner_and_uses_identity() {
    let repo = shared_repo();
    let (alice, bob) = (user(), user());
    let alice_service = service_as(&repo, &alice);
    let bob_service = service_as(&repo, &bob);

    let mut draft = DestinationDraft::new("Sofia", 42.6977, 23.3219);
    draft.owner_id = Some(bob.user_id);
    let created = alice_service.create(draft).await.unwrap();

    assert_eq!(created.owner_id, alice.user_id);
    assert_eq!(alice_service.list().await.unwrap(), vec![created]);
    assert!(bob_service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_turns_empty_notes_and_visit_date_into_absent_values() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());

    let mut draft = DestinationDraft::new("Rila Monastery", 42.1333, 23.3400);
    draft.notes = Some(String::new());
    draft.visit_date = Some("  ".to_string());
    draft.tags = vec![" hiking ".to_string(), "history".to_string()];
    let created = service.create(draft).await.unwrap();

    assert_eq!(created.notes, None);
    assert_eq!(created.visit_date, None);
    assert_eq!(created.tags, vec!["hiking", "history"]);
}

#[tokio::test]
async fn list_returns_only_owned_records_newest_first() {
    let repo = shared_repo();
    let (alice, bob) = (user(), user());
    let alice_service = service_as(&repo, &alice);
    let bob_service = service_as(&repo, &bob);

    for name in ["first", "second", "third"] {
        alice_service
            .create(DestinationDraft::new(name, 1.0, 2.0))
            .await
            .unwrap();
    }
    bob_service
        .create(DestinationDraft::new("elsewhere", 3.0, 4.0))
        .await
        .unwrap();

    let names = alice_service
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|destination| destination.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn list_for_identity_without_records_is_empty() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());

    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_changes_only_given_fields_and_advances_updated_at() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());
    let created = service
        .create(DestinationDraft::new("Plovdiv", 42.1354, 24.7453))
        .await
        .unwrap();

    let updated = service
        .update(
            created.id,
            DestinationPatch {
                rating: Some(Some(5)),
                ..DestinationPatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.rating, Some(5));
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.name, created.name);
    assert_eq!(updated.latitude, created.latitude);
    assert_eq!(updated.category, created.category);
}

#[tokio::test]
async fn update_with_null_clears_optional_fields() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());
    let mut draft = DestinationDraft::new("Varna", 43.2141, 27.9147);
    draft.notes = Some("sea garden".to_string());
    draft.rating = Some(4);
    draft.visited = true;
    draft.visit_date = Some("2023-07-14".to_string());
    let created = service.create(draft).await.unwrap();
    assert!(created.visit_date.is_some());

    let patch: DestinationPatch =
        serde_json::from_str(r#"{"notes": null, "rating": null, "visit_date": ""}"#).unwrap();
    let updated = service.update(created.id, patch).await.unwrap();

    assert_eq!(updated.notes, None);
    assert_eq!(updated.rating, None);
    assert_eq!(updated.visit_date, None);
    assert!(updated.visited);
}

#[tokio::test]
async fn foreign_update_is_not_found_and_foreign_delete_is_noop() {
    let repo = shared_repo();
    let (alice, bob) = (user(), user());
    let alice_service = service_as(&repo, &alice);
    let bob_service = service_as(&repo, &bob);
    let created = alice_service
        .create(DestinationDraft::new("Burgas", 42.5048, 27.4626))
        .await
        .unwrap();

    let err = bob_service
        .update(
            created.id,
            DestinationPatch {
                name: Some("stolen".to_string()),
                ..DestinationPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotFound(id) if id == created.id));

    bob_service.delete(created.id).await.unwrap();

    assert_eq!(alice_service.list().await.unwrap(), vec![created]);
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());
    let missing = Uuid::new_v4();

    let err = service
        .update(missing, DestinationPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotFound(id) if id == missing));
}

#[tokio::test]
async fn empty_patch_only_advances_updated_at() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());
    let created = service
        .create(DestinationDraft::new("Varna", 43.2141, 27.9147))
        .await
        .unwrap();

    let touched = service
        .update(created.id, DestinationPatch::default())
        .await
        .unwrap();

    assert!(touched.updated_at > created.updated_at);
    assert_eq!(
        Destination {
            updated_at: created.updated_at,
            ..touched
        },
        created
    );
}

#[tokio::test]
async fn delete_is_idempotent() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());
    let created = service
        .create(DestinationDraft::new("Ruse", 43.8356, 25.9657))
        .await
        .unwrap();

    service.delete(created.id).await.unwrap();
    service.delete(created.id).await.unwrap();

    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn calls_without_identity_fail_before_reaching_backend() {
    let repo = shared_repo();
    let anonymous = DestinationService::new(Arc::clone(&repo), SessionIdentity::new());

    let err = anonymous.list().await.unwrap_err();
    assert!(matches!(err, AccessError::AuthenticationRequired));
    assert_eq!(err.to_string(), "User not authenticated");

    let err = anonymous
        .create(DestinationDraft::new("Nowhere", 0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::AuthenticationRequired));

    let err = anonymous.delete(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AccessError::AuthenticationRequired));

    let local = service_as(&repo, &Identity::local());
    assert!(local.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_payloads_are_rejected_as_validation_errors() {
    let repo = shared_repo();
    let service = service_as(&repo, &user());

    let mut draft = DestinationDraft::new("Too good", 1.0, 1.0);
    draft.rating = Some(6);
    let err = service.create(draft).await.unwrap_err();
    assert!(matches!(
        err,
        AccessError::Validation(DestinationValidationError::RatingOutOfRange(6))
    ));

    let err = service
        .create(DestinationDraft::new("   ", 1.0, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Validation(DestinationValidationError::EmptyName)
    ));

    let err = service
        .create(DestinationDraft::new("Drift", f64::NAN, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Validation(DestinationValidationError::NonFiniteCoordinate {
            field: "latitude"
        })
    ));

    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn backend_faults_surface_as_operation_labelled_failures() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE destinations;").unwrap();
    let repo = SqliteDestinationRepository::try_new(conn).unwrap();
    let service = DestinationService::new(repo, SessionIdentity::signed_in(user()));

    let err = service.list().await.unwrap_err();
    match &err {
        AccessError::BackendFailure { operation, .. } => assert_eq!(*operation, Operation::List),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("Failed to fetch destinations: "));

    let err = service
        .create(DestinationDraft::new("Nowhere", 0.0, 0.0))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to add destination: "));
}

#[tokio::test]
async fn file_store_keeps_records_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("travelmap.db");
    let alice = user();

    let created = {
        let repo = SqliteDestinationRepository::open(&path).unwrap();
        let service = DestinationService::new(repo, SessionIdentity::signed_in(alice.clone()));
        let mut draft = DestinationDraft::new("Veliko Tarnovo", 43.0757123456789, 25.6172123456789);
        draft.tags = vec!["castle".to_string()];
        draft.photos = vec!["https://example.com/tsarevets.jpg".to_string()];
        service.create(draft).await.unwrap()
    };

    let repo = SqliteDestinationRepository::open(&path).unwrap();
    let service = DestinationService::new(repo, SessionIdentity::signed_in(alice));
    assert_eq!(service.list().await.unwrap(), vec![created]);
}
