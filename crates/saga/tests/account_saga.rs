//! Integration tests for the account registration and deletion sagas.

use common::AccountId;
use domain::{NewCard, RegistrationRequest};
use saga::{
    AccountSagaCoordinator, CardService, CompensationOutcome, IdentityService,
    InMemoryIdentityService, InMemoryOrderService, InMemoryProfileService, ProfileService,
    SagaError,
};

type TestCoordinator = AccountSagaCoordinator<
    InMemoryProfileService,
    InMemoryIdentityService,
    InMemoryOrderService,
    InMemoryProfileService,
>;

struct TestHarness {
    coordinator: TestCoordinator,
    profiles: InMemoryProfileService,
    identity: InMemoryIdentityService,
    orders: InMemoryOrderService,
}

impl TestHarness {
    fn new() -> Self {
        let profiles = InMemoryProfileService::new();
        let identity = InMemoryIdentityService::new();
        let orders = InMemoryOrderService::new();

        let coordinator = AccountSagaCoordinator::new(
            profiles.clone(),
            identity.clone(),
            orders.clone(),
            profiles.clone(),
        );

        Self {
            coordinator,
            profiles,
            identity,
            orders,
        }
    }

    fn with_fixed_id(id: &'static str) -> Self {
        let mut harness = Self::new();
        harness.coordinator = harness
            .coordinator
            .with_id_generator(move || AccountId::new(id));
        harness
    }

    async fn add_card(&self, id: &AccountId, number: &str) {
        CardService::create(
            &self.profiles,
            id,
            NewCard {
                number: number.to_string(),
                holder_name: "Bob Builder".to_string(),
                expiry: "12/29".to_string(),
            },
        )
        .await
        .unwrap();
    }
}

fn bob() -> RegistrationRequest {
    RegistrationRequest::new("bob", "pw", "b@x.com")
}

#[tokio::test]
async fn test_register_bob_as_u1() {
    let h = TestHarness::with_fixed_id("U1");

    let summary = h.coordinator.register_account(bob()).await.unwrap();

    assert_eq!(summary.id.as_str(), "U1");
    assert_eq!(summary.login, "bob");
    assert_eq!(summary.email, "b@x.com");

    let profile = h.profiles.profile(&summary.id).unwrap();
    assert_eq!(profile.email, "b@x.com");
    let credentials = h.identity.credentials(&summary.id).unwrap();
    assert_eq!(credentials.login, "bob");
    assert_eq!(credentials.account_id, profile.id);
}

#[tokio::test]
async fn test_identity_down_leaves_no_profile() {
    let h = TestHarness::with_fixed_id("U1");
    h.identity.set_fail_on_create(true);

    let err = h.coordinator.register_account(bob()).await.unwrap_err();

    assert!(
        err.to_string()
            .starts_with("Registration failed in identity step")
    );
    assert!(matches!(err.root_cause(), SagaError::RemoteUnavailable(_)));
    assert_eq!(h.profiles.profile_count(), 0);
    assert_eq!(h.identity.credential_count(), 0);
}

#[tokio::test]
async fn test_duplicate_login_rolls_back_second_profile() {
    let h = TestHarness::new();
    h.coordinator.register_account(bob()).await.unwrap();

    let err = h.coordinator.register_account(bob()).await.unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.stage(), Some("identity"));
    assert_eq!(h.profiles.profile_count(), 1);
    assert_eq!(h.identity.credential_count(), 1);
}

#[tokio::test]
async fn test_concurrent_registrations_are_independent() {
    let h = TestHarness::new();

    let requests = (0..8).map(|i| {
        h.coordinator.register_account(RegistrationRequest::new(
            format!("user{i}"),
            "pw",
            format!("user{i}@x.com"),
        ))
    });
    let results = futures_util::future::join_all(requests).await;

    let ids: std::collections::HashSet<_> = results
        .into_iter()
        .map(|r| r.unwrap().id)
        .collect();
    assert_eq!(ids.len(), 8);
    assert_eq!(h.profiles.profile_count(), 8);
    assert_eq!(h.identity.credential_count(), 8);
}

#[tokio::test]
async fn test_delete_removes_profile_credentials_and_orders() {
    let h = TestHarness::with_fixed_id("U1");
    let id = h.coordinator.register_account(bob()).await.unwrap().id;
    h.add_card(&id, "**** 4242").await;
    h.orders.add_order(&id, "42");
    h.orders.add_order(&id, "43");

    h.coordinator.delete_account(&id).await.unwrap();

    assert!(!h.profiles.has_profile(&id));
    assert!(h.profiles.cards(&id).is_empty());
    assert!(!h.identity.has_credentials(&id));
    assert_eq!(h.orders.order_count(&id), 0);
}

#[tokio::test]
async fn test_identity_delete_failure_restores_profile_and_cards() {
    let h = TestHarness::with_fixed_id("U1");
    let id = h.coordinator.register_account(bob()).await.unwrap().id;
    h.add_card(&id, "**** 4242").await;
    h.add_card(&id, "**** 1111").await;
    let profile_before = h.profiles.profile(&id).unwrap();
    h.identity.set_fail_on_delete(true);

    let err = h.coordinator.delete_account(&id).await.unwrap_err();

    assert!(err.to_string().starts_with("Deletion failed in identity step"));
    let restored = h.profiles.profile(&id).unwrap();
    assert_eq!(restored.email, profile_before.email);
    assert_eq!(restored.name, profile_before.name);

    let mut numbers: Vec<_> = h
        .profiles
        .cards(&id)
        .into_iter()
        .map(|card| card.number)
        .collect();
    numbers.sort();
    assert_eq!(numbers, vec!["**** 1111", "**** 4242"]);
    assert!(h.identity.has_credentials(&id));
}

#[tokio::test]
async fn test_order_delete_failure_restores_credentials_then_profile() {
    let h = TestHarness::with_fixed_id("U1");
    let id = h.coordinator.register_account(bob()).await.unwrap().id;
    let credentials_before = h.identity.credentials(&id).unwrap();
    h.orders.add_order(&id, "42");
    h.orders.set_fail_on_delete(true);

    let err = h.coordinator.delete_account(&id).await.unwrap_err();

    assert!(err.to_string().starts_with("Deletion failed in order step"));
    assert_eq!(h.identity.credentials(&id), Some(credentials_before));
    assert!(h.profiles.has_profile(&id));
    assert_eq!(h.orders.order_count(&id), 1);
}

#[tokio::test]
async fn test_failed_compensation_keeps_original_error() {
    let h = TestHarness::with_fixed_id("U1");
    let id = h.coordinator.register_account(bob()).await.unwrap().id;
    h.orders.set_fail_on_delete(true);
    h.identity.set_fail_on_restore(true);

    let err = h.coordinator.delete_account(&id).await.unwrap_err();

    assert_eq!(err.stage(), Some("order"));
    assert!(matches!(err.root_cause(), SagaError::RemoteUnavailable(_)));
    // Credentials stay lost, profile still comes back.
    assert!(!h.identity.has_credentials(&id));
    assert!(h.profiles.has_profile(&id));
}

#[tokio::test]
async fn test_partial_card_restore_does_not_change_the_error() {
    let h = TestHarness::with_fixed_id("U1");
    let id = h.coordinator.register_account(bob()).await.unwrap().id;
    h.add_card(&id, "**** 4242").await;
    h.add_card(&id, "**** 1111").await;
    h.identity.set_fail_on_delete(true);
    h.profiles.fail_card_number("**** 1111");

    let err = h.coordinator.delete_account(&id).await.unwrap_err();

    assert_eq!(err.stage(), Some("identity"));
    assert_eq!(h.profiles.cards(&id).len(), 1);
}

#[tokio::test]
async fn test_compensation_twice_with_same_snapshots_never_fails() {
    let h = TestHarness::with_fixed_id("U1");
    let id = h.coordinator.register_account(bob()).await.unwrap().id;
    h.add_card(&id, "**** 4242").await;
    let profile_snapshot = h.profiles.delete(&id).await.unwrap();
    let credential_snapshot = h.identity.delete(&id).await.unwrap();
    let compensation = h.coordinator.compensation();

    for _ in 0..2 {
        assert!(
            compensation
                .recreate_credentials(&credential_snapshot)
                .await
                .is_ok()
        );
        let (profile, cards) = compensation.restore_profile(&profile_snapshot).await;
        assert!(profile.is_ok());
        assert!(cards.is_complete());
    }

    assert_eq!(
        compensation.recreate_profile(&profile_snapshot.deleted).await,
        CompensationOutcome::AlreadyApplied
    );
    assert_eq!(h.profiles.profile_count(), 1);
    assert_eq!(h.profiles.cards(&id).len(), 1);
    assert_eq!(h.identity.credential_count(), 1);
}
