use fedwallet_core::{
    EnrollmentError, MembershipConfig, MembershipError, MembershipEvent, MembershipSession, TransferEligibility,
};
use fedwallet_invite::{InviteCode, InvitePayload};
use fedwallet_sync::{BackendCall, BackendError, MemoryBackend};
use fedwallet_types::{Amount, FederationId, FederationIdentity, RecommendationState};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

async fn new_session(backend: &Arc<MemoryBackend>) -> MembershipSession {
    let _ = tracing_subscriber::fmt::try_init();
    MembershipSession::new(backend.clone(), MembershipConfig::default()).await
}

async fn seed(backend: &MemoryBackend, id: &str) -> FederationIdentity {
    let identity = FederationIdentity::new(id, format!("Federation {}", id), format!("fed1{}", id));
    backend.insert_federation(identity.clone()).await;
    identity
}

#[tokio::test]
async fn unreachable_guardian_falls_back_to_next_invite() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .fail_join("fed1abc", BackendError::GuardianUnreachable("no guardian answered".into()))
        .await;
    let session = new_session(&backend).await;

    let joined = session.enroll(&["fed1abc", "fed1xyz"]).await.expect("second invite should join");
    info!("Joined {} via {}", joined.id, joined.invite_code);

    assert_eq!(joined.invite_code, "fed1xyz");
    assert_eq!(backend.join_attempts().await, vec!["fed1abc", "fed1xyz"]);
    assert_eq!(session.list_membership().await, vec![joined]);
}

#[tokio::test]
async fn every_candidate_unreachable_exhausts_in_order() {
    let backend = Arc::new(MemoryBackend::new());
    let codes = ["fed1one", "fed1two", "fed1three"];
    for code in codes {
        backend
            .fail_join(code, BackendError::GuardianUnreachable(format!("{} down", code)))
            .await;
    }
    let session = new_session(&backend).await;

    let err = session.enroll(&codes).await.unwrap_err();
    assert_eq!(
        err,
        EnrollmentError::AllCandidatesExhausted {
            attempts: 3,
            last: BackendError::GuardianUnreachable("fed1three down".into()),
        }
    );
    assert_eq!(backend.join_attempts().await, codes.to_vec());
    assert!(session.list_membership().await.is_empty());
}

#[tokio::test]
async fn fatal_error_never_tries_later_candidates() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .fail_join("fed1abc", BackendError::GuardianUnreachable("down".into()))
        .await;
    backend
        .fail_join("fed1def", BackendError::Internal("bad federation config".into()))
        .await;
    let session = new_session(&backend).await;

    let err = session.enroll(&["fed1abc", "fed1def", "fed1ghi"]).await.unwrap_err();
    assert_eq!(err, EnrollmentError::Join(BackendError::Internal("bad federation config".into())));
    assert_eq!(backend.join_attempts().await, vec!["fed1abc", "fed1def"]);
}

#[tokio::test]
async fn joining_a_known_federation_is_a_duplicate() {
    let backend = Arc::new(MemoryBackend::new());
    let session = new_session(&backend).await;

    let payload = InvitePayload {
        federation_id: FederationId::from("fed-alpha"),
        guardians: vec![Url::parse("wss://guardian-1.alpha.example").unwrap()],
        api_secret: None,
    };
    let invite = InviteCode::encode(&payload).unwrap();
    backend
        .script_identity(invite.as_str(), FederationIdentity::new("fed-alpha", "Alpha", invite.as_str()))
        .await;

    session.enroll(&[invite.as_str()]).await.unwrap();
    let err = session.enroll(&[invite.as_str()]).await.unwrap_err();
    assert_eq!(err, EnrollmentError::DuplicateFederation("fed-alpha".into()));

    // The second attempt is rejected before reaching the backend
    assert_eq!(backend.join_attempts().await.len(), 1);
    assert_eq!(session.list_membership().await.len(), 1);
}

#[tokio::test]
async fn removal_prunes_balances_and_recommendations() {
    let backend = Arc::new(MemoryBackend::new());
    let f1 = seed(&backend, "f1").await;
    let f2 = seed(&backend, "f2").await;
    backend.set_balance(&f1.id, Amount::from_sats(21_000)).await;
    backend.set_balance(&f2.id, Amount::from_sats(500)).await;
    let session = new_session(&backend).await;
    session.refresh().await.unwrap();
    let mut events = session.subscribe();

    assert_eq!(session.aggregated_balances().await.len(), 2);
    session.set_recommendation(&f1.id, &f1.invite_code, true).await.unwrap();

    session.remove_membership(&f1.id).await.unwrap();

    assert_eq!(events.recv().await.unwrap(), MembershipEvent::Removed(f1.id.clone()));
    assert_eq!(session.balance_of(&f1.id).await, None);
    assert_eq!(session.recommendation_state(&f1.id).await, RecommendationState::Unknown);
    assert_eq!(session.balance_of(&f2.id).await, Some(Amount::from_sats(500)));
    assert!(session.federation(&f1.id).await.is_none());
}

#[tokio::test]
async fn failed_removal_surfaces_and_is_not_retried() {
    let backend = Arc::new(MemoryBackend::new());
    let f1 = seed(&backend, "f1").await;
    let session = new_session(&backend).await;
    session.refresh().await.unwrap();
    backend.fail_writes(Some(BackendError::Unavailable("daemon restarting".into()))).await;

    let err = session.remove_membership(&f1.id).await.unwrap_err();
    assert_eq!(err, MembershipError::Backend(BackendError::Unavailable("daemon restarting".into())));

    let removals = backend
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, BackendCall::Remove(_)))
        .count();
    assert_eq!(removals, 1);
    assert_eq!(session.list_membership().await, vec![f1]);
}

#[tokio::test]
async fn balance_backend_failure_yields_empty_mapping() {
    let backend = Arc::new(MemoryBackend::new());
    let f1 = seed(&backend, "f1").await;
    let session = new_session(&backend).await;
    session.refresh().await.unwrap();

    backend.fail_reads(Some(BackendError::Unavailable("offline".into()))).await;
    let balances = session.aggregated_balances().await;
    assert!(balances.is_empty());
    assert_eq!(session.list_membership().await, vec![f1]);
}

#[tokio::test]
async fn recommendation_is_optimistic() {
    let backend = Arc::new(MemoryBackend::new());
    let f1 = seed(&backend, "f1").await;
    let session = new_session(&backend).await;
    session.refresh().await.unwrap();

    assert_eq!(session.recommendation_state(&f1.id).await, RecommendationState::Unknown);
    session.set_recommendation(&f1.id, &f1.invite_code, true).await.unwrap();

    // No has-recommended query has gone out yet
    assert!(!backend
        .calls()
        .await
        .iter()
        .any(|call| matches!(call, BackendCall::HasRecommended(_))));
    assert_eq!(session.recommendation_state(&f1.id).await, RecommendationState::Recommended);

    let refreshed = session.refresh_recommendations().await;
    assert_eq!(refreshed, vec![(f1.id.clone(), RecommendationState::Recommended)]);
}

#[tokio::test]
async fn transfer_eligibility_needs_a_second_federation() {
    let backend = Arc::new(MemoryBackend::new());
    let f1 = seed(&backend, "F1").await;
    let session = new_session(&backend).await;
    session.refresh().await.unwrap();

    assert!(!session.transfer_eligibility(&f1.id).await);
    assert!(!session.transfer_eligibility(&"not-a-member".into()).await);
    assert_eq!(
        session.transfer_check(&f1.id).await,
        TransferEligibility::NeedsAnotherFederation
    );

    let f2 = session.enroll(&["fed1F2"]).await.unwrap();
    assert!(session.transfer_eligibility(&f1.id).await);
    assert_eq!(
        session.transfer_check(&f1.id).await,
        TransferEligibility::Eligible { destinations: vec![f2] }
    );
}

#[tokio::test]
async fn concurrent_removals_of_one_federation() {
    let backend = Arc::new(MemoryBackend::new());
    let f1 = seed(&backend, "f1").await;
    seed(&backend, "f2").await;
    let session = Arc::new(new_session(&backend).await);
    session.refresh().await.unwrap();

    let first = tokio::spawn({
        let session = session.clone();
        let id = f1.id.clone();
        async move { session.remove_membership(&id).await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        let id = f1.id.clone();
        async move { session.remove_membership(&id).await }
    });

    let results = vec![first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|result| *result == Err(MembershipError::NotFound(f1.id.clone()))));
    assert_eq!(session.list_membership().await.len(), 1);
}

#[tokio::test]
async fn abandoned_enroll_inserts_nothing() {
    let backend = Arc::new(MemoryBackend::new().with_join_latency(Duration::from_millis(200)));
    let session = new_session(&backend).await;

    let abandoned = tokio::time::timeout(Duration::from_millis(20), session.enroll(&["fed1slow"])).await;
    assert!(abandoned.is_err());

    // Let the detached attempt finish in the background
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.list_membership().await.is_empty());
    assert_eq!(backend.join_attempts().await, vec!["fed1slow"]);
}
