use std::sync::Arc;
use std::time::Duration;
use tokenvault::application_impl::*;
use tokenvault::application_port::*;
use tokenvault::domain_model::*;
use tokenvault::domain_port::*;
use tokenvault::infra_memory::MemoryCache;

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

fn store(cache: Arc<MemoryCache>, config: TokenStoreConfig) -> Arc<dyn TokenStore> {
    Arc::new(CacheTokenStore::new(cache, config))
}

#[tokio::test]
async fn issue_validate_revoke_scenario() {
    let store = store(Arc::new(MemoryCache::new()), TokenStoreConfig::default());
    let u1 = SubjectId::from("u1");

    let t1 = store
        .issue(&u1, Some(Duration::from_secs(3600)), Metadata::new(), deadline())
        .await
        .unwrap();
    let session = store.validate(&t1.id, deadline()).await.unwrap();
    assert_eq!(session.subject_id, u1);

    store.revoke(&t1.id, deadline()).await.unwrap();
    assert!(matches!(
        store.validate(&t1.id, deadline()).await,
        Err(TokenStoreError::NotFound)
    ));
}

#[tokio::test]
async fn eviction_scenario_keeps_the_two_newest() {
    let store = store(
        Arc::new(MemoryCache::new()),
        TokenStoreConfig {
            max_tokens_per_subject: Some(2),
            ..TokenStoreConfig::default()
        },
    );
    let subject = SubjectId::from("u1");

    let mut tokens = Vec::new();
    for _ in 0..3 {
        tokens.push(
            store
                .issue(&subject, None, Metadata::new(), deadline())
                .await
                .unwrap(),
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(matches!(
        store.validate(&tokens[0].id, deadline()).await,
        Err(TokenStoreError::NotFound)
    ));
    assert!(store.validate(&tokens[1].id, deadline()).await.is_ok());
    assert!(store.validate(&tokens[2].id, deadline()).await.is_ok());
}

#[tokio::test]
async fn disconnected_backend_is_never_reported_as_missing() {
    let cache = Arc::new(MemoryCache::new());
    let store = store(cache.clone(), TokenStoreConfig::default());
    let token = store
        .issue(&SubjectId::from("u1"), None, Metadata::new(), deadline())
        .await
        .unwrap();

    cache.set_available(false);
    let err = store.validate(&token.id, deadline()).await.unwrap_err();
    assert!(matches!(err, TokenStoreError::Connection(_)));

    struct NobodyVerifier;

    #[async_trait::async_trait]
    impl CredentialVerifier for NobodyVerifier {
        async fn verify(&self, _: &str, _: &str) -> Result<Option<SubjectId>, VerifierError> {
            Ok(None)
        }
    }

    let authenticator =
        RealSessionAuthenticator::new(store, Arc::new(NobodyVerifier), Duration::from_secs(1));
    assert!(matches!(
        authenticator.authenticate(token.id.as_str()).await,
        Err(AuthError::Unauthenticated)
    ));
}

#[tokio::test]
async fn concurrent_issue_and_bulk_revoke_converge() {
    let cache = Arc::new(MemoryCache::new());
    let store = store(cache.clone(), TokenStoreConfig::default());
    let subject = SubjectId::from("u1");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let store = store.clone();
        let subject = subject.clone();
        tasks.spawn(async move {
            store
                .issue(&subject, None, Metadata::new(), deadline())
                .await
                .unwrap()
        });
    }
    let mut issued = Vec::new();
    while let Some(token) = tasks.join_next().await {
        issued.push(token.unwrap());
    }

    let listed = store.list_for_subject(&subject, deadline()).await.unwrap();
    assert_eq!(listed.len(), issued.len());

    let revoked = store
        .revoke_all_for_subject(&subject, deadline())
        .await
        .unwrap();
    assert_eq!(revoked, issued.len());
    for token in &issued {
        assert!(matches!(
            store.validate(&token.id, deadline()).await,
            Err(TokenStoreError::NotFound)
        ));
    }
    // primary records and the subject index are both gone
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn revoked_and_expired_tokens_never_come_back() {
    let cache = Arc::new(MemoryCache::new());
    let store = store(cache.clone(), TokenStoreConfig::default());
    let subject = SubjectId::from("u1");

    let short = store
        .issue(&subject, Some(Duration::from_secs(5)), Metadata::new(), deadline())
        .await
        .unwrap();
    let revoked = store
        .issue(&subject, Some(Duration::from_secs(60)), Metadata::new(), deadline())
        .await
        .unwrap();
    store.revoke(&revoked.id, deadline()).await.unwrap();

    tokio::time::advance(Duration::from_secs(6)).await;
    for token in [&short, &revoked] {
        assert!(matches!(
            store.validate(&token.id, deadline()).await,
            Err(TokenStoreError::NotFound)
        ));
        assert!(matches!(
            store.consume(&token.id, deadline()).await,
            Err(TokenStoreError::NotFound)
        ));
    }
    assert!(
        store
            .list_for_subject(&subject, deadline())
            .await
            .unwrap()
            .is_empty()
    );
}
