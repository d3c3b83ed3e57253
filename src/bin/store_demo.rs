/// Walks the session token lifecycle against a running Redis.
///
/// $ cargo run --bin store_demo -- --address 127.0.0.1:6379 --password mysecret
///
/// Subjects are suffixed with a per-run id so repeated runs do not collide.
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokenvault::application_impl::CacheTokenStore;
use tokenvault::application_port::{TokenStore, TokenStoreConfig, TokenStoreError};
use tokenvault::domain_model::{Deadline, Metadata, SubjectId};
use tokenvault::infra_redis::{BackoffConfig, CacheClient};
use tokenvault::logger::*;
use tokenvault::settings::Parser;
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:6379")]
    address: String,
    #[arg(long)]
    password: Option<String>,
    #[arg(long, default_value_t = 0)]
    database: i64,
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(2))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logger = Logger::new_bootstrap();

    let run_id = Utc::now().timestamp_millis();

    // region prepare connection

    let client = CacheClient::new(BackoffConfig::default());
    let cache = client
        .connect(&args.address, args.password.as_deref(), args.database)
        .await?;
    // second connect hands back the same handle
    let again = client
        .connect(&args.address, args.password.as_deref(), args.database)
        .await?;
    println!("connected, shared handle: {}", Arc::ptr_eq(&cache, &again));

    let store: Arc<dyn TokenStore> = Arc::new(CacheTokenStore::new(
        cache,
        TokenStoreConfig {
            ttl_default: Duration::from_secs(60),
            sliding_expiration: false,
            max_tokens_per_subject: Some(2),
        },
    ));

    // endregion

    // region lifecycle

    let u1 = SubjectId::new(format!("demo-u1-{}", run_id));
    let t1 = store
        .issue(&u1, Some(Duration::from_secs(3600)), Metadata::new(), deadline())
        .await?;
    let session = store.validate(&t1.id, deadline()).await?;
    println!("validate -> {:?}", session);

    store.revoke(&t1.id, deadline()).await?;
    match store.validate(&t1.id, deadline()).await {
        Err(TokenStoreError::NotFound) => println!("revoked token -> not found"),
        other => println!("unexpected: {:?}", other),
    }
    store.revoke(&t1.id, deadline()).await?;

    // endregion

    // region eviction

    let u2 = SubjectId::new(format!("demo-u2-{}", run_id));
    let mut issued = Vec::new();
    for _ in 0..3 {
        issued.push(store.issue(&u2, None, Metadata::new(), deadline()).await?);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    for (i, token) in issued.iter().enumerate() {
        let valid = store.validate(&token.id, deadline()).await.is_ok();
        println!("eviction: token #{} valid = {}", i + 1, valid);
    }

    // endregion

    // region concurrent issue + revoke all

    let u3 = SubjectId::new(format!("demo-u3-{}", run_id));
    let unlimited: Arc<dyn TokenStore> = Arc::new(CacheTokenStore::new(
        client
            .connect(&args.address, args.password.as_deref(), args.database)
            .await?,
        TokenStoreConfig::default(),
    ));
    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let store = unlimited.clone();
        let subject = u3.clone();
        tasks.spawn(async move {
            let mut metadata = Metadata::new();
            metadata.insert("worker".to_string(), i.to_string());
            store.issue(&subject, None, metadata, deadline()).await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result??;
    }
    let listed = unlimited.list_for_subject(&u3, deadline()).await?;
    println!("concurrent issue: {} live tokens", listed.len());
    let revoked = unlimited.revoke_all_for_subject(&u3, deadline()).await?;
    println!("revoke all: {} revoked", revoked);

    // endregion

    client.close().await;
    match store.validate(&issued[2].id, deadline()).await {
        Err(TokenStoreError::Connection(e)) => println!("after close -> connection error: {}", e),
        other => println!("unexpected: {:?}", other),
    }
    info!("demo finished");

    Ok(())
}
