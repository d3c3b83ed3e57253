use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::SubjectId;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

/// Everything the HTTP layer needs, built in dependency order: cache first
/// (fatal on failure), then the token store, then the authenticator.
pub struct Server {
    pub session_authenticator: Arc<dyn SessionAuthenticator>,
    pub token_store: Arc<dyn TokenStore>,
    cache_client: Option<CacheClient>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let (cache, cache_client): (CacheHandle, Option<CacheClient>) =
            match settings.cache.backend.as_str() {
                "memory" => {
                    warn!("using in-process session cache, sessions are lost on restart");
                    (Arc::new(MemoryCache::new()), None)
                }
                "redis" => {
                    let client = CacheClient::new(BackoffConfig {
                        max_attempts: settings.cache.max_attempts.max(1),
                        initial_backoff: Duration::from_millis(settings.cache.initial_backoff_ms),
                        max_backoff: Duration::from_millis(settings.cache.max_backoff_ms),
                        connect_timeout: Duration::from_millis(settings.cache.connect_timeout_ms),
                    });
                    let handle = client
                        .connect(
                            &settings.cache.address,
                            settings.cache.password.as_deref(),
                            settings.cache.database,
                        )
                        .await
                        .map_err(|e| anyhow::anyhow!("session cache unavailable: {}", e))?;
                    (handle, Some(client))
                }
                other => return Err(anyhow::anyhow!("Unknown cache backend: {}", other)),
            };

        let store_config = TokenStoreConfig {
            ttl_default: Duration::from_secs(settings.session.ttl_default_secs),
            sliding_expiration: settings.session.sliding_expiration,
            max_tokens_per_subject: match settings.session.max_tokens_per_subject {
                0 => None,
                max => Some(max),
            },
        };
        if store_config.ttl_default.is_zero() {
            return Err(anyhow::anyhow!("session.ttl_default_secs must be positive"));
        }
        let representable = chrono::Duration::from_std(store_config.ttl_default)
            .ok()
            .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
            .is_some();
        if !representable {
            return Err(anyhow::anyhow!(
                "session.ttl_default_secs is out of range: {}",
                settings.session.ttl_default_secs
            ));
        }
        let token_store: Arc<dyn TokenStore> =
            Arc::new(CacheTokenStore::new(cache, store_config));

        let users = settings.identity.users.iter().map(|u| StaticUser {
            username: u.username.clone(),
            subject_id: SubjectId::new(u.subject_id.clone()),
            password_hash: u.password_hash.clone(),
        });
        let credential_verifier = StaticCredentialVerifier::new(users)?;
        if credential_verifier.is_empty() {
            warn!("no identity users configured, every login will be rejected");
        }

        let session_authenticator: Arc<dyn SessionAuthenticator> =
            Arc::new(RealSessionAuthenticator::new(
                token_store.clone(),
                Arc::new(credential_verifier),
                Duration::from_millis(settings.session.request_timeout_ms),
            ));

        info!("server started");

        Ok(Self {
            session_authenticator,
            token_store,
            cache_client,
        })
    }

    pub fn cache_state(&self) -> Option<ConnectionState> {
        self.cache_client.as_ref().map(CacheClient::state)
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        if let Some(client) = &self.cache_client {
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::parse_settings_str;

    const SETTINGS: &str = r#"
        [cache]
        backend = "memory"

        [http]
        address = "127.0.0.1:0"

        [log]
        filter = "info"

        [session]
        ttl_default_secs = 60
        max_tokens_per_subject = 0
    "#;

    #[tokio::test]
    async fn memory_backend_needs_no_connection() {
        let settings = parse_settings_str(SETTINGS).unwrap();
        let server = Server::try_new(&settings).await.unwrap();
        assert!(server.cache_state().is_none());
        assert!(server.token_store.config().max_tokens_per_subject.is_none());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_backend_aborts_startup() {
        let settings = parse_settings_str(&SETTINGS.replace("memory", "memcached")).unwrap();
        assert!(Server::try_new(&settings).await.is_err());
    }

    #[tokio::test]
    async fn redis_without_address_aborts_startup() {
        let settings = parse_settings_str(&SETTINGS.replace("memory", "redis")).unwrap();
        assert!(Server::try_new(&settings).await.is_err());
    }

    #[tokio::test]
    async fn unrepresentable_default_ttl_is_refused() {
        let settings =
            parse_settings_str(&SETTINGS.replace("= 60", "= 10000000000000")).unwrap();
        assert!(Server::try_new(&settings).await.is_err());
    }

    #[tokio::test]
    async fn zero_default_ttl_is_refused() {
        let settings = parse_settings_str(&SETTINGS.replace("= 60", "= 0")).unwrap();
        assert!(Server::try_new(&settings).await.is_err());
    }
}
