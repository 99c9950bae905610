//! Application context
//!
//! Builds every session component once and hands out shared references.
//! Auto-loaders are created here too, but their lifecycle (start/shutdown)
//! belongs to whoever holds them.

use std::sync::Arc;

use anyhow::Result;

use crate::api::ApiClient;
use crate::auth::{AuthEvents, AuthService, StoreKind, TokenManager};
use crate::autoload::{AutoLoader, DomainSource, RemoteCollection};
use crate::config::{AppDirs, Config};

pub struct AppContext {
    pub config: Config,
    pub dirs: AppDirs,
    pub session: Arc<TokenManager>,
    pub events: Arc<AuthEvents>,
    pub api: Arc<ApiClient>,
    pub auth: AuthService,
}

impl AppContext {
    pub fn new(config: Config, dirs: AppDirs) -> Result<Self> {
        let locations = dirs.store_locations();
        let prefs = Arc::clone(&locations.prefs);

        let session = Arc::new(TokenManager::new(locations, config.token_store));
        let events = Arc::new(AuthEvents::new());
        let api = Arc::new(ApiClient::new(&config.api_base_url, Arc::clone(&session))?);
        let auth = AuthService::new(
            Arc::clone(&api),
            Arc::clone(&session),
            Arc::clone(&events),
            prefs,
        );

        Ok(Self {
            config,
            dirs,
            session,
            events,
            api,
            auth,
        })
    }

    /// Load config from `dirs` and build the context.
    pub fn load(dirs: AppDirs) -> Result<Self> {
        let config = Config::load(&dirs)?;
        Self::new(config, dirs)
    }

    /// A loader for `source`, wired to this context's session and signals.
    pub fn loader<S: DomainSource>(&self, source: S) -> AutoLoader<S> {
        AutoLoader::new(
            source,
            Arc::clone(&self.session),
            Arc::clone(&self.events),
            self.config.autoload.settings(),
        )
    }

    /// One loader per configured collection.
    pub fn collection_loaders(&self) -> Vec<AutoLoader<RemoteCollection>> {
        self.config
            .collections
            .iter()
            .map(|c| {
                self.loader(RemoteCollection::new(
                    c.name.clone(),
                    c.endpoint.clone(),
                    Arc::clone(&self.api),
                ))
            })
            .collect()
    }

    /// Move the token to another store and remember the choice.
    pub fn switch_store(&mut self, kind: StoreKind) -> Result<bool> {
        let carried = self.session.switch_store(kind)?;
        self.config.token_store = kind;
        self.config.save(&self.dirs)?;
        Ok(carried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoload::LoadPhase;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(server: &MockServer, dir: &tempfile::TempDir) -> AppContext {
        let mut config = Config::default();
        config.api_base_url = server.uri();
        config.autoload.initial_delay_ms = 10;
        config.autoload.poll_interval_secs = 1;
        AppContext::new(config, AppDirs::under(dir.path())).unwrap()
    }

    #[tokio::test]
    async fn test_login_drives_every_loader() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "A.B.C"})))
            .mount(&server)
            .await;
        Mock::given(path("/inventory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/shop/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}, {"id": 8}])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, &dir);
        let mut loaders = ctx.collection_loaders();
        for loader in &mut loaders {
            loader.start();
        }

        ctx.auth.login("a@b.c", "pw").await.unwrap();
        for _ in 0..50 {
            if loaders.iter().all(|l| l.phase() == LoadPhase::Loaded) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(loaders[0].items().len(), 1);
        assert_eq!(loaders[1].items().len(), 2);

        ctx.auth.logout().await;
        assert!(loaders.iter().all(|l| l.items().is_empty()));
        assert!(loaders.iter().all(|l| l.phase() == LoadPhase::AwaitingAuth));

        for loader in &mut loaders {
            loader.shutdown().await;
        }
        assert_eq!(ctx.events.authenticated.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_switch_store_persists_choice() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&server, &dir);
        ctx.session.set_token("A.B.C");

        assert!(ctx.switch_store(StoreKind::File).unwrap());
        assert_eq!(
            Config::load(&ctx.dirs).unwrap().token_store,
            StoreKind::File
        );

        let reopened = AppContext::load(AppDirs::under(dir.path())).unwrap();
        assert_eq!(reopened.session.get_token().as_deref(), Some("A.B.C"));
    }
}
