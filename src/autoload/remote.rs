//! Generic JSON collection endpoint as a data domain

use std::sync::Arc;

use crate::api::{ApiClient, Bearer};

use super::DomainSource;

/// A backend endpoint returning a JSON array, e.g. `inventory` or `shop/items`.
pub struct RemoteCollection {
    name: String,
    endpoint: String,
    api: Arc<ApiClient>,
}

impl RemoteCollection {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api: Arc<ApiClient>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api,
        }
    }
}

impl DomainSource for RemoteCollection {
    type Item = serde_json::Value;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, token: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        let items = self
            .api
            .get_json(&self.endpoint, Bearer::Explicit(token))
            .await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthEvents, StoreKind, StoreLocations, TokenManager};
    use crate::autoload::{AutoLoadSettings, AutoLoader, LoadOutcome};
    use crate::storage::PrefsFile;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_loads_collection_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop/items"))
            .and(header("authorization", "Bearer A.B.C"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1, "name": "potion"}, {"id": 2, "name": "shield"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let locs = StoreLocations::new(
            Arc::new(PrefsFile::new(dir.path().join("prefs.toml"))),
            dir.path().join("session"),
        );
        let session = Arc::new(TokenManager::new(locs, StoreKind::Prefs));
        let api = Arc::new(ApiClient::new(&server.uri(), Arc::clone(&session)).unwrap());

        let loader = AutoLoader::new(
            RemoteCollection::new("shop", "shop/items", api),
            Arc::clone(&session),
            Arc::new(AuthEvents::new()),
            AutoLoadSettings::default(),
        );

        assert_eq!(loader.load_if_empty().await, LoadOutcome::NoToken);
        session.set_token("A.B.C");
        assert_eq!(loader.load_if_empty().await, LoadOutcome::Loaded(2));
        assert_eq!(loader.items()[1]["name"], "shield");
        assert_eq!(loader.load_if_empty().await, LoadOutcome::AlreadyLoaded);
    }

    #[tokio::test]
    async fn test_server_error_is_a_failed_load() {
        let server = MockServer::start().await;
        Mock::given(path("/inventory"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let locs = StoreLocations::new(
            Arc::new(PrefsFile::new(dir.path().join("prefs.toml"))),
            dir.path().join("session"),
        );
        let session = Arc::new(TokenManager::new(locs, StoreKind::File));
        session.set_token("A.B.C");
        let api = Arc::new(ApiClient::new(&server.uri(), Arc::clone(&session)).unwrap());
        let loader = AutoLoader::new(
            RemoteCollection::new("inventory", "inventory", api),
            session,
            Arc::new(AuthEvents::new()),
            AutoLoadSettings::default(),
        );

        assert_eq!(loader.load_if_empty().await, LoadOutcome::Failed);
        assert!(loader.items().is_empty());
    }
}
