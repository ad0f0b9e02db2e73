//! Session store: login, logout, refresh and restore from secure storage.

use std::sync::Arc;

use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};

use super::StoreCell;
use crate::domain::{
    ApiFailure, AuthCredentials, AuthResponse, Backend, PersistedSession, RefreshResponse,
    Session, SessionStatus, TokenCell, UserProfile,
};
use crate::infrastructure::secure_store::{AUTH_TOKEN_KEY, PROFILE_KEY, REFRESH_TOKEN_KEY};
use crate::infrastructure::{
    LocalStorage, RequestClient, RequestOptions, SecureTokenStore, SESSION_STATE_KEY,
};

/// Owner of the authentication session.
pub struct AuthStore {
    client: RequestClient,
    secure: Arc<SecureTokenStore>,
    local: Option<Arc<LocalStorage>>,
    token: TokenCell,
    session: StoreCell<Session>,
}

impl AuthStore {
    /// `token` must be the cell the request client reads.
    pub fn new(
        client: RequestClient,
        secure: Arc<SecureTokenStore>,
        local: Option<Arc<LocalStorage>>,
        token: TokenCell,
    ) -> Self {
        Self {
            client,
            secure,
            local,
            token,
            session: StoreCell::new(Session::default()),
        }
    }

    /// Copy of the session.
    pub fn session(&self) -> Session {
        self.session.snapshot()
    }

    /// Signed-in user, if any.
    pub fn profile(&self) -> Option<UserProfile> {
        self.session.read().profile.clone()
    }

    /// Load tokens and profile from secure storage.
    ///
    /// Ends `Authenticated` when a token is stored together with a readable
    /// profile, taken from secure storage or else from the persisted session
    /// snapshot. `Anonymous` otherwise.
    pub async fn restore_session(&self) -> Session {
        self.session.update(|s| s.status = SessionStatus::Hydrating);

        let (token, refresh_token, raw_profile) = tokio::join!(
            self.secure.get(AUTH_TOKEN_KEY),
            self.secure.get(REFRESH_TOKEN_KEY),
            self.secure.get(PROFILE_KEY),
        );

        let profile = raw_profile.and_then(|raw| match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Stored profile is unreadable");
                None
            }
        });

        let profile = match (&token, profile) {
            (Some(_), None) => self.persisted_profile(),
            (_, profile) => profile,
        };

        let session = match (token, profile) {
            (Some(token), Some(profile)) => {
                info!(user = %profile.email, "Session restored");
                Session {
                    token: Some(token),
                    refresh_token,
                    profile: Some(profile),
                    status: SessionStatus::Authenticated,
                    error: None,
                }
            }
            _ => Session::default().signed_out(),
        };

        self.apply(session.clone());
        session
    }

    /// Exchange credentials for tokens.
    ///
    /// # Errors
    /// Returns the backend failure, rewritten to a readable message when the
    /// cloud backend could not be reached.
    pub async fn login(&self, credentials: &AuthCredentials) -> Result<UserProfile, ApiFailure> {
        let previous = self.session.update(|s| {
            s.error = None;
            std::mem::replace(&mut s.status, SessionStatus::Authenticating)
        });

        let response = self
            .client
            .send_json::<AuthResponse>(
                Backend::Cloud,
                Method::POST,
                "/auth/login",
                credentials,
                RequestOptions::anonymous(),
            )
            .await
            .into_result()
            .map_err(|failure| self.describe_failure(failure));

        let AuthResponse { tokens, profile } = match response {
            Ok(response) => response,
            Err(failure) => {
                // A rejected attempt leaves any existing session in place.
                self.session.update(|s| {
                    s.status = if previous == SessionStatus::Authenticated {
                        previous
                    } else {
                        SessionStatus::Anonymous
                    };
                    s.error = Some(failure.message.clone());
                });
                warn!(error = %failure, "Login failed");
                return Err(failure);
            }
        };

        if let Err(failure) = self
            .store_credentials(&tokens.access_token, tokens.refresh_token.as_deref(), &profile)
            .await
        {
            // Stored credentials were overwritten or rolled back; the old
            // session cannot be trusted any more.
            self.apply(Session::default().signed_out());
            self.session.update(|s| s.error = Some(failure.message.clone()));
            warn!(error = %failure, "Could not store credentials");
            return Err(failure);
        }

        info!(user = %profile.email, "Logged in");
        self.apply(Session {
            token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            profile: Some(profile.clone()),
            status: SessionStatus::Authenticated,
            error: None,
        });
        Ok(profile)
    }

    /// Forget the session and every stored credential.
    ///
    /// The in-memory session is cleared even when secure storage fails.
    ///
    /// # Errors
    /// Returns the first secure storage failure.
    pub async fn logout(&self) -> crate::domain::Result<()> {
        let (a, b, c) = tokio::join!(
            self.secure.remove(AUTH_TOKEN_KEY),
            self.secure.remove(REFRESH_TOKEN_KEY),
            self.secure.remove(PROFILE_KEY),
        );

        self.token.set(None);
        self.session.update(|s| *s = Session::default().signed_out());
        if let Some(local) = &self.local {
            if let Err(e) = local.delete_state(SESSION_STATE_KEY) {
                warn!(error = %e, "Failed to clear persisted session");
            }
        }
        info!("Logged out");

        a.and(b).and(c)
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// # Errors
    /// Fails without a refresh token, or with the backend failure.
    pub async fn refresh(&self) -> Result<(), ApiFailure> {
        let refresh_token = self
            .session
            .read()
            .refresh_token
            .clone()
            .ok_or_else(|| ApiFailure::new("no refresh token"))?;

        let RefreshResponse { access_token } = self
            .client
            .send_json::<RefreshResponse>(
                Backend::Cloud,
                Method::POST,
                "/auth/refresh",
                &json!({ "refreshToken": refresh_token }),
                RequestOptions::anonymous(),
            )
            .await
            .into_result()?;

        self.secure
            .set(AUTH_TOKEN_KEY, &access_token)
            .await
            .map_err(|e| ApiFailure::new(e.to_string()))?;

        self.token.set(Some(access_token.clone()));
        self.session.update(|s| s.token = Some(access_token));
        info!("Access token refreshed");
        Ok(())
    }

    /// Fetch the profile of the signed-in user and store it.
    ///
    /// # Errors
    /// Returns the backend failure.
    pub async fn load_profile(&self) -> Result<UserProfile, ApiFailure> {
        let profile = self
            .client
            .get::<UserProfile>(Backend::Cloud, "/auth/profile")
            .await
            .into_result()?;

        match serde_json::to_string(&profile) {
            Ok(raw) => {
                if let Err(e) = self.secure.set(PROFILE_KEY, &raw).await {
                    warn!(error = %e, "Failed to store profile");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize profile"),
        }

        self.session.update(|s| s.profile = Some(profile.clone()));
        self.persist();
        Ok(profile)
    }

    async fn store_credentials(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        profile: &UserProfile,
    ) -> Result<(), ApiFailure> {
        let storage_failure = |e: crate::domain::AppError| ApiFailure {
            message: e.to_string(),
            code: Some("secure_storage".to_string()),
        };

        let raw = serde_json::to_string(profile).map_err(|e| ApiFailure::new(e.to_string()))?;
        let mut entries = vec![(AUTH_TOKEN_KEY, access_token)];
        if let Some(refresh_token) = refresh_token {
            entries.push((REFRESH_TOKEN_KEY, refresh_token));
        }
        entries.push((PROFILE_KEY, raw.as_str()));

        for (key, value) in entries {
            if let Err(e) = self.secure.set(key, value).await {
                self.discard_credentials().await;
                return Err(storage_failure(e));
            }
        }
        Ok(())
    }

    /// Best-effort removal of every credential key.
    async fn discard_credentials(&self) {
        for key in [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, PROFILE_KEY] {
            if let Err(e) = self.secure.remove(key).await {
                warn!(error = %e, key, "Failed to remove credential");
            }
        }
    }

    fn describe_failure(&self, failure: ApiFailure) -> ApiFailure {
        if failure.is_transport() {
            ApiFailure {
                message: format!(
                    "cannot reach the cloud backend at {} ({})",
                    self.client.url(Backend::Cloud, ""),
                    failure.message
                ),
                code: failure.code,
            }
        } else {
            failure
        }
    }

    /// Profile from the last persisted snapshot of a signed-in session.
    fn persisted_profile(&self) -> Option<UserProfile> {
        let local = self.local.as_ref()?;
        match local.get_state::<PersistedSession>(SESSION_STATE_KEY) {
            Ok(Some(snapshot)) if snapshot.status == SessionStatus::Authenticated => {
                debug!(saved_at = %snapshot.saved_at, "Profile taken from persisted session");
                snapshot.profile
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Persisted session is unreadable");
                None
            }
        }
    }

    fn apply(&self, session: Session) {
        self.token.set(session.token.clone());
        self.session.update(|s| *s = session);
        self.persist();
    }

    fn persist(&self) {
        let Some(local) = &self.local else { return };
        let snapshot = PersistedSession::from_session(&self.session.read());
        if let Err(e) = local.put_state(SESSION_STATE_KEY, &snapshot) {
            warn!(error = %e, "Failed to persist session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use serde_json::json;
    use wiremock::MockServer;

    fn credentials() -> AuthCredentials {
        AuthCredentials {
            identifier: "ada@example.com".into(),
            password: "secret".into(),
            remember_me: false,
        }
    }

    fn store(server: &MockServer) -> (AuthStore, Arc<SecureTokenStore>, Arc<LocalStorage>) {
        let secure = Arc::new(SecureTokenStore::in_memory());
        let local = Arc::new(LocalStorage::open_in_memory().unwrap());
        let request = client(server);
        let token = TokenCell::default();
        let store = AuthStore::new(request, Arc::clone(&secure), Some(Arc::clone(&local)), token);
        (store, secure, local)
    }

    fn profile_json() -> serde_json::Value {
        json!({"id": "u1", "name": "Ada", "email": "ada@example.com"})
    }

    #[tokio::test]
    async fn test_login_server_error_leaves_anonymous() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/api/v1/auth/login", 500, json!({"error": "db down"})).await;
        let (store, secure, _) = store(&server);

        let err = store.login(&credentials()).await.unwrap_err();
        assert_eq!(err.message, "db down");

        let session = store.session();
        assert_eq!(session.status, SessionStatus::Anonymous);
        assert_eq!(session.error.as_deref(), Some("db down"));
        assert!(secure.get(AUTH_TOKEN_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_snapshot() {
        let server = MockServer::start().await;
        respond(
            &server,
            "POST",
            "/api/v1/auth/login",
            200,
            json!({
                "tokens": {"accessToken": "acc", "refreshToken": "ref"},
                "profile": profile_json(),
            }),
        )
        .await;
        let (store, secure, local) = store(&server);

        let profile = store.login(&credentials()).await.unwrap();
        assert_eq!(profile.name, "Ada");
        assert!(store.session().is_authenticated());
        assert_eq!(store.token.get().as_deref(), Some("acc"));
        assert_eq!(secure.get(REFRESH_TOKEN_KEY).await.as_deref(), Some("ref"));

        let persisted: PersistedSession = local.get_state(SESSION_STATE_KEY).unwrap().unwrap();
        assert_eq!(persisted.status, SessionStatus::Authenticated);
        assert!(!local.get_raw(SESSION_STATE_KEY).unwrap().unwrap().contains("acc"));
    }

    #[tokio::test]
    async fn test_unreachable_cloud_gets_readable_message() {
        let mut config = crate::domain::AppConfig::default();
        config.backends.cloud_url = "http://127.0.0.1:1".into();
        let request = RequestClient::new(&config, TokenCell::default());
        let store = AuthStore::new(
            request,
            Arc::new(SecureTokenStore::in_memory()),
            None,
            TokenCell::default(),
        );

        let err = store.login(&credentials()).await.unwrap_err();
        assert!(err.message.starts_with("cannot reach the cloud backend"));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_restore_session_from_secure_store() {
        let server = MockServer::start().await;
        let (store, secure, _) = store(&server);
        secure.set(AUTH_TOKEN_KEY, "tok").await.unwrap();
        secure
            .set(PROFILE_KEY, &profile_json().to_string())
            .await
            .unwrap();

        let session = store.restore_session().await;
        assert_eq!(session.status, SessionStatus::Authenticated);
        assert_eq!(store.token.get().as_deref(), Some("tok"));
        assert_eq!(store.profile().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_restore_without_profile_is_anonymous() {
        let server = MockServer::start().await;
        let (store, secure, _) = store(&server);
        secure.set(AUTH_TOKEN_KEY, "tok").await.unwrap();

        let session = store.restore_session().await;
        assert_eq!(session.status, SessionStatus::Anonymous);
        assert!(store.token.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_removes_everything() {
        let server = MockServer::start().await;
        let (store, secure, local) = store(&server);
        secure.set(AUTH_TOKEN_KEY, "tok").await.unwrap();
        secure.set(PROFILE_KEY, &profile_json().to_string()).await.unwrap();
        store.restore_session().await;

        store.logout().await.unwrap();
        assert!(secure.get(AUTH_TOKEN_KEY).await.is_none());
        assert!(secure.get(PROFILE_KEY).await.is_none());
        assert!(store.token.get().is_none());
        assert_eq!(store.session().status, SessionStatus::Anonymous);
        assert!(local.get_raw(SESSION_STATE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/api/v1/auth/refresh", 200, json!({"accessToken": "fresh"})).await;
        let (store, secure, _) = store(&server);

        assert!(store.refresh().await.is_err());

        secure.set(AUTH_TOKEN_KEY, "old").await.unwrap();
        secure.set(REFRESH_TOKEN_KEY, "ref").await.unwrap();
        secure.set(PROFILE_KEY, &profile_json().to_string()).await.unwrap();
        store.restore_session().await;

        store.refresh().await.unwrap();
        assert_eq!(store.token.get().as_deref(), Some("fresh"));
        assert_eq!(secure.get(AUTH_TOKEN_KEY).await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_load_profile_updates_session_and_secure_store() {
        let server = MockServer::start().await;
        let mut updated = profile_json();
        updated["organization"] = json!("Analytical Engines");
        respond(&server, "GET", "/api/v1/auth/profile", 200, updated).await;
        let (store, secure, _) = store(&server);

        let profile = store.load_profile().await.unwrap();
        assert_eq!(profile.organization.as_deref(), Some("Analytical Engines"));
        assert_eq!(store.profile(), Some(profile));
        assert!(secure.get(PROFILE_KEY).await.unwrap().contains("Analytical Engines"));
    }

    #[tokio::test]
    async fn test_failed_relogin_keeps_existing_session() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/api/v1/auth/login", 401, json!({"error": "bad password"})).await;
        let (store, secure, _) = store(&server);
        secure.set(AUTH_TOKEN_KEY, "old-tok").await.unwrap();
        secure.set(PROFILE_KEY, &profile_json().to_string()).await.unwrap();
        store.restore_session().await;

        let err = store.login(&credentials()).await.unwrap_err();
        assert_eq!(err.message, "bad password");

        let session = store.session();
        assert_eq!(session.status, SessionStatus::Authenticated);
        assert_eq!(session.token.as_deref(), Some("old-tok"));
        assert_eq!(session.error.as_deref(), Some("bad password"));
        assert_eq!(store.token.get().as_deref(), Some("old-tok"));
    }

    /// Bridge that refuses to store the profile.
    #[derive(Default)]
    struct ProfileRejectingBridge {
        entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
    }

    #[async_trait::async_trait]
    impl crate::infrastructure::SecureStorageBridge for ProfileRejectingBridge {
        async fn set(&self, key: &str, value: &str) -> crate::domain::Result<()> {
            if key.ends_with(PROFILE_KEY) {
                return Err(crate::domain::AppError::secure_storage("disk full"));
            }
            self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> crate::domain::Result<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn remove(&self, key: &str) -> crate::domain::Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_partial_credential_write_is_rolled_back() {
        let server = MockServer::start().await;
        respond(
            &server,
            "POST",
            "/api/v1/auth/login",
            200,
            json!({
                "tokens": {"accessToken": "acc", "refreshToken": "ref"},
                "profile": profile_json(),
            }),
        )
        .await;
        let bridge = Arc::new(ProfileRejectingBridge::default());
        let secure = Arc::new(SecureTokenStore::native(bridge.clone()));
        let token = TokenCell::default();
        let store = AuthStore::new(client(&server), secure, None, token.clone());

        let err = store.login(&credentials()).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("secure_storage"));
        assert!(bridge.entries.lock().unwrap().is_empty());
        assert!(token.get().is_none());
        assert_eq!(store.session().status, SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_restore_falls_back_to_persisted_profile() {
        let server = MockServer::start().await;
        let (store, secure, local) = store(&server);
        let profile: UserProfile = serde_json::from_value(profile_json()).unwrap();
        let snapshot = PersistedSession::from_session(&Session {
            token: Some("tok".into()),
            refresh_token: None,
            profile: Some(profile.clone()),
            status: SessionStatus::Authenticated,
            error: None,
        });
        local.put_state(SESSION_STATE_KEY, &snapshot).unwrap();
        secure.set(AUTH_TOKEN_KEY, "tok").await.unwrap();
        secure.set(PROFILE_KEY, "{not json").await.unwrap();

        let session = store.restore_session().await;
        assert_eq!(session.status, SessionStatus::Authenticated);
        assert_eq!(session.profile, Some(profile));
        assert_eq!(store.token.get().as_deref(), Some("tok"));
    }
}
