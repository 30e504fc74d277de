//! Credential renewal for advertising platform connections.
//!
//! Access tokens are long-lived but expire. [`needs_renewal`] decides when a
//! connection's token is close enough to expiry, and [`CredentialRenewer`]
//! exchanges it for a fresh long-lived token through the
//! `fb_exchange_token` grant.
//!
//! A failed renewal never touches the stored connection; the old token keeps
//! working until it actually expires.

mod error;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use uuid::Uuid;

pub use error::{OAuthError, Result};

use crate::entity::connection::Model as Connection;
use crate::graph::{GraphConfig, GraphError, short_error_message};
use crate::http::{HttpRequest, HttpTransport, redact_url};
use crate::repository::{self, TokenUpdate};

/// Tokens expiring within this many days are renewed.
pub const RENEWAL_WINDOW_DAYS: i64 = 7;

/// Lifetime assumed when the exchange response omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_DAYS: i64 = 60;

/// Whether `connection` should be renewed at `now`.
///
/// True iff it has a token, has an expiry, and the expiry is at most
/// [`RENEWAL_WINDOW_DAYS`] away (already expired tokens included).
pub fn needs_renewal(connection: &Connection, now: DateTime<Utc>) -> bool {
    connection.has_token()
        && connection
            .token_expires_at
            .is_some_and(|expires_at| {
                expires_at.with_timezone(&Utc) - now <= Duration::days(RENEWAL_WINDOW_DAYS)
            })
}

/// Token exchange response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl AccessTokenResponse {
    /// Expiry relative to `now`, defaulting to [`DEFAULT_TOKEN_LIFETIME_DAYS`].
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lifetime = self
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map_or(Duration::days(DEFAULT_TOKEN_LIFETIME_DAYS), Duration::seconds);
        now + lifetime
    }
}

/// URL for exchanging `access_token` for a long-lived token.
pub fn exchange_url(config: &GraphConfig, access_token: &str) -> Result<String> {
    let app_id = config
        .app_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OAuthError::configuration("graph.app_id is not set"))?;
    let app_secret = config
        .app_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OAuthError::configuration("graph.app_secret is not set"))?;

    let mut url = config
        .versioned_root()?
        .join("oauth/access_token")
        .map_err(GraphError::from)?;
    url.query_pairs_mut()
        .append_pair("grant_type", "fb_exchange_token")
        .append_pair("client_id", app_id)
        .append_pair("client_secret", app_secret)
        .append_pair("fb_exchange_token", access_token);
    Ok(url.into())
}

/// Exchanges and stores connection credentials.
#[derive(Clone)]
pub struct CredentialRenewer {
    db: Arc<DatabaseConnection>,
    transport: Arc<dyn HttpTransport>,
    config: GraphConfig,
}

impl CredentialRenewer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        transport: Arc<dyn HttpTransport>,
        config: GraphConfig,
    ) -> Self {
        Self {
            db,
            transport,
            config,
        }
    }

    /// Perform the token exchange without storing anything.
    pub async fn exchange(&self, access_token: &str) -> Result<AccessTokenResponse> {
        let url = exchange_url(&self.config, access_token)?;
        let response = self
            .transport
            .send(HttpRequest::get(url.as_str()))
            .await
            .map_err(GraphError::from)?;

        if !response.is_success() {
            let err = GraphError::from_response(&response);
            tracing::warn!(
                url = %redact_url(&url),
                status = response.status,
                error = %err,
                "Token exchange rejected"
            );
            return Err(err.into());
        }

        serde_json::from_slice(&response.body).map_err(|e| OAuthError::Parse(e.to_string()))
    }

    /// Renew `connection`'s token now.
    pub async fn renew(&self, connection: &Connection) -> Result<Connection> {
        self.renew_at(connection, Utc::now()).await
    }

    /// Renew `connection`'s token, treating `now` as the current time.
    ///
    /// On any failure the stored connection is left unmodified.
    pub async fn renew_at(&self, connection: &Connection, now: DateTime<Utc>) -> Result<Connection> {
        if !connection.has_token() {
            return Err(OAuthError::MissingToken);
        }

        let exchanged = match self.exchange(&connection.access_token).await {
            Ok(exchanged) => exchanged,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection.id,
                    error = %short_error_message(&e),
                    "Credential renewal failed, keeping current token"
                );
                return Err(e);
            }
        };

        let update = TokenUpdate {
            expires_at: exchanged.expires_at(now),
            access_token: exchanged.access_token,
            renewed_at: now,
        };
        let renewed = repository::connection::update_tokens(&self.db, connection.id, &update).await?;

        tracing::info!(
            connection_id = %connection.id,
            expires_at = ?renewed.token_expires_at,
            "Renewed connection credentials"
        );
        Ok(renewed)
    }
}

/// Outcome of [`renew_due`].
#[derive(Debug, Default)]
pub struct RenewalSummary {
    pub renewed: Vec<Uuid>,
    pub failed: Vec<(Uuid, String)>,
}

/// Renew every connection that needs it, isolating failures.
///
/// `transport_for` supplies the transport for each connection so throttles
/// are attributed to the right scope.
pub async fn renew_due<F>(
    db: &Arc<DatabaseConnection>,
    config: &GraphConfig,
    transport_for: F,
    now: DateTime<Utc>,
) -> Result<RenewalSummary>
where
    F: Fn(Uuid) -> Arc<dyn HttpTransport>,
{
    let candidates = repository::connection::find_expiring(db, now + Duration::days(RENEWAL_WINDOW_DAYS)).await?;
    let mut summary = RenewalSummary::default();

    for connection in candidates.iter().filter(|c| needs_renewal(c, now)) {
        let renewer = CredentialRenewer::new(Arc::clone(db), transport_for(connection.id), config.clone());
        match renewer.renew_at(connection, now).await {
            Ok(_) => summary.renewed.push(connection.id),
            Err(e) => summary.failed.push((connection.id, short_error_message(&e))),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;

    use crate::http::MockTransport;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn connection(token: &str, expires_at: Option<DateTime<Utc>>) -> Connection {
        let created = now().fixed_offset();
        Connection {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            label: "Main".to_string(),
            access_token: token.to_string(),
            refresh_token: None,
            token_expires_at: expires_at.map(|t| t.fixed_offset()),
            token_renewed_at: None,
            last_synced: json!({}),
            created_at: created,
            updated_at: created,
        }
    }

    fn config() -> GraphConfig {
        GraphConfig {
            base_url: "https://graph.example.com".to_string(),
            app_id: Some("app".to_string()),
            app_secret: Some("shh".to_string()),
            ..GraphConfig::default()
        }
    }

    #[test]
    fn needs_renewal_requires_token_and_expiry() {
        assert!(!needs_renewal(&connection("tok", None), now()));
        assert!(!needs_renewal(
            &connection("", Some(now() + Duration::days(1))),
            now()
        ));
    }

    #[test]
    fn needs_renewal_window_is_inclusive() {
        assert!(needs_renewal(
            &connection("tok", Some(now() + Duration::days(7))),
            now()
        ));
        assert!(!needs_renewal(
            &connection("tok", Some(now() + Duration::days(7) + Duration::seconds(1))),
            now()
        ));
        assert!(needs_renewal(
            &connection("tok", Some(now() - Duration::days(1))),
            now()
        ));
    }

    #[test]
    fn expires_at_defaults_to_sixty_days() {
        let response = AccessTokenResponse {
            access_token: "new".to_string(),
            token_type: None,
            expires_in: None,
        };
        assert_eq!(response.expires_at(now()), now() + Duration::days(60));

        let response = AccessTokenResponse {
            expires_in: Some(3600),
            ..response
        };
        assert_eq!(response.expires_at(now()), now() + Duration::hours(1));
    }

    #[test]
    fn exchange_url_requires_app_credentials() {
        let err = exchange_url(&GraphConfig::default(), "tok").expect_err("missing app id");
        assert!(matches!(err, OAuthError::Configuration(_)));

        let url = exchange_url(&config(), "short").expect("url");
        assert!(url.starts_with("https://graph.example.com/v19.0/oauth/access_token?"));
        assert!(url.contains("grant_type=fb_exchange_token"));
        assert!(url.contains("client_id=app"));
        assert!(url.contains("fb_exchange_token=short"));
    }

    #[tokio::test]
    async fn failed_exchange_leaves_connection_untouched() {
        let mock = MockTransport::new();
        let url = exchange_url(&config(), "old").expect("url");
        mock.push_json(url.as_str(), 400, json!({"error": {"code": 190, "message": "expired"}}));

        // No query or exec results: any database access would fail the test.
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Sqlite).into_connection());
        let renewer = CredentialRenewer::new(Arc::clone(&db), Arc::new(mock), config());

        let conn = connection("old", Some(now() + Duration::days(1)));
        let err = renewer.renew_at(&conn, now()).await.expect_err("rejected");
        assert!(matches!(err, OAuthError::Exchange(GraphError::Auth(_))));

        drop(renewer);
        let db = Arc::try_unwrap(db).ok().expect("sole owner");
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn successful_exchange_stores_new_token() {
        let mock = MockTransport::new();
        let url = exchange_url(&config(), "old").expect("url");
        mock.push_json(
            url.as_str(),
            200,
            json!({"access_token": "new", "token_type": "bearer", "expires_in": 5_184_000}),
        );

        let conn = connection("old", Some(now() + Duration::days(3)));
        let mut stored = conn.clone();
        stored.access_token = "new".to_string();
        stored.token_expires_at = Some((now() + Duration::days(60)).fixed_offset());
        stored.token_renewed_at = Some(now().fixed_offset());

        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![conn.clone()], vec![stored.clone()]])
            .append_exec_results([MockExecResult {
                rows_affected: 1,
                last_insert_id: 0,
            }])
            .into_connection();
        let renewer = CredentialRenewer::new(Arc::new(db), Arc::new(mock), config());

        let renewed = renewer.renew_at(&conn, now()).await.expect("renewed");
        assert_eq!(renewed.access_token, "new");
        assert_eq!(renewed.token_renewed_at, Some(now().fixed_offset()));
    }
}
