//! Connection testing of issued credentials against the target database.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};

use crate::config::{RoleConfig, TargetDatabaseConfig};
use crate::leases::ConnectionTest;

use super::Credential;

/// Checks that a freshly issued credential actually works.
///
/// Testing is best-effort: implementations report [`ConnectionTest::Failed`]
/// instead of returning errors.
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    async fn test_connection(&self, role: &RoleConfig, credential: &Credential) -> ConnectionTest;

    /// Whether the target database answers at all, independent of any lease.
    async fn check_database(&self) -> ConnectionTest {
        ConnectionTest::Untested
    }
}

/// Opens a PostgreSQL connection with the credential and runs `SELECT version()`.
///
/// The role's `connection_info` (`host`, `port`, `database`) overrides the
/// configured target database.
#[derive(Debug, Clone)]
pub struct PostgresConnectionTester {
    target: TargetDatabaseConfig,
}

impl PostgresConnectionTester {
    pub fn new(target: TargetDatabaseConfig) -> Self {
        Self { target }
    }

    fn connect_options(
        &self,
        role: &RoleConfig,
        username: &str,
        password: &str,
    ) -> PgConnectOptions {
        let host = role.connection_info.get("host").unwrap_or(&self.target.host);
        let port = role
            .connection_info
            .get("port")
            .and_then(|p| u16::from_str(p).ok())
            .unwrap_or(self.target.port);
        let database = role.connection_info.get("database").unwrap_or(&self.target.database);

        PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(username)
            .password(password)
    }

    /// Connect and report the outcome under the configured timeout.
    async fn probe(&self, subject: &str, options: PgConnectOptions) -> ConnectionTest {
        let timeout: Duration = self.target.connect_timeout();

        match tokio::time::timeout(timeout, self.try_connect(options)).await {
            Ok(Ok(server_version)) => {
                tracing::info!(
                    subject = %subject,
                    server_version = %server_version,
                    "Database connection test succeeded"
                );
                ConnectionTest::Successful
            }
            Ok(Err(e)) => {
                tracing::warn!(subject = %subject, error = %e, "Database connection test failed");
                ConnectionTest::Failed
            }
            Err(_) => {
                tracing::warn!(
                    subject = %subject,
                    timeout_secs = timeout.as_secs(),
                    "Database connection test timed out"
                );
                ConnectionTest::Failed
            }
        }
    }

    async fn try_connect(&self, options: PgConnectOptions) -> Result<String, String> {
        let mut conn = PgConnection::connect_with(&options).await.map_err(|e| e.to_string())?;
        let version: (String,) = sqlx::query_as("SELECT version()")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| e.to_string())?;
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Failed to close test connection cleanly");
        }
        Ok(version.0)
    }
}

#[async_trait]
impl ConnectionTester for PostgresConnectionTester {
    async fn test_connection(&self, role: &RoleConfig, credential: &Credential) -> ConnectionTest {
        let (Some(username), Some(password)) = (credential.username(), credential.password())
        else {
            tracing::warn!(
                role = %role.name,
                "Credential has no username/password, cannot test connection"
            );
            return ConnectionTest::Failed;
        };

        let options = self.connect_options(role, username, password);
        self.probe(&role.name, options).await
    }

    async fn check_database(&self) -> ConnectionTest {
        let (Some(username), Some(password)) =
            (&self.target.health_username, &self.target.health_password)
        else {
            return ConnectionTest::Untested;
        };

        let options = PgConnectOptions::new()
            .host(&self.target.host)
            .port(self.target.port)
            .database(&self.target.database)
            .username(username)
            .password(password);
        self.probe("health", options).await
    }
}

/// Tester that always reports the same outcome.
///
/// Used for the in-memory backend, where there is no database to reach.
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectionTester(pub ConnectionTest);

#[async_trait]
impl ConnectionTester for FixedConnectionTester {
    async fn test_connection(
        &self,
        _role: &RoleConfig,
        _credential: &Credential,
    ) -> ConnectionTest {
        self.0
    }

    async fn check_database(&self) -> ConnectionTest {
        self.0
    }
}
