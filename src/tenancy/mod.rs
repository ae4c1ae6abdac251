//! Per-company database routing.
//!
//! Every company owns a dedicated logical database. [`TenantRouter`] maps a
//! company code to a connection for that database, creating it on first use
//! and keeping it for the lifetime of the process.

pub mod postgres;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;

pub use postgres::{PgConnector, tenant_database_url};

pub const MAX_CODE_LEN: usize = 32;

/// A validated, uppercase company code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantCode(String);

impl TenantCode {
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RouterError::InvalidCode("Company code is required".to_string()));
        }
        if trimmed.len() > MAX_CODE_LEN {
            return Err(RouterError::InvalidCode(format!(
                "Company code must be at most {MAX_CODE_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RouterError::InvalidCode(
                "Company code may only contain letters, digits and '_'".to_string(),
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the company's database: `prefix` followed by the lowercased code.
    pub fn database_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0.to_ascii_lowercase())
    }
}

impl fmt::Display for TenantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub enum RouterError {
    InvalidCode(String),
    /// The code is well-formed but no company is registered under it.
    UnknownCompany(String),
    Unavailable(String),
    Closed,
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::InvalidCode(msg) => write!(f, "Invalid company code: {msg}"),
            RouterError::UnknownCompany(code) => write!(f, "No company registered as {code}"),
            RouterError::Unavailable(msg) => write!(f, "Company database unavailable: {msg}"),
            RouterError::Closed => write!(f, "Tenant router is shut down"),
        }
    }
}

impl std::error::Error for RouterError {}

/// Opens and closes the connections handed out by [`TenantRouter`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Clone + Send + Sync + 'static;

    async fn connect(&self, code: &TenantCode) -> Result<Self::Conn, RouterError>;

    async fn close(&self, conn: &Self::Conn);

    /// Close the primary (main registry) connection.
    async fn close_primary(&self);
}

/// Lazily-populated cache of per-company connections.
///
/// Creation is serialized per code: concurrent first requests for the same
/// company wait on a single connect attempt. A failed attempt leaves the slot
/// empty so the next request retries.
pub struct TenantRouter<C: Connector> {
    connector: C,
    connections: DashMap<TenantCode, Arc<OnceCell<C::Conn>>>,
    closed: AtomicBool,
}

impl<C: Connector> TenantRouter<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connections: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Resolve a raw company code to its connection.
    pub async fn get(&self, raw_code: &str) -> Result<C::Conn, RouterError> {
        let code = TenantCode::parse(raw_code)?;
        self.get_code(&code).await
    }

    pub async fn get_code(&self, code: &TenantCode) -> Result<C::Conn, RouterError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RouterError::Closed);
        }

        // Clone the slot out so the shard lock is released before awaiting.
        let slot = self
            .connections
            .entry(code.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(conn) = slot.get() {
            tracing::trace!("Using existing connection for company {code}");
            return Ok(conn.clone());
        }

        let conn = slot
            .get_or_try_init(|| async {
                tracing::info!("Creating connection for company {code}");
                match self.connector.connect(code).await {
                    Ok(conn) => {
                        tracing::info!("Company database connected for {code}");
                        Ok(conn)
                    }
                    Err(e) => {
                        tracing::error!("Error connecting to company database for {code}: {e}");
                        Err(e)
                    }
                }
            })
            .await?
            .clone();

        // Lost a race with shutdown: the slot may already be gone from the map.
        if self.closed.load(Ordering::Acquire) {
            self.connector.close(&conn).await;
            return Err(RouterError::Closed);
        }

        Ok(conn)
    }

    /// Codes with an open connection.
    pub fn connected(&self) -> Vec<TenantCode> {
        self.connections
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Close every cached connection and the primary connection.
    ///
    /// Safe to call more than once; only the first call does any work.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let slots: Vec<(TenantCode, Arc<OnceCell<C::Conn>>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.connections.clear();

        let closing = slots.iter().filter_map(|(code, slot)| {
            slot.get().map(|conn| async move {
                self.connector.close(conn).await;
                tracing::debug!("Closed connection for company {code}");
            })
        });
        futures_util::future::join_all(closing).await;

        self.connector.close_primary().await;
        tracing::info!("All database connections closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct FakeConnector {
        connects: AtomicUsize,
        closes: AtomicUsize,
        primary_closes: AtomicUsize,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl Connector for Arc<FakeConnector> {
        type Conn = Arc<String>;

        async fn connect(&self, code: &TenantCode) -> Result<Self::Conn, RouterError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RouterError::Unavailable("connection refused".to_string()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(code.database_name("hrms_")))
        }

        async fn close(&self, _conn: &Self::Conn) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        async fn close_primary(&self) {
            self.primary_closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn router() -> (Arc<FakeConnector>, TenantRouter<Arc<FakeConnector>>) {
        let connector = Arc::new(FakeConnector::default());
        (connector.clone(), TenantRouter::new(connector))
    }

    #[test]
    fn code_is_normalized_to_uppercase() {
        let code = TenantCode::parse("  acme_01 ").unwrap();
        assert_eq!(code.as_str(), "ACME_01");
        assert_eq!(code.database_name("hrms_"), "hrms_acme_01");
    }

    #[test]
    fn malformed_codes_are_rejected() {
        for raw in ["", "   ", "ac-me", "acme;drop", "ÄCME", &"X".repeat(33)] {
            assert!(
                matches!(TenantCode::parse(raw), Err(RouterError::InvalidCode(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn same_code_returns_cached_handle() {
        let (connector, router) = router();

        let first = router.get("acme").await.unwrap();
        let second = router.get("ACME").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_codes_get_distinct_handles() {
        let (connector, router) = router();

        let acme = router.get("ACME").await.unwrap();
        let globex = router.get("GLOBEX").await.unwrap();

        assert!(!Arc::ptr_eq(&acme, &globex));
        assert_eq!(acme.as_str(), "hrms_acme");
        assert_eq!(globex.as_str(), "hrms_globex");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_code_fails_before_connecting() {
        let (connector, router) = router();

        let err = router.get("bad code").await.unwrap_err();

        assert!(matches!(err, RouterError::InvalidCode(_)));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(router.connected().is_empty());
    }

    #[tokio::test]
    async fn failed_connect_is_not_cached() {
        let (connector, router) = router();
        connector.fail_next.store(true, Ordering::SeqCst);

        assert!(matches!(
            router.get("ACME").await,
            Err(RouterError::Unavailable(_))
        ));
        assert!(router.connected().is_empty());

        router.get("ACME").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_access_connects_once() {
        let (connector, router) = router();
        let router = Arc::new(router);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { router.get("acme").await.unwrap() })
            })
            .collect();

        let mut conns = Vec::new();
        for handle in handles {
            conns.push(handle.await.unwrap());
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(conns.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn shutdown_closes_everything_once() {
        let (connector, router) = router();
        router.get("ACME").await.unwrap();
        router.get("GLOBEX").await.unwrap();

        router.shutdown().await;
        router.shutdown().await;

        assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
        assert_eq!(connector.primary_closes.load(Ordering::SeqCst), 1);
        assert!(router.connected().is_empty());
        assert!(matches!(router.get("ACME").await, Err(RouterError::Closed)));
    }
}
