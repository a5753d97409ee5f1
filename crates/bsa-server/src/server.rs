//! Server assembly
//!
//! Wires one [`StateAuthority`] into the HTTP routes and the reconciliation
//! loop. A zero reconcile interval or an unbindable listen address are the
//! only fatal errors.

use crate::api;
use bsa_core::{AuthorityConfig, Reconciler, ReconcilerHandle, StateAuthority};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Authority settings
    pub authority: AuthorityConfig,
    /// Listen address
    pub listen: SocketAddr,
}

impl ServerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With authority settings
    #[inline]
    #[must_use]
    pub fn with_authority(mut self, authority: AuthorityConfig) -> Self {
        self.authority = authority;
        self
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig::default(),
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Reconciliation would spin without pause
    #[error("reconcile interval must be non-zero")]
    ZeroInterval,

    /// Listen address unavailable
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying bind failure
        #[source]
        source: warp::Error,
    },
}

/// A bound, not yet running server
pub struct BoundServer {
    addr: SocketAddr,
    authority: Arc<StateAuthority>,
    reconciler: ReconcilerHandle,
    serve: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl BoundServer {
    /// Address actually bound; differs from the configured one for port 0
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Authority behind the routes
    #[inline]
    #[must_use]
    pub fn authority(&self) -> &Arc<StateAuthority> {
        &self.authority
    }

    /// Serve until the shutdown signal fires, then stop reconciliation
    pub async fn run(self) {
        tracing::info!(addr = %self.addr, "listening");
        self.serve.await;
        tracing::info!("http server stopped");
        self.reconciler.shutdown().await;
    }
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("addr", &self.addr)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

/// Create the authority, start reconciliation and bind the listener
///
/// Must be called from within a tokio runtime.
///
/// # Errors
/// - `ServeError::ZeroInterval` if the reconcile interval is zero
/// - `ServeError::Bind` if the listen address cannot be bound
pub fn bind(
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<BoundServer, ServeError> {
    if config.authority.reconcile_interval.is_zero() {
        return Err(ServeError::ZeroInterval);
    }
    let authority = Arc::new(StateAuthority::new(config.authority));

    let (addr, serve) = warp::serve(api::routes(Arc::clone(&authority)))
        .try_bind_with_graceful_shutdown(config.listen, shutdown)
        .map_err(|source| ServeError::Bind {
            addr: config.listen,
            source,
        })?;

    tracing::info!(
        repo_path = %authority.config().repo_path.display(),
        "state authority initialized"
    );
    let reconciler = Reconciler::new(Arc::clone(&authority)).spawn();

    Ok(BoundServer {
        addr,
        authority,
        reconciler,
        serve: Box::pin(serve),
    })
}

/// Bind and serve until `shutdown` fires
///
/// # Errors
/// - `ServeError::ZeroInterval` if the reconcile interval is zero
/// - `ServeError::Bind` if the listen address cannot be bound
pub async fn run(
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError> {
    bind(config, shutdown)?.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen_matches_reference_port() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port(), 8080);
        assert!(config.listen.ip().is_unspecified());
    }

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig::new()
            .with_authority(AuthorityConfig::new().with_repo_path(dir.path()))
            .with_listen(([127, 0, 0, 1], 0).into());

        let first = bind(config.clone(), std::future::pending()).unwrap();
        let taken = config.with_listen(first.local_addr());

        let err = bind(taken, std::future::pending()).unwrap_err();
        assert!(matches!(err, ServeError::Bind { .. }));
    }

    #[tokio::test]
    async fn zero_interval_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig::new()
            .with_authority(
                AuthorityConfig::new()
                    .with_repo_path(dir.path())
                    .with_reconcile_interval(std::time::Duration::ZERO),
            )
            .with_listen(([127, 0, 0, 1], 0).into());

        let err = bind(config, std::future::pending()).unwrap_err();
        assert!(matches!(err, ServeError::ZeroInterval));
    }
}
