//! Tool gateway: `OpenAPI` operations as invokable agent tools.
//!
//! - [`catalog`]: spec -> tools for one configured API
//! - [`registry`]: tool registry over a durable [`store::ToolStore`]
//! - [`resolver`]: effective configuration (persisted + remote override)
//! - [`invocation`]: tool calls under the shared [`resilience`] policy
//! - [`mcp`]: conversion to MCP protocol types
//! - [`http`]: JSON HTTP surface

pub mod catalog;
pub mod error;
pub mod http;
pub mod invocation;
pub mod mcp;
pub mod model;
pub mod registry;
pub mod resilience;
pub mod resolver;
pub mod settings;
pub mod store;

pub use error::{ErrorCode, GatewayError, Result};
pub use invocation::{CallValidation, InvocationEngine, InvocationEngineParts};
pub use registry::{ConflictStrategy, ImportReport, ToolRegistry};

use anyhow::Context as _;
use axum::{Extension, Router};
use catalog::Catalog;
use http::AppState;
use resilience::SharedResilience;
use resolver::EffectiveConfigResolver;
use settings::GatewaySettings;
use std::sync::Arc;
use store::{
    ConfigurationStore, MemoryConfigurationStore, MemoryStatsStore, MemoryToolStore, StatsStore,
    ToolStore,
};
use unrelated_http_tools::{HttpTransport, ReqwestTransport};
use unrelated_openapi_tools::{DefaultSourceProvider, SpecIngester};

/// Durable stores a gateway runs on.
#[derive(Clone)]
pub struct GatewayStores {
    pub tools: Arc<dyn ToolStore>,
    pub configs: Arc<dyn ConfigurationStore>,
    pub stats: Arc<dyn StatsStore>,
}

impl GatewayStores {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tools: Arc::new(MemoryToolStore::new()),
            configs: Arc::new(MemoryConfigurationStore::new()),
            stats: Arc::new(MemoryStatsStore::new()),
        }
    }
}

/// A wired gateway: engine, registry and catalog sharing one transport and one set of stores.
pub struct Gateway {
    pub engine: Arc<InvocationEngine>,
    pub catalog: Catalog,
}

impl Gateway {
    /// Wire a gateway with a `reqwest` transport built from the outbound settings.
    ///
    /// # Errors
    ///
    /// See [`Gateway::build_with_transport`]; also fails if the HTTP client cannot be built.
    pub async fn build(settings: &GatewaySettings, stores: GatewayStores) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(settings.outbound.to_policy())
            .context("build outbound HTTP client")?;
        Self::build_with_transport(settings, stores, Arc::new(transport)).await
    }

    /// Wire a gateway, warm the registry from the store and import every configured API.
    ///
    /// An API whose import fails is logged and skipped; its previously stored tools stay
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be read during warm-up.
    pub async fn build_with_transport(
        settings: &GatewaySettings,
        stores: GatewayStores,
        transport: Arc<dyn HttpTransport>,
    ) -> anyhow::Result<Self> {
        let provider = Arc::new(DefaultSourceProvider::new(
            Arc::clone(&transport),
            settings.defaults.spec_fetch_timeout(),
        ));
        let ingester = Arc::new(SpecIngester::new(provider));
        let registry = ToolRegistry::new(Arc::clone(&stores.tools));
        registry.warm_up().await.context("warm up tool registry")?;

        let engine = Arc::new(InvocationEngine::new(InvocationEngineParts {
            registry: registry.clone(),
            configs: Arc::clone(&stores.configs),
            resolver: EffectiveConfigResolver::new(
                Arc::clone(&transport),
                settings.defaults.override_fetch_timeout(),
            ),
            transport,
            resilience: Arc::new(SharedResilience::new(settings.resilience.clone())),
            stats: stores.stats,
        }));
        engine.load_stats().await.context("load execution stats")?;

        let catalog = Catalog::new(ingester, registry, stores.configs);
        for api in &settings.apis {
            match catalog.import_api(api).await {
                Ok(report) => tracing::info!(
                    config_id = %api.config.id,
                    imported = report.imported,
                    skipped = report.skipped,
                    overwritten = report.overwritten,
                    "API imported"
                ),
                Err(e) => tracing::error!(config_id = %api.config.id, error = %format!("{e:#}"), "API import failed"),
            }
        }

        Ok(Self { engine, catalog })
    }

    pub fn router(&self) -> Router {
        http::router().layer(Extension(Arc::new(AppState {
            engine: Arc::clone(&self.engine),
        })))
    }
}

/// Build a gateway with in-memory stores and serve it until Ctrl-C.
///
/// # Errors
///
/// Returns an error if wiring fails or the listener cannot be bound.
pub async fn run(settings: GatewaySettings) -> anyhow::Result<()> {
    let gateway = Gateway::build(&settings, GatewayStores::in_memory()).await?;
    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("bind {}", settings.bind))?;
    tracing::info!(
        bind = %settings.bind,
        tools = gateway.engine.registry().count(),
        "Tool gateway listening"
    );
    axum::serve(listener, gateway.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("serve HTTP")
}
