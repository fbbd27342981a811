use crate::{
    analytics::AnalyticsService,
    auth::{
        jwt::{JwtService, JwtServiceImpl, parse_algorithm},
        middleware::jwt_auth_middleware,
    },
    config::Config,
    error::AppError,
    health::HealthService,
    oauth::{
        ConnectorHealthChecker, ConnectorRegistry, InstagramConnector, LinkedInConnector,
        StateStore,
    },
    routes::{
        create_account_routes, create_ai_routes, create_auth_routes, create_callback_routes,
        create_health_routes, create_protected_auth_routes,
    },
    storage::{Storage, StorageFactory, StorageHealthChecker},
};
use axum::{Router, middleware};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub jwt_service: Arc<dyn JwtService>,
    pub storage: Arc<Storage>,
    pub connectors: ConnectorRegistry,
    pub analytics: Arc<AnalyticsService>,
    pub health_service: Arc<HealthService>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let jwt_algorithm = parse_algorithm(&config.jwt.algorithm)?;
        let jwt_service_impl = JwtServiceImpl::new(&config.jwt.secret, jwt_algorithm);
        let jwt_service: Arc<dyn JwtService> = Arc::new(jwt_service_impl.clone());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let storage = Arc::new(StorageFactory::create_from_config(&config).await?);
        let states = StateStore::new(storage.clone());

        let mut connectors = ConnectorRegistry::new();
        connectors.register(Arc::new(InstagramConnector::new(
            config.platforms.instagram.clone(),
            http.clone(),
            storage.clone(),
            states.clone(),
        )));
        connectors.register(Arc::new(LinkedInConnector::new(
            config.platforms.linkedin.clone(),
            http.clone(),
            storage.clone(),
            states.clone(),
        )));

        let analytics = Arc::new(AnalyticsService::new(
            storage.clone(),
            connectors.clone(),
            http,
            config.platforms.instagram.graph_api_url.clone(),
        ));

        let health_service = Arc::new(HealthService::new());
        health_service
            .register(Arc::new(StorageHealthChecker::new(storage.clone())))
            .await;
        health_service
            .register(jwt_service_impl.health_checker())
            .await;
        health_service
            .register(Arc::new(ConnectorHealthChecker::new(
                crate::storage::Platform::Instagram,
                &config.platforms.instagram.client_id,
                &config.platforms.instagram.client_secret,
            )))
            .await;
        health_service
            .register(Arc::new(ConnectorHealthChecker::new(
                crate::storage::Platform::Linkedin,
                &config.platforms.linkedin.client_id,
                &config.platforms.linkedin.client_secret,
            )))
            .await;

        Ok(Self {
            config: Arc::new(config),
            jwt_service,
            storage,
            connectors,
            analytics,
            health_service,
        })
    }

    pub async fn run(&self) -> Result<(), AppError> {
        let app = self.create_app();

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            })
            .await
            .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

        info!("Server shutdown complete");
        Ok(())
    }

    /// Creates the application router
    pub fn create_app(&self) -> Router {
        Router::new()
            .nest("/api/auth", create_auth_routes())
            .nest("/api/auth", self.protected_auth_routes())
            .nest("/api/social-accounts", self.account_routes())
            .nest("/api/oauth", create_callback_routes())
            .nest("/api/ai", self.ai_routes())
            .nest("/health", create_health_routes())
            .with_state(self.clone())
    }

    fn protected_auth_routes(&self) -> Router<Server> {
        create_protected_auth_routes().layer(middleware::from_fn_with_state(
            self.clone(),
            jwt_auth_middleware,
        ))
    }

    fn account_routes(&self) -> Router<Server> {
        create_account_routes().layer(middleware::from_fn_with_state(
            self.clone(),
            jwt_auth_middleware,
        ))
    }

    fn ai_routes(&self) -> Router<Server> {
        create_ai_routes().layer(middleware::from_fn_with_state(
            self.clone(),
            jwt_auth_middleware,
        ))
    }
}
