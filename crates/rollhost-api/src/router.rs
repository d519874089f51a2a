//! API router construction

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ApiConfig;
use crate::handlers;
use crate::handlers::sandbox::SandboxState;
use crate::openapi::ApiDoc;
use rollhost_agent::TrajectoryManager;

/// Build the API router over a trajectory manager
pub fn build_router(config: &ApiConfig, manager: Arc<TrajectoryManager>) -> Router {
    let state = SandboxState { manager };

    let cors = build_cors_layer(config);

    let sandbox_routes = Router::new()
        .route("/start_sandbox", post(handlers::sandbox::start_sandbox))
        .route("/run_command", post(handlers::sandbox::run_command))
        .route(
            "/shutdown_sandbox",
            post(handlers::sandbox::shutdown_sandbox),
        )
        .route("/get_output", get(handlers::sandbox::get_output))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/live", get(handlers::health::liveness))
        .route("/ready", get(handlers::health::readiness))
        .with_state(state);

    let mut router = Router::new()
        .merge(sandbox_routes)
        .nest("/health", health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    if config.swagger_enabled {
        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
}

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new().max_age(std::time::Duration::from_secs(config.cors.max_age));

    let cors = if config.cors.allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    };

    cors.allow_methods(Any).allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollhost_agent::MockRuntime;
    use rollhost_core::CoreConfig;

    fn test_manager() -> Arc<TrajectoryManager> {
        Arc::new(TrajectoryManager::new(
            CoreConfig::default(),
            Arc::new(MockRuntime::new()),
        ))
    }

    #[test]
    fn test_build_router() {
        let config = ApiConfig::default();
        let _router = build_router(&config, test_manager());
    }

    #[test]
    fn test_build_router_without_swagger() {
        let config = ApiConfig {
            swagger_enabled: false,
            ..Default::default()
        };
        let _router = build_router(&config, test_manager());
    }

    #[test]
    fn test_build_cors_layer_with_origins() {
        let mut config = ApiConfig::default();
        config.cors.allowed_origins = vec!["http://localhost:3000".to_string()];
        let _cors = build_cors_layer(&config);
    }
}
