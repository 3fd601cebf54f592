use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/auth/login", post(handlers::auth::login));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        // User endpoints
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/users", post(handlers::auth::create_user))
        // Host management endpoints
        .route("/api/hosts", post(handlers::hosts::create_host))
        .route("/api/hosts", get(handlers::hosts::list_hosts))
        .route("/api/hosts/batch", post(handlers::hosts::batch_create_hosts))
        .route("/api/hosts/import", post(handlers::hosts::import_hosts))
        .route("/api/hosts/export", get(handlers::hosts::export_hosts))
        .route("/api/hosts/:id", get(handlers::hosts::get_host))
        .route("/api/hosts/:id", put(handlers::hosts::update_host))
        .route("/api/hosts/:id", delete(handlers::hosts::delete_host))
        .route("/api/hosts/:id/test", post(handlers::hosts::test_host))
        // Script management endpoints
        .route("/api/scripts", post(handlers::scripts::create_script))
        .route("/api/scripts", get(handlers::scripts::list_scripts))
        .route("/api/scripts/:id", get(handlers::scripts::get_script))
        .route("/api/scripts/:id", put(handlers::scripts::update_script))
        .route("/api/scripts/:id", delete(handlers::scripts::delete_script))
        // Job management endpoints
        .route("/api/jobs", post(handlers::jobs::create_job))
        .route("/api/jobs", get(handlers::jobs::list_jobs))
        .route("/api/jobs/:id", get(handlers::jobs::get_job))
        .route("/api/jobs/:id", put(handlers::jobs::update_job))
        .route("/api/jobs/:id", delete(handlers::jobs::delete_job))
        .route("/api/jobs/:id/execute", post(handlers::jobs::execute_job))
        // Execution history endpoints
        .route(
            "/api/executions",
            get(handlers::executions::list_executions),
        )
        .route(
            "/api/executions/quick",
            post(handlers::executions::quick_exec),
        )
        .route(
            "/api/executions/batch-delete",
            post(handlers::executions::batch_delete_executions),
        )
        .route(
            "/api/executions/:id",
            get(handlers::executions::get_execution),
        )
        .route(
            "/api/executions/:id",
            delete(handlers::executions::delete_execution),
        )
        .route(
            "/api/executions/:id/save",
            post(handlers::executions::save_execution_result),
        )
        // File management endpoints
        .route("/api/files", post(handlers::files::upload_file))
        .route("/api/files", get(handlers::files::list_files))
        .route("/api/files/:id", get(handlers::files::get_file))
        .route("/api/files/:id", delete(handlers::files::delete_file))
        .route("/api/files/:id/download", get(handlers::files::download_file))
        // File distribution endpoints
        .route(
            "/api/distributions",
            post(handlers::distributions::create_distribution),
        )
        .route(
            "/api/distributions",
            get(handlers::distributions::list_distributions),
        )
        .route(
            "/api/distributions/:id",
            get(handlers::distributions::get_distribution),
        )
        .route(
            "/api/distributions/:id",
            delete(handlers::distributions::delete_distribution),
        )
        // Topology endpoints
        .route("/api/topology/tree", get(handlers::topology::get_topology_tree))
        .route(
            "/api/topology/businesses",
            post(handlers::topology::create_business),
        )
        .route(
            "/api/topology/businesses",
            get(handlers::topology::list_businesses),
        )
        .route(
            "/api/topology/businesses/:id",
            delete(handlers::topology::delete_business),
        )
        .route(
            "/api/topology/environments",
            post(handlers::topology::create_environment),
        )
        .route(
            "/api/topology/environments",
            get(handlers::topology::list_environments),
        )
        .route(
            "/api/topology/environments/:id",
            delete(handlers::topology::delete_environment),
        )
        .route(
            "/api/topology/clusters",
            post(handlers::topology::create_cluster),
        )
        .route(
            "/api/topology/clusters",
            get(handlers::topology::list_clusters),
        )
        .route(
            "/api/topology/clusters/:id",
            delete(handlers::topology::delete_cluster),
        )
        .route("/api/topology/hosts", post(handlers::topology::assign_host))
        .route(
            "/api/topology/hosts/:host_id",
            delete(handlers::topology::unassign_host),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
