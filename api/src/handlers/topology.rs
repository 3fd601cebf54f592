use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use common::errors::{DatabaseError, ValidationError};
use common::models::{
    Business, Cluster, Environment, Host, HostStatus, HostTopology, NodeStats, TopologyNode,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBusinessRequest {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    pub code: String,
    pub business_id: Uuid,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    pub code: String,
    pub environment_id: Uuid,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignHostRequest {
    pub host_id: Uuid,
    pub cluster_id: Uuid,
}

fn require_name_and_code(name: &str, code: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField("name".to_string()));
    }
    if code.trim().is_empty() {
        return Err(ValidationError::MissingField("code".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Businesses
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_business(
    State(state): State<AppState>,
    Json(req): Json<CreateBusinessRequest>,
) -> Result<SuccessResponse<Business>, ErrorResponse> {
    require_name_and_code(&req.name, &req.code)?;

    let now = Utc::now();
    let business = Business {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        code: req.code.trim().to_string(),
        description: req.description,
        owner: req.owner,
        created_at: now,
        updated_at: now,
    };

    state.topology_repo().create_business(&business).await?;
    Ok(SuccessResponse::new(business))
}

#[tracing::instrument(skip(state))]
pub async fn list_businesses(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<Business>>, ErrorResponse> {
    let businesses = state.topology_repo().find_businesses().await?;
    Ok(SuccessResponse::new(businesses))
}

#[tracing::instrument(skip(state))]
pub async fn delete_business(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.topology_repo().delete_business(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_environment(
    State(state): State<AppState>,
    Json(req): Json<CreateEnvironmentRequest>,
) -> Result<SuccessResponse<Environment>, ErrorResponse> {
    require_name_and_code(&req.name, &req.code)?;

    let now = Utc::now();
    let environment = Environment {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        code: req.code.trim().to_string(),
        business_id: req.business_id,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    state
        .topology_repo()
        .create_environment(&environment)
        .await?;
    Ok(SuccessResponse::new(environment))
}

#[tracing::instrument(skip(state))]
pub async fn list_environments(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<Environment>>, ErrorResponse> {
    let environments = state.topology_repo().find_environments().await?;
    Ok(SuccessResponse::new(environments))
}

#[tracing::instrument(skip(state))]
pub async fn delete_environment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.topology_repo().delete_environment(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_cluster(
    State(state): State<AppState>,
    Json(req): Json<CreateClusterRequest>,
) -> Result<SuccessResponse<Cluster>, ErrorResponse> {
    require_name_and_code(&req.name, &req.code)?;

    let now = Utc::now();
    let cluster = Cluster {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        code: req.code.trim().to_string(),
        environment_id: req.environment_id,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    state.topology_repo().create_cluster(&cluster).await?;
    Ok(SuccessResponse::new(cluster))
}

#[tracing::instrument(skip(state))]
pub async fn list_clusters(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<Cluster>>, ErrorResponse> {
    let clusters = state.topology_repo().find_clusters().await?;
    Ok(SuccessResponse::new(clusters))
}

#[tracing::instrument(skip(state))]
pub async fn delete_cluster(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.topology_repo().delete_cluster(id).await?;
    Ok(SuccessResponse::new(serde_json::json!({ "deleted": id })))
}

// ---------------------------------------------------------------------------
// Host assignments
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, req), fields(host_id = %req.host_id, cluster_id = %req.cluster_id))]
pub async fn assign_host(
    State(state): State<AppState>,
    Json(req): Json<AssignHostRequest>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state
        .host_repo()
        .find_by_id(req.host_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Host not found: {}", req.host_id)))?;

    state
        .topology_repo()
        .assign_host(req.host_id, req.cluster_id)
        .await?;
    Ok(SuccessResponse::new(serde_json::json!({
        "host_id": req.host_id,
        "cluster_id": req.cluster_id,
    })))
}

#[tracing::instrument(skip(state))]
pub async fn unassign_host(
    State(state): State<AppState>,
    Path(host_id): Path<Uuid>,
) -> Result<SuccessResponse<serde_json::Value>, ErrorResponse> {
    state.topology_repo().unassign_host(host_id).await?;
    Ok(SuccessResponse::new(
        serde_json::json!({ "host_id": host_id }),
    ))
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Render the full business / environment / cluster / host tree with
/// reachability stats rolled up at every level
#[tracing::instrument(skip(state))]
pub async fn get_topology_tree(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<TopologyNode>>, ErrorResponse> {
    let repo = state.topology_repo();
    let businesses = repo.find_businesses().await?;
    let environments = repo.find_environments().await?;
    let clusters = repo.find_clusters().await?;
    let assignments = repo.find_assignments().await?;
    let hosts = state.host_repo().find_all().await?;

    let tree = build_tree(&businesses, &environments, &clusters, &assignments, &hosts);
    Ok(SuccessResponse::new(tree))
}

fn host_node(host: &Host) -> TopologyNode {
    TopologyNode {
        id: host.id,
        name: host.name.clone(),
        code: None,
        kind: "host".to_string(),
        children: Vec::new(),
        host_status: Some(host.status),
        stats: None,
    }
}

fn stats_of(children: &[TopologyNode]) -> NodeStats {
    let mut stats = NodeStats::default();
    for child in children {
        match (&child.host_status, &child.stats) {
            (Some(status), _) => {
                stats.total_hosts += 1;
                match status {
                    HostStatus::Online => stats.online_hosts += 1,
                    HostStatus::Offline => stats.offline_hosts += 1,
                    HostStatus::Unknown => {}
                }
            }
            (None, Some(child_stats)) => {
                stats.total_hosts += child_stats.total_hosts;
                stats.online_hosts += child_stats.online_hosts;
                stats.offline_hosts += child_stats.offline_hosts;
            }
            (None, None) => {}
        }
    }
    stats
}

fn build_tree(
    businesses: &[Business],
    environments: &[Environment],
    clusters: &[Cluster],
    assignments: &[HostTopology],
    hosts: &[Host],
) -> Vec<TopologyNode> {
    let hosts_by_id: HashMap<Uuid, &Host> = hosts.iter().map(|h| (h.id, h)).collect();

    let mut hosts_by_cluster: HashMap<Uuid, Vec<&Host>> = HashMap::new();
    for assignment in assignments {
        if let Some(host) = hosts_by_id.get(&assignment.host_id) {
            hosts_by_cluster
                .entry(assignment.cluster_id)
                .or_default()
                .push(host);
        }
    }

    let mut clusters_by_env: HashMap<Uuid, Vec<&Cluster>> = HashMap::new();
    for cluster in clusters {
        clusters_by_env
            .entry(cluster.environment_id)
            .or_default()
            .push(cluster);
    }

    let mut envs_by_business: HashMap<Uuid, Vec<&Environment>> = HashMap::new();
    for environment in environments {
        envs_by_business
            .entry(environment.business_id)
            .or_default()
            .push(environment);
    }

    businesses
        .iter()
        .map(|business| {
            let env_nodes: Vec<TopologyNode> = envs_by_business
                .get(&business.id)
                .map(|envs| {
                    envs.iter()
                        .map(|environment| {
                            let cluster_nodes: Vec<TopologyNode> = clusters_by_env
                                .get(&environment.id)
                                .map(|clusters| {
                                    clusters
                                        .iter()
                                        .map(|cluster| {
                                            let host_nodes: Vec<TopologyNode> = hosts_by_cluster
                                                .get(&cluster.id)
                                                .map(|hosts| {
                                                    hosts.iter().map(|h| host_node(h)).collect()
                                                })
                                                .unwrap_or_default();
                                            let stats = stats_of(&host_nodes);
                                            TopologyNode {
                                                id: cluster.id,
                                                name: cluster.name.clone(),
                                                code: Some(cluster.code.clone()),
                                                kind: "cluster".to_string(),
                                                children: host_nodes,
                                                host_status: None,
                                                stats: Some(stats),
                                            }
                                        })
                                        .collect()
                                })
                                .unwrap_or_default();
                            let stats = stats_of(&cluster_nodes);
                            TopologyNode {
                                id: environment.id,
                                name: environment.name.clone(),
                                code: Some(environment.code.clone()),
                                kind: "environment".to_string(),
                                children: cluster_nodes,
                                host_status: None,
                                stats: Some(stats),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            let stats = stats_of(&env_nodes);
            TopologyNode {
                id: business.id,
                name: business.name.clone(),
                code: Some(business.code.clone()),
                kind: "business".to_string(),
                children: env_nodes,
                host_status: None,
                stats: Some(stats),
            }
        })
        .collect()
}
