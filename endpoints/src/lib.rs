pub mod config;
pub mod cookie_sync;
pub mod errors;
pub mod handler;
pub mod metrics_defs;
pub mod privacy;
pub mod service;
pub mod setuid;
pub mod state;

use config::Config;
use errors::EndpointError;
use metrics_defs::SYNCERS_CONFIGURED;
use service::EndpointService;
use shared::admin_service::AdminService;
use shared::gauge;
use shared::http::run_http_service;
use state::SyncState;
use std::sync::Arc;

pub async fn run(config: Config) -> Result<(), EndpointError> {
    let listener = config.listener.clone();
    let admin_listener = config.admin_listener.clone();

    let state = SyncState::new(config).map_err(|errors| {
        for error in &errors {
            tracing::error!(error = %error, "failed to build syncer");
        }
        EndpointError::SyncerBuild(errors.len())
    })?;
    gauge!(SYNCERS_CONFIGURED).set(state.syncers.len() as f64);

    let endpoint_task = run_http_service(
        &listener.host,
        listener.port,
        EndpointService::new(Arc::new(state)),
    );
    let admin_task = run_http_service(
        &admin_listener.host,
        admin_listener.port,
        AdminService::<_, EndpointError>::new(|| true),
    );

    tokio::try_join!(endpoint_task, admin_task)?;
    Ok(())
}
