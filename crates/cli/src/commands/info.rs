//! Model description and health check

use super::EngineOptions;
use crate::output::HealthResponse;
use anyhow::Result;
use tracing::error;

pub fn model_info(options: &EngineOptions) -> Result<()> {
    let config = options.resolve_config()?;
    let engine = options.load_engine(&config)?;
    super::print_json(&engine.model_info(), false)
}

/// Print health status; exits non-zero when the models do not load
pub fn health(options: &EngineOptions) -> Result<()> {
    let loaded = options
        .resolve_config()
        .and_then(|config| options.load_engine(&config));

    match loaded {
        Ok(_) => super::print_json(
            &HealthResponse {
                status: "healthy",
                model_loaded: true,
                error: None,
            },
            false,
        ),
        Err(e) => {
            error!("Health check failed: {:#}", e);
            super::print_json(
                &HealthResponse {
                    status: "unhealthy",
                    model_loaded: false,
                    error: Some(format!("{:#}", e)),
                },
                false,
            )?;
            Err(e)
        }
    }
}
