//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliService};
use crate::config::{IntakeConfig, ServiceConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to an [`IntakeConfig`]
///
/// The config file (if any) is the base; flags override it.
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn from_cli(cli: &Cli) -> Result<IntakeConfig> {
        let mut config = match &cli.config {
            Some(path) => IntakeConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => IntakeConfig::default(),
        };

        if let Some(dir) = &cli.output_dir {
            config.download_dir = Some(dir.clone());
        }

        config.service = Self::resolve_service(cli, &config.service)?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn resolve_service(cli: &Cli, base: &ServiceConfig) -> Result<ServiceConfig> {
        // An endpoint on its own selects the HTTP service
        let wanted = cli.service.or_else(|| cli.endpoint.as_ref().map(|_| CliService::Http));

        let service = match (wanted, base) {
            (None, ServiceConfig::Mock { step_delay_ms, fail })
            | (Some(CliService::Mock), ServiceConfig::Mock { step_delay_ms, fail }) => {
                ServiceConfig::Mock {
                    step_delay_ms: cli.mock_delay_ms.unwrap_or(*step_delay_ms),
                    fail: cli.mock_fail || *fail,
                }
            },
            (Some(CliService::Mock), ServiceConfig::Http { .. }) => ServiceConfig::Mock {
                step_delay_ms: cli.mock_delay_ms.unwrap_or(0),
                fail: cli.mock_fail,
            },
            (None | Some(CliService::Http), ServiceConfig::Http {
                endpoint,
                timeout_secs,
            }) => ServiceConfig::Http {
                endpoint: cli.endpoint.clone().unwrap_or_else(|| endpoint.clone()),
                timeout_secs: cli.timeout.unwrap_or(*timeout_secs),
            },
            (Some(CliService::Http), ServiceConfig::Mock { .. }) => {
                let endpoint = cli
                    .endpoint
                    .clone()
                    .context("--service http requires --endpoint or an endpoint in the config file")?;
                ServiceConfig::Http {
                    endpoint,
                    timeout_secs: cli.timeout.unwrap_or(300),
                }
            },
        };
        Ok(service)
    }
}
