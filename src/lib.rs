//! xray-keeper: issues, revokes and polices VLESS keys on an XRay server.
//!
//! Library crate shared by the binary and the integration tests in `tests/`.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod enforcement;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod provisioning;
pub mod store;
pub mod xray;

use clock::Clock;
use enforcement::{Throttler, UsageEnforcer};
use provisioning::artifact::SvgQrRenderer;
use provisioning::ProvisioningService;
use store::CredentialRegistry;
use xray::{CommandRunner, XrayConfigFile, XrayReloader};

/// Shared application state passed to handlers and jobs.
pub struct AppState {
    pub config: config::Config,
    pub registry: Arc<dyn CredentialRegistry>,
    pub provisioning: ProvisioningService,
    pub enforcer: Arc<UsageEnforcer>,
    pub runner: Arc<dyn CommandRunner>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire every component from one config, registry, command runner and clock.
    pub fn build(
        config: config::Config,
        registry: Arc<dyn CredentialRegistry>,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reloader = XrayReloader::new(runner.clone(), config.reload_argv());
        let provisioning = ProvisioningService::new(
            XrayConfigFile::new(config.xray_config_path.clone()),
            registry.clone(),
            reloader,
            config.network.clone(),
            clock.clone(),
            Arc::new(SvgQrRenderer::default()),
        );
        let enforcer = Arc::new(UsageEnforcer::new(Throttler::new(
            runner.clone(),
            config.throttle_device.clone(),
        )));

        Self {
            config,
            registry,
            provisioning,
            enforcer,
            runner,
            clock,
        }
    }

    pub fn reconciler(&self) -> jobs::expiration::ExpirationReconciler {
        jobs::expiration::ExpirationReconciler::new(
            XrayConfigFile::new(self.config.xray_config_path.clone()),
            self.registry.clone(),
            XrayReloader::new(self.runner.clone(), self.config.reload_argv()),
            self.clock.clone(),
        )
    }
}
