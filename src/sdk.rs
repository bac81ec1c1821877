//! One-stop assembly of the runtime: registry, cache, pipeline, session and gateway.
//!
//! ```no_run
//! # use driver_sdk::{DriverSdk, SdkConfig};
//! # async fn run<D: driver_sdk::Driver>(driver: D) -> driver_sdk::SdkResult<()> {
//! let config = SdkConfig::load()?;
//! let sdk = DriverSdk::connect(&config, driver)?;
//! sdk.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::{SdkConfig, SessionSettings};
use crate::driver::Driver;
use crate::error::SdkResult;
use crate::gateway::OutboundGateway;
use crate::pipeline::{FieldStage, LastValidValueCache, ProcessingPipeline};
use crate::registry::DeviceRegistry;
use crate::session::{ConnectionState, DriverDispatcher, GrpcTransport, Identity, SessionManager, Transport};

/// Running SDK instance for one driver process.
///
/// Must be created inside a tokio runtime: building it spawns the session actor.
pub struct DriverSdk {
    session: SessionManager,
    gateway: OutboundGateway,
    pipeline: Arc<ProcessingPipeline>,
    registry: Arc<DeviceRegistry>,
}

impl DriverSdk {
    pub fn builder<D: Driver>(driver: D, identity: Identity) -> DriverSdkBuilder<D> {
        DriverSdkBuilder {
            driver: Arc::new(driver),
            identity,
            settings: SessionSettings::default(),
            stages: Vec::new(),
        }
    }

    /// Validate `config` and assemble an SDK talking gRPC to the configured platform.
    ///
    /// The channel connects lazily; the first attempt happens on [`DriverSdk::start`].
    pub fn connect<D: Driver>(config: &SdkConfig, driver: D) -> SdkResult<Self> {
        config.validate()?;
        let transport = GrpcTransport::connect_lazy(&config.platform, config.session.stream_buffer)?;
        tracing::info!(endpoint = %config.platform.endpoint, "Platform channel configured");
        Ok(Self::builder(driver, config.identity())
            .settings(config.session.clone())
            .build(Arc::new(transport)))
    }

    pub async fn start(&self) -> SdkResult<()> {
        self.session.start().await
    }

    pub async fn stop(&self) -> SdkResult<()> {
        self.session.stop().await
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn gateway(&self) -> &OutboundGateway {
        &self.gateway
    }

    pub fn pipeline(&self) -> &Arc<ProcessingPipeline> {
        &self.pipeline
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}

/// Builder returned by [`DriverSdk::builder`].
pub struct DriverSdkBuilder<D: Driver> {
    driver: Arc<D>,
    identity: Identity,
    settings: SessionSettings,
    stages: Vec<(Arc<dyn FieldStage>, i32)>,
}

impl<D: Driver> DriverSdkBuilder<D> {
    #[must_use]
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Add a custom stage next to the built-in ones.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn FieldStage>, priority: i32) -> Self {
        self.stages.push((stage, priority));
        self
    }

    pub fn build(self, transport: Arc<dyn Transport>) -> DriverSdk {
        let registry = Arc::new(DeviceRegistry::new());
        let cache = Arc::new(LastValidValueCache::new());

        let pipeline = self
            .stages
            .into_iter()
            .fold(ProcessingPipeline::new(Arc::clone(&cache)), |pipeline, (stage, priority)| {
                pipeline.with_stage(stage, priority)
            });
        let pipeline = Arc::new(pipeline);
        tracing::debug!(stages = ?pipeline.stage_names(), "Processing pipeline assembled");

        let handler = Arc::new(DriverDispatcher::new(self.driver, Arc::clone(&registry), cache));
        let session = SessionManager::spawn(self.settings, self.identity.clone(), Arc::clone(&transport), handler);
        let gateway = OutboundGateway::new(
            session.subscribe(),
            transport,
            self.identity,
            Arc::clone(&registry),
            Arc::clone(&pipeline),
        );

        DriverSdk {
            session,
            gateway,
            pipeline,
            registry,
        }
    }
}
