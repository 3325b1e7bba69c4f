//! Test data builders for pipeline configurations

use closable_pipeline::config::{AppConfig, StageConfig, StageKind};
use closable_pipeline::pipeline::FaultPolicy;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    /// Start from a config with no stages
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.stages.clear();
        Self { config }
    }

    pub fn items(mut self, items: u64) -> Self {
        self.config.pipeline.items = items;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.pipeline.capacity = capacity;
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.config.pipeline.fault_policy = policy;
        self
    }

    pub fn stage(mut self, name: &str, kind: StageKind) -> Self {
        self.config.stages.push(StageConfig::new(name, kind));
        self
    }

    pub fn stage_with_workers(mut self, name: &str, workers: usize, kind: StageKind) -> Self {
        self.config
            .stages
            .push(StageConfig::new(name, kind).with_workers(workers));
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .items(7)
            .stage("a", StageKind::Identity)
            .stage_with_workers("b", 3, StageKind::Trace)
            .build();

        assert_eq!(config.pipeline.items, 7);
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[1].workers, 3);
    }
}
