// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use figment::{
    providers::{Format, Yaml},
    Figment,
};

use crate::config::{Config, ConfigOverrides, ConfigSource};
use crate::error::ConfigError;

/// Reads tuning knobs from a YAML file. A missing file is an empty layer.
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        match figment.extract::<ConfigOverrides>() {
            Ok(overrides) => {
                overrides.apply(config);
                Ok(())
            }
            Err(e) => Err(ConfigError::Load(format!(
                "failed to parse {}: {e}",
                self.path.display()
            ))),
        }
    }
}
