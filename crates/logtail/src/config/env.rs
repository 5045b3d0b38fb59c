// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use figment::{providers::Env, Figment};

use crate::config::{Config, ConfigOverrides, ConfigSource};
use crate::error::ConfigError;

/// Prefix shared by every environment variable the agent reads.
pub const ENV_PREFIX: &str = "LOGTAIL_";

/// Reads tuning knobs from `LOGTAIL_*` environment variables, e.g.
/// `LOGTAIL_BACKOFF_MS=500`.
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<ConfigOverrides>() {
            Ok(overrides) => {
                overrides.apply(config);
                Ok(())
            }
            Err(e) => Err(ConfigError::Load(format!(
                "failed to parse environment variables: {e}"
            ))),
        }
    }
}
