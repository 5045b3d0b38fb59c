// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use logtail::config::Config;
use tokio::time::{sleep, timeout};

/// Config with short poll and settle intervals so tests run fast.
pub fn fast_config() -> Config {
    Config {
        backoff_ms: 10,
        max_retries: 3,
        poll_interval_ms: 10,
        settle_threshold_ms: 20,
        settle_poll_interval_ms: 10,
        ..Config::default()
    }
}

pub fn append(path: &Path, data: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
    file.flush().unwrap();
}

/// Polls `condition` until it holds, failing the test after ten seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(10), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
