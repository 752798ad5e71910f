//! Session configuration options

use std::time::Duration;

use crate::deploy::poller;
use crate::storage::settings::Settings;

/// Publish session options
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Task log polling
    pub poller: poller::Options,
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            poller: poller::Options {
                interval: settings.poll_interval(),
                max_idle_polls: settings.max_idle_polls.max(1),
            },
        }
    }
}

impl SessionOptions {
    /// Options for tests and scripted runs that should not wait between polls
    pub fn without_delay() -> Self {
        Self {
            poller: poller::Options {
                interval: Duration::ZERO,
                ..Default::default()
            },
        }
    }
}
