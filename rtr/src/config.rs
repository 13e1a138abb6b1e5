// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

/// Default listen address for the RTR service.
pub const DEFAULT_LISTEN: &str = "[::]:8282";

/// Validator endpoints polled when none are configured.
pub const DEFAULT_RPKI_URLS: &[&str] = &[
    "https://hosted-routinator.rarc.net/json",
    "https://console.rpki-client.org/vrps.json",
];

/// End of Data timer defaults, in seconds.
pub const DEFAULT_REFRESH: u32 = 3600;
pub const DEFAULT_RETRY: u32 = 600;
pub const DEFAULT_EXPIRE: u32 = 7200;

/// The timer values routers receive in End of Data, already clamped to
/// the ranges RFC 8210 §6 allows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timing {
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

impl Timing {
    pub fn clamped(refresh: u32, retry: u32, expire: u32) -> Timing {
        Timing {
            refresh: refresh.clamp(1, 86400),
            retry: retry.clamp(1, 7200),
            expire: expire.clamp(600, 172800),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the RTR listener binds.
    pub listen: String,

    /// Validator JSON endpoints, fetched concurrently each refresh.
    pub rpki_urls: Vec<String>,

    /// End of Data timers handed to routers.
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,

    /// How often the refresher polls the validators.
    pub poll_interval: Duration,

    /// Per-request timeout on validator fetches.
    pub fetch_timeout: Duration,

    /// How long shutdown waits for sessions to drain.
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn timing(&self) -> Timing {
        Timing::clamped(self.refresh, self.retry, self.expire)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: DEFAULT_LISTEN.to_string(),
            rpki_urls: DEFAULT_RPKI_URLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            refresh: DEFAULT_REFRESH,
            retry: DEFAULT_RETRY,
            expire: DEFAULT_EXPIRE,
            poll_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_through_clamp() {
        let t = Config::default().timing();
        assert_eq!(
            t,
            Timing {
                refresh: 3600,
                retry: 600,
                expire: 7200
            }
        );
    }

    #[test]
    fn out_of_range_timers_clamped() {
        let t = Timing::clamped(0, 100000, 0);
        assert_eq!(t.refresh, 1);
        assert_eq!(t.retry, 7200);
        assert_eq!(t.expire, 600);

        let t = Timing::clamped(100000, 0, u32::MAX);
        assert_eq!(t.refresh, 86400);
        assert_eq!(t.retry, 1);
        assert_eq!(t.expire, 172800);
    }
}
