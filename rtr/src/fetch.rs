// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use crate::roa::Roa;
use serde::Deserialize;
use slog::{debug, Logger};
use std::net::IpAddr;
use std::time::Duration;

/// Where ROAs come from. The server only ever sees this trait; production
/// uses [`HttpSource`], tests substitute canned data.
pub trait RoaSource: Send + Sync {
    /// Produce the complete raw ROA list for one generation. Duplicate
    /// and invalid entries are fine, the caller filters them.
    fn fetch(&self) -> Result<Vec<Roa>, Error>;
}

/// Exported VRP set as published by RPKI validators (routinator,
/// rpki-client, and friends).
///
/// ```json
/// { "roas": [ { "prefix": "1.2.3.0/24", "maxLength": 24, "asn": 64512 } ] }
/// ```
#[derive(Debug, Deserialize)]
struct VrpFile {
    roas: Vec<JsonRoa>,
}

#[derive(Debug, Deserialize)]
struct JsonRoa {
    prefix: String,
    #[serde(rename = "maxLength")]
    max_length: u8,
    asn: AsnField,
}

/// Validators disagree on the ASN encoding: some emit a bare number,
/// others a string like "AS64512".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AsnField {
    Number(u32),
    Text(String),
}

impl AsnField {
    fn normalize(&self) -> u32 {
        match self {
            AsnField::Number(n) => *n,
            AsnField::Text(s) => s
                .strip_prefix("AS")
                .or_else(|| s.strip_prefix("as"))
                .unwrap_or(s)
                .parse()
                .unwrap_or(0),
        }
    }
}

/// Fetches ROAs over HTTP from a set of validator endpoints. All URLs are
/// fetched concurrently; a failure on any one fails the whole load so a
/// partial generation is never installed.
pub struct HttpSource {
    urls: Vec<String>,
    client: reqwest::blocking::Client,
    log: Logger,
}

impl HttpSource {
    pub fn new(
        urls: Vec<String>,
        timeout: Duration,
        log: Logger,
    ) -> Result<HttpSource, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(HttpSource { urls, client, log })
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<Roa>, Error> {
        debug!(self.log, "fetching roas from {url}");
        let resp = self.client.get(url).send()?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamStatus(resp.status().as_u16()));
        }
        let body = resp.text()?;
        let vrps: VrpFile = serde_json::from_str(&body)?;
        vrps.roas.iter().map(convert).collect()
    }
}

impl RoaSource for HttpSource {
    fn fetch(&self) -> Result<Vec<Roa>, Error> {
        let results: Vec<Result<Vec<Roa>, Error>> =
            std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .urls
                    .iter()
                    .map(|url| scope.spawn(move || self.fetch_url(url)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(Error::InternalCommunication(
                                "fetch worker panicked".to_string(),
                            ))
                        })
                    })
                    .collect()
            });

        let mut combined = Vec::new();
        for result in results {
            combined.extend(result?);
        }
        Ok(combined)
    }
}

fn convert(json: &JsonRoa) -> Result<Roa, Error> {
    let (addr, prefix_len) = parse_prefix(&json.prefix)?;
    Ok(Roa {
        addr,
        prefix_len,
        max_len: json.max_length,
        asn: json.asn.normalize(),
    })
}

fn parse_prefix(s: &str) -> Result<(IpAddr, u8), Error> {
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| Error::InvalidPrefix(s.to_string()))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| Error::InvalidPrefix(s.to_string()))?;
    let len: u8 = len
        .parse()
        .map_err(|_| Error::InvalidPrefix(s.to_string()))?;
    Ok((addr, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_vrp_file() {
        let doc = r#"{
            "roas": [
                { "prefix": "1.2.3.0/24", "maxLength": 24, "asn": 64512 },
                { "prefix": "2001:db8::/32", "maxLength": 48, "asn": "AS64513" }
            ]
        }"#;
        let vrps: VrpFile = serde_json::from_str(doc).unwrap();
        let roas: Vec<Roa> =
            vrps.roas.iter().map(|j| convert(j).unwrap()).collect();

        assert_eq!(
            roas[0],
            Roa {
                addr: "1.2.3.0".parse().unwrap(),
                prefix_len: 24,
                max_len: 24,
                asn: 64512,
            }
        );
        assert_eq!(
            roas[1],
            Roa {
                addr: "2001:db8::".parse().unwrap(),
                prefix_len: 32,
                max_len: 48,
                asn: 64513,
            }
        );
    }

    #[test]
    fn asn_normalization() {
        assert_eq!(AsnField::Number(64512).normalize(), 64512);
        assert_eq!(AsnField::Text("AS64512".to_string()).normalize(), 64512);
        assert_eq!(AsnField::Text("as64512".to_string()).normalize(), 64512);
        assert_eq!(AsnField::Text("64512".to_string()).normalize(), 64512);
        assert_eq!(AsnField::Text("ASxyz".to_string()).normalize(), 0);
    }

    #[test]
    fn bad_prefix_rejected() {
        assert!(parse_prefix("1.2.3.0").is_err());
        assert!(parse_prefix("not-an-addr/24").is_err());
        assert!(parse_prefix("1.2.3.0/abc").is_err());
        assert!(parse_prefix("1.2.3.0/24").is_ok());
        assert!(parse_prefix("2001:db8::/129").is_ok()); // validity filter's job
    }
}
