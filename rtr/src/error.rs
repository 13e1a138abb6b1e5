// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("too small: {0}")]
    TooSmall(String),

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("invalid pdu length {0}")]
    InvalidLength(u32),

    #[error("bad pdu length: expected {expected} found {found}")]
    BadLength { expected: u32, found: u32 },

    /// A syntactically valid PDU carrying a type the cache never accepts
    /// from a router. The header version rides along so the session layer
    /// can distinguish a version problem from a type problem while still
    /// negotiating.
    #[error("unsupported pdu type {typ} (version {version})")]
    UnsupportedPduType { typ: u8, version: u8 },

    #[error("unexpected protocol version: {0}")]
    UnexpectedVersion(ExpectationMismatch<u8>),

    #[error("io {0}")]
    Io(#[from] std::io::Error),

    #[error("disconnected")]
    Disconnected,

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid prefix {0}")]
    InvalidPrefix(String),

    #[error("http {0}")]
    Http(#[from] reqwest::Error),

    #[error("json {0}")]
    Json(#[from] serde_json::Error),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("shutdown timed out")]
    ShutdownTimeout,

    #[error("internal communication error {0}")]
    InternalCommunication(String),
}

#[derive(Debug)]
pub struct ExpectationMismatch<T: Display> {
    pub expected: T,
    pub got: T,
}

impl<T: Display> Display for ExpectationMismatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected: {} got: {}", self.expected, self.got)
    }
}
