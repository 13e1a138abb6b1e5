// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::cache::Cache;
use crate::config::Timing;
use crate::connection::RtrConnection;
use crate::error::{Error, ExpectationMismatch};
use crate::messages::{
    self, CacheResetPdu, CacheResponsePdu, EndOfDataPdu, ErrorCode,
    ErrorReportPdu, Ipv4PrefixPdu, Ipv6PrefixPdu, Pdu, SerialNotifyPdu,
    SerialQueryPdu, FLAG_ANNOUNCE, FLAG_WITHDRAW,
};
use crate::roa::Roa;
use slog::{debug, info, warn, Logger};
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Accumulate roughly this many bytes of response before committing them
/// to the socket. Large snapshots go out as a handful of big writes
/// instead of one syscall per prefix.
const FLUSH_BYTES: usize = 64 * 1024;

/// Everything that can wake a session up.
pub enum FsmEvent {
    /// The router sent a PDU.
    Message(Pdu),

    /// The receive loop hit a framing, protocol, or transport problem.
    /// Carries the error so the session can pick the right report code.
    Fault(Error),

    /// The refresher installed a new generation under this serial.
    SerialUpdate(u32),

    /// The server is going down.
    Shutdown,
}

/// Session states. Negotiation is resolved on the first inbound PDU, so
/// the machine starts in `AwaitingInitial`; `Idle` carries the pinned
/// protocol version for the rest of the session.
pub enum FsmState {
    /// Waiting for the router's first query. No version pinned yet.
    AwaitingInitial,

    /// Handshake complete. Serving queries and pushing notifies under
    /// the negotiated version.
    Idle(u8),

    /// Terminal. Transport is torn down on entry.
    Closed,
}

impl Display for FsmState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FsmState::AwaitingInitial => write!(f, "awaiting initial"),
            FsmState::Idle(v) => write!(f, "idle (version {v})"),
            FsmState::Closed => write!(f, "closed"),
        }
    }
}

/// Drives one router connection through the protocol: version
/// negotiation, the initial query, snapshot or diff streaming, then a
/// steady state of re-queries and serial notifies until something closes
/// the transport.
pub struct SessionRunner {
    cache: Arc<Cache>,
    conn: RtrConnection,
    event_rx: Receiver<FsmEvent>,
    timing: Timing,
    log: Logger,
}

impl SessionRunner {
    pub fn new(
        cache: Arc<Cache>,
        conn: RtrConnection,
        event_rx: Receiver<FsmEvent>,
        timing: Timing,
        log: Logger,
    ) -> SessionRunner {
        let log = log.new(slog::o!("peer" => conn.peer().to_string()));
        SessionRunner {
            cache,
            conn,
            event_rx,
            timing,
            log,
        }
    }

    pub fn run(&mut self) {
        info!(self.log, "session started");
        let mut state = FsmState::AwaitingInitial;
        loop {
            state = match state {
                FsmState::AwaitingInitial => self.awaiting_initial(),
                FsmState::Idle(version) => self.idle(version),
                FsmState::Closed => break,
            };
            debug!(self.log, "session state: {state}");
        }
        self.conn.close();
        info!(self.log, "session closed");
    }

    fn recv(&self) -> Option<FsmEvent> {
        // A dropped sender means the server side is gone; treat as close.
        self.event_rx.recv().ok()
    }

    fn awaiting_initial(&mut self) -> FsmState {
        let Some(event) = self.recv() else {
            return FsmState::Closed;
        };
        match event {
            FsmEvent::Message(pdu) => {
                let version = pdu.version();
                if !messages::version_supported(version) {
                    warn!(
                        self.log,
                        "unsupported protocol version {version}"
                    );
                    self.send_error(
                        None,
                        ErrorCode::UnsupportedProtocolVersion,
                        "unsupported protocol version",
                    );
                    return FsmState::Closed;
                }
                debug!(self.log, "negotiated version {version}");
                let typ = pdu.typ();
                match pdu {
                    Pdu::ResetQuery(_) => {
                        info!(self.log, "initial reset query");
                        self.serve_snapshot(version)
                    }
                    Pdu::SerialQuery(sq) => {
                        info!(
                            self.log,
                            "initial serial query at {}", sq.serial
                        );
                        self.serve_serial_query(version, &sq)
                    }
                    _ => {
                        warn!(
                            self.log,
                            "expected reset or serial query, got {typ:?}"
                        );
                        self.send_error(
                            Some(version),
                            ErrorCode::InvalidRequest,
                            "first pdu must be a reset or serial query",
                        );
                        FsmState::Closed
                    }
                }
            }
            // No version pinned yet; faults report under the fallback.
            FsmEvent::Fault(e) => {
                self.handle_fault(e, messages::VERSION_2, true)
            }
            FsmEvent::SerialUpdate(serial) => {
                // No handshake yet, nothing to notify.
                debug!(
                    self.log,
                    "ignoring serial {serial} update before handshake"
                );
                FsmState::AwaitingInitial
            }
            FsmEvent::Shutdown => FsmState::Closed,
        }
    }

    fn idle(&mut self, version: u8) -> FsmState {
        let Some(event) = self.recv() else {
            return FsmState::Closed;
        };
        match event {
            FsmEvent::Message(pdu) => {
                if pdu.version() != version {
                    let e = Error::UnexpectedVersion(ExpectationMismatch {
                        expected: version,
                        got: pdu.version(),
                    });
                    warn!(self.log, "closing session: {e}");
                    self.send_error(
                        Some(version),
                        ErrorCode::UnexpectedProtocolVersion,
                        "protocol version changed mid-session",
                    );
                    return FsmState::Closed;
                }
                match pdu {
                    Pdu::ResetQuery(_) => {
                        info!(self.log, "reset query");
                        self.serve_snapshot(version)
                    }
                    Pdu::SerialQuery(sq) => {
                        info!(self.log, "serial query at {}", sq.serial);
                        self.serve_serial_query(version, &sq)
                    }
                    Pdu::ErrorReport(report) => {
                        // RFC 8210 §5.11: never answer a report with
                        // another report.
                        warn!(
                            self.log,
                            "router reported error {}: {}",
                            report.code,
                            report.text_lossy()
                        );
                        FsmState::Closed
                    }
                    _ => {
                        self.send_error(
                            Some(version),
                            ErrorCode::InvalidRequest,
                            "unexpected pdu",
                        );
                        FsmState::Closed
                    }
                }
            }
            FsmEvent::Fault(e) => self.handle_fault(e, version, false),
            FsmEvent::SerialUpdate(serial) => self.notify(version, serial),
            FsmEvent::Shutdown => FsmState::Closed,
        }
    }

    /// Map a receive-side failure onto the protocol error taxonomy, send
    /// the report best-effort, and close. `version` is the session's
    /// pinned version, or the fallback while still negotiating; a fault
    /// that carries its own header version reports under that instead.
    fn handle_fault(
        &mut self,
        e: Error,
        version: u8,
        negotiating: bool,
    ) -> FsmState {
        match e {
            Error::Disconnected => {
                info!(self.log, "router disconnected");
            }
            Error::Io(e) => {
                warn!(self.log, "transport error: {e}");
            }
            Error::UnsupportedPduType {
                typ,
                version: pdu_version,
            } => {
                if negotiating && !messages::version_supported(pdu_version) {
                    warn!(
                        self.log,
                        "unsupported protocol version {pdu_version}"
                    );
                    self.send_error(
                        Some(pdu_version),
                        ErrorCode::UnsupportedProtocolVersion,
                        "unsupported protocol version",
                    );
                } else {
                    warn!(self.log, "unsupported pdu type {typ}");
                    self.send_error(
                        Some(pdu_version),
                        ErrorCode::UnsupportedPduType,
                        "pdu type not accepted by cache",
                    );
                }
            }
            Error::InvalidLength(len) => {
                warn!(self.log, "pdu length {len} out of range");
                self.send_error(
                    Some(version),
                    ErrorCode::CorruptData,
                    "pdu length out of range",
                );
            }
            Error::BadLength { expected, found } => {
                warn!(
                    self.log,
                    "pdu length mismatch: expected {expected} found {found}"
                );
                self.send_error(
                    Some(version),
                    ErrorCode::CorruptData,
                    "pdu length does not match type",
                );
            }
            Error::TooSmall(_) | Error::TooLarge(_) => {
                warn!(self.log, "malformed pdu: {e}");
                self.send_error(
                    Some(version),
                    ErrorCode::CorruptData,
                    "malformed pdu",
                );
            }
            e => {
                warn!(self.log, "internal session error: {e}");
                self.send_error(
                    Some(version),
                    ErrorCode::InternalError,
                    "internal error",
                );
            }
        }
        FsmState::Closed
    }

    /// Serve the full current snapshot: Cache Response, one prefix PDU
    /// per ROA, End of Data. The ROA set handle is taken up front so no
    /// lock is held while streaming.
    fn serve_snapshot(&mut self, version: u8) -> FsmState {
        let (roas, serial, session) = self.cache.snapshot();
        debug!(
            self.log,
            "serving snapshot: {} roas at serial {serial}",
            roas.len()
        );

        let mut buf = CacheResponsePdu { version, session }.to_wire();
        for roa in roas.iter() {
            buf.extend_from_slice(&prefix_pdu(version, FLAG_ANNOUNCE, roa));
            if buf.len() >= FLUSH_BYTES {
                if let Err(e) = self.conn.send(&buf) {
                    warn!(self.log, "snapshot write failed: {e}");
                    return FsmState::Closed;
                }
                buf.clear();
            }
        }
        buf.extend_from_slice(&self.end_of_data(version, session, serial));
        if let Err(e) = self.conn.send(&buf) {
            warn!(self.log, "snapshot write failed: {e}");
            return FsmState::Closed;
        }
        FsmState::Idle(version)
    }

    /// Serve a serial query. The cache can only answer from the current
    /// serial or the one immediately before it; anything else gets a
    /// Cache Reset so the router falls back to a full snapshot.
    fn serve_serial_query(
        &mut self,
        version: u8,
        query: &SerialQueryPdu,
    ) -> FsmState {
        let (diff, serial, session) = self.cache.current_diff();

        if query.serial == 0 {
            // Serial 0 is the "nothing yet" sentinel; the router needs a
            // full snapshot regardless of where the cache is.
            debug!(self.log, "serial 0 query, sending cache reset");
            return self
                .commit(&CacheResetPdu { version }.to_wire(), version);
        }

        if query.serial == serial {
            // Router is current; confirm with an empty response.
            let mut buf = CacheResponsePdu { version, session }.to_wire();
            buf.extend_from_slice(&self.end_of_data(version, session, serial));
            return self.commit(&buf, version);
        }

        if query.serial == serial.wrapping_sub(1) && !diff.is_empty() {
            debug!(
                self.log,
                "serving diff {} -> {serial}: {} changes",
                query.serial,
                diff.len()
            );
            let mut buf = CacheResponsePdu { version, session }.to_wire();
            for roa in &diff.added {
                buf.extend_from_slice(&prefix_pdu(
                    version,
                    FLAG_ANNOUNCE,
                    roa,
                ));
            }
            for roa in &diff.withdrawn {
                buf.extend_from_slice(&prefix_pdu(
                    version,
                    FLAG_WITHDRAW,
                    roa,
                ));
            }
            buf.extend_from_slice(&self.end_of_data(version, session, serial));
            return self.commit(&buf, version);
        }

        // Stale serial, future serial, or a diff-less gap: tell the
        // router to start over.
        debug!(
            self.log,
            "cannot serve serial {} at {serial}, sending cache reset",
            query.serial
        );
        self.commit(&CacheResetPdu { version }.to_wire(), version)
    }

    /// Push a Serial Notify for a freshly installed generation.
    fn notify(&mut self, version: u8, serial: u32) -> FsmState {
        let pdu = SerialNotifyPdu {
            version,
            session: self.cache.session_id(),
            serial,
        };
        match self.conn.send(&pdu.to_wire()) {
            Ok(()) => {
                debug!(self.log, "notified serial {serial}");
                FsmState::Idle(version)
            }
            Err(e) => {
                warn!(self.log, "notify write failed: {e}");
                FsmState::Closed
            }
        }
    }

    fn commit(&mut self, buf: &[u8], version: u8) -> FsmState {
        match self.conn.send(buf) {
            Ok(()) => FsmState::Idle(version),
            Err(e) => {
                warn!(self.log, "write failed: {e}");
                FsmState::Closed
            }
        }
    }

    fn end_of_data(&self, version: u8, session: u16, serial: u32) -> Vec<u8> {
        EndOfDataPdu {
            version,
            session,
            serial,
            refresh: self.timing.refresh,
            retry: self.timing.retry,
            expire: self.timing.expire,
        }
        .to_wire()
    }

    /// Best-effort Error Report. Failures here are moot, the transport
    /// is about to be torn down anyway.
    fn send_error(&self, version: Option<u8>, code: ErrorCode, text: &str) {
        let version = version.unwrap_or(messages::VERSION_2);
        let report = ErrorReportPdu::new(version, code, text);
        match report.to_wire() {
            Ok(buf) => {
                let _ = self.conn.send(&buf);
            }
            Err(e) => {
                warn!(self.log, "error report encode failed: {e}");
            }
        }
    }
}

fn prefix_pdu(version: u8, flags: u8, roa: &Roa) -> Vec<u8> {
    match roa.addr {
        IpAddr::V4(prefix) => Ipv4PrefixPdu {
            version,
            flags,
            prefix_len: roa.prefix_len,
            max_len: roa.max_len,
            prefix,
            asn: roa.asn,
        }
        .to_wire(),
        IpAddr::V6(prefix) => Ipv6PrefixPdu {
            version,
            flags,
            prefix_len: roa.prefix_len,
            max_len: roa.max_len,
            prefix,
            asn: roa.asn,
        }
        .to_wire(),
    }
}
