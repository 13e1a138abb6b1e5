// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::cache::Cache;
use crate::config::Config;
use crate::connection::{RtrConnection, RtrListener};
use crate::error::Error;
use crate::fetch::RoaSource;
use crate::lock;
use crate::roa::RoaSet;
use crate::session::{FsmEvent, SessionRunner};
use slog::{debug, error, info, warn, Logger};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{sleep, spawn};
use std::time::{Duration, Instant};

/// Granularity at which the refresher notices a shutdown request.
const TICK_RESOLUTION: Duration = Duration::from_millis(100);

/// The RTR cache server: owns the shared cache, the session registry,
/// the refresher, and the accept loop.
pub struct Server {
    config: Config,
    source: Arc<dyn RoaSource>,
    cache: Arc<Cache>,
    registry: Arc<Mutex<BTreeMap<SocketAddr, Sender<FsmEvent>>>>,
    shutdown: Arc<AtomicBool>,
    active: Arc<(Mutex<usize>, Condvar)>,
    local_addr: Mutex<Option<SocketAddr>>,
    log: Logger,
}

impl Server {
    pub fn new(
        config: Config,
        source: Arc<dyn RoaSource>,
        cache: Arc<Cache>,
        log: Logger,
    ) -> Server {
        Server {
            config,
            source,
            cache,
            registry: Arc::new(Mutex::new(BTreeMap::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new((Mutex::new(0), Condvar::new())),
            local_addr: Mutex::new(None),
            log,
        }
    }

    /// Prime the cache with an initial fetch, bind the listener, and
    /// spawn the refresher and accept loops. Returns the bound address.
    /// Both the fetch and the bind are fatal if they fail; the server
    /// never listens with an unprimed cache.
    pub fn start(self: Arc<Self>) -> Result<SocketAddr, Error> {
        let roas = RoaSet::from_raw(self.source.fetch()?);
        info!(self.log, "loaded {} initial roas", roas.len());
        self.cache.install_initial(roas);

        let listener = RtrListener::bind(&self.config.listen)?;
        let addr = listener.local_addr()?;
        *lock!(self.local_addr) = Some(addr);
        info!(
            self.log,
            "listening on {addr} with session id {}",
            self.cache.session_id()
        );

        let s = self.clone();
        spawn(move || s.refresh_loop());

        let s = self;
        spawn(move || s.accept_loop(listener));

        Ok(addr)
    }

    fn accept_loop(&self, listener: RtrListener) {
        loop {
            let conn = match listener.accept(self.log.clone()) {
                Ok(conn) => conn,
                Err(e) => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    error!(self.log, "accept error: {e}");
                    continue;
                }
            };
            if self.shutdown.load(Ordering::Relaxed) {
                // The wake-up connection from shutdown, or a straggler.
                break;
            }
            info!(self.log, "router connected: {}", conn.peer());
            self.spawn_session(conn);
        }
        debug!(self.log, "accept loop exited");
    }

    fn spawn_session(&self, conn: RtrConnection) {
        let peer = conn.peer();
        let (event_tx, event_rx) = channel();

        if let Err(e) = conn.spawn_recv(event_tx.clone()) {
            warn!(self.log, "failed to start recv loop for {peer}: {e}");
            conn.close();
            return;
        }

        lock!(self.registry).insert(peer, event_tx);
        {
            let (count, _) = &*self.active;
            *lock!(count) += 1;
        }

        let cache = self.cache.clone();
        let registry = self.registry.clone();
        let active = self.active.clone();
        let timing = self.config.timing();
        let log = self.log.clone();
        spawn(move || {
            let mut runner =
                SessionRunner::new(cache, conn, event_rx, timing, log.clone());
            runner.run();

            lock!(registry).remove(&peer);
            let (count, cv) = &*active;
            *lock!(count) -= 1;
            cv.notify_all();
            info!(log, "router disconnected: {peer}");
        });
    }

    /// Poll the validators on the configured cadence. A successful fetch
    /// that actually changes the data set is installed under a new serial
    /// and every connected session is told to notify its router. Fetch
    /// failures keep the previous generation.
    fn refresh_loop(&self) {
        loop {
            let mut waited = Duration::ZERO;
            while waited < self.config.poll_interval {
                if self.shutdown.load(Ordering::Relaxed) {
                    debug!(self.log, "refresh loop exited");
                    return;
                }
                sleep(TICK_RESOLUTION);
                waited += TICK_RESOLUTION;
            }

            debug!(self.log, "checking for roa updates");
            let raw = match self.source.fetch() {
                Ok(raw) => raw,
                Err(e) => {
                    error!(self.log, "roa refresh failed: {e}");
                    continue;
                }
            };

            if self.cache.install_update(RoaSet::from_raw(raw)) {
                let (diff, serial, _) = self.cache.current_diff();
                info!(
                    self.log,
                    "installed serial {serial}: {} added, {} withdrawn",
                    diff.added.len(),
                    diff.withdrawn.len()
                );
                for (peer, tx) in lock!(self.registry).iter() {
                    debug!(self.log, "notifying {peer} of serial {serial}");
                    if tx.send(FsmEvent::SerialUpdate(serial)).is_err() {
                        debug!(self.log, "session {peer} already gone");
                    }
                }
            }
        }
    }

    /// Stop accepting, tell every session to wind down, and wait up to
    /// `timeout` for them to drain.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), Error> {
        info!(self.log, "shutting down");
        self.shutdown.store(true, Ordering::Relaxed);

        // The accept loop is blocked in accept(); poke it awake.
        if let Some(addr) = *lock!(self.local_addr) {
            let wake = if addr.ip().is_unspecified() {
                let loopback: IpAddr = match addr.ip() {
                    IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                    IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
                };
                SocketAddr::new(loopback, addr.port())
            } else {
                addr
            };
            let _ = TcpStream::connect_timeout(&wake, Duration::from_secs(1));
        }

        for (peer, tx) in lock!(self.registry).iter() {
            debug!(self.log, "sending shutdown to {peer}");
            let _ = tx.send(FsmEvent::Shutdown);
        }

        let deadline = Instant::now() + timeout;
        let (count, cv) = &*self.active;
        let mut active = lock!(count);
        while *active > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    self.log,
                    "shutdown timed out with {} sessions active", *active
                );
                return Err(Error::ShutdownTimeout);
            }
            let (guard, _) = cv
                .wait_timeout(active, remaining)
                .expect("condvar wait");
            active = guard;
        }
        info!(self.log, "all sessions drained");
        Ok(())
    }
}
