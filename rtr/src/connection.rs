// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use crate::lock;
use crate::messages;
use crate::session::FsmEvent;
use slog::{debug, Logger};
use std::io::Write;
use std::net::{
    Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::spawn;

pub struct RtrListener {
    listener: TcpListener,
}

impl RtrListener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<RtrListener, Error> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| Error::InvalidAddress(e.to_string()))?
            .next()
            .ok_or(Error::InvalidAddress(
                "at least one address required".into(),
            ))?;
        let listener = TcpListener::bind(addr)?;
        Ok(RtrListener { listener })
    }

    pub fn accept(&self, log: Logger) -> Result<RtrConnection, Error> {
        let (conn, peer) = self.listener.accept()?;
        Ok(RtrConnection::new(conn, peer, log))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }
}

/// One accepted router connection. Reading happens on a dedicated thread
/// that turns framed PDUs into session events; writing happens from the
/// session thread through [`send`](RtrConnection::send), which commits
/// whole pre-assembled buffers so responses coalesce into large segments.
pub struct RtrConnection {
    peer: SocketAddr,
    conn: Arc<Mutex<TcpStream>>,
    dropped: Arc<AtomicBool>,
    log: Logger,
}

impl RtrConnection {
    fn new(conn: TcpStream, peer: SocketAddr, log: Logger) -> RtrConnection {
        RtrConnection {
            peer,
            conn: Arc::new(Mutex::new(conn)),
            dropped: Arc::new(AtomicBool::new(false)),
            log,
        }
    }

    /// Spawn the receive loop. Each decoded PDU becomes a
    /// [`FsmEvent::Message`]; the first decode or transport failure
    /// becomes a [`FsmEvent::Fault`] and ends the loop.
    pub fn spawn_recv(
        &self,
        event_tx: Sender<FsmEvent>,
    ) -> Result<(), Error> {
        let mut stream = lock!(self.conn).try_clone()?;
        let dropped = self.dropped.clone();
        let log = self.log.clone();
        let peer = self.peer;
        spawn(move || {
            loop {
                match messages::read_pdu(&mut stream) {
                    Ok(pdu) => {
                        if event_tx.send(FsmEvent::Message(pdu)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if !dropped.load(Ordering::Relaxed) {
                            let _ = event_tx.send(FsmEvent::Fault(e));
                        }
                        break;
                    }
                }
                if dropped.load(Ordering::Relaxed) {
                    break;
                }
            }
            debug!(log, "recv loop for {peer} exited");
        });
        Ok(())
    }

    /// Commit a buffer to the socket in full.
    pub fn send(&self, buf: &[u8]) -> Result<(), Error> {
        let mut guard = lock!(self.conn);
        guard.write_all(buf)?;
        Ok(())
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Tear the transport down. Also unblocks the receive thread, which
    /// exits quietly once the dropped flag is up.
    pub fn close(&self) {
        self.dropped.store(true, Ordering::Relaxed);
        let _ = lock!(self.conn).shutdown(Shutdown::Both);
    }
}
