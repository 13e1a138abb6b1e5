// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::roa::{Diff, RoaSet};
use crate::{read_lock, write_lock};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Everything that must be observed together: a generation of ROAs, the
/// diff that produced it, and the serial that names it.
struct CacheState {
    roas: Arc<RoaSet>,
    diff: Arc<Diff>,
    serial: u32,
}

/// The single shared mutable resource in the server. One writer (the
/// refresher) installs generations; any number of session readers take
/// cheap snapshot handles. The session id is fixed for the life of the
/// process, so it lives outside the lock.
pub struct Cache {
    session: u16,
    state: RwLock<CacheState>,
}

impl Cache {
    /// Create an empty cache with a session id derived from the startup
    /// time. Serial is 0 until the initial install.
    pub fn new() -> Cache {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Cache::with_session((now & 0xFFFF) as u16)
    }

    pub fn with_session(session: u16) -> Cache {
        Cache {
            session,
            state: RwLock::new(CacheState {
                roas: Arc::new(RoaSet::default()),
                diff: Arc::new(Diff::default()),
                serial: 0,
            }),
        }
    }

    /// Install the first generation. Serial becomes 1, the diff is empty.
    pub fn install_initial(&self, roas: RoaSet) {
        let mut state = write_lock!(self.state);
        state.roas = Arc::new(roas);
        state.diff = Arc::new(Diff::default());
        state.serial = 1;
    }

    /// Diff `roas` against the current generation and, if anything
    /// changed, install it under the next serial. Returns whether an
    /// install happened. The diff is computed on a private snapshot; the
    /// write lock is held only across the pointer swaps.
    pub fn install_update(&self, roas: RoaSet) -> bool {
        let current = read_lock!(self.state).roas.clone();
        let diff = Diff::compute(&roas, &current);
        if diff.is_empty() {
            return false;
        }
        let mut state = write_lock!(self.state);
        state.roas = Arc::new(roas);
        state.diff = Arc::new(diff);
        state.serial = state.serial.wrapping_add(1);
        true
    }

    /// A consistent `(roas, serial, session)` triple. The returned set is
    /// immutable, so the caller can stream it without holding any lock.
    pub fn snapshot(&self) -> (Arc<RoaSet>, u32, u16) {
        let state = read_lock!(self.state);
        (state.roas.clone(), state.serial, self.session)
    }

    /// A consistent `(diff, serial, session)` triple. The diff is always
    /// the one that produced `serial` from `serial - 1`.
    pub fn current_diff(&self) -> (Arc<Diff>, u32, u16) {
        let state = read_lock!(self.state);
        (state.diff.clone(), state.serial, self.session)
    }

    pub fn serial(&self) -> u32 {
        read_lock!(self.state).serial
    }

    pub fn session_id(&self) -> u16 {
        self.session
    }

    pub fn len(&self) -> usize {
        read_lock!(self.state).roas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Cache {
    fn default() -> Self {
        Cache::new()
    }
}
