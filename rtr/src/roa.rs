// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;

/// One validated route origin authorization. Produced by the fetcher,
/// never mutated afterwards. Equality and hashing cover all four fields,
/// which is exactly the identity the diff engine keys on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Roa {
    pub addr: IpAddr,
    pub prefix_len: u8,
    pub max_len: u8,
    pub asn: u32,
}

impl Roa {
    /// Canonical membership key, `<addr>/<plen>|<max>|<asn>`. The struct's
    /// own `Eq`/`Hash` agree with this projection; the string form exists
    /// for logs and diagnostics.
    pub fn key(&self) -> String {
        format!(
            "{}/{}|{}|{}",
            self.addr, self.prefix_len, self.max_len, self.asn
        )
    }

    /// Check the RFC 6482 §3.3 constraints on the max-length field.
    pub fn is_valid(&self) -> bool {
        if self.max_len == 0 {
            return false;
        }
        if self.max_len < self.prefix_len {
            return false;
        }
        match self.addr {
            IpAddr::V4(_) => self.max_len <= 32,
            IpAddr::V6(_) => self.max_len <= 128,
        }
    }
}

impl Display for Roa {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}-{} AS{}",
            self.addr, self.prefix_len, self.max_len, self.asn
        )
    }
}

/// An unordered collection of ROAs with no duplicates. Built once per
/// fetch generation and installed atomically; readers hold `Arc` handles
/// to it across entire streaming responses.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoaSet {
    roas: Vec<Roa>,
}

impl RoaSet {
    /// Build a set from raw fetcher output: keep the first occurrence of
    /// each ROA, drop duplicates, drop entries that fail validation.
    /// Input order is preserved so downstream output is deterministic for
    /// deterministic input.
    pub fn from_raw(raw: Vec<Roa>) -> RoaSet {
        let mut seen = HashSet::with_capacity(raw.len());
        let mut roas = Vec::with_capacity(raw.len());
        for roa in raw {
            if seen.insert(roa) && roa.is_valid() {
                roas.push(roa);
            }
        }
        RoaSet { roas }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Roa> {
        self.roas.iter()
    }

    pub fn len(&self) -> usize {
        self.roas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roas.is_empty()
    }
}

/// The set difference between two consecutive ROA generations. Served to
/// routers that serial-query at exactly one generation behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<Roa>,
    pub withdrawn: Vec<Roa>,
}

impl Diff {
    /// Symmetric difference of `new` against `old`, keyed by full ROA
    /// identity. Both output vectors follow the iteration order of their
    /// source set.
    pub fn compute(new: &RoaSet, old: &RoaSet) -> Diff {
        let new_keys: HashSet<&Roa> = new.iter().collect();
        let old_keys: HashSet<&Roa> = old.iter().collect();

        let added = new
            .iter()
            .filter(|r| !old_keys.contains(r))
            .copied()
            .collect();
        let withdrawn = old
            .iter()
            .filter(|r| !new_keys.contains(r))
            .copied()
            .collect();

        Diff { added, withdrawn }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.withdrawn.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.withdrawn.len()
    }
}
