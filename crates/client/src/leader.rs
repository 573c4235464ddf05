// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader election on the client side.
//!
//! A pure state machine: announcements, join completions, and session
//! losses go in, actions come out. The run loop performs the bus I/O the
//! actions call for, so no lock is ever held across an await.

use std::collections::VecDeque;

use lumenwire::bus::{Announcement, SessionId};

/// Ignore-set bound; a stale join reply per rotation is the only legitimate
/// occupant, so the set stays tiny in practice.
pub const IGNORE_CAP: usize = 32;

/// The highest-ranked leader seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentLeader {
    pub bus_name: String,
    pub device_id: String,
    pub device_name: String,
    pub rank: u64,
    pub port: u16,
    pub session: Option<SessionId>,
}

/// A session to tear down before joining a better leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornDown {
    pub session: SessionId,
    pub device_id: String,
    pub device_name: String,
}

/// Where to direct the next session join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTarget {
    pub bus_name: String,
    pub port: u16,
    pub device_id: String,
    pub device_name: String,
}

/// What to do with one announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnounceAction {
    /// Not a leader, lower-ranked, or nothing changed.
    Drop,
    /// The connected leader renamed itself.
    NameChanged { device_id: String, device_name: String },
    /// A better leader: optionally tear down, then join.
    Connect { teardown: Option<TornDown>, target: JoinTarget },
}

/// What to do with one join completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A suppressed reply from a superseded leader; leave `session` if any.
    Ignored { session: Option<SessionId> },
    Connected { device_id: String, device_name: String, session: SessionId },
    Failed { device_id: String, device_name: String },
    /// Completion for a device that is neither current nor ignored.
    Stale { session: Option<SessionId> },
}

pub struct LeaderTracker {
    current: CurrentLeader,
    ignore: VecDeque<String>,
}

impl Default for LeaderTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderTracker {
    pub fn new() -> Self {
        Self { current: CurrentLeader::default(), ignore: VecDeque::new() }
    }

    pub fn current(&self) -> &CurrentLeader {
        &self.current
    }

    /// The live session, if one is established.
    pub fn session(&self) -> Option<SessionId> {
        self.current.session
    }

    pub fn on_announced(&mut self, ann: &Announcement) -> AnnounceAction {
        if !ann.is_leader {
            return AnnounceAction::Drop;
        }

        if ann.device_id == self.current.device_id {
            if ann.device_name != self.current.device_name {
                self.current.device_name = ann.device_name.clone();
                if self.current.session.is_some() {
                    return AnnounceAction::NameChanged {
                        device_id: ann.device_id.clone(),
                        device_name: ann.device_name.clone(),
                    };
                }
            }
            return AnnounceAction::Drop;
        }

        if ann.rank <= self.current.rank {
            return AnnounceAction::Drop;
        }

        // Higher-ranked leader wins. An old leader with no established
        // session may still deliver a late join reply; suppress it.
        let teardown = if self.current.bus_name.is_empty() {
            None
        } else if let Some(session) = self.current.session {
            Some(TornDown {
                session,
                device_id: self.current.device_id.clone(),
                device_name: self.current.device_name.clone(),
            })
        } else {
            self.push_ignore(self.current.device_id.clone());
            None
        };

        self.current = CurrentLeader {
            bus_name: ann.bus_name.clone(),
            device_id: ann.device_id.clone(),
            device_name: ann.device_name.clone(),
            rank: ann.rank,
            port: ann.port,
            session: None,
        };

        AnnounceAction::Connect {
            teardown,
            target: JoinTarget {
                bus_name: ann.bus_name.clone(),
                port: ann.port,
                device_id: ann.device_id.clone(),
                device_name: ann.device_name.clone(),
            },
        }
    }

    pub fn on_join_completed(
        &mut self,
        device_id: &str,
        session: Option<SessionId>,
    ) -> JoinOutcome {
        if let Some(pos) = self.ignore.iter().position(|id| id == device_id) {
            self.ignore.remove(pos);
            return JoinOutcome::Ignored { session };
        }

        if device_id != self.current.device_id {
            return JoinOutcome::Stale { session };
        }

        match session {
            Some(session) => {
                self.current.session = Some(session);
                JoinOutcome::Connected {
                    device_id: self.current.device_id.clone(),
                    device_name: self.current.device_name.clone(),
                    session,
                }
            }
            None => JoinOutcome::Failed {
                device_id: self.current.device_id.clone(),
                device_name: self.current.device_name.clone(),
            },
        }
    }

    /// Returns the lost leader's identity when the loss matches the live
    /// session; the record is cleared so any leader announcement (including
    /// the same one) triggers a fresh join.
    pub fn on_session_lost(&mut self, session: SessionId) -> Option<(String, String)> {
        if self.current.session != Some(session) {
            return None;
        }
        let lost = (self.current.device_id.clone(), self.current.device_name.clone());
        self.current = CurrentLeader::default();
        Some(lost)
    }

    fn push_ignore(&mut self, device_id: String) {
        if self.ignore.len() >= IGNORE_CAP {
            self.ignore.pop_front();
        }
        self.ignore.push_back(device_id);
    }

    #[cfg(test)]
    fn ignore_len(&self) -> usize {
        self.ignore.len()
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod tests;
