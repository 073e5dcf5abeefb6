use crate::config::ElectionConfig;
use crate::message::{Message, Outbound};
use crate::timer::{ElectionTimer, HeartbeatTicker};
use crate::{NodeId, Role};
use serde::Serialize;
use std::collections::HashSet;
use tokio::time::Instant;

/// Snapshot of a node's election state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub role: Role,
    pub term: u64,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub votes: usize,
}

/// The election state machine of a single node.
///
/// The state is purely reactive: [`ElectionState::tick`] and
/// [`ElectionState::handle`] take the current instant and return the
/// messages to send. Sending is left to the caller so the node lock is never
/// held across network I/O.
///
/// # Safety invariants
///
/// - `current_term` never decreases.
/// - `voted_for` is written at most once per term and cleared whenever the
///   term advances, so a node grants at most one vote per term.
/// - A node becomes leader only with votes from a strict majority of the
///   cluster for its current term, and steps down on any newer term.
#[derive(Debug)]
pub struct ElectionState {
    config: ElectionConfig,
    current_term: u64,
    role: Role,
    voted_for: Option<NodeId>,
    votes_received: HashSet<NodeId>,
    leader_id: Option<NodeId>,
    last_heartbeat_at: Instant,
    election_timer: ElectionTimer,
    heartbeat: HeartbeatTicker,
    candidate_deadline: Option<Instant>,
    stopped: bool,
}

impl ElectionState {
    /// Creates a follower for term 0 whose election alarm is armed from `now`.
    pub fn new(config: ElectionConfig, now: Instant) -> Self {
        let election_timer = ElectionTimer::new(
            config.election_timeout_min(),
            config.election_timeout_max(),
            now,
        );
        let heartbeat = HeartbeatTicker::new(config.heartbeat_interval());
        ElectionState {
            config,
            current_term: 0,
            role: Role::Follower,
            voted_for: None,
            votes_received: HashSet::new(),
            leader_id: None,
            last_heartbeat_at: now,
            election_timer,
            heartbeat,
            candidate_deadline: None,
            stopped: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.config.id
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn votes_received(&self) -> &HashSet<NodeId> {
        &self.votes_received
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }

    /// The election timeout drawn at the last reset.
    pub fn election_timeout(&self) -> std::time::Duration {
        self.election_timer.timeout()
    }

    /// When the election alarm fires, if it is armed.
    pub fn election_deadline(&self) -> Option<Instant> {
        self.election_timer.deadline()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.config.id,
            role: self.role,
            term: self.current_term,
            voted_for: self.voted_for,
            leader_id: self.leader_id,
            votes: self.votes_received.len(),
        }
    }

    /// Whether the votes collected so far form a strict majority.
    pub fn has_quorum(&self) -> bool {
        self.votes_received.len() > self.config.cluster_size() / 2
    }

    /// Re-arms the election alarm from `now` as if the node had just booted.
    ///
    /// Only a follower that has not yet seen any term is affected, so a node
    /// built some time before its loops start does not time out immediately.
    pub fn arm(&mut self, now: Instant) {
        if self.stopped || self.role != Role::Follower || self.current_term != 0 {
            return;
        }
        self.last_heartbeat_at = now;
        self.election_timer.reset(now);
        tracing::debug!(
            node_id = self.config.id,
            role = %self.role,
            term = self.current_term,
            timeout_ms = self.election_timer.timeout().as_millis() as u64,
            "Armed election timer"
        );
    }

    /// The next instant at which [`ElectionState::tick`] has work to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        if self.stopped {
            return None;
        }
        match self.role {
            Role::Follower => self.election_timer.deadline(),
            Role::Candidate => self.candidate_deadline,
            Role::Leader => self.heartbeat.next_tick(),
        }
    }

    /// Advances the timers to `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<Outbound> {
        if self.stopped {
            return Vec::new();
        }
        match self.role {
            Role::Follower => {
                if self.election_timer.is_expired(now) {
                    tracing::info!(
                        node_id = self.config.id,
                        role = %self.role,
                        term = self.current_term,
                        elapsed_ms = now.duration_since(self.last_heartbeat_at).as_millis() as u64,
                        "Election timeout"
                    );
                    return self.start_election(now);
                }
            }
            Role::Candidate => {
                if self.candidate_deadline.is_some_and(|deadline| now >= deadline) {
                    tracing::info!(
                        node_id = self.config.id,
                        role = %self.role,
                        term = self.current_term,
                        votes = self.votes_received.len(),
                        "No majority before candidate timeout, reverting to follower"
                    );
                    self.become_follower(self.current_term, None, now);
                }
            }
            Role::Leader => {
                if self.heartbeat.is_due(now) {
                    self.heartbeat.advance(now);
                    tracing::trace!(
                        node_id = self.config.id,
                        role = %self.role,
                        term = self.current_term,
                        "Broadcasting heartbeat"
                    );
                    return self.broadcast(Message::Heartbeat {
                        leader_id: self.config.id,
                        term: self.current_term,
                    });
                }
            }
        }
        Vec::new()
    }

    /// Applies an inbound message and returns any replies.
    pub fn handle(&mut self, message: Message, now: Instant) -> Vec<Outbound> {
        if self.stopped {
            return Vec::new();
        }

        let sender = message.sender();
        if sender == self.config.id {
            tracing::debug!(
                node_id = self.config.id,
                role = %self.role,
                term = self.current_term,
                datagram = %message,
                "Ignoring message from self"
            );
            return Vec::new();
        }
        if !self.config.peers.contains(&sender) {
            tracing::warn!(
                node_id = self.config.id,
                role = %self.role,
                term = self.current_term,
                datagram = %message,
                "Ignoring message from unknown node"
            );
            return Vec::new();
        }

        let term = message.term();
        if term < self.current_term {
            tracing::debug!(
                node_id = self.config.id,
                role = %self.role,
                term = self.current_term,
                datagram = %message,
                "Ignoring stale message"
            );
            return Vec::new();
        }
        if term > self.current_term {
            self.observe_term(term, now);
        }

        match message {
            Message::VoteRequest { candidate_id, term } => {
                self.handle_vote_request(candidate_id, term, now)
            }
            Message::VoteGranted { voter_id, term } => self.handle_vote_granted(voter_id, term, now),
            Message::Heartbeat { leader_id, term } => {
                self.handle_heartbeat(leader_id, term, now);
                Vec::new()
            }
        }
    }

    fn handle_vote_request(&mut self, candidate_id: NodeId, term: u64, now: Instant) -> Vec<Outbound> {
        match self.voted_for {
            Some(voted) if voted != candidate_id => {
                tracing::debug!(
                    node_id = self.config.id,
                    role = %self.role,
                    term,
                    candidate_id,
                    voted_for = voted,
                    "Vote already cast this term, ignoring request"
                );
                Vec::new()
            }
            _ => {
                self.voted_for = Some(candidate_id);
                self.last_heartbeat_at = now;
                self.election_timer.reset(now);
                tracing::info!(
                    node_id = self.config.id,
                    role = %self.role,
                    term,
                    candidate_id,
                    "Granted vote"
                );
                vec![Outbound {
                    to: candidate_id,
                    message: Message::VoteGranted {
                        voter_id: self.config.id,
                        term,
                    },
                }]
            }
        }
    }

    fn handle_vote_granted(&mut self, voter_id: NodeId, term: u64, now: Instant) -> Vec<Outbound> {
        match self.role {
            Role::Follower => {
                tracing::debug!(
                    node_id = self.config.id,
                    role = %self.role,
                    term,
                    voter_id,
                    "Ignoring vote, not a candidate"
                );
                return Vec::new();
            }
            // Grants that arrive after the election was won are only recorded.
            Role::Leader => {
                if self.votes_received.insert(voter_id) {
                    tracing::debug!(
                        node_id = self.config.id,
                        role = %self.role,
                        term,
                        voter_id,
                        votes = self.votes_received.len(),
                        "Recorded late vote"
                    );
                }
                return Vec::new();
            }
            Role::Candidate => {}
        }
        if !self.votes_received.insert(voter_id) {
            tracing::debug!(
                node_id = self.config.id,
                role = %self.role,
                term,
                voter_id,
                "Ignoring duplicate vote"
            );
            return Vec::new();
        }

        tracing::info!(
            node_id = self.config.id,
            role = %self.role,
            term,
            voter_id,
            votes = self.votes_received.len(),
            needed = self.config.quorum(),
            "Received vote"
        );

        if self.has_quorum() {
            self.become_leader(now)
        } else {
            Vec::new()
        }
    }

    fn handle_heartbeat(&mut self, leader_id: NodeId, term: u64, now: Instant) {
        if self.role == Role::Follower {
            if self.leader_id != Some(leader_id) {
                tracing::info!(
                    node_id = self.config.id,
                    role = %self.role,
                    term,
                    leader_id,
                    "Following leader"
                );
            }
            self.leader_id = Some(leader_id);
            self.election_timer.reset(now);
        } else {
            if self.role == Role::Leader {
                tracing::warn!(
                    node_id = self.config.id,
                    role = %self.role,
                    term,
                    leader_id,
                    "Another leader claims this term, stepping down"
                );
            }
            self.become_follower(term, Some(leader_id), now);
        }
        self.last_heartbeat_at = now;
        tracing::trace!(
            node_id = self.config.id,
            role = %self.role,
            term,
            leader_id,
            "Accepted heartbeat"
        );
    }

    /// Adopts a strictly newer term, forgetting the vote and leader of the
    /// previous one. Candidates and leaders step down.
    fn observe_term(&mut self, term: u64, now: Instant) {
        tracing::info!(
            node_id = self.config.id,
            role = %self.role,
            term = self.current_term,
            new_term = term,
            "Observed newer term"
        );
        if self.role == Role::Follower {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        } else {
            self.become_follower(term, None, now);
        }
    }

    /// Moves to follower in `term` (never lowering the current term) and
    /// re-arms the election alarm with a fresh random timeout.
    pub fn become_follower(&mut self, term: u64, leader_id: Option<NodeId>, now: Instant) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
        }
        let previous = self.role;
        self.role = Role::Follower;
        self.leader_id = leader_id;
        self.votes_received.clear();
        self.heartbeat.stop();
        self.candidate_deadline = None;
        self.election_timer.reset(now);

        if previous != Role::Follower {
            tracing::info!(
                node_id = self.config.id,
                role = %self.role,
                term = self.current_term,
                from = %previous,
                leader_id = ?self.leader_id,
                timeout_ms = self.election_timer.timeout().as_millis() as u64,
                "Became follower"
            );
        }
    }

    /// Starts a new election: bumps the term, votes for itself and asks every
    /// peer for a vote.
    pub fn start_election(&mut self, now: Instant) -> Vec<Outbound> {
        self.current_term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.config.id);
        self.votes_received.clear();
        self.votes_received.insert(self.config.id);
        self.leader_id = None;
        self.heartbeat.stop();
        self.election_timer.reset(now);
        self.candidate_deadline = Some(now + self.config.candidate_timeout());

        tracing::info!(
            node_id = self.config.id,
            role = %self.role,
            term = self.current_term,
            "Started election"
        );

        if self.has_quorum() {
            return self.become_leader(now);
        }
        self.broadcast(Message::VoteRequest {
            candidate_id: self.config.id,
            term: self.current_term,
        })
    }

    /// Takes leadership of the current term and announces it right away.
    pub fn become_leader(&mut self, now: Instant) -> Vec<Outbound> {
        if self.role != Role::Candidate {
            tracing::warn!(
                node_id = self.config.id,
                role = %self.role,
                term = self.current_term,
                "Only a candidate can become leader"
            );
            return Vec::new();
        }
        self.role = Role::Leader;
        self.leader_id = Some(self.config.id);
        self.candidate_deadline = None;
        self.election_timer.cancel();
        self.heartbeat.start(now);

        tracing::info!(
            node_id = self.config.id,
            role = %self.role,
            term = self.current_term,
            votes = self.votes_received.len(),
            "Became leader"
        );

        self.broadcast(Message::Heartbeat {
            leader_id: self.config.id,
            term: self.current_term,
        })
    }

    /// Cancels every timer and ignores all further events.
    pub fn halt(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.election_timer.cancel();
        self.heartbeat.stop();
        self.candidate_deadline = None;
        tracing::debug!(
            node_id = self.config.id,
            role = %self.role,
            term = self.current_term,
            "Stopped"
        );
    }

    fn broadcast(&self, message: Message) -> Vec<Outbound> {
        self.config
            .peers
            .iter()
            .map(|&to| Outbound { to, message })
            .collect()
    }
}
