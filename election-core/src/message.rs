//! Election messages and their pipe-delimited wire format.
//!
//! ```text
//! HEARTBEAT|<leaderId>|<term>
//! VOTE_REQUEST|<candidateId>|<term>
//! VOTE_GRANTED|<voterId>|<term>
//! ```

use crate::error::CodecError;
use crate::NodeId;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Largest datagram a node will accept.
pub const MAX_DATAGRAM_LEN: usize = 1024;

const HEARTBEAT: &str = "HEARTBEAT";
const VOTE_REQUEST: &str = "VOTE_REQUEST";
const VOTE_GRANTED: &str = "VOTE_GRANTED";

/// A message exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Message {
    /// A candidate asks for a vote in `term`.
    VoteRequest { candidate_id: NodeId, term: u64 },
    /// A voter grants its vote for `term`.
    VoteGranted { voter_id: NodeId, term: u64 },
    /// Leader liveness announcement for `term`.
    Heartbeat { leader_id: NodeId, term: u64 },
}

impl Message {
    /// The term carried by the message.
    pub fn term(&self) -> u64 {
        match self {
            Message::VoteRequest { term, .. }
            | Message::VoteGranted { term, .. }
            | Message::Heartbeat { term, .. } => *term,
        }
    }

    /// The node that produced the message.
    pub fn sender(&self) -> NodeId {
        match self {
            Message::VoteRequest { candidate_id, .. } => *candidate_id,
            Message::VoteGranted { voter_id, .. } => *voter_id,
            Message::Heartbeat { leader_id, .. } => *leader_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::VoteRequest { .. } => VOTE_REQUEST,
            Message::VoteGranted { .. } => VOTE_GRANTED,
            Message::Heartbeat { .. } => HEARTBEAT,
        }
    }

    /// Encodes the message into a single datagram payload.
    pub fn to_datagram(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Decodes a datagram payload.
    pub fn from_datagram(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() > MAX_DATAGRAM_LEN {
            return Err(CodecError::TooLarge(payload.len()));
        }
        std::str::from_utf8(payload)
            .map_err(|_| CodecError::InvalidUtf8)?
            .parse()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.kind(), self.sender(), self.term())
    }
}

impl FromStr for Message {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CodecError::Empty);
        }

        let parts: Vec<&str> = s.split('|').collect();
        let kind = match parts[0] {
            HEARTBEAT => HEARTBEAT,
            VOTE_REQUEST => VOTE_REQUEST,
            VOTE_GRANTED => VOTE_GRANTED,
            other => return Err(CodecError::UnknownKind(other.to_string())),
        };
        if parts.len() != 3 {
            return Err(CodecError::FieldCount {
                kind,
                expected: 3,
                actual: parts.len(),
            });
        }

        let id = parse_number("node id", parts[1])?;
        let term = parse_number("term", parts[2])?;

        Ok(match kind {
            HEARTBEAT => Message::Heartbeat { leader_id: id, term },
            VOTE_REQUEST => Message::VoteRequest {
                candidate_id: id,
                term,
            },
            _ => Message::VoteGranted { voter_id: id, term },
        })
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<u64, CodecError> {
    value
        .trim()
        .parse()
        .map_err(|_| CodecError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// A message addressed to a single peer, produced by the state machine and
/// sent by the node runtime once the state lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outbound {
    pub to: NodeId,
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_documented_layout() {
        let hb = Message::Heartbeat {
            leader_id: 2,
            term: 1,
        };
        assert_eq!(hb.to_string(), "HEARTBEAT|2|1");

        let rv = Message::VoteRequest {
            candidate_id: 2,
            term: 1,
        };
        assert_eq!(rv.to_string(), "VOTE_REQUEST|2|1");

        let vg = Message::VoteGranted {
            voter_id: 4,
            term: 7,
        };
        assert_eq!(&vg.to_datagram()[..], b"VOTE_GRANTED|4|7");
    }

    #[test]
    fn decodes_with_surrounding_whitespace() {
        let msg: Message = " VOTE_REQUEST|3|12\n".parse().unwrap();
        assert_eq!(
            msg,
            Message::VoteRequest {
                candidate_id: 3,
                term: 12
            }
        );
        assert_eq!(msg.sender(), 3);
        assert_eq!(msg.term(), 12);
    }

    #[test]
    fn rejects_malformed_messages() {
        assert_eq!("".parse::<Message>(), Err(CodecError::Empty));
        assert_eq!(
            "ELECT|1|1".parse::<Message>(),
            Err(CodecError::UnknownKind("ELECT".into()))
        );
        assert_eq!(
            "HEARTBEAT|2".parse::<Message>(),
            Err(CodecError::FieldCount {
                kind: "HEARTBEAT",
                expected: 3,
                actual: 2
            })
        );
        assert!(matches!(
            "VOTE_GRANTED|x|1".parse::<Message>(),
            Err(CodecError::InvalidNumber {
                field: "node id",
                ..
            })
        ));
        assert!(matches!(
            "VOTE_GRANTED|1|-3".parse::<Message>(),
            Err(CodecError::InvalidNumber { field: "term", .. })
        ));
    }

    #[test]
    fn rejects_bad_datagrams() {
        assert_eq!(
            Message::from_datagram(&[0xff, 0xfe]),
            Err(CodecError::InvalidUtf8)
        );
        let oversized = vec![b'A'; MAX_DATAGRAM_LEN + 1];
        assert_eq!(
            Message::from_datagram(&oversized),
            Err(CodecError::TooLarge(MAX_DATAGRAM_LEN + 1))
        );
    }
}
