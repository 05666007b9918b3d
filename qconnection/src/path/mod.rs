//! Path validation and migration (spec §4.5): recognizing a new 4-tuple,
//! challenging it with PATH_CHALLENGE, and promoting it once the matching
//! PATH_RESPONSE returns.

pub mod aa;

use std::net::SocketAddr;

use qbase::frame::{PathChallengeFrame, PathResponseFrame};
use rand::RngCore;
use tokio::time::Instant;

pub use aa::AntiAmplifier;

/// Where a path's validation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// The path the handshake completed on; always considered valid.
    Validated,
    /// A PATH_CHALLENGE with the given nonce is outstanding, sent at `since`.
    Validating { nonce: [u8; 8], since: Instant },
}

/// One network path a connection has seen traffic from.
#[derive(Debug)]
pub struct Path {
    peer_addr: SocketAddr,
    state: PathState,
    anti_amplifier: AntiAmplifier,
}

impl Path {
    /// The path a connection starts on (the handshake's peer address),
    /// already validated by virtue of completing the handshake there.
    pub fn initial(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            state: PathState::Validated,
            anti_amplifier: AntiAmplifier::new(),
        }
    }

    /// A newly observed 4-tuple: unvalidated until challenged and answered.
    pub fn new_unvalidated(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            state: PathState::Validating {
                nonce: random_nonce(),
                since: Instant::now(),
            },
            anti_amplifier: AntiAmplifier::new(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_validated(&self) -> bool {
        matches!(self.state, PathState::Validated)
    }

    pub fn anti_amplifier(&self) -> &AntiAmplifier {
        &self.anti_amplifier
    }

    /// The PATH_CHALLENGE to (re-)send for this path, if one is outstanding.
    pub fn challenge(&self) -> Option<PathChallengeFrame> {
        match self.state {
            PathState::Validating { nonce, .. } => Some(PathChallengeFrame { data: nonce }),
            PathState::Validated => None,
        }
    }

    /// A PATH_RESPONSE arrived; promote the path if its nonce matches the
    /// outstanding challenge.
    pub fn on_response(&mut self, response: &PathResponseFrame) -> bool {
        match self.state {
            PathState::Validating { nonce, .. } if nonce == response.data => {
                self.state = PathState::Validated;
                self.anti_amplifier.validate();
                true
            }
            _ => false,
        }
    }

    /// A datagram arrived on this path: credit it against the anti-amplification limit.
    pub fn on_rcvd(&self, amount: usize) {
        self.anti_amplifier.on_rcvd(amount);
    }

    /// How many bytes may still be sent on this path right now.
    pub fn send_budget(&self) -> Option<usize> {
        self.anti_amplifier.balance()
    }

    pub fn on_sent(&self, amount: usize) {
        self.anti_amplifier.on_sent(amount);
    }
}

fn random_nonce() -> [u8; 8] {
    let mut nonce = [0u8; 8];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn matching_response_validates_the_path() {
        let mut path = Path::new_unvalidated(addr());
        let challenge = path.challenge().unwrap();
        assert!(!path.is_validated());
        assert!(path.on_response(&PathResponseFrame { data: challenge.data }));
        assert!(path.is_validated());
        assert!(path.challenge().is_none());
    }

    #[test]
    fn mismatched_response_is_ignored() {
        let mut path = Path::new_unvalidated(addr());
        assert!(!path.on_response(&PathResponseFrame { data: [0xff; 8] }));
        assert!(!path.is_validated());
    }
}
