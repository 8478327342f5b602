// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Call Signaling Relay
//!
//! Pure envelope pass-through keyed by `call_id`. All call state machine
//! logic lives in an external call manager; this core only transports
//! offer/answer/ICE/end/state events between peers.

use crate::network::{
    CallAnswerPayload, CallEndPayload, CallIceCandidatePayload, CallOfferPayload,
    CallStatePayload, EnvelopePayload,
};

/// An inbound call signal, correlated by `call_id`, with the sending peer
/// attached from the transport frame.
#[derive(Debug, Clone)]
pub enum CallSignal {
    Offer {
        call_id: String,
        from_did: String,
        sdp: String,
    },
    Answer {
        call_id: String,
        from_did: String,
        sdp: String,
    },
    IceCandidate {
        call_id: String,
        from_did: String,
        candidate: String,
    },
    End {
        call_id: String,
        from_did: String,
        reason: Option<String>,
    },
    State {
        call_id: String,
        from_did: String,
        state: String,
    },
}

impl CallSignal {
    pub fn call_id(&self) -> &str {
        match self {
            CallSignal::Offer { call_id, .. }
            | CallSignal::Answer { call_id, .. }
            | CallSignal::IceCandidate { call_id, .. }
            | CallSignal::End { call_id, .. }
            | CallSignal::State { call_id, .. } => call_id,
        }
    }

    pub fn from_did(&self) -> &str {
        match self {
            CallSignal::Offer { from_did, .. }
            | CallSignal::Answer { from_did, .. }
            | CallSignal::IceCandidate { from_did, .. }
            | CallSignal::End { from_did, .. }
            | CallSignal::State { from_did, .. } => from_did,
        }
    }
}

/// Build an outbound `call_offer`.
pub fn offer(call_id: &str, sdp: &str) -> EnvelopePayload {
    EnvelopePayload::CallOffer(CallOfferPayload {
        call_id: call_id.to_string(),
        sdp: sdp.to_string(),
    })
}

/// Build an outbound `call_answer`.
pub fn answer(call_id: &str, sdp: &str) -> EnvelopePayload {
    EnvelopePayload::CallAnswer(CallAnswerPayload {
        call_id: call_id.to_string(),
        sdp: sdp.to_string(),
    })
}

/// Build an outbound `call_ice_candidate`.
pub fn ice_candidate(call_id: &str, candidate: &str) -> EnvelopePayload {
    EnvelopePayload::CallIceCandidate(CallIceCandidatePayload {
        call_id: call_id.to_string(),
        candidate: candidate.to_string(),
    })
}

/// Build an outbound `call_end`.
pub fn end(call_id: &str, reason: Option<String>) -> EnvelopePayload {
    EnvelopePayload::CallEnd(CallEndPayload {
        call_id: call_id.to_string(),
        reason,
    })
}

/// Build an outbound `call_state`.
pub fn state(call_id: &str, state: &str) -> EnvelopePayload {
    EnvelopePayload::CallState(CallStatePayload {
        call_id: call_id.to_string(),
        state: state.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_carry_the_call_id() {
        let payload = offer("call-1", "v=0 ...");
        match payload {
            EnvelopePayload::CallOffer(p) => {
                assert_eq!(p.call_id, "call-1");
                assert_eq!(p.sdp, "v=0 ...");
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn signal_accessors() {
        let signal = CallSignal::End {
            call_id: "call-9".to_string(),
            from_did: "did:key:z6MkBob".to_string(),
            reason: None,
        };
        assert_eq!(signal.call_id(), "call-9");
        assert_eq!(signal.from_did(), "did:key:z6MkBob");
    }
}
