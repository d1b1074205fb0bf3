//! JS-execution challenge.
//!
//! The challenge carries a nonce and a per-challenge key. Its answer is an
//! HMAC over the nonce and the environment descriptor, so it can only be
//! produced by code that actually runs in the page and reads the environment.
//! Replaying an answer captured elsewhere, or posting a made-up one, fails.

use super::TrapHit;
use crate::environment::EnvironmentDescriptor;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Confidence of a wrong answer.
pub const JS_MISMATCH_CONFIDENCE: u8 = 85;

/// Challenge handed to the page script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsChallenge {
    pub nonce: String,
    pub key: String,
    /// Unix seconds
    pub issued_at: u64,
}

impl JsChallenge {
    /// The answer a page running in `env` computes.
    pub fn answer(&self, env: &EnvironmentDescriptor) -> String {
        hex::encode(self.mac(env).finalize().into_bytes())
    }

    fn mac(&self, env: &EnvironmentDescriptor) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(self.nonce.as_bytes());
        mac.update(b"|");
        mac.update(env.summary().as_bytes());
        mac
    }
}

/// Outcome of verifying an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Passed,
    Mismatch(TrapHit),
    /// The challenge outlived its validity; not evidence either way
    Expired,
    /// Nothing outstanding to verify against
    NotIssued,
}

struct Outstanding {
    challenge: JsChallenge,
    env: EnvironmentDescriptor,
}

/// JS-execution trap. At most one challenge is outstanding; each is single use.
pub struct JsExecutionTrap {
    secret: Vec<u8>,
    validity_seconds: u64,
    outstanding: Option<Outstanding>,
}

impl JsExecutionTrap {
    pub fn new(secret: impl Into<String>, validity_seconds: u64) -> Self {
        Self {
            secret: secret.into().into_bytes(),
            validity_seconds,
            outstanding: None,
        }
    }

    /// Issue a fresh challenge bound to `env`, replacing any outstanding one.
    pub fn issue(&mut self, env: &EnvironmentDescriptor) -> JsChallenge {
        let issued_at = unix_seconds();
        let nonce = hex::encode(rand::random::<[u8; 16]>());
        let key = self.sign(&format!("{}|{}", issued_at, nonce));

        let challenge = JsChallenge {
            nonce,
            key,
            issued_at,
        };
        self.outstanding = Some(Outstanding {
            challenge: challenge.clone(),
            env: env.clone(),
        });
        challenge
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Verify `token` against the outstanding challenge and consume it.
    pub fn verify(&mut self, token: &str) -> Verification {
        let Some(Outstanding { challenge, env }) = self.outstanding.take() else {
            return Verification::NotIssued;
        };

        if unix_seconds().saturating_sub(challenge.issued_at) > self.validity_seconds {
            return Verification::Expired;
        }

        let passed = hex::decode(token.trim())
            .map(|bytes| challenge.mac(&env).verify_slice(&bytes).is_ok())
            .unwrap_or(false);

        if passed {
            Verification::Passed
        } else {
            Verification::Mismatch(TrapHit::new(
                JS_MISMATCH_CONFIDENCE,
                format!("challenge {} answered incorrectly", &challenge.nonce[..8]),
            ))
        }
    }

    fn sign(&self, data: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
