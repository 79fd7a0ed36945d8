// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! Ed25519 signature verification against the embedded trust anchor. The
//! device only ever verifies; signing happens in the release tooling.

use ed25519_dalek::{Signature, VerifyingKey};

use crate::digest::ContentDigest;

pub const TRUST_ANCHOR_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// The embedded public key bytes do not decode to a valid key
    TrustAnchorInvalid,
    /// The signature is malformed or does not match the digest
    SignatureInvalid,
}

/// The compiled-in / provisioned public key the device trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustAnchor {
    public_key: [u8; TRUST_ANCHOR_LEN],
}

impl TrustAnchor {
    pub const fn new(public_key: [u8; TRUST_ANCHOR_LEN]) -> Self {
        Self { public_key }
    }

    /// Verifies `signature` over the content digest.
    pub fn verify(
        &self,
        digest: &ContentDigest,
        signature: &[u8],
    ) -> Result<(), SignatureError> {
        let key = VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| SignatureError::TrustAnchorInvalid)?;
        let signature = Signature::from_slice(signature)
            .map_err(|_| SignatureError::SignatureInvalid)?;
        key.verify_strict(digest, &signature)
            .map_err(|_| SignatureError::SignatureInvalid)
    }
}
