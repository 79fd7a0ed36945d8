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

//! Release artifact assembly: payload + signed manifest trailer, in the
//! exact layout the device parses off the tail of a completed session.

use ed25519_dalek::{Signer, SigningKey};
use heapless::Vec as HVec;
use lorafota_core::digest::digest_bytes;
use lorafota_core::manifest::{FirmwareManifest, SIGNATURE_FIELD_LEN, MANIFEST_TRAILER_LEN};

#[derive(Debug, Clone, Copy)]
pub struct ArtifactParams {
    pub manufacturer_id: [u8; 16],
    pub device_class_id: [u8; 16],
    pub version: u64,
    /// `Some(source_len)` marks the payload as a delta against a source
    /// image of that size
    pub delta_source_len: Option<u32>,
}

#[derive(Debug)]
pub enum ArtifactError {
    /// Delta source images above 2^24 bytes cannot be described in the
    /// manifest
    SourceTooLarge,
}

/// Appends a signed manifest trailer to the payload. The signature covers
/// the Ascon-Hash256 of the payload bytes only.
pub fn build_signed_artifact(
    payload: &[u8],
    params: &ArtifactParams,
    signing_key: &SigningKey,
) -> Result<Vec<u8>, ArtifactError> {
    let digest = digest_bytes(payload);
    let signature = signing_key.sign(&digest);

    let mut sig_field: HVec<u8, SIGNATURE_FIELD_LEN> = HVec::new();
    sig_field
        .extend_from_slice(&signature.to_bytes())
        .expect("ed25519 signature fits the manifest field");

    if params.delta_source_len.unwrap_or(0) > 0x00FF_FFFF {
        return Err(ArtifactError::SourceTooLarge);
    }

    let manifest = FirmwareManifest {
        manufacturer_id: params.manufacturer_id,
        device_class_id: params.device_class_id,
        version: params.version,
        signature: sig_field,
        is_delta: params.delta_source_len.is_some(),
        source_size: params.delta_source_len.unwrap_or(0),
    };

    let mut trailer = [0u8; MANIFEST_TRAILER_LEN];
    manifest
        .encode(&mut trailer)
        .expect("trailer buffer is sized for the manifest");

    let mut artifact = payload.to_vec();
    artifact.extend_from_slice(&trailer);
    Ok(artifact)
}
