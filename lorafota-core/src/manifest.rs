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

//! The authenticated metadata trailer appended to every received image.
//!
//! Fixed 117-byte layout, parsed verbatim from the tail of the received
//! data:
//! - manufacturer UUID, 16 bytes
//! - device-class UUID, 16 bytes
//! - version, u64 little-endian
//! - signature length, u8
//! - signature field, 72 bytes (only the first `signature length` valid)
//! - diff descriptor: is-delta flag, u8 + source image size, 3 bytes
//!   big-endian

use heapless::Vec;

pub const UUID_LEN: usize = 16;
pub const SIGNATURE_FIELD_LEN: usize = 72;
pub const MANIFEST_TRAILER_LEN: usize = 117;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestError {
    BufferTooSmall,
    /// The signature length byte exceeds the signature field
    SignatureLengthInvalid,
    /// The is-delta flag is neither 0 nor 1
    DiffFlagInvalid,
    /// The source image size does not fit the 24-bit field
    SourceSizeTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareManifest {
    pub manufacturer_id: [u8; UUID_LEN],
    pub device_class_id: [u8; UUID_LEN],
    pub version: u64,
    pub signature: Vec<u8, SIGNATURE_FIELD_LEN>,
    pub is_delta: bool,
    /// Expected size of the source image a delta applies against. Zero for
    /// full images.
    pub source_size: u32,
}

impl FirmwareManifest {
    pub fn decode(buffer: &[u8]) -> Result<Self, ManifestError> {
        if buffer.len() < MANIFEST_TRAILER_LEN {
            return Err(ManifestError::BufferTooSmall);
        }

        let mut manufacturer_id = [0u8; UUID_LEN];
        manufacturer_id.copy_from_slice(&buffer[0..16]);
        let mut device_class_id = [0u8; UUID_LEN];
        device_class_id.copy_from_slice(&buffer[16..32]);

        let mut version = [0u8; 8];
        version.copy_from_slice(&buffer[32..40]);
        let version = u64::from_le_bytes(version);

        let signature_len = buffer[40] as usize;
        if signature_len > SIGNATURE_FIELD_LEN {
            return Err(ManifestError::SignatureLengthInvalid);
        }
        let mut signature = Vec::new();
        // cannot fail, checked against the field size above
        let _ = signature.extend_from_slice(&buffer[41..41 + signature_len]);

        let is_delta = match buffer[113] {
            0 => false,
            1 => true,
            _ => return Err(ManifestError::DiffFlagInvalid),
        };
        let source_size =
            u32::from_be_bytes([0, buffer[114], buffer[115], buffer[116]]);

        Ok(Self {
            manufacturer_id,
            device_class_id,
            version,
            signature,
            is_delta,
            source_size,
        })
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, ManifestError> {
        if buffer.len() < MANIFEST_TRAILER_LEN {
            return Err(ManifestError::BufferTooSmall);
        }
        if self.source_size > 0x00FF_FFFF {
            return Err(ManifestError::SourceSizeTooLarge);
        }

        buffer[0..16].copy_from_slice(&self.manufacturer_id);
        buffer[16..32].copy_from_slice(&self.device_class_id);
        buffer[32..40].copy_from_slice(&self.version.to_le_bytes());
        buffer[40] = self.signature.len() as u8;
        buffer[41..41 + SIGNATURE_FIELD_LEN].fill(0);
        buffer[41..41 + self.signature.len()].copy_from_slice(&self.signature);
        buffer[113] = self.is_delta as u8;
        let size = self.source_size.to_be_bytes();
        buffer[114..117].copy_from_slice(&size[1..4]);
        Ok(MANIFEST_TRAILER_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FirmwareManifest {
        let mut signature = Vec::new();
        signature.extend_from_slice(&[0x5A; 64]).unwrap();
        FirmwareManifest {
            manufacturer_id: [0x10; UUID_LEN],
            device_class_id: [0x20; UUID_LEN],
            version: 7,
            signature,
            is_delta: true,
            source_size: 0x012345,
        }
    }

    #[test]
    fn round_trips_through_fixed_layout() {
        let manifest = sample();
        let mut buffer = [0u8; MANIFEST_TRAILER_LEN];
        assert_eq!(manifest.encode(&mut buffer), Ok(MANIFEST_TRAILER_LEN));
        assert_eq!(FirmwareManifest::decode(&buffer), Ok(manifest));
    }

    #[test]
    fn source_size_is_big_endian_24_bit() {
        let manifest = sample();
        let mut buffer = [0u8; MANIFEST_TRAILER_LEN];
        manifest.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[114..117], &[0x01, 0x23, 0x45]);
    }

    #[test]
    fn oversized_signature_length_is_rejected() {
        let manifest = sample();
        let mut buffer = [0u8; MANIFEST_TRAILER_LEN];
        manifest.encode(&mut buffer).unwrap();
        buffer[40] = (SIGNATURE_FIELD_LEN + 1) as u8;
        assert_eq!(
            FirmwareManifest::decode(&buffer),
            Err(ManifestError::SignatureLengthInvalid)
        );
    }

    #[test]
    fn bad_delta_flag_is_rejected() {
        let manifest = sample();
        let mut buffer = [0u8; MANIFEST_TRAILER_LEN];
        manifest.encode(&mut buffer).unwrap();
        buffer[113] = 2;
        assert_eq!(
            FirmwareManifest::decode(&buffer),
            Err(ManifestError::DiffFlagInvalid)
        );
    }

    #[test]
    fn truncated_trailer_is_rejected() {
        let buffer = [0u8; MANIFEST_TRAILER_LEN - 1];
        assert_eq!(
            FirmwareManifest::decode(&buffer),
            Err(ManifestError::BufferTooSmall)
        );
    }
}
