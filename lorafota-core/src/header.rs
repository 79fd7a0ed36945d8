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

//! The bootloader header record. The boot-stage loader reads this from a
//! fixed per-slot address to decide which image to flash next, so the byte
//! layout is fixed by its reader and must match exactly.
//!
//! Layout (little-endian):
//! - version, u64
//! - total image size, u64
//! - content digest, 32 bytes (Ascon-Hash256)
//! - campaign tag, 16 bytes (reserved, zero-filled)
//! - signature size, u32 (reserved, always zero)

use crate::digest::{ContentDigest, DIGEST_LEN};

pub const HEADER_LEN: usize = 68;

const CAMPAIGN_TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    BufferTooSmall,
}

/// The record that marks a slot as "pending install". Created only after a
/// successful verification, programmed in a single bounded write, and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareDetails {
    pub version: u64,
    pub size: u64,
    pub digest: ContentDigest,
}

impl FirmwareDetails {
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, HeaderError> {
        if buffer.len() < HEADER_LEN {
            return Err(HeaderError::BufferTooSmall);
        }
        buffer[0..8].copy_from_slice(&self.version.to_le_bytes());
        buffer[8..16].copy_from_slice(&self.size.to_le_bytes());
        buffer[16..48].copy_from_slice(&self.digest);
        buffer[48..48 + CAMPAIGN_TAG_LEN].fill(0);
        buffer[64..68].copy_from_slice(&0u32.to_le_bytes());
        Ok(HEADER_LEN)
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, HeaderError> {
        if buffer.len() < HEADER_LEN {
            return Err(HeaderError::BufferTooSmall);
        }
        let mut version = [0u8; 8];
        version.copy_from_slice(&buffer[0..8]);
        let mut size = [0u8; 8];
        size.copy_from_slice(&buffer[8..16]);
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&buffer[16..48]);
        Ok(Self {
            version: u64::from_le_bytes(version),
            size: u64::from_le_bytes(size),
            digest,
        })
    }
}
