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

//! Streaming Ascon-Hash256 over a storage window. The image never fits in
//! RAM, so the range is fed through the hash in bounded steps.

use ascon_hash::digest::Digest;
use ascon_hash::AsconHash256;
use embedded_storage::nor_flash::ReadNorFlash;

use crate::storage::{StorageError, Window, STREAM_BUFFER_SIZE};

pub const DIGEST_LEN: usize = 32;

pub type ContentDigest = [u8; DIGEST_LEN];

/// Digest of `[offset, offset + len)` within the window.
pub fn digest_window<F: ReadNorFlash>(
    flash: &mut F,
    window: Window,
    offset: u32,
    len: u32,
) -> Result<ContentDigest, StorageError> {
    let mut hasher = AsconHash256::new();
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    let mut done = 0u32;
    while done < len {
        let step = (len - done).min(STREAM_BUFFER_SIZE as u32);
        let chunk = &mut buffer[..step as usize];
        window.read(flash, offset + done, chunk)?;
        hasher.update(&chunk[..]);
        done += step;
    }
    Ok(finalize(hasher))
}

/// Digest of a byte slice already in memory (host-side artifact building,
/// tests).
pub fn digest_bytes(data: &[u8]) -> ContentDigest {
    let mut hasher = AsconHash256::new();
    hasher.update(data);
    finalize(hasher)
}

fn finalize(hasher: AsconHash256) -> ContentDigest {
    let result = hasher.finalize();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&result[..DIGEST_LEN]);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_flash::MemFlash;

    #[test]
    fn streamed_digest_matches_in_memory_digest() {
        let mut flash = MemFlash::<4096>::new();
        let window = Window::new(0, 4096);

        // more than one stream buffer, not a multiple of the buffer size
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        window.program(&mut flash, 0, &data).unwrap();

        let streamed = digest_window(&mut flash, window, 0, 1000).unwrap();
        assert_eq!(streamed, digest_bytes(&data));
    }

    #[test]
    fn digest_covers_only_the_requested_range() {
        let mut flash = MemFlash::<1024>::new();
        let window = Window::new(0, 1024);
        let data = [0x42u8; 512];
        window.program(&mut flash, 0, &data).unwrap();

        let full = digest_window(&mut flash, window, 0, 512).unwrap();
        let partial = digest_window(&mut flash, window, 0, 511).unwrap();
        assert_ne!(full, partial);
        assert_eq!(partial, digest_bytes(&data[..511]));
    }

    #[test]
    fn empty_range_digests_to_empty_input_hash() {
        let mut flash = MemFlash::<64>::new();
        let window = Window::new(0, 64);
        let digest = digest_window(&mut flash, window, 0, 0).unwrap();
        assert_eq!(digest, digest_bytes(&[]));
    }
}
