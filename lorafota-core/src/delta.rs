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

//! Streaming binary patch apply.
//!
//! Patch stream layout: 4-byte magic `LFD1`, then records until END. All
//! integers big-endian.
//!
//! - `0x01` COPY: source offset u32, length u32 — copy bytes from the
//!   source image
//! - `0x02` LITERAL: length u32, payload — raw bytes carried in the patch
//! - `0x00` END: CRC32 (ISO-HDLC) of the reconstructed target, u32
//!
//! Records write strictly sequentially to the destination; neither the
//! source, the patch nor the target is ever held in memory whole.

use crc::{Crc, CRC_32_ISO_HDLC};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::storage::{StorageError, Window, STREAM_BUFFER_SIZE};

pub const PATCH_MAGIC: [u8; 4] = *b"LFD1";

pub const RECORD_END: u8 = 0x00;
pub const RECORD_COPY: u8 = 0x01;
pub const RECORD_LITERAL: u8 = 0x02;

pub const PATCH_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaError {
    /// The patch stream does not start with the expected magic
    BadMagic,
    /// Unknown record tag in the patch stream
    UnknownRecord(u8),
    /// The patch stream ended mid-record
    TruncatedPatch,
    /// A COPY record references bytes beyond the source image
    CopyOutOfRange,
    /// The reconstructed image does not fit the destination window
    DestinationOverflow,
    /// The reconstructed bytes do not match the checksum in the END record
    ChecksumMismatch,
    Storage(StorageError),
}

impl From<StorageError> for DeltaError {
    fn from(err: StorageError) -> Self {
        DeltaError::Storage(err)
    }
}

/// Cursor over the patch stream; reads are bounds-checked against the
/// declared patch length so a truncated stream is reported as such rather
/// than as a storage error.
struct PatchReader {
    window: Window,
    len: u32,
    pos: u32,
}

impl PatchReader {
    fn read_exact<F: ReadNorFlash>(
        &mut self,
        flash: &mut F,
        buffer: &mut [u8],
    ) -> Result<(), DeltaError> {
        let wanted = buffer.len() as u32;
        if self.pos + wanted > self.len {
            return Err(DeltaError::TruncatedPatch);
        }
        self.window.read(flash, self.pos, buffer)?;
        self.pos += wanted;
        Ok(())
    }

    fn read_u8<F: ReadNorFlash>(&mut self, flash: &mut F) -> Result<u8, DeltaError> {
        let mut byte = [0u8; 1];
        self.read_exact(flash, &mut byte)?;
        Ok(byte[0])
    }

    fn read_u32<F: ReadNorFlash>(&mut self, flash: &mut F) -> Result<u32, DeltaError> {
        let mut bytes = [0u8; 4];
        self.read_exact(flash, &mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }
}

/// Applies the patch in `[patch_offset, patch_offset + patch_len)` of the
/// patch window against the first `source_len` bytes of the source window,
/// writing the reconstruction sequentially into the destination window.
///
/// Returns the reconstructed length; the target size is only known once the
/// stream has been consumed.
pub fn apply_patch<F: ReadNorFlash + NorFlash>(
    flash: &mut F,
    source: Window,
    source_len: u32,
    patch: Window,
    patch_offset: u32,
    patch_len: u32,
    dest: Window,
) -> Result<u32, DeltaError> {
    let mut reader = PatchReader {
        window: patch.sub(patch_offset, patch_len)?,
        len: patch_len,
        pos: 0,
    };

    let mut magic = [0u8; 4];
    reader.read_exact(flash, &mut magic)?;
    if magic != PATCH_MAGIC {
        return Err(DeltaError::BadMagic);
    }

    let mut crc = PATCH_CRC.digest();
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    let mut out_pos = 0u32;

    loop {
        let tag = reader.read_u8(flash)?;
        match tag {
            RECORD_COPY => {
                let src_offset = reader.read_u32(flash)?;
                let len = reader.read_u32(flash)?;
                let src_end = src_offset
                    .checked_add(len)
                    .ok_or(DeltaError::CopyOutOfRange)?;
                if src_end > source_len {
                    return Err(DeltaError::CopyOutOfRange);
                }
                check_dest(dest, out_pos, len)?;

                let mut done = 0u32;
                while done < len {
                    let step = (len - done).min(STREAM_BUFFER_SIZE as u32);
                    let chunk = &mut buffer[..step as usize];
                    source.read(flash, src_offset + done, chunk)?;
                    crc.update(chunk);
                    dest.program(flash, out_pos + done, chunk)?;
                    done += step;
                }
                out_pos += len;
            }
            RECORD_LITERAL => {
                let len = reader.read_u32(flash)?;
                check_dest(dest, out_pos, len)?;

                let mut done = 0u32;
                while done < len {
                    let step = (len - done).min(STREAM_BUFFER_SIZE as u32);
                    let chunk = &mut buffer[..step as usize];
                    reader.read_exact(flash, chunk)?;
                    crc.update(chunk);
                    dest.program(flash, out_pos + done, chunk)?;
                    done += step;
                }
                out_pos += len;
            }
            RECORD_END => {
                let expected = reader.read_u32(flash)?;
                if crc.finalize() != expected {
                    return Err(DeltaError::ChecksumMismatch);
                }
                return Ok(out_pos);
            }
            other => return Err(DeltaError::UnknownRecord(other)),
        }
    }
}

fn check_dest(dest: Window, out_pos: u32, len: u32) -> Result<(), DeltaError> {
    let end = out_pos
        .checked_add(len)
        .ok_or(DeltaError::DestinationOverflow)?;
    if end > dest.len() {
        return Err(DeltaError::DestinationOverflow);
    }
    Ok(())
}
