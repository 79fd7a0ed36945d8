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

//! Delta patch generation (`target ⊖ source`).
//!
//! Block-matching generator: source blocks are indexed by checksum, the
//! target is walked looking for runs that already exist in the source.
//! Matched runs become COPY records, everything else is carried as LITERAL
//! bytes. Output applies with `lorafota_core::delta::apply_patch`.

use std::collections::HashMap;

use lorafota_core::delta::{
    PATCH_CRC, PATCH_MAGIC, RECORD_COPY, RECORD_END, RECORD_LITERAL,
};

const BLOCK_SIZE: usize = 64;
/// Matches shorter than a record's own overhead only bloat the patch.
const MIN_COPY_LEN: usize = 16;

/// Generates a patch stream that reconstructs `target` from `source`.
/// `progress` is called with the number of target bytes consumed so far.
pub fn generate_patch(
    source: &[u8],
    target: &[u8],
    mut progress: impl FnMut(usize),
) -> Vec<u8> {
    let index = index_source(source);

    let mut patch = PATCH_MAGIC.to_vec();
    let mut literal: Vec<u8> = Vec::new();
    let mut pos = 0usize;

    while pos < target.len() {
        let matched = if pos + BLOCK_SIZE <= target.len() {
            find_match(source, &index, &target[pos..])
        } else {
            None
        };

        match matched {
            Some((src_offset, len)) if len >= MIN_COPY_LEN => {
                flush_literal(&mut patch, &mut literal);
                push_copy(&mut patch, src_offset as u32, len as u32);
                pos += len;
            }
            _ => {
                literal.push(target[pos]);
                pos += 1;
            }
        }
        progress(pos);
    }
    flush_literal(&mut patch, &mut literal);

    patch.push(RECORD_END);
    patch.extend_from_slice(&PATCH_CRC.checksum(target).to_be_bytes());
    patch
}

/// Checksum of every aligned source block, mapped to its offsets.
fn index_source(source: &[u8]) -> HashMap<u32, Vec<usize>> {
    let mut index: HashMap<u32, Vec<usize>> = HashMap::new();
    let mut offset = 0usize;
    while offset + BLOCK_SIZE <= source.len() {
        let sum = PATCH_CRC.checksum(&source[offset..offset + BLOCK_SIZE]);
        index.entry(sum).or_default().push(offset);
        offset += BLOCK_SIZE;
    }
    index
}

/// Longest run starting at `window[0]` that exists in the source, anchored
/// on a whole-block checksum hit.
fn find_match(
    source: &[u8],
    index: &HashMap<u32, Vec<usize>>,
    window: &[u8],
) -> Option<(usize, usize)> {
    let sum = PATCH_CRC.checksum(&window[..BLOCK_SIZE]);
    let candidates = index.get(&sum)?;

    let mut best: Option<(usize, usize)> = None;
    for &offset in candidates {
        if source[offset..offset + BLOCK_SIZE] != window[..BLOCK_SIZE] {
            // checksum collision
            continue;
        }
        let mut len = BLOCK_SIZE;
        while offset + len < source.len()
            && len < window.len()
            && source[offset + len] == window[len]
        {
            len += 1;
        }
        if best.map_or(true, |(_, b)| len > b) {
            best = Some((offset, len));
        }
    }
    best
}

fn flush_literal(patch: &mut Vec<u8>, literal: &mut Vec<u8>) {
    if literal.is_empty() {
        return;
    }
    patch.push(RECORD_LITERAL);
    patch.extend_from_slice(&(literal.len() as u32).to_be_bytes());
    patch.extend_from_slice(literal);
    literal.clear();
}

fn push_copy(patch: &mut Vec<u8>, src_offset: u32, len: u32) {
    patch.push(RECORD_COPY);
    patch.extend_from_slice(&src_offset.to_be_bytes());
    patch.extend_from_slice(&len.to_be_bytes());
}
