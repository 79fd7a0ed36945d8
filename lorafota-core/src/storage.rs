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

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

/// Scratch buffer size used when streaming storage contents. Images are far
/// larger than RAM, so every bulk operation goes through a window of this
/// size.
pub const STREAM_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The underlying flash driver reported a read failure
    ReadFailed,
    /// The underlying flash driver reported a program failure
    WriteFailed,
    /// The access would fall outside the window
    OutOfBounds,
}

/// A byte-addressable view onto a fixed region of persistent storage.
///
/// All core access to the flash device goes through a `Window`, which
/// enforces the region bounds before handing the access to the driver. The
/// driver is expected to support byte-granular reads and programs (the
/// concrete block driver is an external collaborator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    addr: u32,
    len: u32,
}

impl Window {
    pub const fn new(addr: u32, len: u32) -> Self {
        Self { addr, len }
    }

    pub const fn len(&self) -> u32 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A sub-window of this window. Fails if the requested range does not
    /// fit.
    pub fn sub(&self, offset: u32, len: u32) -> Result<Window, StorageError> {
        let end = offset.checked_add(len).ok_or(StorageError::OutOfBounds)?;
        if end > self.len {
            return Err(StorageError::OutOfBounds);
        }
        Ok(Window::new(self.addr + offset, len))
    }

    pub fn read<F: ReadNorFlash>(
        &self,
        flash: &mut F,
        offset: u32,
        buffer: &mut [u8],
    ) -> Result<(), StorageError> {
        self.check_range(offset, buffer.len())?;
        flash.read(self.addr + offset, buffer).map_err(|_| {
            log::warn!("flash read failed at 0x{:x}", self.addr + offset);
            StorageError::ReadFailed
        })
    }

    pub fn program<F: NorFlash>(
        &self,
        flash: &mut F,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.check_range(offset, bytes.len())?;
        flash.write(self.addr + offset, bytes).map_err(|_| {
            log::warn!("flash program failed at 0x{:x}", self.addr + offset);
            StorageError::WriteFailed
        })
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<(), StorageError> {
        let len = u32::try_from(len).map_err(|_| StorageError::OutOfBounds)?;
        let end = offset.checked_add(len).ok_or(StorageError::OutOfBounds)?;
        if end > self.len {
            return Err(StorageError::OutOfBounds);
        }
        Ok(())
    }
}

/// Copies `len` bytes from `src` (starting at `src_offset`) to `dest`
/// (starting at `dest_offset`), streaming through a bounded buffer.
pub fn copy_between<F: ReadNorFlash + NorFlash>(
    flash: &mut F,
    src: Window,
    src_offset: u32,
    dest: Window,
    dest_offset: u32,
    len: u32,
) -> Result<(), StorageError> {
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    let mut done = 0u32;
    while done < len {
        let step = (len - done).min(STREAM_BUFFER_SIZE as u32);
        let chunk = &mut buffer[..step as usize];
        src.read(flash, src_offset + done, chunk)?;
        dest.program(flash, dest_offset + done, chunk)?;
        done += step;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_flash::MemFlash;

    #[test]
    fn window_rejects_out_of_bounds_access() {
        let mut flash = MemFlash::<1024>::new();
        let window = Window::new(0, 16);
        let mut buf = [0u8; 8];
        assert_eq!(window.read(&mut flash, 0, &mut buf), Ok(()));
        assert_eq!(
            window.read(&mut flash, 9, &mut buf),
            Err(StorageError::OutOfBounds)
        );
        assert_eq!(
            window.program(&mut flash, 12, &[0u8; 5]),
            Err(StorageError::OutOfBounds)
        );
    }

    #[test]
    fn sub_window_is_bounds_checked() {
        let window = Window::new(100, 50);
        assert_eq!(window.sub(10, 40), Ok(Window::new(110, 40)));
        assert_eq!(window.sub(10, 41), Err(StorageError::OutOfBounds));
    }

    #[test]
    fn copy_between_streams_all_bytes() {
        let mut flash = MemFlash::<2048>::new();
        let src = Window::new(0, 1024);
        let dest = Window::new(1024, 1024);

        let data: Vec<u8> = (0..700).map(|i| (i % 251) as u8).collect();
        src.program(&mut flash, 0, &data).unwrap();

        copy_between(&mut flash, src, 0, dest, 0, 700).unwrap();

        let mut out = vec![0u8; 700];
        dest.read(&mut flash, 0, &mut out).unwrap();
        assert_eq!(out, data);
    }
}
