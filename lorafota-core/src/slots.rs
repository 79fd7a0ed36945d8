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

use crate::header::HEADER_LEN;
use crate::storage::Window;

/// The three fixed roles a storage region can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Receives the image (or diff) delivered by the fragmentation session
    Incoming,
    /// Holds the currently running image
    Running,
    /// Scratch output for delta reconstruction
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLayoutError {
    /// A slot is too small to hold a header and any payload
    SlotTooSmall(SlotRole),
    /// Two slot ranges overlap
    Overlap(SlotRole, SlotRole),
}

/// A fixed `(base, length)` region of the flash device reserved for one
/// role. The bootloader header sits at the slot base, the image payload
/// immediately after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub base: u32,
    pub length: u32,
}

impl Slot {
    pub const fn new(base: u32, length: u32) -> Self {
        Self { base, length }
    }

    pub fn header_window(&self) -> Window {
        Window::new(self.base, HEADER_LEN as u32)
    }

    pub fn image_window(&self) -> Window {
        Window::new(self.base + HEADER_LEN as u32, self.length - HEADER_LEN as u32)
    }

    fn end(&self) -> u32 {
        self.base + self.length
    }

    fn overlaps(&self, other: &Slot) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

/// The process-wide slot assignment, fixed at configuration time.
///
/// Construction fails if any two slots alias each other; nothing downstream
/// re-checks this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    incoming: Slot,
    running: Slot,
    staging: Slot,
}

impl SlotLayout {
    pub fn new(incoming: Slot, running: Slot, staging: Slot) -> Result<Self, SlotLayoutError> {
        let slots = [
            (SlotRole::Incoming, incoming),
            (SlotRole::Running, running),
            (SlotRole::Staging, staging),
        ];
        for (role, slot) in &slots {
            if slot.length <= HEADER_LEN as u32 {
                return Err(SlotLayoutError::SlotTooSmall(*role));
            }
        }
        for i in 0..slots.len() {
            for j in (i + 1)..slots.len() {
                if slots[i].1.overlaps(&slots[j].1) {
                    return Err(SlotLayoutError::Overlap(slots[i].0, slots[j].0));
                }
            }
        }
        Ok(Self {
            incoming,
            running,
            staging,
        })
    }

    pub fn slot(&self, role: SlotRole) -> Slot {
        match role {
            SlotRole::Incoming => self.incoming,
            SlotRole::Running => self.running,
            SlotRole::Staging => self.staging,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_layout_is_accepted() {
        let layout = SlotLayout::new(
            Slot::new(0, 0x1000),
            Slot::new(0x1000, 0x1000),
            Slot::new(0x2000, 0x1000),
        );
        assert!(layout.is_ok());
    }

    #[test]
    fn overlapping_slots_are_rejected() {
        let layout = SlotLayout::new(
            Slot::new(0, 0x1000),
            Slot::new(0x0800, 0x1000),
            Slot::new(0x2000, 0x1000),
        );
        assert_eq!(
            layout,
            Err(SlotLayoutError::Overlap(SlotRole::Incoming, SlotRole::Running))
        );
    }

    #[test]
    fn undersized_slot_is_rejected() {
        let layout = SlotLayout::new(
            Slot::new(0, 0x40),
            Slot::new(0x1000, 0x1000),
            Slot::new(0x2000, 0x1000),
        );
        assert_eq!(layout, Err(SlotLayoutError::SlotTooSmall(SlotRole::Incoming)));
    }

    #[test]
    fn image_window_excludes_header() {
        let slot = Slot::new(0x1000, 0x1000);
        assert_eq!(slot.header_window(), Window::new(0x1000, HEADER_LEN as u32));
        assert_eq!(
            slot.image_window(),
            Window::new(0x1000 + HEADER_LEN as u32, 0x1000 - HEADER_LEN as u32)
        );
    }
}
