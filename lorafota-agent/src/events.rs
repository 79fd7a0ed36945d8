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

//! Event records marshaled from the radio stack into task context.
//!
//! Receive completions and session notifications can arrive from interrupt
//! context; producers only `try_send` an immutable event onto the channel
//! and all state mutation happens when the task loop takes it off again.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

use crate::device_class::SwitchRequest;
use crate::queue::MAX_PAYLOAD_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Application data arrived on a port
    Downlink {
        port: u8,
        payload: Vec<u8, MAX_PAYLOAD_LEN>,
    },
    /// The fragmentation session delivered a complete image into the
    /// incoming slot
    SessionComplete { total_received: u32 },
    /// The multicast collaborator wants the device in extended receive
    ExtendedReceiveRequest(SwitchRequest),
    /// The multicast collaborator wants the device back in normal mode
    RevertToNormal,
    /// The MAC finished transmitting the last accepted frame
    TxDone,
    /// The MAC gave up on the last accepted frame
    TxFailed,
}

const CHANNEL_DEPTH: usize = 8;

pub type AgentEventChannel = Channel<CriticalSectionRawMutex, AgentEvent, CHANNEL_DEPTH>;
pub type AgentEventSender<'a> = Sender<'a, CriticalSectionRawMutex, AgentEvent, CHANNEL_DEPTH>;
pub type AgentEventReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, AgentEvent, CHANNEL_DEPTH>;
