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

//! Control-port routing for inbound application data.
//!
//! Three well-known ports carry the update-related control protocols; the
//! protocols themselves (clock sync, multicast group setup, fragmentation
//! session management) are external collaborators plugged in as handlers.
//! Anything else is opaque application payload and is only logged.

use heapless::Vec;

use crate::queue::{QueuedMessage, ReplyKind, MAX_PAYLOAD_LEN};
use embassy_time::Instant;

pub const MULTICAST_CONTROL_PORT: u8 = 200;
pub const FRAGMENTATION_PORT: u8 = 201;
pub const CLOCK_SYNC_PORT: u8 = 202;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPort {
    MulticastControl,
    FragmentationControl,
    ClockSync,
}

impl ControlPort {
    pub fn from_port(port: u8) -> Option<Self> {
        match port {
            MULTICAST_CONTROL_PORT => Some(ControlPort::MulticastControl),
            FRAGMENTATION_PORT => Some(ControlPort::FragmentationControl),
            CLOCK_SYNC_PORT => Some(ControlPort::ClockSync),
            _ => None,
        }
    }

    pub const fn port(&self) -> u8 {
        match self {
            ControlPort::MulticastControl => MULTICAST_CONTROL_PORT,
            ControlPort::FragmentationControl => FRAGMENTATION_PORT,
            ControlPort::ClockSync => CLOCK_SYNC_PORT,
        }
    }

    const fn reply_kind(&self) -> ReplyKind {
        match self {
            ControlPort::MulticastControl => ReplyKind::MulticastReply,
            ControlPort::FragmentationControl => ReplyKind::FragmentationReply,
            ControlPort::ClockSync => ReplyKind::ClockSyncReply,
        }
    }
}

/// An uplink a collaborator wants sent in response to a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    pub confirmed: bool,
    pub retry_allowed: bool,
}

impl Reply {
    /// `None` when the payload does not fit an uplink.
    pub fn new(payload: &[u8], confirmed: bool, retry_allowed: bool) -> Option<Self> {
        Some(Self {
            payload: Vec::from_slice(payload).ok()?,
            confirmed,
            retry_allowed,
        })
    }

    pub(crate) fn into_message(self, port: ControlPort, now: Instant) -> QueuedMessage {
        QueuedMessage {
            kind: port.reply_kind(),
            port: port.port(),
            payload: self.payload,
            confirmed: self.confirmed,
            retry_allowed: self.retry_allowed,
            queued_at: now,
        }
    }
}

/// One of the external control-protocol collaborators. Implementations
/// parse the command, act on it, and optionally hand back a reply to
/// enqueue.
pub trait ControlHandler {
    fn handle(&mut self, payload: &[u8]) -> Option<Reply>;
}

/// Routes a downlink to the matching handler, or logs and drops it.
pub fn dispatch<CS, MC, FR>(
    port: u8,
    payload: &[u8],
    clock_sync: &mut CS,
    multicast: &mut MC,
    fragmentation: &mut FR,
) -> Option<(ControlPort, Reply)>
where
    CS: ControlHandler,
    MC: ControlHandler,
    FR: ControlHandler,
{
    let Some(control) = ControlPort::from_port(port) else {
        log::info!(
            "data received on application port {} ({} bytes), ignoring",
            port,
            payload.len()
        );
        return None;
    };

    let reply = match control {
        ControlPort::ClockSync => clock_sync.handle(payload),
        ControlPort::MulticastControl => multicast.handle(payload),
        ControlPort::FragmentationControl => fragmentation.handle(payload),
    };
    reply.map(|r| (control, r))
}
