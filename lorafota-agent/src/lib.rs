#![cfg_attr(not(test), no_std)]
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

//! Firmware-over-the-air update agent for a LoRaWAN end device.
//!
//! The crate is a set of poll-based state machines: the radio stack hands
//! events in (marshaled through [`events::AgentEventChannel`] when they
//! originate in interrupt context), the owner calls `poll` with the current
//! time from its task loop, and all side effects go through the
//! [`radio::Radio`] trait and the flash device. Nothing here blocks or
//! resets the system; a successful commit only reports that a reset is due.

pub mod config;
pub mod context;
pub mod device_class;
pub mod downlink;
pub mod events;
pub mod pipeline;
pub mod queue;
pub mod radio;

pub use config::{AgentConfig, VersionPolicy};
pub use context::UpdateAgent;
pub use device_class::{ClassScheduler, DeviceMode, SwitchRequest};
pub use pipeline::{Committed, UpdateError, UpdatePipeline};
pub use queue::{OutboundQueue, QueuedMessage, ReplyKind};
