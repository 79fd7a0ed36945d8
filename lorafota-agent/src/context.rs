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

//! The agent context: one object owning the pipeline, scheduler, queue,
//! flash and radio, driven from a single task loop. There is no hidden
//! process-wide state; everything a handler touches hangs off this.

use embassy_time::Instant;
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use lorafota_core::slots::SlotLayout;

use crate::config::AgentConfig;
use crate::device_class::{ClassScheduler, DeviceMode};
use crate::downlink::{dispatch, ControlHandler};
use crate::events::AgentEvent;
use crate::pipeline::{Committed, UpdatePipeline};
use crate::queue::{Busy, OutboundQueue, QueuedMessage, ReplyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkError {
    /// A message is already pending
    Busy,
    /// The payload exceeds the uplink size limit
    PayloadTooLarge,
}

impl From<Busy> for UplinkError {
    fn from(_: Busy) -> Self {
        UplinkError::Busy
    }
}

pub struct UpdateAgent<F, R, CS, MC, FR> {
    flash: F,
    radio: R,
    clock_sync: CS,
    multicast: MC,
    fragmentation: FR,
    pipeline: UpdatePipeline,
    scheduler: ClassScheduler,
    queue: OutboundQueue,
}

impl<F, R, CS, MC, FR> UpdateAgent<F, R, CS, MC, FR>
where
    F: ReadNorFlash + NorFlash,
    R: crate::radio::Radio,
    CS: ControlHandler,
    MC: ControlHandler,
    FR: ControlHandler,
{
    pub fn new(
        flash: F,
        radio: R,
        layout: SlotLayout,
        config: AgentConfig,
        clock_sync: CS,
        multicast: MC,
        fragmentation: FR,
    ) -> Self {
        Self {
            flash,
            radio,
            clock_sync,
            multicast,
            fragmentation,
            pipeline: UpdatePipeline::new(layout, &config),
            scheduler: ClassScheduler::new(config.tx_cooldown),
            queue: OutboundQueue::new(config.fallback_backoff),
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.scheduler.mode()
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Handles one marshaled event. Returns the commit outcome when the
    /// event completed an update; the caller is responsible for the system
    /// reset.
    pub fn process_event(&mut self, event: AgentEvent, now: Instant) -> Option<Committed> {
        match event {
            AgentEvent::Downlink { port, payload } => {
                if let Some((control, reply)) = dispatch(
                    port,
                    &payload,
                    &mut self.clock_sync,
                    &mut self.multicast,
                    &mut self.fragmentation,
                ) {
                    if self.queue.enqueue(reply.into_message(control, now)).is_err() {
                        log::warn!("uplink already pending, dropping {:?} reply", control);
                    }
                }
                None
            }
            AgentEvent::SessionComplete { total_received } => {
                match self
                    .pipeline
                    .handle_firmware_ready(&mut self.flash, total_received)
                {
                    Ok(committed) => {
                        log::info!("firmware ready, reset will install {:?}", committed.slot);
                        Some(committed)
                    }
                    Err(e) => {
                        // terminal for this attempt; the device stays on the
                        // running image and resumes normal operation
                        log::error!("update attempt failed: {:?}", e);
                        None
                    }
                }
            }
            AgentEvent::ExtendedReceiveRequest(request) => {
                if let Err(e) = self.scheduler.request_extended_receive(
                    request,
                    now,
                    &mut self.radio,
                    &mut self.queue,
                ) {
                    log::warn!("extended-receive request rejected: {:?}", e);
                }
                None
            }
            AgentEvent::RevertToNormal => {
                self.scheduler.request_normal(now, &mut self.radio);
                None
            }
            AgentEvent::TxDone => {
                log::debug!("uplink delivered to network server");
                None
            }
            AgentEvent::TxFailed => {
                log::warn!("uplink transmission failed");
                None
            }
        }
    }

    /// One pass of the task loop: fire due mode transitions, then attempt
    /// to drain the outbound queue.
    pub fn poll(&mut self, now: Instant) {
        self.scheduler
            .poll(now, &mut self.radio, &mut self.queue);
        let tx_allowed = self.scheduler.tx_allowed(now);
        self.queue.drain_once(now, tx_allowed, &mut self.radio);
    }

    /// Queues an application uplink (keep-alive, sensor reading) when no
    /// protocol reply is waiting.
    pub fn enqueue_application_uplink(
        &mut self,
        port: u8,
        payload: &[u8],
        confirmed: bool,
        now: Instant,
    ) -> Result<(), UplinkError> {
        let payload =
            heapless::Vec::from_slice(payload).map_err(|_| UplinkError::PayloadTooLarge)?;
        self.queue.enqueue(QueuedMessage {
            kind: ReplyKind::ApplicationReply,
            port,
            payload,
            confirmed,
            retry_allowed: true,
            queued_at: now,
        })?;
        Ok(())
    }
}
