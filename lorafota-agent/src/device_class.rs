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

//! Device-class scheduling state machine.
//!
//! `Normal` is duty-cycled class-A style operation; `ExtendedReceive` keeps
//! the receiver open continuously while a firmware image is multicast down.
//! Transitions are driven by external requests (with an optional start
//! delay) and by the reversion timer; the owner calls [`ClassScheduler::poll`]
//! from its task loop.

use embassy_time::{Duration, Instant};

use crate::queue::OutboundQueue;
use crate::radio::Radio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Normal,
    ExtendedReceive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    /// The `(datarate, frequency)` pair is not usable in this region
    InvalidRxParams,
}

/// An external request to enter extended receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRequest {
    /// Wait this long before switching
    pub delay: Duration,
    /// Automatic reversion to normal after this long in extended receive
    pub lifetime: Duration,
    pub datarate: u8,
    pub frequency_hz: u32,
}

#[derive(Debug, Clone, Copy)]
struct PendingSwitch {
    at: Instant,
    request: SwitchRequest,
}

pub struct ClassScheduler {
    mode: DeviceMode,
    pending: Option<PendingSwitch>,
    revert_at: Option<Instant>,
    tx_hold_until: Option<Instant>,
    tx_cooldown: Duration,
}

impl ClassScheduler {
    pub const fn new(tx_cooldown: Duration) -> Self {
        Self {
            mode: DeviceMode::Normal,
            pending: None,
            revert_at: None,
            tx_hold_until: None,
            tx_cooldown,
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Whether normal-mode transmit activity is currently permitted. False
    /// in extended receive and during the post-reversion cool-down.
    pub fn tx_allowed(&self, now: Instant) -> bool {
        if self.mode != DeviceMode::Normal {
            return false;
        }
        match self.tx_hold_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Schedules (or, for a zero delay, immediately executes) a switch to
    /// extended receive. A later request supersedes a pending one.
    pub fn request_extended_receive<R: Radio>(
        &mut self,
        request: SwitchRequest,
        now: Instant,
        radio: &mut R,
        queue: &mut OutboundQueue,
    ) -> Result<(), SwitchError> {
        if !radio.validate_rx2(request.datarate, request.frequency_hz) {
            log::warn!(
                "rejecting extended-receive request, dr {} / {} Hz invalid",
                request.datarate,
                request.frequency_hz
            );
            return Err(SwitchError::InvalidRxParams);
        }

        if request.delay == Duration::from_ticks(0) {
            self.pending = None;
            self.enter_extended_receive(request, now, radio, queue);
            return Ok(());
        }

        if self.pending.is_some() {
            log::info!("superseding previously scheduled class switch");
        }
        self.pending = Some(PendingSwitch {
            at: now + request.delay,
            request,
        });
        log::info!(
            "extended receive scheduled in {} s for {} s",
            request.delay.as_secs(),
            request.lifetime.as_secs()
        );
        Ok(())
    }

    /// Reverts to normal mode ahead of the reversion timer.
    pub fn request_normal<R: Radio>(&mut self, now: Instant, radio: &mut R) {
        self.pending = None;
        if self.mode == DeviceMode::ExtendedReceive {
            self.revert(now, radio);
        }
    }

    /// Executes any due scheduled transition. Returns the new mode when one
    /// fired.
    pub fn poll<R: Radio>(
        &mut self,
        now: Instant,
        radio: &mut R,
        queue: &mut OutboundQueue,
    ) -> Option<DeviceMode> {
        if let Some(pending) = self.pending {
            if now >= pending.at {
                self.pending = None;
                self.enter_extended_receive(pending.request, now, radio, queue);
                return Some(DeviceMode::ExtendedReceive);
            }
        }
        if self.mode == DeviceMode::ExtendedReceive {
            if let Some(at) = self.revert_at {
                if now >= at {
                    self.revert(now, radio);
                    return Some(DeviceMode::Normal);
                }
            }
        }
        None
    }

    /// The earliest instant at which `poll` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.pending.map(|p| p.at), self.revert_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    fn enter_extended_receive<R: Radio>(
        &mut self,
        request: SwitchRequest,
        now: Instant,
        radio: &mut R,
        queue: &mut OutboundQueue,
    ) {
        log::info!(
            "entering extended receive, dr {} / {} Hz for {} s",
            request.datarate,
            request.frequency_hz,
            request.lifetime.as_secs()
        );

        radio.cancel_sending();
        queue.discard();

        if let Err(e) = radio.set_adaptive_datarate(false) {
            log::warn!("failed to suspend ADR: {:?}", e);
        }
        // a failed window reconfiguration must not strand the device
        // outside extended receive, the session may still come through
        if let Err(e) = radio.configure_rx2(request.datarate, request.frequency_hz) {
            log::warn!("failed to configure rx2 window: {:?}", e);
        }

        self.mode = DeviceMode::ExtendedReceive;
        self.revert_at = Some(now + request.lifetime);
        self.tx_hold_until = None;
    }

    fn revert<R: Radio>(&mut self, now: Instant, radio: &mut R) {
        log::info!("reverting to normal mode");

        if let Err(e) = radio.set_adaptive_datarate(true) {
            log::warn!("failed to restore ADR: {:?}", e);
        }
        if let Err(e) = radio.restore_rx2() {
            log::warn!("failed to restore rx2 window: {:?}", e);
        }

        self.mode = DeviceMode::Normal;
        self.revert_at = None;
        self.tx_hold_until = Some(now + self.tx_cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueuedMessage, ReplyKind};
    use crate::radio::RadioError;
    use heapless::Vec;

    struct RecordingRadio {
        cancelled: u32,
        adr: std::vec::Vec<bool>,
        rx2: std::vec::Vec<(u8, u32)>,
        rx2_restored: u32,
        rx2_valid: bool,
        rx2_config_fails: bool,
    }

    impl RecordingRadio {
        fn new() -> Self {
            Self {
                cancelled: 0,
                adr: std::vec::Vec::new(),
                rx2: std::vec::Vec::new(),
                rx2_restored: 0,
                rx2_valid: true,
                rx2_config_fails: false,
            }
        }
    }

    impl Radio for RecordingRadio {
        fn send(&mut self, _port: u8, _data: &[u8], _confirmed: bool) -> Result<(), RadioError> {
            Ok(())
        }

        fn cancel_sending(&mut self) {
            self.cancelled += 1;
        }

        fn backoff_remaining(&self) -> Option<Duration> {
            None
        }

        fn set_adaptive_datarate(&mut self, enabled: bool) -> Result<(), RadioError> {
            self.adr.push(enabled);
            Ok(())
        }

        fn validate_rx2(&self, _datarate: u8, _frequency_hz: u32) -> bool {
            self.rx2_valid
        }

        fn configure_rx2(&mut self, datarate: u8, frequency_hz: u32) -> Result<(), RadioError> {
            if self.rx2_config_fails {
                return Err(RadioError::RxConfigRejected);
            }
            self.rx2.push((datarate, frequency_hz));
            Ok(())
        }

        fn restore_rx2(&mut self) -> Result<(), RadioError> {
            self.rx2_restored += 1;
            Ok(())
        }
    }

    fn immediate_request() -> SwitchRequest {
        SwitchRequest {
            delay: Duration::from_secs(0),
            lifetime: Duration::from_secs(600),
            datarate: 2,
            frequency_hz: 869_525_000,
        }
    }

    fn pending_message() -> QueuedMessage {
        QueuedMessage {
            kind: ReplyKind::ApplicationReply,
            port: 15,
            payload: Vec::from_slice(b"keepalive").unwrap(),
            confirmed: false,
            retry_allowed: true,
            queued_at: Instant::from_secs(0),
        }
    }

    #[test]
    fn immediate_switch_enters_extended_receive_and_discards_queue() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        queue.enqueue(pending_message()).unwrap();

        let t0 = Instant::from_secs(0);
        scheduler
            .request_extended_receive(immediate_request(), t0, &mut radio, &mut queue)
            .unwrap();

        assert_eq!(scheduler.mode(), DeviceMode::ExtendedReceive);
        assert!(!queue.is_pending());
        assert_eq!(radio.cancelled, 1);
        assert_eq!(radio.adr, vec![false]);
        assert_eq!(radio.rx2, vec![(2, 869_525_000)]);
        // reversion scheduled for lifetime later
        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_secs(600)));
    }

    #[test]
    fn reversion_timer_restores_normal_mode_with_cooldown() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(5));

        let t0 = Instant::from_secs(0);
        scheduler
            .request_extended_receive(immediate_request(), t0, &mut radio, &mut queue)
            .unwrap();

        // not due yet
        let t1 = t0 + Duration::from_secs(599);
        assert_eq!(scheduler.poll(t1, &mut radio, &mut queue), None);
        assert!(!scheduler.tx_allowed(t1));

        let t2 = t0 + Duration::from_secs(600);
        assert_eq!(
            scheduler.poll(t2, &mut radio, &mut queue),
            Some(DeviceMode::Normal)
        );
        assert_eq!(radio.adr, vec![false, true]);
        assert_eq!(radio.rx2_restored, 1);

        // cool-down holds off transmission for a few seconds
        assert!(!scheduler.tx_allowed(t2));
        assert!(scheduler.tx_allowed(t2 + Duration::from_secs(5)));
    }

    #[test]
    fn delayed_switch_fires_on_poll() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(5));

        let mut request = immediate_request();
        request.delay = Duration::from_secs(10);

        let t0 = Instant::from_secs(0);
        scheduler
            .request_extended_receive(request, t0, &mut radio, &mut queue)
            .unwrap();
        assert_eq!(scheduler.mode(), DeviceMode::Normal);

        assert_eq!(scheduler.poll(t0 + Duration::from_secs(9), &mut radio, &mut queue), None);
        assert_eq!(
            scheduler.poll(t0 + Duration::from_secs(10), &mut radio, &mut queue),
            Some(DeviceMode::ExtendedReceive)
        );
    }

    #[test]
    fn later_request_supersedes_scheduled_one() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(5));

        let mut first = immediate_request();
        first.delay = Duration::from_secs(10);
        first.datarate = 1;

        let mut second = immediate_request();
        second.delay = Duration::from_secs(30);
        second.datarate = 3;

        let t0 = Instant::from_secs(0);
        scheduler
            .request_extended_receive(first, t0, &mut radio, &mut queue)
            .unwrap();
        scheduler
            .request_extended_receive(second, t0, &mut radio, &mut queue)
            .unwrap();

        // the superseded switch must not fire
        assert_eq!(scheduler.poll(t0 + Duration::from_secs(10), &mut radio, &mut queue), None);
        assert_eq!(
            scheduler.poll(t0 + Duration::from_secs(30), &mut radio, &mut queue),
            Some(DeviceMode::ExtendedReceive)
        );
        assert_eq!(radio.rx2, vec![(3, 869_525_000)]);
    }

    #[test]
    fn invalid_rx_params_are_rejected_before_scheduling() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        radio.rx2_valid = false;
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        queue.enqueue(pending_message()).unwrap();

        let result = scheduler.request_extended_receive(
            immediate_request(),
            Instant::from_secs(0),
            &mut radio,
            &mut queue,
        );
        assert_eq!(result, Err(SwitchError::InvalidRxParams));
        assert_eq!(scheduler.mode(), DeviceMode::Normal);
        // nothing was touched
        assert!(queue.is_pending());
        assert_eq!(radio.cancelled, 0);
    }

    #[test]
    fn rx2_configuration_failure_does_not_block_the_switch() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        radio.rx2_config_fails = true;
        let mut queue = OutboundQueue::new(Duration::from_secs(5));

        scheduler
            .request_extended_receive(immediate_request(), Instant::from_secs(0), &mut radio, &mut queue)
            .unwrap();
        assert_eq!(scheduler.mode(), DeviceMode::ExtendedReceive);
    }

    #[test]
    fn explicit_revert_request_cancels_pending_switch() {
        let mut scheduler = ClassScheduler::new(Duration::from_secs(5));
        let mut radio = RecordingRadio::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(5));

        let mut request = immediate_request();
        request.delay = Duration::from_secs(10);
        let t0 = Instant::from_secs(0);
        scheduler
            .request_extended_receive(request, t0, &mut radio, &mut queue)
            .unwrap();

        scheduler.request_normal(t0 + Duration::from_secs(1), &mut radio);
        assert_eq!(scheduler.poll(t0 + Duration::from_secs(10), &mut radio, &mut queue), None);
        assert_eq!(scheduler.mode(), DeviceMode::Normal);
    }
}
