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

//! Single-slot outbound message queue with backoff-driven retry.
//!
//! At most one message is ever pending. The payload is owned by the queue
//! from enqueue until it is transmitted or discarded; there is no other
//! reference to it.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::downlink::MULTICAST_CONTROL_PORT;
use crate::radio::Radio;

/// Maximum LoRaWAN application payload carried in one uplink.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Opcode of a multicast class-C session acknowledgment.
const MC_CLASS_C_SESSION_ANS: u8 = 0x04;
const MC_CLASS_C_SESSION_ANS_LEN: usize = 5;

/// Which collaborator produced an outbound message. One tagged type, one
/// enqueue path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    ClockSyncReply,
    MulticastReply,
    FragmentationReply,
    ApplicationReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub kind: ReplyKind,
    pub port: u8,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    pub confirmed: bool,
    pub retry_allowed: bool,
    pub queued_at: Instant,
}

/// A message is already pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

/// The queued payload is not a class-C session acknowledgment, so no
/// time-to-start adjustment applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotClassCSessionAck;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing pending
    Empty,
    /// In extended-receive mode or inside a backoff window; nothing done
    Deferred,
    /// Message handed to the MAC and discarded from the queue
    Sent,
    /// The MAC rejected the frame; a retry is scheduled
    Failed,
}

pub struct OutboundQueue {
    pending: Option<QueuedMessage>,
    next_send_after: Option<Instant>,
    fallback_backoff: Duration,
}

impl OutboundQueue {
    pub const fn new(fallback_backoff: Duration) -> Self {
        Self {
            pending: None,
            next_send_after: None,
            fallback_backoff,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&QueuedMessage> {
        self.pending.as_ref()
    }

    /// Accepts a message for transmission. Fails with [`Busy`] while one is
    /// already pending; the pending message is left untouched.
    pub fn enqueue(&mut self, message: QueuedMessage) -> Result<(), Busy> {
        if self.pending.is_some() {
            return Err(Busy);
        }
        log::debug!(
            "queued {} byte uplink for port {}",
            message.payload.len(),
            message.port
        );
        self.pending = Some(message);
        Ok(())
    }

    /// Drops the pending message, releasing its buffer. Used when switching
    /// to extended receive; pending sends do not survive the mode switch.
    pub fn discard(&mut self) {
        if self.pending.take().is_some() {
            log::debug!("discarded pending uplink");
        }
        self.next_send_after = None;
    }

    /// One transmit attempt. `tx_allowed` is false while in extended
    /// receive or during the post-reversion cool-down.
    pub fn drain_once<R: Radio>(
        &mut self,
        now: Instant,
        tx_allowed: bool,
        radio: &mut R,
    ) -> DrainOutcome {
        if !tx_allowed {
            return DrainOutcome::Deferred;
        }
        if let Some(after) = self.next_send_after {
            if now < after {
                return DrainOutcome::Deferred;
            }
        }
        let Some(message) = self.pending.as_ref() else {
            return DrainOutcome::Empty;
        };

        // a delayed class-C ack carries "seconds until session start",
        // which has been ticking down while the message sat queued. The
        // adjustment is applied to a transmit-time copy; the queued message
        // keeps the original value so a retry re-derives it from scratch.
        let adjusted = if message.kind == ReplyKind::MulticastReply {
            match adjust_class_c_session_ack(message, now) {
                Ok(payload) => Some(payload),
                Err(NotClassCSessionAck) => {
                    log::warn!(
                        "queued multicast reply on port {} is not a class-C session ack, sending unmodified",
                        message.port
                    );
                    None
                }
            }
        } else {
            None
        };
        let payload = adjusted.as_ref().unwrap_or(&message.payload);

        match radio.send(message.port, payload, message.confirmed) {
            Ok(()) => {
                log::info!(
                    "{} bytes scheduled for transmission on port {}",
                    message.payload.len(),
                    message.port
                );
                self.pending = None;
                // seeds the next send's schedule, not this one
                self.schedule_next(now, radio.backoff_remaining());
                DrainOutcome::Sent
            }
            Err(e) => {
                log::warn!("send on port {} failed: {:?}", message.port, e);
                if !message.retry_allowed {
                    log::warn!("retry not allowed, dropping uplink for port {}", message.port);
                    self.pending = None;
                }
                self.schedule_next(now, radio.backoff_remaining());
                DrainOutcome::Failed
            }
        }
    }

    fn schedule_next(&mut self, now: Instant, backoff: Option<Duration>) {
        let wait = backoff.unwrap_or(self.fallback_backoff);
        self.next_send_after = Some(now + wait);
    }

    /// When the next transmit attempt is permitted, if a backoff window is
    /// active.
    pub fn next_send_after(&self) -> Option<Instant> {
        self.next_send_after
    }
}

/// Returns a copy of a queued multicast class-C session acknowledgment with
/// its time-to-start field reduced by the time the message has spent queued.
/// The encoded value is in seconds, 24-bit little-endian, floored at zero.
/// The queued message itself is never modified; the subtraction is always
/// relative to the originally encoded value.
pub fn adjust_class_c_session_ack(
    message: &QueuedMessage,
    now: Instant,
) -> Result<Vec<u8, MAX_PAYLOAD_LEN>, NotClassCSessionAck> {
    if message.port != MULTICAST_CONTROL_PORT
        || message.payload.len() != MC_CLASS_C_SESSION_ANS_LEN
        || message.payload[0] != MC_CLASS_C_SESSION_ANS
    {
        return Err(NotClassCSessionAck);
    }

    let elapsed = (now - message.queued_at).as_secs();
    let encoded = u32::from_le_bytes([
        message.payload[2],
        message.payload[3],
        message.payload[4],
        0,
    ]);
    let adjusted = encoded.saturating_sub(elapsed.min(u32::MAX as u64) as u32);

    let mut payload = message.payload.clone();
    let bytes = adjusted.to_le_bytes();
    payload[2] = bytes[0];
    payload[3] = bytes[1];
    payload[4] = bytes[2];

    log::debug!("class-C ack time-to-start adjusted {} -> {}", encoded, adjusted);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::RadioError;

    pub(crate) struct FakeRadio {
        pub sent: std::vec::Vec<(u8, std::vec::Vec<u8>, bool)>,
        pub fail_sends: bool,
        pub backoff: Option<Duration>,
    }

    impl FakeRadio {
        pub fn new() -> Self {
            Self {
                sent: std::vec::Vec::new(),
                fail_sends: false,
                backoff: None,
            }
        }
    }

    impl Radio for FakeRadio {
        fn send(&mut self, port: u8, data: &[u8], confirmed: bool) -> Result<(), RadioError> {
            if self.fail_sends {
                return Err(RadioError::TxRejected);
            }
            self.sent.push((port, data.to_vec(), confirmed));
            Ok(())
        }

        fn cancel_sending(&mut self) {}

        fn backoff_remaining(&self) -> Option<Duration> {
            self.backoff
        }

        fn set_adaptive_datarate(&mut self, _enabled: bool) -> Result<(), RadioError> {
            Ok(())
        }

        fn validate_rx2(&self, _datarate: u8, _frequency_hz: u32) -> bool {
            true
        }

        fn configure_rx2(&mut self, _datarate: u8, _frequency_hz: u32) -> Result<(), RadioError> {
            Ok(())
        }

        fn restore_rx2(&mut self) -> Result<(), RadioError> {
            Ok(())
        }
    }

    fn message(kind: ReplyKind, port: u8, payload: &[u8], queued_at: Instant) -> QueuedMessage {
        QueuedMessage {
            kind,
            port,
            payload: Vec::from_slice(payload).unwrap(),
            confirmed: false,
            retry_allowed: true,
            queued_at,
        }
    }

    fn class_c_ack(time_to_start: u32, queued_at: Instant) -> QueuedMessage {
        let t = time_to_start.to_le_bytes();
        message(
            ReplyKind::MulticastReply,
            MULTICAST_CONTROL_PORT,
            &[MC_CLASS_C_SESSION_ANS, 0x00, t[0], t[1], t[2]],
            queued_at,
        )
    }

    #[test]
    fn second_enqueue_returns_busy_and_keeps_original() {
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        let t0 = Instant::from_secs(0);
        let original = message(ReplyKind::ApplicationReply, 15, b"first", t0);
        queue.enqueue(original.clone()).unwrap();
        assert_eq!(
            queue.enqueue(message(ReplyKind::ApplicationReply, 15, b"second", t0)),
            Err(Busy)
        );
        assert_eq!(queue.pending(), Some(&original));
    }

    #[test]
    fn drain_is_deferred_when_tx_not_allowed() {
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        let mut radio = FakeRadio::new();
        let t0 = Instant::from_secs(0);
        queue
            .enqueue(message(ReplyKind::ApplicationReply, 15, b"data", t0))
            .unwrap();
        assert_eq!(queue.drain_once(t0, false, &mut radio), DrainOutcome::Deferred);
        assert!(queue.is_pending());
        assert!(radio.sent.is_empty());
    }

    #[test]
    fn successful_drain_discards_and_seeds_next_schedule() {
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        let mut radio = FakeRadio::new();
        radio.backoff = Some(Duration::from_secs(12));
        let t0 = Instant::from_secs(100);
        queue
            .enqueue(message(ReplyKind::ApplicationReply, 15, b"data", t0))
            .unwrap();

        assert_eq!(queue.drain_once(t0, true, &mut radio), DrainOutcome::Sent);
        assert!(!queue.is_pending());
        assert_eq!(radio.sent.len(), 1);
        assert_eq!(queue.next_send_after(), Some(t0 + Duration::from_secs(12)));
    }

    #[test]
    fn failed_drain_keeps_message_and_schedules_retry() {
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        let mut radio = FakeRadio::new();
        radio.fail_sends = true;
        let t0 = Instant::from_secs(0);
        queue
            .enqueue(message(ReplyKind::ApplicationReply, 15, b"data", t0))
            .unwrap();

        assert_eq!(queue.drain_once(t0, true, &mut radio), DrainOutcome::Failed);
        assert!(queue.is_pending());
        // fallback applies, no radio-reported backoff
        assert_eq!(queue.next_send_after(), Some(t0 + Duration::from_secs(5)));

        // retry before the window opens is deferred
        let t1 = t0 + Duration::from_secs(3);
        assert_eq!(queue.drain_once(t1, true, &mut radio), DrainOutcome::Deferred);

        // retry after the window succeeds
        radio.fail_sends = false;
        let t2 = t0 + Duration::from_secs(5);
        assert_eq!(queue.drain_once(t2, true, &mut radio), DrainOutcome::Sent);
    }

    #[test]
    fn class_c_ack_time_is_reduced_by_queue_delay() {
        let t0 = Instant::from_secs(1000);
        let msg = class_c_ack(100, t0);
        let payload = adjust_class_c_session_ack(&msg, t0 + Duration::from_secs(30)).unwrap();
        assert_eq!(&payload[2..5], &[70, 0, 0]);
        // the queued original keeps its encoded value
        assert_eq!(&msg.payload[2..5], &[100, 0, 0]);
    }

    #[test]
    fn class_c_ack_time_never_goes_negative() {
        let t0 = Instant::from_secs(1000);
        let msg = class_c_ack(100, t0);
        let payload = adjust_class_c_session_ack(&msg, t0 + Duration::from_secs(150)).unwrap();
        assert_eq!(&payload[2..5], &[0, 0, 0]);
    }

    #[test]
    fn non_ack_shapes_are_rejected_unmodified() {
        let t0 = Instant::from_secs(0);
        let now = t0 + Duration::from_secs(10);

        // wrong port
        let msg = message(ReplyKind::MulticastReply, 15, &[0x04, 0, 50, 0, 0], t0);
        assert_eq!(
            adjust_class_c_session_ack(&msg, now),
            Err(NotClassCSessionAck)
        );
        assert_eq!(&msg.payload[..], &[0x04, 0, 50, 0, 0]);

        // wrong length
        let msg = message(
            ReplyKind::MulticastReply,
            MULTICAST_CONTROL_PORT,
            &[0x04, 0, 50, 0],
            t0,
        );
        assert_eq!(
            adjust_class_c_session_ack(&msg, now),
            Err(NotClassCSessionAck)
        );

        // wrong opcode
        let msg = message(
            ReplyKind::MulticastReply,
            MULTICAST_CONTROL_PORT,
            &[0x02, 0, 50, 0, 0],
            t0,
        );
        assert_eq!(
            adjust_class_c_session_ack(&msg, now),
            Err(NotClassCSessionAck)
        );
    }

    #[test]
    fn drained_class_c_ack_is_sent_with_adjusted_time() {
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        let mut radio = FakeRadio::new();
        let t0 = Instant::from_secs(0);
        queue.enqueue(class_c_ack(100, t0)).unwrap();

        queue.drain_once(t0 + Duration::from_secs(30), true, &mut radio);
        assert_eq!(radio.sent[0].1[2..5], [70, 0, 0]);
    }

    #[test]
    fn retried_class_c_ack_is_adjusted_from_enqueue_time() {
        let mut queue = OutboundQueue::new(Duration::from_secs(5));
        let mut radio = FakeRadio::new();
        radio.fail_sends = true;
        let t0 = Instant::from_secs(0);
        queue.enqueue(class_c_ack(100, t0)).unwrap();

        // failed attempt 30 s in must not eat into the encoded value
        assert_eq!(
            queue.drain_once(t0 + Duration::from_secs(30), true, &mut radio),
            DrainOutcome::Failed
        );
        assert_eq!(&queue.pending().unwrap().payload[2..5], &[100, 0, 0]);

        radio.fail_sends = false;
        assert_eq!(
            queue.drain_once(t0 + Duration::from_secs(40), true, &mut radio),
            DrainOutcome::Sent
        );
        assert_eq!(radio.sent[0].1[2..5], [60, 0, 0]);
    }
}
