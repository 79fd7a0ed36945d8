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

//! Boundary to the LoRaWAN MAC stack. Join, duty cycle, frame crypto and
//! the actual receive path live behind this trait; the agent only schedules
//! against it.

use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The MAC rejected the transmit request (duty cycle, not joined, busy)
    TxRejected,
    /// The requested receive-window parameters were rejected
    RxConfigRejected,
}

pub trait Radio {
    /// Hands a frame to the MAC for transmission. Completion is reported
    /// asynchronously as a TxDone / TxFailed event.
    fn send(&mut self, port: u8, data: &[u8], confirmed: bool) -> Result<(), RadioError>;

    /// Aborts any transmission the MAC has in flight.
    fn cancel_sending(&mut self);

    /// Minimum wait the MAC imposes before the next transmit attempt, if it
    /// reports one.
    fn backoff_remaining(&self) -> Option<Duration>;

    fn set_adaptive_datarate(&mut self, enabled: bool) -> Result<(), RadioError>;

    /// True when the `(datarate, frequency)` pair is usable in the current
    /// region.
    fn validate_rx2(&self, datarate: u8, frequency_hz: u32) -> bool;

    /// Points the continuous receive window at the given parameters.
    fn configure_rx2(&mut self, datarate: u8, frequency_hz: u32) -> Result<(), RadioError>;

    /// Restores the receive window configured before `configure_rx2`.
    fn restore_rx2(&mut self) -> Result<(), RadioError>;
}
