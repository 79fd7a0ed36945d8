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

use embassy_time::Duration;
use lorafota_core::manifest::UUID_LEN;
use lorafota_core::signing::TrustAnchor;

/// Where the version recorded in a committed header comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPolicy {
    /// Take the version carried in the manifest
    FromManifest,
    /// Ignore the manifest and record one more than the running image's
    /// committed version
    MonotonicFromRunning,
}

/// Everything the agent needs that was provisioned at build or manufacture
/// time. Owned by the agent context and passed down; there is no global
/// state.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub manufacturer_id: [u8; UUID_LEN],
    pub device_class_id: [u8; UUID_LEN],
    pub trust_anchor: TrustAnchor,
    pub version_policy: VersionPolicy,
    /// Transmit hold-off after reverting to normal mode, while the radio
    /// settles
    pub tx_cooldown: Duration,
    /// Retry interval when the transport reports no backoff of its own
    pub fallback_backoff: Duration,
}

impl AgentConfig {
    pub fn new(
        manufacturer_id: [u8; UUID_LEN],
        device_class_id: [u8; UUID_LEN],
        trust_anchor: TrustAnchor,
        version_policy: VersionPolicy,
    ) -> Self {
        Self {
            manufacturer_id,
            device_class_id,
            trust_anchor,
            version_policy,
            tx_cooldown: Duration::from_secs(5),
            fallback_backoff: Duration::from_secs(5),
        }
    }
}
