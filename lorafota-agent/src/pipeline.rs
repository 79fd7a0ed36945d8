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

//! Update verification and commit pipeline.
//!
//! Runs when the fragmentation session reports a complete image in the
//! incoming slot: authenticates the received bytes, reconstructs the full
//! image from a delta when the manifest says so, and commits the bootloader
//! header that marks a slot as pending install. The header write is the
//! sole commit point; everything before it leaves storage untouched apart
//! from the staging scratch area.
//!
//! The pipeline never resets the device. The caller reacts to a
//! [`Committed`] result, typically by triggering a system reset.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use lorafota_core::delta::{apply_patch, DeltaError};
use lorafota_core::digest::{digest_window, ContentDigest};
use lorafota_core::header::{FirmwareDetails, HeaderError, HEADER_LEN};
use lorafota_core::manifest::{FirmwareManifest, ManifestError, MANIFEST_TRAILER_LEN};
use lorafota_core::signing::{SignatureError, TrustAnchor};
use lorafota_core::slots::{SlotLayout, SlotRole};
use lorafota_core::storage::StorageError;

use crate::config::{AgentConfig, VersionPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// Manufacturer or device-class UUID does not match this device
    IdentityMismatch,
    /// The signature does not verify against the trust anchor
    SignatureInvalid,
    StorageReadError,
    StorageWriteError,
    /// A bounded buffer was too small for the data it had to hold.
    /// Reserved: the header and trailer buffers in this crate are fixed
    /// stack arrays sized to their wire formats, so nothing produces it
    /// until a variable-length record is introduced.
    OutOfMemory,
    /// The manifest's source size disagrees with the committed running image
    DiffSizeMismatch,
    /// The running image does not hash to its committed digest
    SourceHashMismatch,
    DeltaApplyFailed(DeltaError),
    /// An access fell outside its slot
    InvalidSlot,
    /// The manifest trailer could not be parsed
    ManifestInvalid(ManifestError),
    /// The committed header of the source slot could not be parsed
    HeaderInvalid,
}

impl From<StorageError> for UpdateError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ReadFailed => UpdateError::StorageReadError,
            StorageError::WriteFailed => UpdateError::StorageWriteError,
            StorageError::OutOfBounds => UpdateError::InvalidSlot,
        }
    }
}

impl From<DeltaError> for UpdateError {
    fn from(err: DeltaError) -> Self {
        match err {
            DeltaError::Storage(e) => e.into(),
            other => UpdateError::DeltaApplyFailed(other),
        }
    }
}

impl From<ManifestError> for UpdateError {
    fn from(err: ManifestError) -> Self {
        UpdateError::ManifestInvalid(err)
    }
}

impl From<SignatureError> for UpdateError {
    fn from(_: SignatureError) -> Self {
        UpdateError::SignatureInvalid
    }
}

impl From<HeaderError> for UpdateError {
    fn from(_: HeaderError) -> Self {
        UpdateError::HeaderInvalid
    }
}

/// A successful commit: which slot the bootloader will install from, and
/// the header it will read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    pub slot: SlotRole,
    pub details: FirmwareDetails,
}

pub struct UpdatePipeline {
    layout: SlotLayout,
    manufacturer_id: [u8; 16],
    device_class_id: [u8; 16],
    trust_anchor: TrustAnchor,
    version_policy: VersionPolicy,
}

impl UpdatePipeline {
    pub fn new(layout: SlotLayout, config: &AgentConfig) -> Self {
        Self {
            layout,
            manufacturer_id: config.manufacturer_id,
            device_class_id: config.device_class_id,
            trust_anchor: config.trust_anchor,
            version_policy: config.version_policy,
        }
    }

    /// Entry point for the fragmentation collaborator's session-complete
    /// notification: `total_received` bytes (image payload plus manifest
    /// trailer) sit at the start of the incoming slot's image area.
    pub fn handle_firmware_ready<F: ReadNorFlash + NorFlash>(
        &self,
        flash: &mut F,
        total_received: u32,
    ) -> Result<Committed, UpdateError> {
        let trailer_len = MANIFEST_TRAILER_LEN as u32;
        if total_received < trailer_len {
            return Err(UpdateError::ManifestInvalid(ManifestError::BufferTooSmall));
        }
        // signature and digest cover the payload only, never the trailer
        let payload_len = total_received - trailer_len;

        let incoming = self.layout.slot(SlotRole::Incoming).image_window();
        let mut trailer = [0u8; MANIFEST_TRAILER_LEN];
        incoming.read(flash, payload_len, &mut trailer)?;
        let manifest = FirmwareManifest::decode(&trailer)?;

        if manifest.is_delta {
            log::info!(
                "delta image received, {} byte diff against {} byte source",
                payload_len,
                manifest.source_size
            );
            self.verify_image(flash, SlotRole::Incoming, &manifest, 0, payload_len)?;

            let reconstructed = self.apply_delta(
                flash,
                SlotRole::Running,
                manifest.source_size,
                SlotRole::Incoming,
                payload_len,
                SlotRole::Staging,
            )?;

            let staging = self.layout.slot(SlotRole::Staging).image_window();
            let digest = digest_window(flash, staging, 0, reconstructed)?;
            let details =
                self.build_details(flash, &manifest, reconstructed as u64, digest)?;
            self.commit(flash, SlotRole::Staging, details)
        } else {
            log::info!("full image received, {} bytes", payload_len);
            self.verify_and_commit(flash, SlotRole::Incoming, &manifest, 0, payload_len)
        }
    }

    /// Verifies the image bytes in `[image_offset, image_offset +
    /// image_length)` of the slot against the manifest and, on success,
    /// commits the bootloader header for that slot.
    pub fn verify_and_commit<F: ReadNorFlash + NorFlash>(
        &self,
        flash: &mut F,
        slot: SlotRole,
        manifest: &FirmwareManifest,
        image_offset: u32,
        image_length: u32,
    ) -> Result<Committed, UpdateError> {
        let digest = self.verify_image(flash, slot, manifest, image_offset, image_length)?;
        let details = self.build_details(flash, manifest, image_length as u64, digest)?;
        self.commit(flash, slot, details)
    }

    /// Reconstructs a full image from the running image plus the diff in
    /// the diff slot, writing into the destination slot's image area.
    /// Returns the reconstructed length.
    pub fn apply_delta<F: ReadNorFlash + NorFlash>(
        &self,
        flash: &mut F,
        source_slot: SlotRole,
        source_length: u32,
        diff_slot: SlotRole,
        diff_length: u32,
        dest_slot: SlotRole,
    ) -> Result<u32, UpdateError> {
        let source = self.layout.slot(source_slot);

        let committed = self.read_committed_header(flash, source_slot)?;
        if committed.size != source_length as u64 {
            log::warn!(
                "source size mismatch: manifest says {}, committed header says {}",
                source_length,
                committed.size
            );
            return Err(UpdateError::DiffSizeMismatch);
        }

        // catch cheap corruption before spending time and power on the
        // reconstruction
        let source_digest = digest_window(flash, source.image_window(), 0, source_length)?;
        if source_digest != committed.digest {
            log::warn!("source image does not match its committed digest");
            return Err(UpdateError::SourceHashMismatch);
        }

        let diff = self.layout.slot(diff_slot).image_window();
        let dest = self.layout.slot(dest_slot).image_window();
        let reconstructed = apply_patch(
            flash,
            source.image_window(),
            source_length,
            diff,
            0,
            diff_length,
            dest,
        )?;
        log::info!("delta reconstruction produced {} bytes", reconstructed);
        Ok(reconstructed)
    }

    fn verify_image<F: ReadNorFlash>(
        &self,
        flash: &mut F,
        slot: SlotRole,
        manifest: &FirmwareManifest,
        image_offset: u32,
        image_length: u32,
    ) -> Result<ContentDigest, UpdateError> {
        if manifest.manufacturer_id != self.manufacturer_id
            || manifest.device_class_id != self.device_class_id
        {
            log::warn!("image is for a different manufacturer or device class");
            return Err(UpdateError::IdentityMismatch);
        }

        let window = self.layout.slot(slot).image_window();
        let digest = digest_window(flash, window, image_offset, image_length)?;

        self.trust_anchor.verify(&digest, &manifest.signature)?;
        log::debug!("image digest and signature verified");
        Ok(digest)
    }

    fn build_details<F: ReadNorFlash>(
        &self,
        flash: &mut F,
        manifest: &FirmwareManifest,
        size: u64,
        digest: ContentDigest,
    ) -> Result<FirmwareDetails, UpdateError> {
        let version = match self.version_policy {
            VersionPolicy::FromManifest => manifest.version,
            VersionPolicy::MonotonicFromRunning => {
                let running = self.read_committed_header(flash, SlotRole::Running)?;
                running.version + 1
            }
        };
        Ok(FirmwareDetails {
            version,
            size,
            digest,
        })
    }

    /// The sole commit point: one bounded write of the whole header.
    fn commit<F: NorFlash>(
        &self,
        flash: &mut F,
        slot: SlotRole,
        details: FirmwareDetails,
    ) -> Result<Committed, UpdateError> {
        let mut buffer = [0u8; HEADER_LEN];
        details.encode(&mut buffer)?;
        let header = self.layout.slot(slot).header_window();
        header.program(flash, 0, &buffer)?;
        log::info!(
            "committed version {} ({} bytes) to {:?} slot",
            details.version,
            details.size,
            slot
        );
        Ok(Committed { slot, details })
    }

    fn read_committed_header<F: ReadNorFlash>(
        &self,
        flash: &mut F,
        slot: SlotRole,
    ) -> Result<FirmwareDetails, UpdateError> {
        let mut buffer = [0u8; HEADER_LEN];
        self.layout
            .slot(slot)
            .header_window()
            .read(flash, 0, &mut buffer)?;
        Ok(FirmwareDetails::decode(&buffer)?)
    }
}
