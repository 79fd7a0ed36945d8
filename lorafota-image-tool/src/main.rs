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

mod artifact;
mod diff;

use std::io::{Error as IoError, ErrorKind, Result as IoResult};

use ed25519_dalek::SigningKey;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

use artifact::{build_signed_artifact, ArtifactParams};
use lorafota_core::digest::digest_bytes;

fn main() -> IoResult<()> {
    let (log_level, args) = parse_log_level();

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    log::info!("LoRa FOTA Image Tool");
    log::info!("====================\n");

    match args.first().map(String::as_str) {
        Some("diff") => cmd_diff(&args[1..]),
        Some("sign") => cmd_sign(&args[1..]),
        Some("digest") => cmd_digest(&args[1..]),
        _ => {
            eprintln!("usage:");
            eprintln!("  lorafota-image-tool diff <source> <target> <out-patch>");
            eprintln!(
                "  lorafota-image-tool sign <payload> <key-seed> <out> <manufacturer-hex32> \
                 <device-class-hex32> <version> [delta-source]"
            );
            eprintln!("  lorafota-image-tool digest <file>");
            Err(IoError::new(ErrorKind::InvalidInput, "unknown command"))
        }
    }
}

/// Generates a delta patch stream reconstructing `target` from `source`.
fn cmd_diff(args: &[String]) -> IoResult<()> {
    let [source_path, target_path, out_path] = args else {
        return Err(IoError::new(ErrorKind::InvalidInput, "diff needs 3 arguments"));
    };

    let source = std::fs::read(source_path)?;
    let target = std::fs::read(target_path)?;
    log::info!("source: {} bytes, target: {} bytes", source.len(), target.len());

    let bar = ProgressBar::new(target.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes}")
            .expect("static progress template"),
    );
    let patch = diff::generate_patch(&source, &target, |done| bar.set_position(done as u64));
    bar.finish();

    std::fs::write(out_path, &patch)?;
    log::info!(
        "wrote {} byte patch ({}% of the target image)",
        patch.len(),
        patch.len() * 100 / target.len().max(1)
    );
    Ok(())
}

/// Appends a signed manifest trailer to a payload (full image or patch).
fn cmd_sign(args: &[String]) -> IoResult<()> {
    if args.len() < 6 || args.len() > 7 {
        return Err(IoError::new(ErrorKind::InvalidInput, "sign needs 6 or 7 arguments"));
    }
    let payload = std::fs::read(&args[0])?;
    let seed = std::fs::read(&args[1])?;
    let seed: [u8; 32] = seed
        .as_slice()
        .try_into()
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "key seed must be exactly 32 bytes"))?;
    let signing_key = SigningKey::from_bytes(&seed);

    let manufacturer_id = parse_uuid(&args[3])?;
    let device_class_id = parse_uuid(&args[4])?;
    let version: u64 = args[5]
        .parse()
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "version must be an integer"))?;

    let delta_source_len = match args.get(6) {
        Some(path) => Some(std::fs::read(path)?.len() as u32),
        None => None,
    };

    let params = ArtifactParams {
        manufacturer_id,
        device_class_id,
        version,
        delta_source_len,
    };
    let artifact = build_signed_artifact(&payload, &params, &signing_key)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("{:?}", e)))?;

    std::fs::write(&args[2], &artifact)?;
    log::info!(
        "wrote {} byte artifact (version {}, {})",
        artifact.len(),
        version,
        if delta_source_len.is_some() { "delta" } else { "full image" }
    );
    log::info!("public key: {}", to_hex(&signing_key.verifying_key().to_bytes()));
    Ok(())
}

fn cmd_digest(args: &[String]) -> IoResult<()> {
    let [path] = args else {
        return Err(IoError::new(ErrorKind::InvalidInput, "digest needs 1 argument"));
    };
    let data = std::fs::read(path)?;
    println!("{}", to_hex(&digest_bytes(&data)));
    Ok(())
}

fn parse_uuid(s: &str) -> IoResult<[u8; 16]> {
    if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            "UUID must be 32 hex characters",
        ));
    }
    let mut uuid = [0u8; 16];
    for (i, byte) in uuid.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16)
            .map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
    }
    Ok(uuid)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse log level from command-line arguments
/// Supports: --log-level <LEVEL> or RUST_LOG environment variable
/// Defaults to INFO if neither is provided
fn parse_log_level() -> (LevelFilter, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut level = LevelFilter::Info;

    if let Some(i) = args.iter().position(|a| a == "--log-level") {
        if i + 1 < args.len() {
            level = match args[i + 1].to_uppercase().as_str() {
                "OFF" => LevelFilter::Off,
                "ERROR" => LevelFilter::Error,
                "WARN" => LevelFilter::Warn,
                "INFO" => LevelFilter::Info,
                "DEBUG" => LevelFilter::Debug,
                "TRACE" => LevelFilter::Trace,
                other => {
                    eprintln!("Unknown log level: {}. Using INFO", other);
                    LevelFilter::Info
                }
            };
            args.drain(i..i + 2);
        }
    }
    (level, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_parsing_accepts_32_hex_chars() {
        let uuid = parse_uuid("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(uuid[0], 0x00);
        assert_eq!(uuid[15], 0x0F);
    }

    #[test]
    fn uuid_parsing_rejects_bad_input() {
        assert!(parse_uuid("too short").is_err());
        assert!(parse_uuid("zz0102030405060708090a0b0c0d0e0f").is_err());
    }
}
