//! Device fingerprinting.
//!
//! The fingerprint is the wire `deviceId`: it names this device in seat
//! claims, the authorized-device list, and pending consumptions. It must be
//! stable across restarts but change when the hardware meaningfully does.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use std::env;

/// A stable identifier for the current device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    id: String,
}

impl DeviceFingerprint {
    /// Generates the fingerprint for the current device.
    #[must_use]
    pub fn generate() -> Self {
        let combined = collect_hardware_ids().join("|");

        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        let hash = hasher.finalize();

        Self {
            id: URL_SAFE_NO_PAD.encode(&hash[..16]),
        }
    }

    /// Returns the fingerprint ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

fn collect_hardware_ids() -> Vec<String> {
    let mut ids = Vec::new();

    ids.push(env::consts::OS.to_string());
    ids.push(env::consts::ARCH.to_string());
    ids.push(get_hostname());

    if let Some(machine_id) = get_machine_id() {
        ids.push(machine_id);
    }

    // Username as fallback component
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        ids.push(user);
    }

    ids
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Platform-specific machine identifier, the most stable component.
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
