//! Stable machine/deployment identifiers used as key-derivation input.
//!
//! Every source degrades gracefully: a component that cannot be read on the
//! current platform is omitted rather than failing collection. The collected
//! material is never logged or persisted in plaintext.

use std::fmt;

use sha2::{Digest, Sha256};

/// Opaque machine fingerprint. Constructed once per store open.
pub struct Fingerprint {
    machine_id: Option<String>,
    components: Vec<String>,
}

impl Fingerprint {
    /// Collect identifiers from the running machine: OS machine id, DMI
    /// hardware UUID, canonicalised MAC addresses, and hostname.
    pub fn collect() -> Self {
        let mut components = Vec::new();

        let machine_id = read_machine_id();
        if let Some(id) = &machine_id {
            components.push(format!("machine_id:{id}"));
        }
        if let Some(uuid) = read_hardware_uuid() {
            components.push(format!("hw_uuid:{uuid}"));
        }
        for mac in read_mac_addresses() {
            components.push(format!("mac:{mac}"));
        }
        if let Some(host) = read_hostname() {
            components.push(format!("hostname:{host}"));
        }

        // Last-resort component; still deterministic per platform.
        if components.is_empty() {
            components.push(format!(
                "platform:{}-{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            ));
        }

        tracing::debug!(count = components.len(), "collected fingerprint components");
        Self {
            machine_id,
            components,
        }
    }

    /// Build a fingerprint from known parts. Used by tests and by callers
    /// simulating a specific deployment.
    pub fn from_parts(machine_id: Option<String>, components: Vec<String>) -> Self {
        Self {
            machine_id,
            components,
        }
    }

    /// The raw OS machine id, when one was found. Feeds the legacy v2
    /// derivation during migration.
    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    /// Opaque digest over all components.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.components.join("|").as_bytes());
        hasher.finalize().into()
    }
}

// Fingerprint material must not leak through Debug formatting.
impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("components", &self.components.len())
            .finish()
    }
}

fn read_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let id = contents.trim();
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
        None
    }
    #[cfg(target_os = "macos")]
    {
        read_ioplatform_uuid()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

fn read_hardware_uuid() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        for path in [
            "/sys/class/dmi/id/product_uuid",
            "/sys/class/dmi/id/board_serial",
        ] {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let value = contents.trim();
                if !value.is_empty() && value != "To be filled by O.E.M." {
                    return Some(value.to_string());
                }
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(target_os = "macos")]
fn read_ioplatform_uuid() -> Option<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('"').nth(3))
        .map(str::to_string)
}

/// MAC addresses, lowercased, sorted and deduplicated so interface
/// enumeration order from the OS never changes the fingerprint.
fn read_mac_addresses() -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        let mut macs = Vec::new();
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return macs;
        };
        for entry in entries.flatten() {
            if entry.file_name() == "lo" {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(entry.path().join("address")) else {
                continue;
            };
            let mac = contents.trim().to_ascii_lowercase();
            if !mac.is_empty() && mac != "00:00:00:00:00:00" {
                macs.push(mac);
            }
        }
        macs.sort();
        macs.dedup();
        macs
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

fn read_hostname() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
            let host = contents.trim();
            if !host.is_empty() {
                return Some(host.to_string());
            }
        }
    }
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty())
}
