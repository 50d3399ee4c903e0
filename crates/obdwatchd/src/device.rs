//! Host identity attached to every report
//!
//! Detected values sit underneath the `[device]` config section: anything
//! configured there replaces what was detected.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::DeviceConfig;

const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";
const MODEL_PATH: &str = "/proc/device-tree/model";
const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Where host facts are read from
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub hostname: PathBuf,
    pub model: PathBuf,
    pub cpuinfo: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            hostname: PathBuf::from(HOSTNAME_PATH),
            model: PathBuf::from(MODEL_PATH),
            cpuinfo: PathBuf::from(CPUINFO_PATH),
        }
    }
}

/// Board details, present only on a Raspberry Pi
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PiInfo {
    pub model: Option<String>,
    pub serial: Option<String>,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostIdentity {
    pub hostname: Option<String>,
    pub platform: &'static str,
    pub machine: &'static str,
    pub pi: Option<PiInfo>,
}

impl HostIdentity {
    pub fn detect() -> Self {
        Self::detect_from(&HostPaths::default())
    }

    /// Read host facts from `paths`; unreadable files are skipped
    pub fn detect_from(paths: &HostPaths) -> Self {
        let hostname = read_trimmed(&paths.hostname).or_else(|| {
            std::env::var("HOSTNAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
        });
        let model = read_trimmed(&paths.model);
        let cpuinfo = fs::read_to_string(&paths.cpuinfo).ok();

        let is_pi = match (&model, &cpuinfo) {
            (Some(model), _) => model.contains("Raspberry Pi"),
            (None, Some(cpuinfo)) => cpuinfo.contains("BCM") && cpuinfo.contains("ARMv"),
            (None, None) => false,
        };
        let pi = is_pi.then(|| PiInfo {
            model,
            serial: cpuinfo.as_deref().and_then(|c| cpuinfo_field(c, "Serial")),
            revision: cpuinfo.as_deref().and_then(|c| cpuinfo_field(c, "Revision")),
        });

        let identity = Self {
            hostname,
            platform: std::env::consts::OS,
            machine: std::env::consts::ARCH,
            pi,
        };
        debug!(?identity, "Detected host identity");
        identity
    }

    /// `device.*` tags for the detected values
    pub fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("device.platform".to_string(), self.platform.to_string());
        tags.insert("device.machine".to_string(), self.machine.to_string());
        if let Some(hostname) = &self.hostname {
            tags.insert("device.hostname".to_string(), hostname.clone());
        }
        if let Some(pi) = &self.pi {
            let fields = [
                ("device.pi_model", &pi.model),
                ("device.pi_serial", &pi.serial),
                ("device.pi_revision", &pi.revision),
            ];
            for (key, value) in fields {
                if let Some(value) = value {
                    tags.insert(key.to_string(), value.clone());
                }
            }
        }
        tags
    }
}

/// Detected tags overlaid with the configured device identity
pub fn device_tags(host: &HostIdentity, config: &DeviceConfig) -> BTreeMap<String, String> {
    let mut tags = host.tags();
    for (key, value) in &config.info {
        tags.insert(format!("device.{}", key), value.clone());
    }
    if let Some(id) = &config.id {
        tags.insert("device.id".to_string(), id.clone());
    }
    if let Some(device_type) = &config.device_type {
        tags.insert("device.type".to_string(), device_type.clone());
    }
    tags
}

/// File contents with whitespace and device-tree NULs stripped
fn read_trimmed(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let value = content.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!value.is_empty()).then(|| value.to_string())
}

fn cpuinfo_field(cpuinfo: &str, name: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with(name))
        .find_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PI_CPUINFO: &str = "processor\t: 0\n\
        model name\t: ARMv7 Processor rev 4 (v7l)\n\
        Hardware\t: BCM2835\n\
        Revision\t: a02082\n\
        Serial\t\t: 00000000abcd1234\n\
        Model\t\t: Raspberry Pi 3 Model B Rev 1.2\n";

    fn paths(dir: &TempDir) -> HostPaths {
        HostPaths {
            hostname: dir.path().join("hostname"),
            model: dir.path().join("model"),
            cpuinfo: dir.path().join("cpuinfo"),
        }
    }

    #[test]
    fn test_detects_raspberry_pi() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.hostname, "carpi\n").unwrap();
        fs::write(&paths.model, "Raspberry Pi 3 Model B Rev 1.2\0").unwrap();
        fs::write(&paths.cpuinfo, PI_CPUINFO).unwrap();

        let host = HostIdentity::detect_from(&paths);
        assert_eq!(host.hostname.as_deref(), Some("carpi"));
        assert_eq!(
            host.pi,
            Some(PiInfo {
                model: Some("Raspberry Pi 3 Model B Rev 1.2".into()),
                serial: Some("00000000abcd1234".into()),
                revision: Some("a02082".into()),
            })
        );

        let tags = host.tags();
        assert_eq!(tags["device.pi_serial"], "00000000abcd1234");
        assert_eq!(tags["device.pi_revision"], "a02082");
        assert_eq!(tags["device.platform"], std::env::consts::OS);
    }

    #[test]
    fn test_pi_detected_from_cpuinfo_alone() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.cpuinfo, PI_CPUINFO).unwrap();

        let pi = HostIdentity::detect_from(&paths).pi.unwrap();
        assert_eq!(pi.model, None);
        assert_eq!(pi.serial.as_deref(), Some("00000000abcd1234"));
    }

    #[test]
    fn test_missing_files_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let host = HostIdentity::detect_from(&paths(&dir));

        assert_eq!(host.pi, None);
        let tags = host.tags();
        assert!(tags.contains_key("device.machine"));
        assert!(!tags.keys().any(|key| key.starts_with("device.pi_")));
    }

    #[test]
    fn test_other_board_is_not_a_pi() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.model, "Generic x86 Board\0").unwrap();
        fs::write(&paths.cpuinfo, "processor\t: 0\nSerial\t: 1234\n").unwrap();

        assert_eq!(HostIdentity::detect_from(&paths).pi, None);
    }

    #[test]
    fn test_configured_identity_wins() {
        let host = HostIdentity {
            hostname: Some("carpi".into()),
            platform: "linux",
            machine: "aarch64",
            pi: Some(PiInfo {
                model: Some("Raspberry Pi 4 Model B".into()),
                serial: None,
                revision: None,
            }),
        };
        let config = DeviceConfig {
            id: Some("van-7".into()),
            device_type: None,
            info: [
                ("hostname".to_string(), "fleet-van-7".to_string()),
                ("location".to_string(), "depot-2".to_string()),
            ]
            .into_iter()
            .collect(),
        };

        let tags = device_tags(&host, &config);
        let expected: BTreeMap<String, String> = [
            ("device.hostname", "fleet-van-7"),
            ("device.id", "van-7"),
            ("device.location", "depot-2"),
            ("device.machine", "aarch64"),
            ("device.pi_model", "Raspberry Pi 4 Model B"),
            ("device.platform", "linux"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(tags, expected);
    }
}
