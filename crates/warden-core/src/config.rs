use std::path::PathBuf;
use std::time::Duration;

use crate::decision::DEFAULT_UNKNOWN_COOLDOWN;
use crate::door::DEFAULT_UNLOCK_DURATION;
use crate::types::DEFAULT_MATCH_THRESHOLD;

/// Which lock actuator drives the door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorKind {
    /// Log-only stand-in.
    Simulated,
    /// Kernel GPIO character device.
    Gpio,
}

/// SMTP relay settings. Present only when credentials are configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub recipient: String,
}

/// Shared configuration for `wardend` and `warden`, loaded from environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of `<name>.embedding.json` files.
    pub gallery_dir: PathBuf,
    /// Where unknown-person snapshots are written.
    pub capture_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    pub unknown_cooldown: Duration,
    pub unlock_duration: Duration,
    pub actuator: ActuatorKind,
    pub gpio_chip: String,
    pub gpio_line: u32,
    /// `None` disables email alerts.
    pub smtp: Option<SmtpConfig>,
    /// Text-to-speech program; empty means log-only greetings.
    pub tts_command: String,
    pub dashboard_enabled: bool,
    pub dashboard_addr: String,
}

impl Config {
    /// Load configuration from `WARDEN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("warden");

        let path = |key: &str, default: &str| {
            var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(default))
        };

        let actuator = match var("WARDEN_ACTUATOR").as_deref() {
            Some("gpio") => ActuatorKind::Gpio,
            Some("simulated") | None => ActuatorKind::Simulated,
            Some(other) => {
                tracing::warn!(value = other, "unknown WARDEN_ACTUATOR; using simulated");
                ActuatorKind::Simulated
            }
        };

        let smtp = match (
            var("WARDEN_SMTP_USER"),
            var("WARDEN_SMTP_PASSWORD"),
            var("WARDEN_ALERT_RECIPIENT"),
        ) {
            (Some(user), Some(password), Some(recipient))
                if !user.is_empty() && !password.is_empty() && !recipient.is_empty() =>
            {
                Some(SmtpConfig {
                    server: var("WARDEN_SMTP_SERVER").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                    port: parse_or(var("WARDEN_SMTP_PORT"), 587),
                    user,
                    password,
                    recipient,
                })
            }
            _ => None,
        };

        Self {
            camera_device: var("WARDEN_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            camera_width: parse_or(var("WARDEN_CAMERA_WIDTH"), 640),
            camera_height: parse_or(var("WARDEN_CAMERA_HEIGHT"), 480),
            model_dir: path("WARDEN_MODEL_DIR", "models"),
            gallery_dir: path("WARDEN_GALLERY_DIR", "known_faces"),
            capture_dir: path("WARDEN_CAPTURE_DIR", "captured_images"),
            db_path: path("WARDEN_DB_PATH", "door_system.db"),
            match_threshold: parse_or(var("WARDEN_MATCH_THRESHOLD"), DEFAULT_MATCH_THRESHOLD),
            unknown_cooldown: Duration::from_secs(parse_or(
                var("WARDEN_UNKNOWN_COOLDOWN_SECS"),
                DEFAULT_UNKNOWN_COOLDOWN.as_secs(),
            )),
            unlock_duration: Duration::from_secs(parse_or(
                var("WARDEN_UNLOCK_SECS"),
                DEFAULT_UNLOCK_DURATION.as_secs(),
            )),
            actuator,
            gpio_chip: var("WARDEN_GPIO_CHIP").unwrap_or_else(|| "/dev/gpiochip0".to_string()),
            gpio_line: parse_or(var("WARDEN_GPIO_LINE"), 18),
            smtp,
            tts_command: var("WARDEN_TTS_COMMAND").unwrap_or_else(|| "espeak".to_string()),
            dashboard_enabled: var("WARDEN_DASHBOARD_ENABLED")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            dashboard_addr: var("WARDEN_DASHBOARD_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("HOME", "/home/door")]);
        assert_eq!(cfg.camera_device, "/dev/video0");
        assert_eq!((cfg.camera_width, cfg.camera_height), (640, 480));
        assert_eq!(cfg.db_path, PathBuf::from("/home/door/.local/share/warden/door_system.db"));
        assert_eq!(cfg.gallery_dir, PathBuf::from("/home/door/.local/share/warden/known_faces"));
        assert_eq!(cfg.match_threshold, 1.10);
        assert_eq!(cfg.unknown_cooldown, Duration::from_secs(5));
        assert_eq!(cfg.unlock_duration, Duration::from_secs(5));
        assert_eq!(cfg.actuator, ActuatorKind::Simulated);
        assert_eq!(cfg.gpio_line, 18);
        assert!(cfg.smtp.is_none());
        assert_eq!(cfg.tts_command, "espeak");
        assert!(cfg.dashboard_enabled);
        assert_eq!(cfg.dashboard_addr, "0.0.0.0:5000");
    }

    #[test]
    fn test_xdg_data_home_and_overrides() {
        let cfg = config(&[
            ("XDG_DATA_HOME", "/var/lib"),
            ("WARDEN_CAPTURE_DIR", "/srv/captures"),
            ("WARDEN_MATCH_THRESHOLD", "0.45"),
            ("WARDEN_UNLOCK_SECS", "10"),
            ("WARDEN_ACTUATOR", "gpio"),
            ("WARDEN_DASHBOARD_ENABLED", "0"),
        ]);
        assert_eq!(cfg.model_dir, PathBuf::from("/var/lib/warden/models"));
        assert_eq!(cfg.capture_dir, PathBuf::from("/srv/captures"));
        assert_eq!(cfg.match_threshold, 0.45);
        assert_eq!(cfg.unlock_duration, Duration::from_secs(10));
        assert_eq!(cfg.actuator, ActuatorKind::Gpio);
        assert!(!cfg.dashboard_enabled);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let cfg = config(&[("WARDEN_MATCH_THRESHOLD", "close"), ("WARDEN_GPIO_LINE", "-1")]);
        assert_eq!(cfg.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(cfg.gpio_line, 18);
    }

    #[test]
    fn test_smtp_requires_all_credentials() {
        let partial = config(&[("WARDEN_SMTP_USER", "door@example.com")]);
        assert!(partial.smtp.is_none());

        let full = config(&[
            ("WARDEN_SMTP_USER", "door@example.com"),
            ("WARDEN_SMTP_PASSWORD", "secret"),
            ("WARDEN_ALERT_RECIPIENT", "owner@example.com"),
            ("WARDEN_SMTP_PORT", "2525"),
        ]);
        let smtp = full.smtp.unwrap();
        assert_eq!(smtp.server, "smtp.gmail.com");
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.recipient, "owner@example.com");
    }
}
