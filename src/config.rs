//! Harness configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{HarnessError, Result};

/// Emulator invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QemuConfig {
    /// Emulator binary name or path.
    #[serde(default = "default_qemu_binary")]
    pub binary: String,
    /// Machine model passed via `-M`.
    #[serde(default = "default_machine")]
    pub machine: String,
    /// Guest memory size passed via `-m`.
    #[serde(default = "default_memory")]
    pub memory: String,
}

fn default_qemu_binary() -> String {
    "qemu-system-arm".into()
}

fn default_machine() -> String {
    "vexpress-a9".into()
}

fn default_memory() -> String {
    "1G".into()
}

impl Default for QemuConfig {
    fn default() -> Self {
        Self {
            binary: default_qemu_binary(),
            machine: default_machine(),
            memory: default_memory(),
        }
    }
}

/// Scratch disk image provisioning settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DiskConfig {
    /// Tool that creates the raw image file.
    #[serde(default = "default_image_tool")]
    pub image_tool: String,
    /// Tool that writes a filesystem onto the image.
    #[serde(default = "default_format_tool")]
    pub format_tool: String,
    /// Image size argument for the image tool.
    #[serde(default = "default_disk_size")]
    pub size: String,
    /// Filesystem block size passed to the format tool via `-B`.
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

fn default_image_tool() -> String {
    "qemu-img".into()
}

fn default_format_tool() -> String {
    "mkfs.mfs".into()
}

fn default_disk_size() -> String {
    "64M".into()
}

fn default_block_size() -> u32 {
    4096
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            image_tool: default_image_tool(),
            format_tool: default_format_tool(),
            size: default_disk_size(),
            block_size: default_block_size(),
        }
    }
}

/// Configurable timeout values (seconds) for session interactions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Deadline for one guest test execution.
    #[serde(default = "default_exec_seconds")]
    pub exec_seconds: u64,
    /// Deadline for the boot readiness handshake.
    #[serde(default = "default_boot_seconds")]
    pub boot_seconds: u64,
    /// Grace period between the `quit` command and a forced kill.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

fn default_exec_seconds() -> u64 {
    4
}

fn default_boot_seconds() -> u64 {
    30
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            exec_seconds: default_exec_seconds(),
            boot_seconds: default_boot_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Guest test execution deadline.
    #[must_use]
    pub fn exec(&self) -> Duration {
        Duration::from_secs(self.exec_seconds)
    }

    /// Boot handshake deadline.
    #[must_use]
    pub fn boot(&self) -> Duration {
        Duration::from_secs(self.boot_seconds)
    }

    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

/// Harness configuration parsed from `config.toml`.
///
/// Every field carries a default matching the real emulator contract, so the
/// file itself is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HarnessConfig {
    /// Emulator invocation settings.
    #[serde(default)]
    pub qemu: QemuConfig,
    /// Scratch disk provisioning settings.
    #[serde(default)]
    pub disk: DiskConfig,
    /// Timeout configuration for session flows.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl HarnessConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| HarnessError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional path, falling back to built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` if a path was given and loading fails.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.qemu.binary.is_empty() {
            return Err(HarnessError::Config("qemu.binary must not be empty".into()));
        }

        if self.qemu.machine.is_empty() || self.qemu.memory.is_empty() {
            return Err(HarnessError::Config(
                "qemu.machine and qemu.memory must not be empty".into(),
            ));
        }

        if self.disk.image_tool.is_empty() || self.disk.format_tool.is_empty() {
            return Err(HarnessError::Config(
                "disk.image_tool and disk.format_tool must not be empty".into(),
            ));
        }

        if self.disk.size.is_empty() {
            return Err(HarnessError::Config("disk.size must not be empty".into()));
        }

        if self.disk.block_size == 0 {
            return Err(HarnessError::Config(
                "disk.block_size must be greater than zero".into(),
            ));
        }

        if self.timeouts.exec_seconds == 0 || self.timeouts.boot_seconds == 0 {
            return Err(HarnessError::Config(
                "timeouts must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
