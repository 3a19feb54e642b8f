//! Runtime options

use serde::{Deserialize, Serialize};

/// Environment variable enabling handle allocation audits
pub const ENV_AUDIT_HANDLES: &str = "VMCI_AUDIT_HANDLES";
/// Environment variable forcing profile maturity (`true`/`false`)
pub const ENV_FORCE_PROFILE_MATURITY: &str = "VMCI_FORCE_PROFILE_MATURITY";
/// Environment variable toggling profile record size checks
pub const ENV_VERIFY_PROFILE_SIZES: &str = "VMCI_VERIFY_PROFILE_SIZES";

/// Options controlling a [`VmciRuntime`](crate::VmciRuntime)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Capture an allocation backtrace for every indirect object handle
    pub audit_handles: bool,

    /// Override the VM's profile maturity oracle
    pub force_profile_maturity: Option<bool>,

    /// Cross-check every decoded profile record size against the VM
    pub verify_profile_sizes: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            audit_handles: false,
            force_profile_maturity: None,
            verify_profile_sizes: true,
        }
    }
}

impl RuntimeOptions {
    /// Defaults overridden by `VMCI_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by values from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(v) = lookup(ENV_AUDIT_HANDLES).and_then(|v| parse_bool(&v)) {
            options.audit_handles = v;
        }
        if let Some(v) = lookup(ENV_FORCE_PROFILE_MATURITY) {
            options.force_profile_maturity = parse_bool(&v);
        }
        if let Some(v) = lookup(ENV_VERIFY_PROFILE_SIZES).and_then(|v| parse_bool(&v)) {
            options.verify_profile_sizes = v;
        }
        options
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
