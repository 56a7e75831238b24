//! Input validation and sanitization
//!
//! Values that end up as arguments to `ip`, `wg` or `modprobe` are checked
//! here before any process is spawned.

use crate::error::{WgError, WgResult};

/// Maximum length for interface names (Linux kernel limit is 15)
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Maximum length for kernel module names (MODULE_NAME_LEN - 1)
const MAX_MODULE_NAME_LEN: usize = 55;

/// Validate interface name to prevent command injection
///
/// Interface names must be alphanumeric with optional dashes and underscores,
/// and no longer than 15 characters (Linux kernel limit)
pub fn validate_interface_name(name: &str) -> WgResult<()> {
    if name.is_empty() {
        return Err(WgError::Config("Interface name cannot be empty".to_string()));
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(WgError::Config(format!(
            "Interface name too long (max {} characters)",
            MAX_INTERFACE_NAME_LEN
        )));
    }

    // Only allow alphanumeric, dash, underscore
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
            return Err(WgError::Config(format!(
                "Invalid interface name '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    // Don't allow names starting with dash (could be interpreted as option)
    if name.starts_with('-') {
        return Err(WgError::Config("Interface name cannot start with dash".to_string()));
    }

    Ok(())
}

/// Validate a kernel module name before handing it to the module manager
pub fn validate_module_name(name: &str) -> WgResult<()> {
    if name.is_empty() || name.len() > MAX_MODULE_NAME_LEN {
        return Err(WgError::Config(format!("Invalid kernel module name '{}'", name)));
    }

    if name.starts_with('-') || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(WgError::Config(format!("Invalid kernel module name '{}'", name)));
    }

    Ok(())
}
