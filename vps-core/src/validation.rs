//! Centralized validation for identifiers that end up in hypervisor arguments,
//! file names, and persisted document names.
//!
//! Everything accepted here is safe to use as a single argv element and as a
//! path component.

use crate::error::{CoreError, Result};

/// Maximum length of a tenant identity
pub const MAX_TENANT_ID_LEN: usize = 64;

/// Maximum length of a VM (libvirt domain) name
pub const MAX_VM_NAME_LEN: usize = 128;

/// Validate an opaque tenant identity.
///
/// Tenant ids come from external identity providers (chat user ids, session
/// lookups) and are embedded in document names and VM names, so only ASCII
/// alphanumerics, '-' and '_' are allowed.
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.is_empty() || tenant_id.len() > MAX_TENANT_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Tenant id must be between 1 and {} characters",
            MAX_TENANT_ID_LEN
        )));
    }

    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Tenant id '{}' contains invalid characters (only alphanumeric, '-' and '_' allowed)",
            tenant_id.escape_debug()
        )));
    }

    Ok(())
}

/// Validate a VM name before it is passed to the hypervisor.
pub fn validate_vm_name(vm_name: &str) -> Result<()> {
    if vm_name.is_empty() || vm_name.len() > MAX_VM_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "VM name must be between 1 and {} characters",
            MAX_VM_NAME_LEN
        )));
    }

    // A leading '-' would be parsed as an option by virsh and qemu-img
    if !vm_name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation(format!(
            "VM name '{}' must start with an alphanumeric character",
            vm_name.escape_debug()
        )));
    }

    if !vm_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "VM name '{}' contains invalid characters",
            vm_name.escape_debug()
        )));
    }

    Ok(())
}

/// Validate that a resource quantity is a positive integer.
pub fn validate_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(CoreError::Validation(format!(
            "{} must be a positive integer",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tenant_id_valid() {
        assert!(validate_tenant_id("123456789012345678").is_ok());
        assert!(validate_tenant_id("tenant_a").is_ok());
        assert!(validate_tenant_id("tenant-b").is_ok());
    }

    #[test]
    fn test_validate_tenant_id_invalid() {
        assert!(validate_tenant_id("").is_err());
        assert!(validate_tenant_id("../etc/passwd").is_err());
        assert!(validate_tenant_id("a b").is_err());
        assert!(validate_tenant_id("id;rm -rf /").is_err());
        assert!(validate_tenant_id(&"x".repeat(MAX_TENANT_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_vm_name() {
        assert!(validate_vm_name("vps-42-1700000000000-ab12cd34").is_ok());
        assert!(validate_vm_name("-rf").is_err());
        assert!(validate_vm_name("vm name").is_err());
        assert!(validate_vm_name("vm$(reboot)").is_err());
        assert!(validate_vm_name("vm/../../x").is_err());
        assert!(validate_vm_name("").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("ram", 1).is_ok());
        let err = validate_positive("ram", 0).unwrap_err();
        assert!(err.to_string().contains("ram must be a positive integer"));
    }
}
