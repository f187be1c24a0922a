use anyhow::Result;

use crate::vmid::{vmid as derive_vmid, well_known_vmids};

/// Print the VMID for `name`, or the table of well-known VMIDs without one
pub fn vmid(name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => println!("{}", derive_vmid(name)),
        None => {
            for (name, id) in well_known_vmids() {
                println!("{:<8} {}", name, id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vmid_command() {
        assert!(vmid(Some("Lux EVM")).is_ok());
        assert!(vmid(None).is_ok());
    }
}
