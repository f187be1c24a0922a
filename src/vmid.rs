//! VM identifier derivation.
//!
//! A VMID is `base58check(sha256(pad32(name)))` with version byte `0`. The
//! host process computes the same value on its own, so the encoding must
//! stay bit-exact.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

pub const VM_NAME_LUX_EVM: &str = "Lux EVM";
pub const VM_NAME_CORE_VM: &str = "Core VM";
pub const VM_NAME_AVM: &str = "AVM";

const NAME_WIDTH: usize = 32;
const VERSION_BYTE: u8 = 0;

/// Compute the VM identifier for a VM name.
///
/// The name is copied into a 32-byte zero-padded buffer. Bytes beyond 32
/// are dropped, so names sharing their first 32 bytes share an identifier.
pub fn vmid(name: &str) -> String {
    let mut padded = [0u8; NAME_WIDTH];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_WIDTH);
    padded[..len].copy_from_slice(&bytes[..len]);

    let hash = Sha256::digest(padded);

    // Version byte leads the payload and is covered by the checksum.
    let mut payload = Vec::with_capacity(1 + hash.len());
    payload.push(VERSION_BYTE);
    payload.extend_from_slice(&hash);

    bs58::encode(payload).with_check().into_string()
}

/// Identifiers of the built-in VMs, keyed by VM name.
pub fn well_known_vmids() -> BTreeMap<&'static str, String> {
    [VM_NAME_LUX_EVM, VM_NAME_CORE_VM, VM_NAME_AVM]
        .into_iter()
        .map(|name| (name, vmid(name)))
        .collect()
}
