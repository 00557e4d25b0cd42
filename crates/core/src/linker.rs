//! Library linking: placeholder substitution in unlinked bytecode
//!
//! The compiler leaves a 40 character placeholder wherever a contract calls
//! into an external library. Two placeholder shapes exist:
//!
//! * legacy: `__<name truncated/padded to 36 chars with '_'>__`
//! * hashed: `__$<first 34 hex chars of keccak256(name)>$__`
//!
//! Linking swaps every placeholder of a library with a known address for the
//! zero-padded address. Placeholders of libraries without an address stay in
//! place.

use crate::{
    contract::{short_name, ContractTable},
    error::{Error, Result},
    presets::{LibraryAddressTable, RegistryRewrite},
};
use sha3::{Digest, Keccak256};

/// Width of a placeholder and of a hex encoded address
pub const PLACEHOLDER_LEN: usize = 40;

const LEGACY_NAME_LEN: usize = PLACEHOLDER_LEN - 4;

/// Legacy placeholder for `name`
pub fn legacy_placeholder(name: &str) -> String {
    let truncated: String = name.chars().take(LEGACY_NAME_LEN).collect();
    format!("__{:_<width$}__", truncated, width = LEGACY_NAME_LEN)
}

/// Hashed placeholder for the fully qualified `name`
pub fn hashed_placeholder(name: &str) -> String {
    let hash = hex::encode(Keccak256::digest(name.as_bytes()));
    format!("__${}$__", &hash[..34])
}

/// Validates `address` and renders it as 40 lowercase hex digits without
/// prefix
pub fn format_address(library: &str, address: &str) -> Result<String> {
    let invalid = || Error::InvalidAddress {
        library: library.to_string(),
        address: address.to_string(),
    };

    let digits = address.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() > PLACEHOLDER_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    Ok(format!(
        "{:0>width$}",
        digits.to_ascii_lowercase(),
        width = PLACEHOLDER_LEN
    ))
}

/// Links every library in `libraries` that has an address into `bytecode`
pub fn link_bytecode(bytecode: &str, libraries: &LibraryAddressTable) -> Result<String> {
    let mut linked = bytecode.to_string();
    for (library, address) in libraries.resolved() {
        let address = format_address(library, address)?;
        for placeholder in placeholders(library) {
            if linked.contains(&placeholder) {
                linked = linked.replace(&placeholder, &address);
            }
        }
    }
    Ok(linked)
}

/// Placeholders a library may appear under in unlinked bytecode
pub fn placeholders(library: &str) -> Vec<String> {
    let mut tokens = vec![legacy_placeholder(library), hashed_placeholder(library)];
    // compilers without file names in placeholders
    let bare = short_name(library);
    if bare != library {
        tokens.push(legacy_placeholder(bare));
    }
    tokens
}

/// Replaces every occurrence of the reference registry address, ignoring
/// case
pub fn rewrite_registry(bytecode: &str, rewrite: &RegistryRewrite) -> Result<String> {
    let reference = format_address("registry", &rewrite.reference)?;
    let target = format_address("registry", &rewrite.target)?;
    Ok(replace_ignore_ascii_case(bytecode, &reference, &target))
}

fn replace_ignore_ascii_case(haystack: &str, needle: &str, replacement: &str) -> String {
    // ASCII lowercasing keeps byte offsets stable
    let lower = haystack.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    for (idx, _) in lower.match_indices(needle) {
        out.push_str(&haystack[last..idx]);
        out.push_str(replacement);
        last = idx + needle.len();
    }
    out.push_str(&haystack[last..]);
    out
}

/// Links contract tables against an address table that grows as libraries
/// get deployed
#[derive(Debug, Clone)]
pub struct Linker {
    addresses: LibraryAddressTable,
    registry: Option<RegistryRewrite>,
}

impl Linker {
    pub fn new(addresses: LibraryAddressTable, registry: Option<RegistryRewrite>) -> Self {
        Self {
            addresses,
            registry,
        }
    }

    pub fn addresses(&self) -> &LibraryAddressTable {
        &self.addresses
    }

    /// Merges `updates` into the address table, then links every contract in
    /// `contracts` and stamps `deployed_at` on the linked libraries.
    ///
    /// Addresses are validated before anything is modified, so an invalid
    /// address leaves `contracts` untouched.
    pub fn link(
        &mut self,
        contracts: &mut ContractTable,
        updates: impl IntoIterator<Item = (String, String)>,
    ) -> Result<()> {
        self.addresses.merge(updates);

        for (library, address) in self.addresses.resolved() {
            format_address(library, address)?;
        }

        for (name, contract) in contracts.iter_mut() {
            let mut bytecode = link_bytecode(&contract.bytecode, &self.addresses)?;
            if let Some(rewrite) = &self.registry {
                bytecode = rewrite_registry(&bytecode, rewrite)?;
            }
            if bytecode != contract.bytecode {
                tracing::debug!("Linked {}", name);
                contract.bytecode = bytecode;
            }
        }

        self.stamp_deployed(contracts);
        Ok(())
    }

    /// Sets `deployed_at` on every library with an address without touching
    /// bytecode
    pub fn stamp_deployed(&self, contracts: &mut ContractTable) {
        for (library, address) in self.addresses.resolved() {
            match contracts.get_mut(library) {
                Some(contract) => contract.deployed_at = Some(address.to_string()),
                None => tracing::debug!("Library {} not in compiled output", library),
            }
        }
    }
}
