//! `serialize_with` helpers that write addresses in EIP-55 checksum form.
//!
//! alloy serializes `Address` as lowercase hex. Anything shown to an operator
//! goes through these instead.

use alloy::primitives::Address;
use serde::Serializer;

pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_checksum(None))
}

pub fn serialize_option<S: Serializer>(
    address: &Option<Address>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match address {
        Some(address) => serialize(address, serializer),
        None => serializer.serialize_none(),
    }
}
