// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Content hash and compact payload.
//!
//! The payload is the object's attribute map with null and `false` fields
//! removed. The content hash is computed over that map before the hash
//! itself is added, so two objects with the same remaining fields hash the
//! same regardless of id or the order fields were written in.

use diagram_core::{field, strip_attrs, AttrMap, AttrValue, LocationDescriptor, Result};
use sha2::{Digest, Sha256};

use crate::prepare::PreparedObject;
use crate::store::CompiledObject;

/// Lowercase hex SHA-256 of the canonical JSON of `fields`.
///
/// Attribute maps are ordered, so the JSON is canonical without sorting.
pub fn content_hash(fields: &AttrMap) -> Result<String> {
    let canonical = serde_json::to_vec(fields)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Strips, hashes and serializes one object.
///
/// The hash is written back onto the prepared object.
pub fn pack(prepared: &mut PreparedObject, location: Option<LocationDescriptor>) -> Result<CompiledObject> {
    let mut fields = strip_attrs(&prepared.attrs);
    let hash_id = content_hash(&fields)?;
    fields.insert(field::HASH.to_string(), AttrValue::String(hash_id.clone()));

    let payload = serde_json::to_string(&fields)?;

    prepared.object.hash_id = Some(hash_id.clone());
    prepared.object.payload = Some(payload.clone());
    prepared.object.location = location;
    prepared.attrs = fields;

    Ok(CompiledObject {
        object_id: prepared.object.id,
        hash_id,
        payload,
        location,
    })
}
