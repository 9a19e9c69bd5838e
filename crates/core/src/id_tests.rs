// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Identifier used to exercise the macro.
    pub struct SampleId;
}

#[test]
fn define_id_displays_inner_string() {
    let id = SampleId::new("sample-1");
    assert_eq!(id.to_string(), "sample-1");
    assert_eq!(id.as_str(), "sample-1");
}

#[test]
fn define_id_compares_against_str() {
    let id: SampleId = "abc".into();
    assert_eq!(id, "abc");
    assert_eq!(id, *"abc");
}

#[test]
fn define_id_is_a_hash_map_key_by_str() {
    let mut map = HashMap::new();
    map.insert(SampleId::new("k"), 7);
    assert_eq!(map.get("k"), Some(&7));
}

#[test]
fn define_id_serializes_transparently() {
    let id = SampleId::new("wire");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"wire\"");
    let back: SampleId = serde_json::from_str("\"wire\"").unwrap();
    assert_eq!(back, id);
}

#[test]
fn sequential_id_gen_counts_up() {
    let gen = SequentialIdGen::new("evt");
    assert_eq!(gen.next(), "evt-1");
    assert_eq!(gen.next(), "evt-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "evt-3");
}

#[test]
fn next_id_builds_typed_ids() {
    let gen = SequentialIdGen::new("p");
    let id: SampleId = gen.next_id();
    assert_eq!(id, "p-1");
}

#[test]
fn uuid_id_gen_is_unique() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}
