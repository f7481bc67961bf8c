//! Desired-vs-live comparison on owned fields
//!
//! One generic routine decides whether a live object already matches the
//! desired one, parameterized by an ownership mask per kind. Only the fields
//! in the mask, plus the label and annotation keys the desired object sets,
//! are compared. Everything else on the live object (status, resource
//! version, server-defaulted fields, labels written by other actors) is
//! live-only and is carried through updates untouched.

use serde_json::{Map, Value};

/// Metadata sections whose desired keys are owned
const OWNED_METADATA: &[&str] = &["labels", "annotations"];

/// Which top-level fields Spyglass owns for a kind, and how
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ownership {
    /// Merged key by key; live-only keys inside them survive updates
    pub merged: &'static [&'static str],
    /// Owned whole; live keys the desired value lacks are removed
    pub replaced: &'static [&'static str],
}

/// Ownership mask for a kind
pub fn owned_fields(kind: &str) -> Ownership {
    let (merged, replaced): (&'static [&'static str], &'static [&'static str]) = match kind {
        "ConfigMap" => (&[], &["data", "binaryData"]),
        "Secret" => (&["type"], &["data", "stringData"]),
        "ServiceAccount" | "Namespace" => (&[], &[]),
        "ClusterRole" | "Role" => (&["rules", "aggregationRule"], &[]),
        "ClusterRoleBinding" | "RoleBinding" => (&["subjects", "roleRef"], &[]),
        _ => (&["spec"], &[]),
    };
    Ownership { merged, replaced }
}

/// Whether `live` already carries every owned field of `desired`
pub fn matches_owned(desired: &Value, live: &Value, owned: Ownership) -> bool {
    let metadata_matches = OWNED_METADATA.iter().all(|section| {
        let path = format!("/metadata/{section}");
        match desired.pointer(&path) {
            None => true,
            Some(d) => match live.pointer(&path) {
                Some(l) => is_subset(d, l),
                None => is_empty(d),
            },
        }
    });

    let merged_match = owned.merged.iter().all(|field| match desired.get(field) {
        None => true,
        Some(d) => match live.get(field) {
            Some(l) => is_subset(d, l),
            None => is_empty(d),
        },
    });

    let replaced_match = owned.replaced.iter().all(|field| match desired.get(field) {
        None => true,
        Some(d) => match live.get(field) {
            Some(l) => d == l || (is_empty(d) && is_empty(l)),
            None => is_empty(d),
        },
    });

    metadata_matches && merged_match && replaced_match
}

/// Build an update body: `live` with the owned fields of `desired` merged in
///
/// Merged fields combine key by key, with arrays and scalars from `desired`
/// replacing the live value. Replaced fields take the desired value whole.
pub fn merge_owned(desired: &Value, live: &Value, owned: Ownership) -> Value {
    let mut merged = live.clone();
    let Some(target) = merged.as_object_mut() else {
        return desired.clone();
    };

    for field in owned.merged {
        if let Some(d) = desired.get(field) {
            match target.get_mut(*field) {
                Some(l) => deep_merge(l, d),
                None => {
                    target.insert(field.to_string(), d.clone());
                }
            }
        }
    }

    for field in owned.replaced {
        if let Some(d) = desired.get(field) {
            target.insert(field.to_string(), d.clone());
        }
    }

    for section in OWNED_METADATA {
        let Some(Value::Object(d)) = desired.pointer(&format!("/metadata/{section}")) else {
            continue;
        };
        let metadata = target
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(metadata) = metadata.as_object_mut() else {
            continue;
        };
        let live_section = metadata
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match live_section.as_object_mut() {
            Some(l) => l.extend(d.iter().map(|(k, v)| (k.clone(), v.clone()))),
            None => *live_section = Value::Object(d.clone()),
        }
    }

    merged
}

/// Structural subset: every value in `desired` is present and equal in `live`
///
/// Arrays must have equal length and match element-wise, so removing an
/// entry from a desired list is detected.
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(k, dv)| match l.get(k) {
            Some(lv) => is_subset(dv, lv),
            None => is_empty(dv),
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| is_subset(dv, lv))
        }
        _ => desired == live,
    }
}

/// Values the API server may drop entirely when persisting
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (k, v) in s {
                match t.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        t.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}
