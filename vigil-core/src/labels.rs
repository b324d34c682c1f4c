//! Label / tag reconciliation.
//!
//! System-derived keys are written first and are reserved: free-form entries
//! coming from the envelope only fill keys nobody else claimed. A label that
//! already holds a value on the registry record is never rewritten, so a
//! malformed envelope cannot move an entity's identity-relevant labels.

use crate::envelope::{Envelope, Labels};

pub const JOB_AGENT: &str = "vigil-agent";
pub const JOB_CONTAINER: &str = "vigil-container";

/// Keys derived from typed envelope fields for metrics/traces.
pub const STANDARD_KEYS: &[&str] = &[
    "hostname",
    "ip_address",
    "os",
    "arch",
    "endpoint_id",
    "agent_id",
    "agent_version",
    "job",
    "container_id",
    "instance",
];

/// Keys derived from typed envelope fields for logs.
pub const LOG_KEYS: &[&str] = &[
    "platform",
    "app_name",
    "container_id",
    "container_name",
    "service",
    "event_id",
];

const LOWERCASED_FREE_FORM: &[&str] = &["namespace", "subnamespace"];

/// Merged labels for a metric/trace envelope given the record's current labels.
pub fn reconcile(env: &Envelope, existing: &Labels) -> Labels {
    merge_labels(existing, &standard_labels(env))
}

/// Same as [`reconcile`] for log metadata.
pub fn reconcile_log(env: &Envelope, existing: &Labels) -> Labels {
    merge_labels(existing, &log_labels(env))
}

/// Labels derived from one envelope, without history.
pub fn standard_labels(env: &Envelope) -> Labels {
    let mut labels = system_labels(env);
    fill_gaps(&mut labels, &env.labels, STANDARD_KEYS);
    labels
}

pub fn log_labels(env: &Envelope) -> Labels {
    let mut labels = system_log_labels(env);
    fill_gaps(&mut labels, &env.extra, LOG_KEYS);
    labels
}

/// Full label set of a log envelope: standard and log-specific system keys
/// first, then free-form entries, none of which may claim a key from either
/// reserved set.
pub fn log_observation_labels(env: &Envelope) -> Labels {
    let mut labels = merge_labels(&system_labels(env), &system_log_labels(env));
    let reserved: Vec<&str> = STANDARD_KEYS.iter().chain(LOG_KEYS).copied().collect();
    fill_gaps(&mut labels, &env.labels, &reserved);
    fill_gaps(&mut labels, &env.extra, &reserved);
    labels
}

fn system_labels(env: &Envelope) -> Labels {
    let mut labels = Labels::new();
    put(&mut labels, "hostname", &env.hostname);
    put(&mut labels, "ip_address", &env.ip_address);
    put(&mut labels, "os", &env.os);
    put(&mut labels, "arch", &env.architecture);
    put(&mut labels, "endpoint_id", &env.endpoint_id);
    put(&mut labels, "agent_id", &env.agent_id);
    put(&mut labels, "agent_version", &env.agent_version);

    if env.has_container() {
        put(&mut labels, "job", JOB_CONTAINER);
        put(&mut labels, "container_id", &env.container_id);
    } else {
        put(&mut labels, "job", JOB_AGENT);
    }
    put(&mut labels, "instance", env.instance_name());

    for key in LOWERCASED_FREE_FORM {
        if let Some(value) = env.labels.get(*key) {
            put(&mut labels, key, &value.to_lowercase());
        }
    }
    labels
}

fn system_log_labels(env: &Envelope) -> Labels {
    let mut labels = Labels::new();
    put(&mut labels, "platform", &env.platform);
    put(&mut labels, "app_name", &env.app_name);
    put(&mut labels, "container_id", &env.container_id);
    put(&mut labels, "container_name", &env.container_name);
    put(&mut labels, "service", &env.service);
    put(&mut labels, "event_id", &env.event_id);
    labels
}

/// User tag update: incoming values overwrite.
pub fn merge_tags(existing: &Labels, incoming: &Labels) -> Labels {
    let mut merged = existing.clone();
    merged.extend(incoming.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Consumer view of labels and tags. Labels win on collision.
pub fn merged_view(labels: &Labels, tags: &Labels) -> Labels {
    let mut view = tags.clone();
    view.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    view
}

/// Empty values are not recorded: an empty label would otherwise freeze the
/// key before the real value arrives.
fn put(labels: &mut Labels, key: &str, value: &str) {
    if !value.is_empty() {
        labels.insert(key.to_string(), value.to_string());
    }
}

fn fill_gaps(labels: &mut Labels, free_form: &Labels, reserved: &[&str]) {
    for (key, value) in free_form {
        if reserved.contains(&key.as_str()) || labels.contains_key(key) {
            continue;
        }
        labels.insert(key.clone(), value.clone());
    }
}

/// Labels are immutable once set: `fresh` only fills keys that are absent
/// or still empty in `existing`.
pub fn merge_labels(existing: &Labels, fresh: &Labels) -> Labels {
    let mut merged = existing.clone();
    for (key, value) in fresh {
        match merged.get(key) {
            Some(current) if !current.is_empty() => {}
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}
