//! Schedule field-name translation between the remote wire shape and the
//! replica's canonical shape.
//!
//! Only schedules need this; enrollee and payment records share their wire
//! names with the replica. Both directions are idempotent: a key is moved only
//! when the source name is present, so translating an already translated
//! record changes nothing.

use serde_json::Value;

/// (remote name, canonical name)
const SCHEDULE_FIELDS: [(&str, &str); 3] = [
    ("start_time", "startTime"),
    ("end_time", "endTime"),
    ("max_capacity", "maxCapacity"),
];

/// Remote → canonical. Non-object values pass through untouched.
pub fn normalize_schedule(record: Value) -> Value {
    rename_keys(record, SCHEDULE_FIELDS.iter().map(|(remote, canon)| (*remote, *canon)))
}

/// Canonical → remote.
pub fn denormalize_schedule(record: Value) -> Value {
    rename_keys(record, SCHEDULE_FIELDS.iter().map(|(remote, canon)| (*canon, *remote)))
}

fn rename_keys<'a>(record: Value, pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Value {
    let Value::Object(mut map) = record else {
        return record;
    };
    for (from, to) in pairs {
        if let Some(v) = map.remove(from) {
            map.insert(to.to_string(), v);
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote_row() -> Value {
        json!({
            "id": 12,
            "name": "Funcional",
            "days": ["monday", "wednesday"],
            "start_time": "08:00:00",
            "end_time": "09:00:00",
            "max_capacity": 12,
            "description": null
        })
    }

    #[test]
    fn normalize_moves_remote_names_to_canonical() {
        let n = normalize_schedule(remote_row());
        assert_eq!(n["startTime"], json!("08:00:00"));
        assert_eq!(n["endTime"], json!("09:00:00"));
        assert_eq!(n["maxCapacity"], json!(12));
        assert!(n.get("start_time").is_none());
        assert!(n.get("max_capacity").is_none());
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let once = normalize_schedule(remote_row());
        let twice = normalize_schedule(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn round_trip_reproduces_remote_record() {
        let original = remote_row();
        let back = denormalize_schedule(normalize_schedule(original.clone()));
        assert_eq!(back, original);
        assert_eq!(
            serde_json::to_string(&back).expect("ser"),
            serde_json::to_string(&original).expect("ser")
        );
    }

    #[test]
    fn null_capacity_survives_round_trip() {
        let original = json!({ "id": "a", "start_time": "10:00", "end_time": "11:00", "max_capacity": null });
        assert_eq!(denormalize_schedule(normalize_schedule(original.clone())), original);
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(normalize_schedule(json!(null)), json!(null));
    }
}
