use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque identity shared by all three collections.
///
/// The remote store hands out either integer or string keys depending on the
/// table; both are accepted and compared by their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the `id` field of a wire record. Empty strings count as missing.
    pub fn from_record(record: &serde_json::Value) -> Option<Self> {
        match record.get("id")? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
            UInt(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("id must not be empty"))
            }
            Raw::Text(s) => Ok(Self(s)),
            Raw::Int(n) => Ok(Self(n.to_string())),
            Raw::UInt(n) => Ok(Self(n.to_string())),
        }
    }
}

/// Implemented by every entity the replica holds.
pub trait Record: Clone {
    fn id(&self) -> &EntityId;
    fn version(&self) -> Option<u64>;
    fn set_version(&mut self, version: u64);
}

fn default_true() -> bool {
    true
}

/// Numeric columns sometimes arrive as strings (`"72.5"`); both are accepted.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(v)) => Ok(Some(v)),
        Some(Raw::Text(s)) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            t.parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("not a number: {}", t)))
        }
    }
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(lenient_f64(deserializer)?.unwrap_or(0.0))
}

/// Accepts `YYYY-MM-DD` as well as timestamps that start with it.
fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_wire_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

pub fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    let head = t.get(..10).unwrap_or(t);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// A roster member. Reads the remote `students` table's snake_case columns;
/// serializes camelCase like every other UI-facing shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Enrollee {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "lastName")]
    pub last_name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub initial_weight: Option<f64>,
    #[serde(default)]
    pub pathology: Option<String>,
    /// Free-text schedule reference, e.g. `"monday, wednesday 08:00-09:00"`.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub schedule_id: Option<EntityId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_assistance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Enrollee {
    pub fn has_pathology(&self) -> bool {
        self.pathology
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name).trim().to_string()
    }
}

impl Record for Enrollee {
    fn id(&self) -> &EntityId {
        &self.id
    }
    fn version(&self) -> Option<u64> {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = Some(version);
    }
}

/// Reads the remote `payments` columns; serializes camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Payment {
    pub id: EntityId,
    /// May reference an enrollee that no longer exists.
    #[serde(
        rename(serialize = "enrolleeId", deserialize = "student_id"),
        alias = "studentId"
    )]
    pub enrollee_id: EntityId,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(deserialize_with = "lenient_date")]
    pub payment_date: NaiveDate,
    #[serde(
        default,
        alias = "currentWeight",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Record for Payment {
    fn id(&self) -> &EntityId {
        &self.id
    }
    fn version(&self) -> Option<u64> {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = Some(version);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }

    /// Accepts full names and three-letter abbreviations, any case.
    pub fn from_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Some(Weekday::Monday),
            "tuesday" | "tue" => Some(Weekday::Tuesday),
            "wednesday" | "wed" => Some(Weekday::Wednesday),
            "thursday" | "thu" => Some(Weekday::Thursday),
            "friday" | "fri" => Some(Weekday::Friday),
            "saturday" | "sat" => Some(Weekday::Saturday),
            "sunday" | "sun" => Some(Weekday::Sunday),
            _ => None,
        }
    }

    /// Monday = 0 … Sunday = 6.
    pub fn column(self) -> usize {
        self as usize
    }

    pub fn of(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::ALL[date.weekday().num_days_from_monday() as usize]
    }
}

/// Order-insensitive weekday tag set. Serialized Monday-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekdaySet(BTreeSet<Weekday>);

impl WeekdaySet {
    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|d| d.tag()))
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
        let mut out = BTreeSet::new();
        for tag in raw {
            match Weekday::from_tag(&tag) {
                Some(day) => {
                    out.insert(day);
                }
                None => tracing::debug!(tag = %tag, "ignoring unknown weekday tag"),
            }
        }
        Ok(Self(out))
    }
}

/// A class slot in canonical (normalized) shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub days: WeekdaySet,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub max_capacity: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Schedule {
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        self.days.contains(Weekday::of(date))
    }

    /// `"{start}-{end}"` exactly as stored; this is the key enrollee
    /// reference strings are matched against.
    pub fn time_range_key(&self) -> String {
        format!("{}-{}", self.start_time, self.end_time)
    }
}

impl Record for Schedule {
    fn id(&self) -> &EntityId {
        &self.id
    }
    fn version(&self) -> Option<u64> {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = Some(version);
    }
}

/// `"08:30:00"` → `"08:30"`.
pub fn short_time(raw: &str) -> &str {
    raw.get(..5).unwrap_or(raw)
}

/// Writable enrollee fields, remote field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolleeDraft {
    pub name: String,
    pub last_name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub initial_weight: Option<f64>,
    #[serde(default)]
    pub pathology: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub schedule_id: Option<EntityId>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub medical_assistance: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl EnrolleeDraft {
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "last_name": self.last_name,
            "age": self.age,
            "initial_weight": self.initial_weight,
            "pathology": blank_to_none(&self.pathology),
            "schedule": blank_to_none(&self.schedule),
            "schedule_id": self.schedule_id,
            "contact": blank_to_none(&self.contact),
            "emergency_contact": blank_to_none(&self.emergency_contact),
            "medical_assistance": blank_to_none(&self.medical_assistance),
            "modality": blank_to_none(&self.modality),
            "photo_url": blank_to_none(&self.photo_url),
        })
    }
}

fn blank_to_none(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDraft {
    #[serde(alias = "studentId")]
    pub enrollee_id: EntityId,
    pub amount: f64,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub current_weight: Option<f64>,
}

impl PaymentDraft {
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "student_id": self.enrollee_id,
            "amount": self.amount,
            "payment_date": self.payment_date.format("%Y-%m-%d").to_string(),
            "current_weight": self.current_weight,
        })
    }
}

/// Writable schedule fields in canonical shape; the normalizer translates
/// them before they leave for the remote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    pub name: String,
    #[serde(default)]
    pub days: WeekdaySet,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub max_capacity: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}
