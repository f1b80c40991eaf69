//! Conversion of raw entry fields into output records.
//!
//! Field names are interpreted according to
//! <https://www.freedesktop.org/software/systemd/man/latest/systemd.journal-fields.html>.
//! Fields with a leading underscore are trusted fields added by the journal
//! itself and land in the `System` section; everything else was supplied by
//! the logging client and lands in `EventData`.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::borrow::Cow;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Str(String),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::UInt(n) => serializer.serialize_u64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Time(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
    }
}

/// Field name to value, in first-seen order.
pub type Fields = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    Raw(Fields),
    Structured { system: Fields, event_data: Fields },
}

/// One decoded entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub seqnum: u64,
    pub realtime: u64,
    pub body: RecordBody,
}

impl Record {
    pub fn timestamp(&self) -> DateTime<Utc> {
        timestamp_from_micros(self.realtime)
    }

    /// Look up a field of a raw record, or of either section of a
    /// structured record.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match &self.body {
            RecordBody::Raw(fields) => fields.get(name),
            RecordBody::Structured { system, event_data } => {
                event_data.get(name).or_else(|| system.get(name))
            }
        }
    }

    pub fn system(&self) -> Option<&Fields> {
        match &self.body {
            RecordBody::Structured { system, .. } => Some(system),
            RecordBody::Raw(_) => None,
        }
    }

    pub fn event_data(&self) -> Option<&Fields> {
        match &self.body {
            RecordBody::Structured { event_data, .. } => Some(event_data),
            RecordBody::Raw(_) => None,
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.body {
            RecordBody::Raw(fields) => fields.serialize(serializer),
            RecordBody::Structured { system, event_data } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("System", system)?;
                map.serialize_entry("EventData", event_data)?;
                map.end()
            }
        }
    }
}

/// Convert a realtime value in microseconds since the epoch. Values past the
/// representable range saturate.
pub fn timestamp_from_micros(micros: u64) -> DateTime<Utc> {
    i64::try_from(micros)
        .ok()
        .and_then(DateTime::from_timestamp_micros)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Split a payload on its first `=`.
fn split_field(payload: &[u8]) -> Option<(Cow<'_, str>, Cow<'_, str>)> {
    let pos = payload.iter().position(|&b| b == b'=')?;
    Some((
        String::from_utf8_lossy(&payload[..pos]),
        String::from_utf8_lossy(&payload[pos + 1..]),
    ))
}

fn parse_int(value: &str) -> Option<i64> {
    value.parse().ok()
}

fn insert(fields: &mut Fields, name: &str, value: Value) {
    fields.insert(name.to_owned(), value);
}

/// Builds records from the raw fields of an entry.
///
/// Keeps a count of special fields whose value did not parse and were
/// therefore stored as plain strings.
#[derive(Debug, Default)]
pub struct Classifier {
    fallbacks: u64,
}

#[derive(Clone, Copy)]
enum Section {
    System,
    EventData,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of special fields that fell back to the generic rule.
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    /// A flat record: the timestamp followed by every field.
    pub fn build_raw<P: AsRef<[u8]>>(&mut self, seqnum: u64, realtime: u64, items: &[P]) -> Record {
        let mut fields = Fields::new();
        insert(&mut fields, "Timestamp", Value::Time(timestamp_from_micros(realtime)));

        for (idx, item) in items.iter().enumerate() {
            let item = item.as_ref();
            match split_field(item) {
                Some((name, value)) => insert(&mut fields, &name, Value::Str(value.into_owned())),
                None => insert(
                    &mut fields,
                    &format!("Item{idx}"),
                    Value::Str(String::from_utf8_lossy(item).into_owned()),
                ),
            }
        }

        Record {
            seqnum,
            realtime,
            body: RecordBody::Raw(fields),
        }
    }

    /// A record split into trusted `System` fields and client `EventData`.
    pub fn build_structured<P: AsRef<[u8]>>(
        &mut self,
        seqnum: u64,
        realtime: u64,
        items: &[P],
    ) -> Record {
        let mut system = Fields::new();
        let mut event_data = Fields::new();

        insert(&mut system, "Seq", Value::UInt(seqnum));
        insert(&mut system, "Timestamp", Value::Time(timestamp_from_micros(realtime)));

        for (idx, item) in items.iter().enumerate() {
            let item = item.as_ref();
            let Some((name, value)) = split_field(item) else {
                // Should not really happen but we capture it anyway
                insert(
                    &mut event_data,
                    &format!("Item{idx}"),
                    Value::Str(String::from_utf8_lossy(item).into_owned()),
                );
                continue;
            };

            match self.classify(&name, &value) {
                Some((Section::System, key, value)) => insert(&mut system, key, value),
                Some((Section::EventData, key, value)) => insert(&mut event_data, key, value),
                None => {
                    let section = if name.starts_with('_') {
                        &mut system
                    } else {
                        &mut event_data
                    };
                    insert(section, &name, Value::Str(value.into_owned()));
                }
            }
        }

        Record {
            seqnum,
            realtime,
            body: RecordBody::Structured { system, event_data },
        }
    }

    /// Apply the special rule for `name`, if there is one and its value
    /// parses. `None` selects the generic string rule.
    fn classify<'n>(&mut self, name: &'n str, value: &str) -> Option<(Section, &'n str, Value)> {
        let (section, parse) = special_rule(name)?;

        let key = match name {
            "_SOURCE_REALTIME_TIMESTAMP" => &name[1..],
            _ => name,
        };

        match parse.apply(value) {
            Some(value) => Some((section, key, value)),
            None => {
                self.fallbacks += 1;
                None
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Parse {
    Int,
    Seconds,
    Micros,
}

impl Parse {
    fn apply(self, value: &str) -> Option<Value> {
        let n = parse_int(value)?;
        match self {
            Parse::Int => Some(Value::Int(n)),
            Parse::Seconds => DateTime::from_timestamp(n, 0).map(Value::Time),
            Parse::Micros => DateTime::from_timestamp_micros(n).map(Value::Time),
        }
    }
}

fn special_rule(name: &str) -> Option<(Section, Parse)> {
    let rule = match name {
        "ERRNO" | "CODE_LINE" | "SYSLOG_FACILITY" | "SYSLOG_PID" | "TID" => {
            (Section::EventData, Parse::Int)
        }

        "_PID" | "_PPID" | "_UID" | "_EUID" | "_FSUID" | "_EGID" | "_GID"
        | "_AUDIT_LOGINUID" | "_AUDIT_SESSION" | "_AUDIT_TYPE" | "_AUDIT_ID"
        | "_AUDIT_FIELD_SYSCALL" | "_AUDIT_FIELD_EXIT" | "_AUDIT_FIELD_SUID"
        | "_AUDIT_FIELD_SGID" => (Section::System, Parse::Int),

        "SYSLOG_TIMESTAMP" => (Section::EventData, Parse::Seconds),
        "_SOURCE_REALTIME_TIMESTAMP" => (Section::System, Parse::Micros),
        "PRIORITY" => (Section::EventData, Parse::Int),

        _ => return None,
    };

    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(items: &[&str]) -> Record {
        Classifier::new().build_structured(1, 1_000_000, items)
    }

    #[test]
    fn generic_fields_keep_their_text() {
        let record = structured(&["MESSAGE=hello=world", "_HOSTNAME=box"]);

        let event_data = record.event_data().unwrap();
        let system = record.system().unwrap();
        assert_eq!(event_data["MESSAGE"], Value::Str("hello=world".into()));
        assert_eq!(system["_HOSTNAME"], Value::Str("box".into()));
        assert_eq!(system["Seq"], Value::UInt(1));
    }

    #[test]
    fn priority_is_an_integer() {
        let record = structured(&["PRIORITY=6"]);
        assert_eq!(record.event_data().unwrap()["PRIORITY"], Value::Int(6));
    }

    #[test]
    fn errno_is_an_integer() {
        let record = structured(&["ERRNO=2", "ERRONO=2"]);
        let event_data = record.event_data().unwrap();

        assert_eq!(event_data["ERRNO"], Value::Int(2));
        assert_eq!(event_data["ERRONO"], Value::Str("2".to_string()));
    }

    #[test]
    fn unparsable_integer_falls_back_to_string() {
        let mut classifier = Classifier::new();
        let record = classifier.build_structured(1, 0, &["PRIORITY=notanumber", "_PID=abc"]);

        assert_eq!(
            record.event_data().unwrap()["PRIORITY"],
            Value::Str("notanumber".into())
        );
        assert_eq!(record.system().unwrap()["_PID"], Value::Str("abc".into()));
        assert_eq!(classifier.fallbacks(), 2);
    }

    #[test]
    fn trusted_integers_go_to_system() {
        let record = structured(&["_PID=42", "_AUDIT_FIELD_SGID=-1", "SYSLOG_PID=7"]);

        let system = record.system().unwrap();
        assert_eq!(system["_PID"], Value::Int(42));
        assert_eq!(system["_AUDIT_FIELD_SGID"], Value::Int(-1));
        assert_eq!(record.event_data().unwrap()["SYSLOG_PID"], Value::Int(7));
    }

    #[test]
    fn source_realtime_timestamp_drops_underscore() {
        let record = structured(&["_SOURCE_REALTIME_TIMESTAMP=1700000000000000"]);

        let system = record.system().unwrap();
        assert!(!system.contains_key("_SOURCE_REALTIME_TIMESTAMP"));
        assert_eq!(
            system["SOURCE_REALTIME_TIMESTAMP"],
            Value::Time(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
        );
    }

    #[test]
    fn syslog_timestamp_is_seconds() {
        let record = structured(&["SYSLOG_TIMESTAMP=86400"]);
        assert_eq!(
            record.event_data().unwrap()["SYSLOG_TIMESTAMP"],
            Value::Time(DateTime::from_timestamp(86_400, 0).unwrap())
        );
    }

    #[test]
    fn fields_without_separator_get_synthetic_names() {
        let raw = Classifier::new().build_raw(1, 0, &["A=1", "garbage", "B=2"]);
        let RecordBody::Raw(fields) = &raw.body else {
            panic!("expected a raw record");
        };
        let keys: Vec<_> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Timestamp", "A", "Item1", "B"]);
        assert_eq!(fields["Item1"], Value::Str("garbage".into()));

        let record = structured(&["garbage"]);
        assert_eq!(
            record.event_data().unwrap()["Item0"],
            Value::Str("garbage".into())
        );
    }

    #[test]
    fn raw_and_structured_agree() {
        let items = ["MESSAGE=hi", "_PID=1", "PRIORITY=3"];
        let mut classifier = Classifier::new();
        let raw = classifier.build_raw(9, 1_234_567, &items);
        let structured = classifier.build_structured(9, 1_234_567, &items);

        assert_eq!(
            raw.get("Timestamp"),
            structured.system().unwrap().get("Timestamp")
        );
        assert_eq!(raw.get("MESSAGE"), structured.get("MESSAGE"));
        assert_eq!(raw.get("PRIORITY"), Some(&Value::Str("3".into())));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let record = structured(&["Z=1", "A=2", "M=3", "A=4"]);
        let keys: Vec<_> = record
            .event_data()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["Z", "A", "M"]);
        assert_eq!(record.get("A"), Some(&Value::Str("4".into())));
    }

    #[test]
    fn serializes_sections() {
        let record = structured(&["MESSAGE=hello", "PRIORITY=6"]);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["System"]["Seq"], 1);
        assert_eq!(json["System"]["Timestamp"], "1970-01-01T00:00:01.000000Z");
        assert_eq!(json["EventData"]["MESSAGE"], "hello");
        assert_eq!(json["EventData"]["PRIORITY"], 6);
    }

    #[test]
    fn oversized_realtime_saturates() {
        assert_eq!(timestamp_from_micros(u64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(timestamp_from_micros(0).timestamp(), 0);
    }
}
