//! Serialization and parsing of one store line, per `spec.md` §6:
//! `ENTRY := KV (":" KV)*`, `KV := KEY "=" VAL`, both percent-encoded per
//! RFC 3986's unreserved set. Unknown keys cause the whole line to be
//! rejected with a diagnostic -- they are never silently dropped, since a
//! key we don't recognise might change whether the line is positive or
//! negative.

use std::collections::HashMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use pk_constraints::{Constraint, ConstraintSet};
use pk_identity::ActionId;

use crate::model::{Entry, Scope};

/// RFC 3986 unreserved = ALPHA / DIGIT / "-" / "." / "_" / "~". Everything
/// else (including `:`, `=`, `/`) gets percent-encoded.
const ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b':')
    .add(b'=')
    .add(b'/')
    .add(b' ')
    .add(b'%')
    .add(b'&')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'!')
    .add(b'$')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b';');

fn enc(s: &str) -> String { utf8_percent_encode(s, ENCODE_SET).to_string() }

fn dec(s: &str) -> Result<String, String> {
    percent_decode_str(s).decode_utf8().map(|c| c.into_owned()).map_err(|e| format!("invalid percent-encoding: {e}"))
}

/// Serializes `entry` into its canonical on-disk form. Always emits keys
/// in the same order for a given scope, so `parse(serialize(e)) == e`
/// even though `parse` itself tolerates any key order (`spec.md` §8).
pub fn serialize_entry(entry: &Entry) -> String {
    let mut parts = vec![format!("scope={}", enc(entry.scope.name()))];

    match &entry.scope {
        Scope::ProcessOneShot { pid, pid_start_time } | Scope::Process { pid, pid_start_time } => {
            parts.push(format!("pid={}", enc(&pid.to_string())));
            parts.push(format!("pid-start-time={}", enc(&pid_start_time.to_string())));
        },
        Scope::Session { session_id } => parts.push(format!("session-id={}", enc(session_id))),
        Scope::Always | Scope::Grant | Scope::GrantNegative => {},
    }

    parts.push(format!("action-id={}", enc(entry.action_id.as_str())));
    parts.push(format!("when={}", enc(&entry.when.to_string())));

    if let Some(auth_as) = entry.auth_as {
        parts.push(format!("auth-as={}", enc(&auth_as.to_string())));
    }
    if let Some(granted_by) = entry.granted_by {
        parts.push(format!("granted-by={}", enc(&granted_by.to_string())));
    }

    for constraint in entry.constraints.as_slice() {
        parts.push(format!("constraint={}", enc(&constraint.serialize())));
    }

    parts.join(":")
}

/// Parses one store line back into an [`Entry`]. Tolerates any key order
/// and any number of repeated `constraint=` keys; rejects unknown keys,
/// missing required keys for the declared scope, and malformed values.
pub fn parse_entry(line: &str) -> Result<Entry, String> {
    let mut scope_name: Option<String> = None;
    let mut single: HashMap<&'static str, String> = HashMap::new();
    let mut constraints: Vec<String> = Vec::new();

    for kv in line.split(':') {
        let (key, val) = kv.split_once('=').ok_or_else(|| format!("malformed key=value pair: {kv:?}"))?;
        let val = dec(val)?;
        match key {
            "scope" => scope_name = Some(val),
            "pid" => {
                single.insert("pid", val);
            },
            "pid-start-time" => {
                single.insert("pid-start-time", val);
            },
            "session-id" => {
                single.insert("session-id", val);
            },
            "action-id" => {
                single.insert("action-id", val);
            },
            "when" => {
                single.insert("when", val);
            },
            "auth-as" => {
                single.insert("auth-as", val);
            },
            "granted-by" => {
                single.insert("granted-by", val);
            },
            "constraint" => constraints.push(val),
            other => return Err(format!("unknown key {other:?}")),
        }
    }

    let scope_name = scope_name.ok_or_else(|| "missing scope key".to_string())?;

    let require = |key: &'static str| -> Result<String, String> { single.get(key).cloned().ok_or_else(|| format!("scope {scope_name:?} missing required key {key:?}")) };
    let parse_u64 = |key: &'static str, val: &str| -> Result<u64, String> { val.parse().map_err(|_| format!("key {key:?} is not a valid integer: {val:?}")) };
    let parse_i64 = |key: &'static str, val: &str| -> Result<i64, String> { val.parse().map_err(|_| format!("key {key:?} is not a valid integer: {val:?}")) };
    let parse_u32 = |key: &'static str, val: &str| -> Result<u32, String> { val.parse().map_err(|_| format!("key {key:?} is not a valid integer: {val:?}")) };

    let scope = match scope_name.as_str() {
        "process-one-shot" | "process" => {
            let pid = parse_i64("pid", &require("pid")?)?;
            let pid_start_time = parse_u64("pid-start-time", &require("pid-start-time")?)?;
            if scope_name == "process-one-shot" { Scope::ProcessOneShot { pid, pid_start_time } } else { Scope::Process { pid, pid_start_time } }
        },
        "session" => Scope::Session { session_id: require("session-id")? },
        "always" => Scope::Always,
        "grant" => Scope::Grant,
        "grant-negative" => Scope::GrantNegative,
        other => return Err(format!("unknown scope {other:?}")),
    };

    let action_id = ActionId::new(require("action-id")?).map_err(|e| e.to_string())?;
    let when = parse_u64("when", &require("when")?)?;

    let auth_as = single.get("auth-as").map(|v| parse_u32("auth-as", v)).transpose()?;
    let granted_by = single.get("granted-by").map(|v| parse_u32("granted-by", v)).transpose()?;

    match &scope {
        Scope::ProcessOneShot { .. } | Scope::Process { .. } | Scope::Session { .. } | Scope::Always => {
            if auth_as.is_none() {
                return Err(format!("scope {scope_name:?} requires auth-as"));
            }
        },
        Scope::Grant | Scope::GrantNegative => {
            if granted_by.is_none() {
                return Err(format!("scope {scope_name:?} requires granted-by"));
            }
        },
    }

    let parsed_constraints: Result<Vec<Constraint>, String> = constraints.iter().map(|token| Constraint::parse(token).map_err(|e| e.to_string())).collect();
    let constraint_set = ConstraintSet::new(parsed_constraints?).map_err(|e| e.to_string())?;

    Ok(Entry { scope, action_id, when, auth_as, granted_by, constraints: constraint_set })
}

#[cfg(test)]
mod tests {
    use pk_constraints::Constraint;

    use super::*;

    fn sample(scope: Scope, constraints: Vec<Constraint>) -> Entry {
        let (auth_as, granted_by) = match &scope {
            Scope::Grant | Scope::GrantNegative => (None, Some(1000)),
            _ => (Some(1000), None),
        };
        Entry { scope, action_id: ActionId::new("org.example.frob").unwrap(), when: 1_700_000_000, auth_as, granted_by, constraints: ConstraintSet::new(constraints).unwrap() }
    }

    #[test]
    fn round_trips_every_scope_kind() {
        let entries = vec![
            sample(Scope::ProcessOneShot { pid: 4242, pid_start_time: 99 }, vec![]),
            sample(Scope::Process { pid: 4242, pid_start_time: 99 }, vec![Constraint::Active]),
            sample(Scope::Session { session_id: "s1".into() }, vec![Constraint::Local, Constraint::Active]),
            sample(Scope::Always, vec![]),
            sample(Scope::Grant, vec![Constraint::SelinuxContext("unconfined_t".into())]),
            sample(Scope::GrantNegative, vec![]),
        ];
        for entry in entries {
            let line = serialize_entry(&entry);
            let parsed = parse_entry(&line).unwrap();
            assert_eq!(parsed, entry, "line was {line:?}");
        }
    }

    #[test]
    fn parser_tolerates_reordered_keys() {
        let entry = sample(Scope::Always, vec![Constraint::Local]);
        let line = serialize_entry(&entry);
        let mut parts: Vec<&str> = line.split(':').collect();
        parts.reverse();
        let shuffled = parts.join(":");
        assert_eq!(parse_entry(&shuffled).unwrap(), entry);
    }

    #[test]
    fn unknown_key_is_rejected() { assert!(parse_entry("scope=always:action-id=org.example.a:when=1:auth-as=0:bogus=1").is_err()); }

    #[test]
    fn missing_required_key_is_rejected() { assert!(parse_entry("scope=process:action-id=org.example.a:when=1:auth-as=0").is_err()); }

    #[test]
    fn percent_encodes_special_characters_in_values() {
        let entry = sample(Scope::Session { session_id: "sess with spaces:and colons".into() }, vec![]);
        let line = serialize_entry(&entry);
        assert!(!line.contains("sess with"));
        assert_eq!(parse_entry(&line).unwrap(), entry);
    }
}
