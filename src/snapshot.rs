// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parameter snapshot (component J): a point-in-time, typed copy of
//! scalar parameters, persisted as a `.par` text file so an interactive
//! session can be resumed with the same settings.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error reading/writing a parameter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse parameter file at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("no such parameter: {0:?}")]
    UnknownKey(String),

    #[error("parameter {0:?} is a {1}, not a {2}")]
    TypeMismatch(String, &'static str, &'static str),
}

/// A scalar parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Int(_) => "int",
            ParamValue::Bool(_) => "bool",
            ParamValue::Text(_) => "text",
        }
    }

    fn encode(&self) -> String {
        match self {
            ParamValue::Float(v) => format!("float {:e}", v),
            ParamValue::Int(v) => format!("int {}", v),
            ParamValue::Bool(v) => format!("bool {}", v),
            ParamValue::Text(v) => format!("text {}", v),
        }
    }

    fn decode(tag: &str, rest: &str, line: usize) -> Result<Self, SnapshotError> {
        match tag {
            "float" => rest
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|e| SnapshotError::Parse {
                    line,
                    reason: e.to_string(),
                }),
            "int" => rest
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| SnapshotError::Parse {
                    line,
                    reason: e.to_string(),
                }),
            "bool" => rest
                .parse::<bool>()
                .map(ParamValue::Bool)
                .map_err(|e| SnapshotError::Parse {
                    line,
                    reason: e.to_string(),
                }),
            "text" => Ok(ParamValue::Text(rest.to_string())),
            other => Err(SnapshotError::Parse {
                line,
                reason: format!("unknown value type {:?}", other),
            }),
        }
    }
}

/// A named, typed parameter snapshot.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    params: BTreeMap<String, ParamValue>,
}

impl Snapshot {
    pub fn save(&mut self, key: &str, value: ParamValue) {
        self.params.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Result<&ParamValue, SnapshotError> {
        self.params
            .get(key)
            .ok_or_else(|| SnapshotError::UnknownKey(key.to_string()))
    }

    pub fn get_float(&self, key: &str) -> Result<f64, SnapshotError> {
        match self.get(key)? {
            ParamValue::Float(v) => Ok(*v),
            other => Err(SnapshotError::TypeMismatch(key.to_string(), other.type_name(), "float")),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, SnapshotError> {
        match self.get(key)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(SnapshotError::TypeMismatch(key.to_string(), other.type_name(), "int")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, SnapshotError> {
        match self.get(key)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(SnapshotError::TypeMismatch(key.to_string(), other.type_name(), "bool")),
        }
    }

    pub fn get_text(&self, key: &str) -> Result<&str, SnapshotError> {
        match self.get(key)? {
            ParamValue::Text(v) => Ok(v.as_str()),
            other => Err(SnapshotError::TypeMismatch(key.to_string(), other.type_name(), "text")),
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> Result<(), SnapshotError> {
        for (key, value) in &self.params {
            writeln!(w, "{} = {}", key, value.encode())?;
        }
        Ok(())
    }

    pub fn read<R: BufRead>(r: R) -> Result<Self, SnapshotError> {
        let mut snapshot = Snapshot::default();
        for (idx, line) in r.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') {
                continue;
            }
            let (key, rest) = trimmed.split_once('=').ok_or_else(|| SnapshotError::Parse {
                line: line_no,
                reason: "expected `key = type value`".to_string(),
            })?;
            let rest = rest.trim();
            let (tag, value_str) = rest.split_once(' ').ok_or_else(|| SnapshotError::Parse {
                line: line_no,
                reason: "expected a type tag before the value".to_string(),
            })?;
            let value = ParamValue::decode(tag, value_str, line_no)?;
            snapshot.save(key.trim(), value);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_every_type() {
        let mut snap = Snapshot::default();
        snap.save("gain", ParamValue::Float(0.05));
        snap.save("niter", ParamValue::Int(100));
        snap.save("dophs", ParamValue::Bool(true));
        snap.save("device", ParamValue::Text("/xs".to_string()));

        let mut buf = Vec::new();
        snap.write(&mut buf).unwrap();
        let read_back = Snapshot::read(Cursor::new(buf)).unwrap();

        assert_eq!(read_back.get_float("gain").unwrap(), 0.05);
        assert_eq!(read_back.get_int("niter").unwrap(), 100);
        assert_eq!(read_back.get_bool("dophs").unwrap(), true);
        assert_eq!(read_back.get_text("device").unwrap(), "/xs");
    }

    #[test]
    fn unknown_key_errors() {
        let snap = Snapshot::default();
        assert!(matches!(snap.get("missing"), Err(SnapshotError::UnknownKey(_))));
    }

    #[test]
    fn type_mismatch_errors() {
        let mut snap = Snapshot::default();
        snap.save("gain", ParamValue::Float(0.05));
        assert!(matches!(
            snap.get_int("gain"),
            Err(SnapshotError::TypeMismatch(_, "float", "int"))
        ));
    }
}
