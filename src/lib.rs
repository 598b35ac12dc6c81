pub mod decoder;
pub mod framer;
pub mod monitor;
pub mod serial;
pub mod supervisor;
pub mod transport;

use serde::{Deserialize, Serialize};

/// One decoded measurement from the shutter tester.
///
/// A fresh instance replaces the previous one on every successful decode;
/// readings are never mutated in place. The all-zero `Default` is the
/// pre-connection value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Time the shutter was effectively open, in device microseconds.
    pub effective_time: u64,
    /// Total duration of the exposure event, in device microseconds.
    pub total_time: u64,
    /// Light level relative to the sensor maximum, typically 0..1.
    pub relative_signal: f64,
    /// Peak relative light level seen during the exposure.
    pub max_relative_signal: f64,
}

impl Reading {
    /// Encode as one wire line: the JSON object terminated by `\n`.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap();
        line.push('\n');
        line
    }
}
