use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::Result;
use crate::types::{Device, Parameter};

pub enum ParameterLogMode {
    /// Every pushed update.
    Full,
    /// Only updates whose value differs from the last one logged.
    Diffed,
}

/// Appends parameter updates to an NDJSON file.
pub struct ParameterLogger {
    mode: ParameterLogMode,
    file: File,
    last_values: HashMap<(String, String), String>,
}

impl ParameterLogger {
    pub fn new(mode: ParameterLogMode, path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            mode,
            file,
            last_values: HashMap::new(),
        })
    }

    pub fn log_update(&mut self, device: &Device, param: &Parameter, create: bool) {
        let key = (device.serial.clone(), param.name.clone());
        if let ParameterLogMode::Diffed = self.mode
            && !create
            && self.last_values.get(&key) == Some(&param.value)
        {
            return;
        }
        self.last_values.insert(key, param.value.clone());

        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "serial": device.serial,
            "name": param.name,
            "value": param.value,
            "timestamp": param.timestamp,
            "create": create,
        });
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write parameter log entry: {e}");
        }
    }
}
