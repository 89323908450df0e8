//! Time-series export: a write-only interface accepting
//! `{measurement, time, fields}` records. A full client is out of scope;
//! this is the thin boundary around it.

use std::collections::BTreeMap;
use std::env;

use chrono::{DateTime, Utc};

use crate::error::WpuError;

pub trait MeasurementSink {
    fn write(
        &self,
        measurement: &str,
        time: DateTime<Utc>,
        fields: &BTreeMap<String, f64>,
    ) -> Result<(), WpuError>;
}

pub struct InfluxDbSink {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    database: String,
    client: reqwest::blocking::Client,
}

impl InfluxDbSink {
    /// Reads connection parameters from the environment.
    pub fn from_env() -> Self {
        InfluxDbSink {
            host: env::var("INFLUXDB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("INFLUXDB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8086),
            username: env::var("INFLUXDB_USERNAME").ok(),
            password: env::var("INFLUXDB_PASSWORD").ok(),
            database: env::var("INFLUXDB_DATABASE").unwrap_or_default(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn line_protocol(measurement: &str, time: DateTime<Utc>, fields: &BTreeMap<String, f64>) -> String {
        let field_str = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{measurement} {field_str} {}", time.timestamp_nanos_opt().unwrap_or(0))
    }
}

impl MeasurementSink for InfluxDbSink {
    fn write(
        &self,
        measurement: &str,
        time: DateTime<Utc>,
        fields: &BTreeMap<String, f64>,
    ) -> Result<(), WpuError> {
        let url = format!("http://{}:{}/write?db={}", self.host, self.port, self.database);
        let body = Self::line_protocol(measurement, time, fields);

        let mut request = self.client.post(&url).body(body);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request
            .send()
            .map_err(|e| WpuError::Export(format!("failed to write to influxdb: {e}")))?;
        if !response.status().is_success() {
            return Err(WpuError::Export(format!(
                "influxdb returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_protocol_formats_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("outside_temp".to_string(), 12.5);
        let time = DateTime::from_timestamp(0, 0).unwrap();
        let line = InfluxDbSink::line_protocol("getdatalog", time, &fields);
        assert_eq!(line, "getdatalog outside_temp=12.5 0");
    }
}
