use super::{ExportError, Exporter, ExporterFactory};
use crate::aggregate::Sample;
use crate::config::types::InfluxConfig;
use async_trait::async_trait;
use std::fmt::Write;

/// Writes samples to InfluxDB through the v2 write endpoint.
///
/// The endpoint is also served by InfluxDB 1.8+, where the bucket is
/// `database/retention_policy` and the token is `user:password`.
#[derive(Debug)]
pub struct InfluxExporter {
    client: reqwest::Client,
    write_url: String,
    bucket: String,
    token: String,
    measurement: String,
    host: String,
}

impl InfluxExporter {
    pub fn new(config: &InfluxConfig) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let bucket = if config.retention_policy.is_empty() {
            config.database.clone()
        } else {
            format!("{}/{}", config.database, config.retention_policy)
        };

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            bucket,
            token: format!("{}:{}", config.user, config.password),
            measurement: config.measurement.clone(),
            host: config.hostname.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Exporter for InfluxExporter {
    async fn export(&mut self, sample: &Sample) -> Result<(), ExportError> {
        let body = encode_line(&self.measurement, &self.host, sample);

        let response = self
            .client
            .post(&self.write_url)
            .query(&[("bucket", self.bucket.as_str()), ("precision", "s")])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExportError::Rejected {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }

    async fn close(&mut self) {
        tracing::debug!(url = %self.write_url, "Closing InfluxDB exporter");
    }
}

/// Builds an [`InfluxExporter`] per drain pass.
#[derive(Debug, Clone)]
pub struct InfluxExporterFactory {
    config: InfluxConfig,
}

impl InfluxExporterFactory {
    pub fn new(config: InfluxConfig) -> Self {
        Self { config }
    }
}

impl ExporterFactory for InfluxExporterFactory {
    fn connect(&self) -> Result<Box<dyn Exporter>, ExportError> {
        Ok(Box::new(InfluxExporter::new(&self.config)?))
    }
}

/// Render a sample as one line of InfluxDB line protocol.
///
/// InfluxDB has no unsigned 64-bit field type on every version, so counters
/// are written as signed integers, clamped at `i64::MAX`.
pub fn encode_line(measurement: &str, host: &str, sample: &Sample) -> String {
    let mut line = escape(measurement, &[',', ' ']);
    if !host.is_empty() {
        line.push_str(",host=");
        line.push_str(&escape(host, &[',', '=', ' ']));
    }

    for (i, (name, value)) in sample.counters.iter().enumerate() {
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        let sep = if i == 0 { ' ' } else { ',' };
        let _ = write!(line, "{sep}{}={value}i", field_name(name));
    }

    let _ = write!(line, " {}", sample.timestamp.timestamp());
    line
}

/// Field key a counter is stored under.
///
/// Existing gatekeeper series spell the occupancy fields with a single "c";
/// writing the corrected spelling would start new series beside them.
pub fn field_name(counter: &str) -> &str {
    match counter {
        "flow_table_occupancy_current" => "flow_table_ocupancy_current",
        "flow_table_occupancy_max" => "flow_table_ocupancy_max",
        other => other,
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
