//! Localization report formatting
//!
//! Collects the outputs of one run (bearings and source estimate) into a
//! serializable report and renders it as text, JSON or CSV.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::algorithms::multilateration::MultilaterationResult;
use crate::core::constants::QUAD_SIZE;
use crate::core::types::{Doa4, MicrophoneId, Tdoa4};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// One bearing alongside the observation it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingRecord {
    pub microphone_ids: [MicrophoneId; QUAD_SIZE],
    pub microphone_names: [String; QUAD_SIZE],
    pub tdoa_s: f64,
    pub doa_deg: f64,
}

impl BearingRecord {
    pub fn new(observation: &Tdoa4, doa: &Doa4) -> Self {
        let mics = doa.microphones();
        Self {
            microphone_ids: std::array::from_fn(|i| mics[i].id()),
            microphone_names: std::array::from_fn(|i| mics[i].name().to_string()),
            tdoa_s: observation.tdoa(),
            doa_deg: doa.doa(),
        }
    }
}

/// Everything a run produced, including stage failures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizationReport {
    pub speed_of_sound_ms: f64,
    pub max_tau_s: Option<f64>,
    pub bearings: Vec<BearingRecord>,
    pub bearing_error: Option<String>,
    pub source: Option<MultilaterationResult>,
    pub source_error: Option<String>,
}

impl LocalizationReport {
    pub fn new(speed_of_sound_ms: f64, max_tau_s: Option<f64>) -> Self {
        Self {
            speed_of_sound_ms,
            max_tau_s,
            ..Self::default()
        }
    }

    /// Pair each bearing with its observation; both slices share input order
    pub fn with_bearings(mut self, observations: &[Tdoa4], bearings: &[Doa4]) -> Self {
        self.bearings = observations
            .iter()
            .zip(bearings)
            .map(|(obs, doa)| BearingRecord::new(obs, doa))
            .collect();
        self
    }

    pub fn with_bearing_error(mut self, error: impl ToString) -> Self {
        self.bearing_error = Some(error.to_string());
        self
    }

    pub fn with_source(mut self, source: MultilaterationResult) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_source_error(mut self, error: impl ToString) -> Self {
        self.source_error = Some(error.to_string());
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(TextFormatter::new().format_text(self)),
            OutputFormat::Json => JsonFormatter::pretty().format_json(self),
            OutputFormat::Csv => Ok(CsvFormatter::new().format_csv(self)),
        }
    }
}

/// Human-readable text formatter
#[derive(Debug, Clone)]
pub struct TextFormatter {
    /// Decimal places for bearings and coordinates
    pub precision: usize,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self { precision: 2 }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_text(&self, report: &LocalizationReport) -> String {
        let p = self.precision;
        let mut output = String::new();

        let _ = writeln!(output, "Speed of sound: {:.1} m/s", report.speed_of_sound_ms);

        match (&report.bearing_error, report.max_tau_s) {
            (Some(error), _) => {
                let _ = writeln!(output, "Bearings: failed ({})", error);
            }
            (None, None) => output.push_str("Bearings: skipped (no maximum tau)\n"),
            (None, Some(max_tau)) => {
                let _ = writeln!(output, "Bearings (max tau {:.6} s):", max_tau);
                for record in &report.bearings {
                    let _ = writeln!(
                        output,
                        "  [{}] tdoa={:.6} s  doa={:.p$}°",
                        record.microphone_names.join(", "),
                        record.tdoa_s,
                        record.doa_deg,
                        p = p
                    );
                }
            }
        }

        match (&report.source, &report.source_error) {
            (Some(source), _) => {
                let _ = writeln!(output, "Source position:");
                let _ = writeln!(output, "  x: {:.p$} m", source.x, p = p);
                let _ = writeln!(output, "  y: {:.p$} m", source.y, p = p);
                let _ = writeln!(
                    output,
                    "  residual norm: {:.3e} m after {} iterations ({:?})",
                    source.residual_norm, source.iterations, source.termination
                );
            }
            (None, Some(error)) => {
                let _ = writeln!(output, "Source position: failed ({})", error);
            }
            (None, None) => output.push_str("Source position: not computed\n"),
        }

        output
    }
}

/// JSON formatter for structured output
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, report: &LocalizationReport) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        }
    }
}

/// CSV formatter, one row per bearing
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    pub include_header: bool,
}

impl Default for CsvFormatter {
    fn default() -> Self {
        Self { include_header: true }
    }
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &'static str {
        "mic1,mic2,mic3,mic4,tdoa_s,doa_deg"
    }

    pub fn format_csv(&self, report: &LocalizationReport) -> String {
        let mut output = String::new();
        if self.include_header {
            output.push_str(self.header());
            output.push('\n');
        }
        for record in &report.bearings {
            let ids = record.microphone_ids;
            let _ = writeln!(
                output,
                "{},{},{},{},{:.9},{:.6}",
                ids[0], ids[1], ids[2], ids[3], record.tdoa_s, record.doa_deg
            );
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::doa::compute_all_doa;
    use crate::algorithms::multilateration::Termination;
    use crate::core::types::{Microphone, MicrophoneHandle, Position2};
    use std::sync::Arc;

    fn observations() -> Vec<Tdoa4> {
        let mics: [MicrophoneHandle; 4] = std::array::from_fn(|i| {
            let angle = i as f64 * std::f64::consts::FRAC_PI_2;
            Arc::new(Microphone::new(
                MicrophoneId(i as u32),
                format!("mic{}", i),
                Position2::new(angle.cos(), angle.sin()),
            ))
        });
        vec![
            Tdoa4::new(mics.clone(), 0.0).unwrap(),
            Tdoa4::new(mics, 0.002).unwrap(),
        ]
    }

    fn sample_report() -> LocalizationReport {
        let observations = observations();
        let bearings = compute_all_doa(&observations, Some(0.004), false).unwrap();
        LocalizationReport::new(343.2, Some(0.004))
            .with_bearings(&observations, &bearings)
            .with_source(MultilaterationResult {
                x: 1.25,
                y: -0.5,
                residuals: vec![0.0, 0.0],
                cost: 0.0,
                residual_norm: 0.0,
                iterations: 4,
                termination: Termination::GradientTolerance,
            })
    }

    #[test]
    fn test_bearing_records_follow_input_order() {
        let report = sample_report();
        assert_eq!(report.bearings.len(), 2);
        assert_eq!(report.bearings[0].doa_deg, 0.0);
        assert_eq!(report.bearings[1].tdoa_s, 0.002);
        assert_eq!(report.bearings[1].microphone_names[2], "mic2");
    }

    #[test]
    fn test_text_format() {
        let text = sample_report().render(OutputFormat::Text).unwrap();
        assert!(text.contains("Speed of sound: 343.2 m/s"));
        assert!(text.contains("doa=30.00°"));
        assert!(text.contains("x: 1.25 m"));
        assert!(text.contains("GradientTolerance"));
    }

    #[test]
    fn test_text_format_reports_failures() {
        let report = LocalizationReport::new(343.2, Some(0.001))
            .with_bearing_error("TDOA 0.002 s exceeds the maximum possible delay of 0.001 s")
            .with_source_error("at least 2 observations are required, 1 provided");
        let text = TextFormatter::new().format_text(&report);
        assert!(text.contains("Bearings: failed (TDOA 0.002 s"));
        assert!(text.contains("Source position: failed (at least 2"));
    }

    #[test]
    fn test_json_format() {
        let report = sample_report();
        let json = JsonFormatter::new().format_json(&report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["bearings"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["source"]["termination"], "GradientTolerance");
        assert_eq!(parsed["source"]["iterations"], 4);
        assert!(parsed["bearing_error"].is_null());
    }

    #[test]
    fn test_csv_format() {
        let csv = sample_report().render(OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "mic1,mic2,mic3,mic4,tdoa_s,doa_deg");
        assert!(lines[2].starts_with("0,1,2,3,0.002000000,30.000000"));
    }
}
