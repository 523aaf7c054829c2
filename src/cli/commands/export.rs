//! `knox export`: export keys from the bunker.
//!
//! Supported formats:
//! - `csv` (default): `name,sec,created_at`, one key per line
//! - `jsonl`: one JSON object per line
//!
//! Keys are exported as `ncryptsec` wrapped with the bunker passphrase
//! unless `--insecure` asks for plain `nsec`.

use std::fmt::Write;
use std::str::FromStr;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::bunker::KnoxState;
use crate::cli::{open_bunker, Cli};
use crate::crypto::{encode_nsec, PassphraseCipher};
use crate::errors::{KnoxError, Result};

/// Output format of `knox export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Jsonl,
}

impl FromStr for ExportFormat {
    type Err = KnoxError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "csv" => Ok(Self::Csv),
            "jsonl" => Ok(Self::Jsonl),
            other => Err(KnoxError::InvalidExportFormat(other.to_string())),
        }
    }
}

/// One exported key.
#[derive(Debug, Serialize)]
pub struct ExportRow {
    pub name: String,
    pub sec: String,
    pub created_at: String,
}

/// Execute the `export` command.
pub fn execute(cli: &Cli, format: &str, keys_only: bool, insecure: bool) -> Result<()> {
    let format: ExportFormat = format.parse()?;

    let (_settings, store) = open_bunker(cli)?;
    let rows = export_rows(store.state(), store.cipher(), insecure)?;

    print!("{}", render(&rows, format, keys_only)?);
    Ok(())
}

/// Encode every key in `state`.
pub fn export_rows(
    state: &KnoxState,
    cipher: &PassphraseCipher,
    insecure: bool,
) -> Result<Vec<ExportRow>> {
    state
        .keys
        .iter()
        .map(|key| {
            let sec = if insecure {
                encode_nsec(&key.sec)?
            } else {
                cipher.encrypt_key(&key.sec)?
            };
            Ok(ExportRow {
                name: key.name.clone(),
                sec,
                created_at: key.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            })
        })
        .collect()
}

/// Render rows as newline-terminated text.
pub fn render(rows: &[ExportRow], format: ExportFormat, keys_only: bool) -> Result<String> {
    let mut out = String::new();
    for row in rows {
        if keys_only {
            let _ = writeln!(out, "{}", row.sec);
            continue;
        }
        match format {
            ExportFormat::Csv => {
                let _ = writeln!(
                    out,
                    "{},{},{}",
                    csv_field(&row.name),
                    row.sec,
                    row.created_at
                );
            }
            ExportFormat::Jsonl => {
                let line = serde_json::to_string(row)
                    .map_err(|e| KnoxError::Serialization(format!("JSON export: {e}")))?;
                let _ = writeln!(out, "{line}");
            }
        }
    }
    Ok(out)
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decode_nsec, generate_secret_key};

    fn cipher() -> PassphraseCipher {
        PassphraseCipher::new("pw").with_work_factor(4)
    }

    fn state() -> KnoxState {
        let mut state = KnoxState::new();
        state.add_key("alex", generate_secret_key()).unwrap();
        state.add_key("sam", generate_secret_key()).unwrap();
        state
    }

    #[test]
    fn parses_known_formats() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(KnoxError::InvalidExportFormat(_))
        ));
    }

    #[test]
    fn insecure_export_round_trips_through_nsec() {
        let state = state();
        let rows = export_rows(&state, &cipher(), true).unwrap();
        assert!(rows[0].sec.starts_with("nsec1"));
        assert_eq!(decode_nsec(&rows[0].sec).unwrap(), state.keys[0].sec);
    }

    #[test]
    fn default_export_is_passphrase_wrapped() {
        let state = state();
        let rows = export_rows(&state, &cipher(), false).unwrap();
        assert!(rows[1].sec.starts_with("ncryptsec1"));
        assert_eq!(cipher().decrypt_key(&rows[1].sec).unwrap(), state.keys[1].sec);
    }

    #[test]
    fn csv_lines_have_three_columns() {
        let rows = export_rows(&state(), &cipher(), true).unwrap();
        let out = render(&rows, ExportFormat::Csv, false).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("alex,nsec1"));
        assert_eq!(lines[1].split(',').count(), 3);
    }

    #[test]
    fn jsonl_lines_are_objects() {
        let rows = export_rows(&state(), &cipher(), true).unwrap();
        let out = render(&rows, ExportFormat::Jsonl, false).unwrap();
        for line in out.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["name"].is_string());
            assert!(value["sec"].as_str().unwrap().starts_with("nsec1"));
            assert!(value["created_at"].as_str().unwrap().ends_with('Z'));
        }
    }

    #[test]
    fn keys_only_prints_just_the_secret() {
        let rows = export_rows(&state(), &cipher(), true).unwrap();
        let out = render(&rows, ExportFormat::Jsonl, true).unwrap();
        assert!(out.lines().all(|line| line.starts_with("nsec1")));
    }

    #[test]
    fn csv_quotes_awkward_names() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
