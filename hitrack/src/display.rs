//! Display helpers: colors, icons and labels for domain values.
//!
//! Every lookup is total. Values the server may add in the future fall back to a neutral color
//! or icon instead of failing.

use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Named palette colors, as used by the web dashboard theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Palette {
    Primary,
    Success,
    Info,
    Warning,
    Error,
    Orange,
    Red,
    Blue,
    Green,
    Purple,
    Cyan,
    Grey,
}

impl Palette {
    pub fn as_str(&self) -> &'static str {
        match self {
            Palette::Primary => "primary",
            Palette::Success => "success",
            Palette::Info => "info",
            Palette::Warning => "warning",
            Palette::Error => "error",
            Palette::Orange => "orange",
            Palette::Red => "red",
            Palette::Blue => "blue",
            Palette::Green => "green",
            Palette::Purple => "purple",
            Palette::Cyan => "cyan",
            Palette::Grey => "grey",
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Vulnerability identifier namespace, eg `CVE` or `GHSA` (case-sensitive)
pub fn vulnerability_type_color(vuln_type: &str) -> Palette {
    match vuln_type {
        "CVE" => Palette::Error,
        "GHSA" => Palette::Warning,
        "RUSTSEC" => Palette::Orange,
        "PYSEC" => Palette::Blue,
        "NPM" => Palette::Red,
        _ => Palette::Grey,
    }
}

pub fn severity_color(severity: &str) -> Palette {
    match severity.to_uppercase().as_str() {
        "CRITICAL" => Palette::Error,
        "HIGH" => Palette::Warning,
        "MEDIUM" => Palette::Orange,
        "LOW" => Palette::Info,
        _ => Palette::Grey,
    }
}

/// Package ecosystem of a component, eg `npm` or `pypi`
pub fn component_type_color(component_type: &str) -> Palette {
    match component_type.to_lowercase().as_str() {
        "npm" => Palette::Red,
        "pypi" => Palette::Blue,
        "maven" => Palette::Green,
        "gem" => Palette::Purple,
        "go" => Palette::Cyan,
        "nuget" => Palette::Orange,
        _ => Palette::Grey,
    }
}

pub fn epss_color(epss: f64) -> Palette {
    if epss >= 0.7 {
        Palette::Error
    } else if epss >= 0.4 {
        Palette::Warning
    } else if epss >= 0.2 {
        Palette::Orange
    } else {
        Palette::Success
    }
}

/// Scan/processing status of repositories, tags, images and tasks
pub fn processing_status_color(status: &str) -> Palette {
    match status {
        "success" => Palette::Success,
        "pending" => Palette::Warning,
        "in_process" => Palette::Info,
        "error" => Palette::Error,
        _ => Palette::Grey,
    }
}

pub fn processing_status_icon(status: &str) -> &'static str {
    match status {
        "success" => "mdi-check-circle",
        "pending" => "mdi-timer-sand",
        "in_process" => "mdi-progress-clock",
        "error" => "mdi-alert-circle",
        _ => "mdi-help-circle",
    }
}

/// Where an EPSS score came from
pub fn epss_source_color(source: &str) -> Palette {
    match source {
        "FIRST-EPSS" => Palette::Primary,
        "Grype" => Palette::Success,
        "manual" => Palette::Warning,
        _ => Palette::Grey,
    }
}

pub fn epss_source_icon(source: &str) -> &'static str {
    match source {
        "FIRST-EPSS" => "mdi-database",
        "Grype" => "mdi-magnify-scan",
        "manual" => "mdi-pencil",
        _ => "mdi-information",
    }
}

pub fn epss_source_display(source: &str) -> &str {
    match source {
        "FIRST-EPSS" => "FIRST API",
        "Grype" => "Grype Scan",
        "manual" => "Manual Entry",
        other => other,
    }
}

/// Formats a duration in seconds, eg "42s", "3m 5s", "2h 10m"
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{}s", seconds.round())
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let remaining = (seconds % 60.0).round();
        format!("{}m {}s", minutes, remaining)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours, minutes)
    }
}

/// Formats an RFC 3339 timestamp (as returned by the API) in UTC, eg
/// "March 7, 2024, 02:05:09 PM". Input that doesn't parse is returned unchanged.
pub fn format_date(timestamp: &str) -> String {
    let parsed = match OffsetDateTime::parse(timestamp, &Rfc3339) {
        Ok(dt) => dt.to_offset(UtcOffset::UTC),
        Err(_) => return timestamp.to_string(),
    };
    let fmt = format_description!(
        "[month repr:long] [day padding:none], [year], [hour repr:12]:[minute]:[second] [period]"
    );
    parsed
        .format(&fmt)
        .unwrap_or_else(|_| timestamp.to_string())
}

#[test]
fn test_severity_color() {
    assert_eq!(severity_color("CRITICAL"), Palette::Error);
    assert_eq!(severity_color("high"), Palette::Warning);
    assert_eq!(severity_color("Medium"), Palette::Orange);
    assert_eq!(severity_color("LOW"), Palette::Info);
    assert_eq!(severity_color("UNKNOWN"), Palette::Grey);
    assert_eq!(severity_color("negligible"), Palette::Grey);
    assert_eq!(severity_color(""), Palette::Grey);
}

#[test]
fn test_type_colors() {
    assert_eq!(vulnerability_type_color("CVE"), Palette::Error);
    assert_eq!(vulnerability_type_color("GHSA"), Palette::Warning);
    assert_eq!(vulnerability_type_color("cve"), Palette::Grey);
    assert_eq!(vulnerability_type_color("GO"), Palette::Grey);

    assert_eq!(component_type_color("NPM"), Palette::Red);
    assert_eq!(component_type_color("pypi"), Palette::Blue);
    assert_eq!(component_type_color("go"), Palette::Cyan);
    assert_eq!(component_type_color("deb"), Palette::Grey);
    assert_eq!(component_type_color("cargo"), Palette::Grey);
}

#[test]
fn test_epss_color() {
    assert_eq!(epss_color(0.95), Palette::Error);
    assert_eq!(epss_color(0.7), Palette::Error);
    assert_eq!(epss_color(0.4), Palette::Warning);
    assert_eq!(epss_color(0.25), Palette::Orange);
    assert_eq!(epss_color(0.0001), Palette::Success);
    assert_eq!(epss_color(f64::NAN), Palette::Success);
}

#[test]
fn test_status_and_source() {
    assert_eq!(processing_status_color("in_process"), Palette::Info);
    assert_eq!(processing_status_color("none"), Palette::Grey);
    assert_eq!(processing_status_icon("error"), "mdi-alert-circle");
    assert_eq!(processing_status_icon("archived"), "mdi-help-circle");

    assert_eq!(epss_source_color("FIRST-EPSS"), Palette::Primary);
    assert_eq!(epss_source_color("nvd"), Palette::Grey);
    assert_eq!(epss_source_icon("Grype"), "mdi-magnify-scan");
    assert_eq!(epss_source_icon("nvd"), "mdi-information");
    assert_eq!(epss_source_display("manual"), "Manual Entry");
    assert_eq!(epss_source_display("nvd"), "nvd");
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(0.0), "0s");
    assert_eq!(format_duration(42.4), "42s");
    assert_eq!(format_duration(59.4), "59s");
    assert_eq!(format_duration(185.0), "3m 5s");
    assert_eq!(format_duration(3600.0), "1h 0m");
    assert_eq!(format_duration(7830.0), "2h 10m");
}

#[test]
fn test_format_date() {
    assert_eq!(
        format_date("2024-03-07T14:05:09.123456Z"),
        "March 7, 2024, 02:05:09 PM"
    );
    assert_eq!(
        format_date("2024-03-07T14:05:09+02:00"),
        "March 7, 2024, 12:05:09 PM"
    );
    assert_eq!(format_date("yesterday"), "yesterday");
}
