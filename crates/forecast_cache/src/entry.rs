//! Cache entry records and the filename scheme.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream model a cached file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Regular-grid wind (GRIB2).
    Wind,
    /// Unstructured-mesh water current (NetCDF).
    Current,
}

impl SourceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SourceKind::Wind => "wind",
            SourceKind::Current => "current",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SourceKind::Wind => "grib2",
            SourceKind::Current => "nc",
        }
    }

    /// Zero-padded width of the forecast hour in the filename.
    pub fn hour_digits(self) -> usize {
        match self {
            SourceKind::Wind => 2,
            SourceKind::Current => 3,
        }
    }

    /// `wind_{YYYYMMDD}_{HH}z_f{FF}.grib2` / `current_{YYYYMMDD}_{HH}z_f{FFF}.nc`
    pub fn filename(self, cycle_time: DateTime<Utc>, forecast_hour: u32) -> String {
        format!(
            "{}_{}_{:02}z_f{:0width$}.{}",
            self.prefix(),
            cycle_time.format("%Y%m%d"),
            cycle_time.hour(),
            forecast_hour,
            self.extension(),
            width = self.hour_digits(),
        )
    }

    /// Inverse of [`SourceKind::filename`]; `None` for anything else.
    pub fn parse_filename(name: &str) -> Option<ParsedName> {
        [SourceKind::Wind, SourceKind::Current]
            .into_iter()
            .find_map(|kind| kind.parse_own(name))
    }

    fn parse_own(self, name: &str) -> Option<ParsedName> {
        let stem = name
            .strip_prefix(self.prefix())?
            .strip_prefix('_')?
            .strip_suffix(self.extension())?
            .strip_suffix('.')?;

        let mut parts = stem.split('_');
        let date = parts.next()?;
        let cycle = parts.next()?.strip_suffix('z')?;
        let fh = parts.next()?.strip_prefix('f')?;
        if parts.next().is_some() {
            return None;
        }

        let all_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(date, 8) || !all_digits(cycle, 2) || !all_digits(fh, self.hour_digits()) {
            return None;
        }

        NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        let cycle_hour: u32 = cycle.parse().ok()?;
        if cycle_hour > 23 {
            return None;
        }

        Some(ParsedName {
            source_type: self,
            cycle_date: date.to_string(),
            cycle_hour,
            forecast_hour: fh.parse().ok()?,
        })
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Fields recoverable from a cache filename alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub source_type: SourceKind,
    pub cycle_date: String,
    pub cycle_hour: u32,
    pub forecast_hour: u32,
}

/// One tracked file. Keyed by filename in the metadata index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Filled from the index key on load.
    #[serde(skip)]
    pub filename: String,
    pub source_type: SourceKind,
    /// `YYYYMMDD` of the model cycle.
    pub cycle_date: String,
    pub cycle_hour: u32,
    pub forecast_hour: u32,
    pub size_bytes: u64,
    pub created_time: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Aggregate view of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub wind_files: usize,
    pub wind_size_bytes: u64,
    pub current_files: usize,
    pub current_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_days: Option<i64>,
}

const MB: f64 = 1024.0 * 1024.0;

impl CacheStats {
    pub fn with_limits(mut self, max_size_gb: f64, expiry_days: i64) -> Self {
        self.max_size_gb = Some(max_size_gb);
        self.expiry_days = Some(expiry_days);
        self
    }

    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / MB
    }

    pub fn total_size_gb(&self) -> f64 {
        self.total_size_bytes as f64 / (MB * 1024.0)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache statistics:")?;
        writeln!(f, "  Total files: {}", self.total_files)?;
        writeln!(
            f,
            "  Total size:  {:.1} MB ({:.2} GB)",
            self.total_size_mb(),
            self.total_size_gb()
        )?;
        writeln!(
            f,
            "  Wind files:    {} ({:.1} MB)",
            self.wind_files,
            self.wind_size_bytes as f64 / MB
        )?;
        write!(
            f,
            "  Current files: {} ({:.1} MB)",
            self.current_files,
            self.current_size_bytes as f64 / MB
        )?;
        if let Some(gb) = self.max_size_gb {
            write!(f, "\n  Size limit:  {gb} GB")?;
        }
        if let Some(days) = self.expiry_days {
            write!(f, "\n  Expiry:      {days} days")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cycle(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_filename_digit_widths() {
        let t = cycle(2025, 1, 30, 14);
        assert_eq!(SourceKind::Wind.filename(t, 6), "wind_20250130_14z_f06.grib2");
        assert_eq!(SourceKind::Current.filename(t, 6), "current_20250130_14z_f006.nc");
        assert_eq!(
            SourceKind::Current.filename(cycle(2025, 3, 1, 3), 48),
            "current_20250301_03z_f048.nc"
        );
    }

    #[test]
    fn test_parse_filename_inverts_naming() {
        let t = cycle(2025, 1, 30, 9);
        for (kind, fh) in [(SourceKind::Wind, 0), (SourceKind::Wind, 48), (SourceKind::Current, 17)] {
            let name = kind.filename(t, fh);
            let parsed = SourceKind::parse_filename(&name).unwrap();
            assert_eq!(parsed.source_type, kind);
            assert_eq!(parsed.cycle_date, "20250130");
            assert_eq!(parsed.cycle_hour, 9);
            assert_eq!(parsed.forecast_hour, fh);
        }
    }

    #[test]
    fn test_parse_filename_rejects_foreign_names() {
        for name in [
            "cache_metadata.json",
            "wind_20250130_14z_f06.grib2.part",
            "wind_20250130_14z_f006.grib2",
            "current_20250130_14z_f06.nc",
            "wind_2025013_14z_f06.grib2",
            "wind_20250130_25z_f06.grib2",
            "wind_20251340_14z_f06.grib2",
            "hrrr_20250130_14z_f06.grib2",
        ] {
            assert!(SourceKind::parse_filename(name).is_none(), "{name} should not parse");
        }
    }

    #[test]
    fn test_stats_display_reports_sizes_and_limits() {
        let stats = CacheStats {
            total_files: 3,
            total_size_bytes: 3 * 1024 * 1024,
            wind_files: 2,
            wind_size_bytes: 2 * 1024 * 1024,
            current_files: 1,
            current_size_bytes: 1024 * 1024,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Total files: 3"));
        assert!(text.contains("Total size:  3.0 MB (0.00 GB)"));
        assert!(text.contains("Wind files:    2 (2.0 MB)"));
        assert!(text.contains("Current files: 1 (1.0 MB)"));
        assert!(!text.contains("Size limit"));

        let text = stats.with_limits(10.0, 7).to_string();
        assert!(text.contains("Size limit:  10 GB"));
        assert!(text.ends_with("Expiry:      7 days"));
    }
}
