//! Coverage table parsing.
//!
//! The input is the per-function table printed by the coverage tool:
//!
//! ```text
//! example.com/svc/pkg/api/server.go:41:    NewServer     100.0%
//! example.com/svc/pkg/api/server.go:77:    Start         62.5%
//! total:                                   (statements)  87.3%
//! ```

use testrig_common::CoverageSummary;
use tracing::debug;

const TOTAL_MARKER: &str = "total:";

/// Result of scanning a coverage table.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageParse {
    /// No total line was found.
    NoCoverage,
    Parsed(CoverageSummary),
    /// A total line was found but its percentage could not be read.
    Malformed { line: String, reason: String },
}

impl CoverageParse {
    pub fn summary(&self) -> Option<&CoverageSummary> {
        match self {
            CoverageParse::Parsed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn into_summary(self) -> Option<CoverageSummary> {
        match self {
            CoverageParse::Parsed(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Parse a coverage table.
///
/// The last total line wins. Function rows become per-unit entries keyed by
/// `<file>:<function>`; unreadable rows are skipped.
pub fn parse_coverage(text: &str) -> CoverageParse {
    let mut total_line = None;
    let mut units = Vec::new();

    for line in text.lines() {
        if let Some(idx) = line.find(TOTAL_MARKER) {
            total_line = Some((line, &line[idx + TOTAL_MARKER.len()..]));
        } else if let Some(unit) = parse_function_row(line) {
            units.push(unit);
        }
    }

    let Some((line, rest)) = total_line else {
        return CoverageParse::NoCoverage;
    };

    let overall = match rest.split_whitespace().last() {
        Some(token) => match parse_percent(token) {
            Ok(value) => value,
            Err(reason) => return malformed(line, reason),
        },
        None => return malformed(line, "no percentage after total marker".to_string()),
    };

    let Some(mut summary) = CoverageSummary::new(overall) else {
        return malformed(line, format!("{} is outside 0-100", overall));
    };

    for (unit, percent) in units {
        if !summary.insert_unit(unit.clone(), percent) {
            debug!("Ignoring duplicate coverage row: {}", unit);
        }
    }

    CoverageParse::Parsed(summary)
}

fn malformed(line: &str, reason: String) -> CoverageParse {
    debug!("Malformed coverage total '{}': {}", line.trim(), reason);
    CoverageParse::Malformed {
        line: line.trim().to_string(),
        reason,
    }
}

fn parse_percent(token: &str) -> Result<f64, String> {
    let number = token.strip_suffix('%').unwrap_or(token);
    number
        .parse::<f64>()
        .map_err(|e| format!("'{}' is not a number: {}", token, e))
}

/// `path/file.go:12:  Name  85.7%` -> (`path/file.go:Name`, 85.7)
fn parse_function_row(line: &str) -> Option<(String, f64)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let location = tokens[0].strip_suffix(':')?;
    let (file, line_no) = location.rsplit_once(':')?;
    if file.is_empty() || line_no.parse::<u32>().is_err() {
        return None;
    }
    let percent = tokens[tokens.len() - 1];
    if !percent.ends_with('%') {
        return None;
    }
    let percent = parse_percent(percent).ok()?;
    Some((format!("{}:{}", file, tokens[1]), percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_only() {
        let parse = parse_coverage("total: (statements) 87.3%");
        let summary = parse.summary().unwrap();
        assert!((summary.overall_percent() - 87.3).abs() < 1e-9);
        assert!(summary.per_unit().is_empty());
    }

    #[test]
    fn test_empty_is_no_coverage() {
        assert_eq!(parse_coverage(""), CoverageParse::NoCoverage);
        assert_eq!(
            parse_coverage("ok  \texample.com/svc/pkg/api\t0.3s\n"),
            CoverageParse::NoCoverage
        );
    }

    #[test]
    fn test_full_table_with_units() {
        let table = "\
example.com/svc/pkg/api/server.go:41:\tNewServer\t\t100.0%
example.com/svc/pkg/api/server.go:77:\tStart\t\t\t62.5%
example.com/svc/pkg/monitor/health.go:20:\tCheck\t\t\t0.0%
total:\t\t\t\t\t(statements)\t\t71.4%
";
        let summary = parse_coverage(table).into_summary().unwrap();
        assert!((summary.overall_percent() - 71.4).abs() < 1e-9);
        assert_eq!(summary.per_unit().len(), 3);
        assert_eq!(
            summary.per_unit().get("example.com/svc/pkg/api/server.go:Start"),
            Some(&62.5)
        );
        assert_eq!(
            summary.per_unit().get("example.com/svc/pkg/monitor/health.go:Check"),
            Some(&0.0)
        );
    }

    #[test]
    fn test_duplicate_unit_first_wins() {
        let table = "\
a/x.go:1:\tinit\t\t50.0%
a/x.go:9:\tinit\t\t75.0%
total:\t(statements)\t60.0%
";
        let summary = parse_coverage(table).into_summary().unwrap();
        assert_eq!(summary.per_unit().get("a/x.go:init"), Some(&50.0));
        assert_eq!(summary.per_unit().len(), 1);
    }

    #[test]
    fn test_unparseable_total_is_malformed() {
        match parse_coverage("total: (statements) abc%") {
            CoverageParse::Malformed { line, reason } => {
                assert_eq!(line, "total: (statements) abc%");
                assert!(reason.contains("abc%"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
        assert!(parse_coverage("total: (statements) abc%").summary().is_none());
    }

    #[test]
    fn test_out_of_range_total_is_malformed() {
        assert!(matches!(
            parse_coverage("total: (statements) 140.0%"),
            CoverageParse::Malformed { .. }
        ));
        assert!(matches!(parse_coverage("total:"), CoverageParse::Malformed { .. }));
    }

    #[test]
    fn test_last_total_wins() {
        let parse = parse_coverage("total: (statements) 10.0%\ntotal: (statements) 20.0%");
        assert_eq!(parse.summary().map(|s| s.overall_percent()), Some(20.0));
    }
}
