use super::{WriteError, Writer};
use crate::model::{DetectedVulnerability, Report, ScanResult, Severity};
use std::io::Write;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

/// Titles longer than this many words are shortened.
const TITLE_WORDS: usize = 12;

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Library")]
    library: String,
    #[tabled(rename = "Vulnerability ID")]
    id: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Installed Version")]
    installed: String,
    #[tabled(rename = "Fixed Version")]
    fixed: String,
    #[tabled(rename = "Title")]
    title: String,
}

#[derive(Tabled)]
struct LightVulnRow {
    #[tabled(rename = "Library")]
    library: String,
    #[tabled(rename = "Vulnerability ID")]
    id: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Installed Version")]
    installed: String,
    #[tabled(rename = "Fixed Version")]
    fixed: String,
}

/// Human-readable tables, one section per target.
///
/// Only vulnerabilities whose severity is in `severities` are shown; an
/// empty list shows every severity. Targets left with no vulnerabilities
/// get no section. Rows keep the order the scanner reported them in.
pub struct TableWriter<W> {
    output: W,
    light: bool,
    severities: Vec<Severity>,
}

impl<W: Write> TableWriter<W> {
    pub fn new(output: W, light: bool, severities: Vec<Severity>) -> Self {
        Self {
            output,
            light,
            severities,
        }
    }

    /// Severities listed in the `Total:` line, lowest first.
    fn shown_severities(&self) -> Vec<Severity> {
        if self.severities.is_empty() {
            return Severity::ALL.to_vec();
        }
        let mut shown = self.severities.clone();
        shown.sort();
        shown.dedup();
        shown
    }
}

impl<W: Write> Writer for TableWriter<W> {
    fn write(&mut self, report: &Report) -> Result<(), WriteError> {
        let io_err = |source| WriteError::Io { stage: "table", source };

        let shown = self.shown_severities();

        for result in &report.results {
            let vulns: Vec<&DetectedVulnerability> = result.filtered_vulnerabilities(&self.severities).collect();
            if vulns.is_empty() {
                continue;
            }
            debug!(target = %result.target, rows = vulns.len(), "rendering table");
            write_section(&mut self.output, self.light, &shown, result, &vulns).map_err(io_err)?;
        }

        self.output.flush().map_err(io_err)
    }
}

fn write_section<W: Write>(
    out: &mut W,
    light: bool,
    shown: &[Severity],
    result: &ScanResult,
    vulns: &[&DetectedVulnerability],
) -> std::io::Result<()> {
    let header = if result.kind.is_empty() {
        result.target.clone()
    } else {
        format!("{} ({})", result.target, result.kind)
    };

    let counts: Vec<String> = shown
        .iter()
        .map(|s| {
            let n = vulns.iter().filter(|v| v.severity == *s).count();
            format!("{}: {}", s, n)
        })
        .collect();

    let table = if light {
        Table::new(vulns.iter().map(|v| light_row(v)))
            .with(Style::ascii())
            .to_string()
    } else {
        Table::new(vulns.iter().map(|v| full_row(v)))
            .with(Style::ascii())
            .to_string()
    };

    writeln!(out)?;
    writeln!(out, "{}", header)?;
    writeln!(out, "{}", "=".repeat(header.chars().count()))?;
    writeln!(out, "Total: {} ({})", vulns.len(), counts.join(", "))?;
    writeln!(out)?;
    writeln!(out, "{}", table)
}

fn full_row(v: &DetectedVulnerability) -> VulnRow {
    VulnRow {
        library: v.pkg_name.clone(),
        id: v.vulnerability_id.clone(),
        severity: v.severity.to_string(),
        installed: v.installed_version.clone(),
        fixed: v.fixed_version.clone(),
        title: short_title(v),
    }
}

fn light_row(v: &DetectedVulnerability) -> LightVulnRow {
    LightVulnRow {
        library: v.pkg_name.clone(),
        id: v.vulnerability_id.clone(),
        severity: v.severity.to_string(),
        installed: v.installed_version.clone(),
        fixed: v.fixed_version.clone(),
    }
}

/// Title, or description when there is no title, cut to [`TITLE_WORDS`] words.
fn short_title(v: &DetectedVulnerability) -> String {
    let title = if v.title.is_empty() {
        &v.description
    } else {
        &v.title
    };
    let words: Vec<&str> = title.split(' ').collect();
    if words.len() > TITLE_WORDS {
        format!("{}...", words[..TITLE_WORDS].join(" "))
    } else {
        title.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln(id: &str, severity: Severity) -> DetectedVulnerability {
        DetectedVulnerability::new(id, "openssl", "1.1.1k", severity)
            .with_fixed_version("1.1.1l")
            .with_title(format!("{} title", id))
    }

    fn render(report: &Report, light: bool, severities: Vec<Severity>) -> String {
        let mut out = Vec::new();
        TableWriter::new(&mut out, light, severities)
            .write(report)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    fn row_count(text: &str) -> usize {
        text.lines().filter(|l| l.starts_with("| openssl")).count()
    }

    fn mixed_report() -> Report {
        Report::new(
            "alpine:3.14",
            vec![ScanResult::new("alpine:3.14 (alpine 3.14.2)")
                .with_kind("alpine")
                .with_vulnerabilities(vec![vuln("CVE-LOW", Severity::Low), vuln("CVE-CRIT", Severity::Critical)])],
        )
    }

    #[test]
    fn test_severity_filter_keeps_matching_rows() {
        let text = render(&mixed_report(), false, vec![Severity::Critical]);
        assert_eq!(row_count(&text), 1);
        assert!(text.contains("CVE-CRIT"));
        assert!(!text.contains("CVE-LOW"));
        assert!(text.contains("Total: 1 (CRITICAL: 1)"));
    }

    #[test]
    fn test_empty_filter_includes_all() {
        let text = render(&mixed_report(), false, Vec::new());
        assert_eq!(row_count(&text), 2);
        assert!(text.contains("Total: 2 (UNKNOWN: 0, LOW: 1, MEDIUM: 0, HIGH: 0, CRITICAL: 1)"));
    }

    #[test]
    fn test_rows_keep_input_order() {
        let text = render(&mixed_report(), false, Vec::new());
        let low = text.find("CVE-LOW").unwrap();
        let crit = text.find("CVE-CRIT").unwrap();
        assert!(low < crit);
    }

    #[test]
    fn test_section_header() {
        let text = render(&mixed_report(), false, Vec::new());
        let header = "alpine:3.14 (alpine 3.14.2) (alpine)";
        assert!(text.starts_with(&format!("\n{}\n{}\n", header, "=".repeat(header.len()))));
    }

    #[test]
    fn test_header_without_type() {
        let report = Report::new("", vec![ScanResult::new("go.sum").with_vulnerabilities(vec![vuln("CVE-1", Severity::High)])]);
        let text = render(&report, false, Vec::new());
        assert!(text.starts_with("\ngo.sum\n======\n"));
    }

    #[test]
    fn test_light_mode_drops_title() {
        let full = render(&mixed_report(), false, Vec::new());
        let light = render(&mixed_report(), true, Vec::new());
        assert!(full.contains("Title"));
        assert!(full.contains("CVE-CRIT title"));
        assert!(!light.contains("Title"));
        assert!(light.contains("Fixed Version"));
        assert_eq!(row_count(&light), 2);
    }

    #[test]
    fn test_filtered_out_target_has_no_section() {
        let report = Report::new(
            "",
            vec![
                ScanResult::new("clean").with_vulnerabilities(vec![vuln("CVE-1", Severity::Low)]),
                ScanResult::new("dirty").with_vulnerabilities(vec![vuln("CVE-2", Severity::High)]),
            ],
        );
        let text = render(&report, false, vec![Severity::High]);
        assert!(!text.contains("clean"));
        assert!(text.contains("dirty"));
    }

    #[test]
    fn test_missing_fixed_version_is_empty_cell() {
        let report = Report::new(
            "",
            vec![ScanResult::new("go.sum").with_vulnerabilities(vec![
                DetectedVulnerability::new("CVE-NOFIX", "openssl", "1.1.1k", Severity::High).with_title("no fix yet"),
                vuln("CVE-FIXED", Severity::High),
            ])],
        );
        let text = render(&report, false, Vec::new());

        let cells = |id: &str| -> Vec<String> {
            let line = text.lines().find(|l| l.contains(id)).unwrap();
            line.split('|').map(|c| c.trim().to_string()).collect()
        };
        let unfixed = cells("CVE-NOFIX");
        assert_eq!(unfixed[1], "openssl");
        assert_eq!(unfixed[4], "1.1.1k");
        assert_eq!(unfixed[5], "");
        assert_eq!(unfixed[6], "no fix yet");
        assert_eq!(cells("CVE-FIXED")[5], "1.1.1l");
    }

    #[test]
    fn test_empty_report_writes_nothing() {
        assert!(render(&Report::default(), false, Vec::new()).is_empty());
    }

    #[test]
    fn test_short_title() {
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen";
        let v = DetectedVulnerability::new("CVE-1", "p", "1", Severity::Low).with_description(long);
        assert_eq!(
            short_title(&v),
            "one two three four five six seven eight nine ten eleven twelve..."
        );

        let v = DetectedVulnerability::new("CVE-1", "p", "1", Severity::Low).with_title("short title");
        assert_eq!(short_title(&v), "short title");
    }

    #[test]
    fn test_io_error_names_stage() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = TableWriter::new(Broken, false, Vec::new())
            .write(&mixed_report())
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to write table");
        assert!(matches!(err, WriteError::Io { stage: "table", .. }));
    }
}
