use std::error::Error as _;
use vulnreport::{output, DetectedVulnerability, Package, Report, ReportError, ScanResult, Severity};

fn sample_report() -> Report {
    let mut report = Report::new(
        "registry.example.com/shop:2.4",
        vec![
            ScanResult::new("registry.example.com/shop:2.4 (debian 11.3)")
                .with_kind("debian")
                .with_packages(vec![Package::new("libc6", "2.31-13"), Package::new("zlib1g", "1:1.2.11")])
                .with_vulnerabilities(vec![
                    DetectedVulnerability::new("CVE-2021-33574", "libc6", "2.31-13", Severity::Critical)
                        .with_title("glibc: mq_notify does not handle separately allocated thread attributes"),
                    DetectedVulnerability::new("CVE-2018-25032", "zlib1g", "1:1.2.11", Severity::High)
                        .with_fixed_version("1:1.2.11.dfsg-2+deb11u1"),
                    DetectedVulnerability::new("CVE-2010-4756", "libc6", "2.31-13", Severity::Low),
                ]),
            ScanResult::new("srv/app/package-lock.json").with_kind("npm"),
        ],
    );
    report.repo_tags = vec!["registry.example.com/shop:2.4".to_string()];
    report
}

fn render(format: &str, severities: &[Severity], template: &str, light: bool) -> Result<String, ReportError> {
    let mut out = Vec::new();
    output::write(format, &mut out, severities, &sample_report(), template, light)?;
    Ok(String::from_utf8(out).unwrap())
}

#[test]
fn unknown_format_names_the_value() {
    let mut out = Vec::new();
    let err = output::write("bogus", &mut out, &[], &sample_report(), "", false).unwrap_err();
    assert_eq!(err.to_string(), "unknown format: bogus");
    assert!(out.is_empty());
}

#[test]
fn format_names_are_exact() {
    assert!(render("Table", &[], "", false).is_err());
    assert!(render("", &[], "", false).is_err());
}

#[test]
fn json_round_trip_is_idempotent() {
    let first = render("json", &[], "", false).unwrap();
    let parsed: Report = serde_json::from_str(&first).unwrap();
    assert_eq!(parsed, sample_report());

    let mut second = Vec::new();
    output::write("json", &mut second, &[], &parsed, "", false).unwrap();
    assert_eq!(first.as_bytes(), second.as_slice());
}

#[test]
fn json_ignores_table_settings() {
    let plain = render("json", &[], "", false).unwrap();
    let filtered = render("json", &[Severity::Critical], "{{ .Nope }}", true).unwrap();
    assert_eq!(plain, filtered);
}

#[test]
fn table_filters_by_severity() {
    let text = render("table", &[Severity::Critical], "", false).unwrap();
    assert!(text.contains("CVE-2021-33574"));
    assert!(!text.contains("CVE-2018-25032"));
    assert!(!text.contains("CVE-2010-4756"));
    assert!(!text.contains("package-lock.json"));

    let all = render("table", &[], "", false).unwrap();
    for id in ["CVE-2021-33574", "CVE-2018-25032", "CVE-2010-4756"] {
        assert!(all.contains(id), "missing {}", id);
    }
}

#[test]
fn template_sees_whole_model() {
    let template = concat!(
        "{{ .ArtifactID }} tags={{ .RepoTags | join \",\" }} failed={{ .Results.Failed }}\n",
        "{{- range .Results }}\n",
        "{{ .Target }} [{{ .Type }}] pkgs={{ len .Packages }} vulns={{ len .Vulnerabilities }}",
        "{{- end }}"
    );
    let out = render("template", &[], template, false).unwrap();
    assert_eq!(
        out,
        "registry.example.com/shop:2.4 tags=registry.example.com/shop:2.4 failed=true\n\
         registry.example.com/shop:2.4 (debian 11.3) [debian] pkgs=2 vulns=3\n\
         srv/app/package-lock.json [npm] pkgs=0 vulns=0"
    );
}

#[test]
fn template_ignores_severity_filter() {
    let template = "{{ range .Results }}{{ len .Vulnerabilities }};{{ end }}";
    let out = render("template", &[Severity::Critical], template, false).unwrap();
    assert_eq!(out, "3;0;");
}

#[test]
fn template_compile_error_is_initialization_error() {
    let mut out = Vec::new();
    let err = output::write("template", &mut out, &[], &sample_report(), "{{ if .ArtifactID }}", false).unwrap_err();
    assert!(matches!(err, ReportError::InitTemplate(_)));
    assert_eq!(err.to_string(), "failed to initialize template writer");
    assert!(err.source().unwrap().source().unwrap().to_string().contains("unexpected EOF"));
    assert!(out.is_empty());
}

#[test]
fn runtime_errors_are_write_errors() {
    let err = render("template", &[], "{{ index .RepoTags 9 }}", false).unwrap_err();
    assert!(matches!(err, ReportError::WriteResults(_)));
    assert_eq!(err.to_string(), "failed to write results");
}

#[test]
fn oversized_printf_width_is_write_error() {
    let err = render("template", &[], r#"{{ printf "%99999999999999999999s" "x" }}"#, false).unwrap_err();
    assert!(matches!(err, ReportError::WriteResults(_)));
    let root = err.source().unwrap().source().unwrap();
    assert!(root.to_string().contains("width too large"));
}

#[test]
fn empty_report_renders_empty() {
    let report = Report::default();
    assert!(!report.results.failed());

    let mut table = Vec::new();
    output::write("table", &mut table, &[], &report, "", false).unwrap();
    assert!(table.is_empty());

    let mut json = Vec::new();
    output::write("json", &mut json, &[], &report, "", false).unwrap();
    assert_eq!(json, b"{}\n");
}

#[test]
fn concurrent_writes_match_sequential() {
    let report = sample_report();
    let formats = ["table", "json", "template"];
    let template = "{{ range .Results }}{{ .Target }}\n{{ end }}";

    let sequential: Vec<Vec<u8>> = formats
        .iter()
        .map(|format| {
            let mut out = Vec::new();
            output::write(format, &mut out, &[], &report, template, false).unwrap();
            out
        })
        .collect();

    let concurrent: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = formats
            .iter()
            .map(|format| {
                let report = &report;
                scope.spawn(move || {
                    let mut out = Vec::new();
                    output::write(format, &mut out, &[], report, template, false).unwrap();
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sequential, concurrent);
}
