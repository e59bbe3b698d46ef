use anyhow::Result;
use hitrack::display::{
    component_type_color, epss_color, epss_source_display, format_date, processing_status_color,
    severity_color, vulnerability_type_color, Palette,
};
use hitrack::models::{
    AddRepositoriesResponse, Component, ComponentVersion, Image, Page, RegistryRepositories,
    Related, Repository, RepositoryTag, SeverityCounts, Stats, Vulnerability,
};
use hitrack::notify::{Level, Notification};
use std::io::Write;
use termcolor::{Color, ColorSpec, WriteColor};

/// Closest terminal color for a dashboard palette entry. Grey has none; it is printed dimmed.
pub fn terminal_color(palette: Palette) -> Option<Color> {
    match palette {
        Palette::Primary | Palette::Blue => Some(Color::Blue),
        Palette::Success | Palette::Green => Some(Color::Green),
        Palette::Info | Palette::Cyan => Some(Color::Cyan),
        Palette::Warning => Some(Color::Yellow),
        Palette::Error | Palette::Red => Some(Color::Red),
        Palette::Orange => Some(Color::Ansi256(208)),
        Palette::Purple => Some(Color::Magenta),
        Palette::Grey => None,
    }
}

fn spec_for(palette: Palette) -> ColorSpec {
    let mut spec = ColorSpec::new();
    match terminal_color(palette) {
        Some(c) => spec.set_fg(Some(c)),
        None => spec.set_dimmed(true),
    };
    spec
}

fn write_colored<W: WriteColor>(out: &mut W, palette: Palette, text: &str) -> Result<()> {
    out.set_color(&spec_for(palette))?;
    write!(out, "{}", text)?;
    out.reset()?;
    Ok(())
}

fn write_dimmed<W: WriteColor>(out: &mut W, text: &str) -> Result<()> {
    out.set_color(ColorSpec::new().set_dimmed(true))?;
    write!(out, "{}", text)?;
    out.reset()?;
    Ok(())
}

fn write_heading<W: WriteColor>(out: &mut W, text: &str) -> Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "{}", text)?;
    out.reset()?;
    Ok(())
}

fn write_page_footer<W: WriteColor, T>(out: &mut W, page: &Page<T>) -> Result<()> {
    let more = if page.has_next() {
        " (more with --page)"
    } else {
        ""
    };
    out.set_color(ColorSpec::new().set_dimmed(true).set_italic(true))?;
    writeln!(out, "{} of {} total{}", page.results.len(), page.count, more)?;
    out.reset()?;
    Ok(())
}

/// Writes severity counts as "CRITICAL 2  HIGH 5 ...", most severe first
pub fn pp_severity_counts<W: WriteColor>(out: &mut W, counts: &SeverityCounts) -> Result<()> {
    const ORDER: [&str; 5] = ["CRITICAL", "HIGH", "MEDIUM", "LOW", "UNKNOWN"];
    let mut first = true;
    let known = ORDER.iter().map(|s| s.to_string());
    let extra = counts
        .keys()
        .filter(|k| !ORDER.contains(&k.to_uppercase().as_str()))
        .cloned();
    for severity in known.chain(extra) {
        let count = counts
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&severity))
            .map(|(_, v)| *v)
            .unwrap_or(0);
        if count == 0 {
            continue;
        }
        if !first {
            write!(out, "  ")?;
        }
        first = false;
        write_colored(out, severity_color(&severity), &severity)?;
        write!(out, " {}", count)?;
    }
    if first {
        write_dimmed(out, "no findings")?;
    }
    Ok(())
}

pub fn pp_stats<W: WriteColor>(out: &mut W, stats: &Stats) -> Result<()> {
    write_heading(out, "Overview")?;
    writeln!(out, "  repositories     {}", stats.repositories)?;
    writeln!(out, "  images           {}", stats.images)?;
    writeln!(out, "  components       {}", stats.components)?;
    writeln!(out, "  vulnerabilities  {}", stats.vulnerabilities)?;
    Ok(())
}

pub fn pp_repository<W: WriteColor>(out: &mut W, repo: &Repository) -> Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
    write!(out, "{:<40.40}", repo.name)?;
    out.reset()?;
    let status = repo.scan_status.as_str();
    write_colored(out, processing_status_color(status), &format!(" {:<11}", status))?;
    write!(out, " {:>4} tags  ", repo.tag_count)?;
    write_dimmed(out, &repo.uuid)?;
    writeln!(out)?;
    Ok(())
}

pub fn pp_repositories<W: WriteColor>(out: &mut W, page: &Page<Repository>) -> Result<()> {
    for repo in &page.results {
        pp_repository(out, repo)?;
    }
    write_page_footer(out, page)
}

pub fn pp_tag<W: WriteColor>(out: &mut W, tag: &RepositoryTag) -> Result<()> {
    let name = match &tag.repository {
        Some(Related::Object(repo)) => format!("{}:{}", repo.name, tag.tag),
        Some(Related::Id(id)) => format!("#{}:{}", id, tag.tag),
        None => tag.tag.clone(),
    };
    out.set_color(ColorSpec::new().set_bold(true))?;
    write!(out, "{:<48.48}", name)?;
    out.reset()?;
    let status = tag.processing_status.unwrap_or_default();
    write_colored(
        out,
        processing_status_color(status.as_str()),
        &format!(" {:<11}", status.as_str()),
    )?;
    write!(out, " {}  ", format_date(&tag.created_at))?;
    write_dimmed(out, &tag.uuid)?;
    writeln!(out)?;
    Ok(())
}

pub fn pp_tags<W: WriteColor>(out: &mut W, tags: &[RepositoryTag]) -> Result<()> {
    for tag in tags {
        pp_tag(out, tag)?;
    }
    Ok(())
}

pub fn pp_image<W: WriteColor>(out: &mut W, image: &Image) -> Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
    write!(out, "{}", image.name)?;
    out.reset()?;
    write!(out, "  ")?;
    write_dimmed(out, &image.uuid)?;
    writeln!(out)?;

    let status = image.scan_status.as_str();
    write!(out, "  status   ")?;
    write_colored(out, processing_status_color(status), status)?;
    if !image.has_sbom {
        write_dimmed(out, " (no SBOM)")?;
    }
    writeln!(out)?;
    write!(
        out,
        "  findings {} ({} unique, {} fixable)  ",
        image.findings, image.unique_findings, image.fixable_findings
    )?;
    pp_severity_counts(out, &image.severity_counts)?;
    writeln!(out)?;
    writeln!(
        out,
        "  components {} ({} fully fixable)",
        image.components_count, image.fully_fixable_components_count
    )?;
    if let Some(info) = &image.repository_info {
        writeln!(out, "  from     {}:{}", info.repository_name, info.tag)?;
    }
    Ok(())
}

pub fn pp_images<W: WriteColor>(out: &mut W, images: &[Image]) -> Result<()> {
    for image in images {
        pp_image(out, image)?;
    }
    Ok(())
}

pub fn pp_image_page<W: WriteColor>(out: &mut W, page: &Page<Image>) -> Result<()> {
    pp_images(out, &page.results)?;
    write_page_footer(out, page)
}

pub fn pp_vulnerability<W: WriteColor>(out: &mut W, vuln: &Vulnerability) -> Result<()> {
    out.set_color(spec_for(vulnerability_type_color(&vuln.vulnerability_type)).set_bold(true))?;
    write!(out, "{:<22.22}", vuln.vulnerability_id)?;
    out.reset()?;
    write_colored(
        out,
        severity_color(&vuln.severity),
        &format!(" {:<9}", vuln.severity.to_uppercase()),
    )?;
    write!(out, " epss ")?;
    write_colored(out, epss_color(vuln.epss), &format!("{:.3}", vuln.epss))?;
    match (&vuln.fix, vuln.fixable) {
        (Some(fix), _) if !fix.is_empty() => write!(out, "  fix {}", fix)?,
        (_, Some(true)) => write!(out, "  fixable")?,
        _ => {}
    }
    if vuln.cisa_kev {
        write_colored(out, Palette::Error, "  KEV")?;
    }
    if vuln.exploit_available {
        write_colored(out, Palette::Warning, "  exploit")?;
    }
    writeln!(out)?;
    Ok(())
}

pub fn pp_vulnerabilities<W: WriteColor>(out: &mut W, vulns: &[Vulnerability]) -> Result<()> {
    for vuln in vulns {
        pp_vulnerability(out, vuln)?;
    }
    Ok(())
}

pub fn pp_vulnerability_page<W: WriteColor>(out: &mut W, page: &Page<Vulnerability>) -> Result<()> {
    pp_vulnerabilities(out, &page.results)?;
    write_page_footer(out, page)
}

/// Full record of one vulnerability, including enrichment details where the server has them
pub fn pp_vulnerability_detail<W: WriteColor>(out: &mut W, vuln: &Vulnerability) -> Result<()> {
    pp_vulnerability(out, vuln)?;
    if let Some(desc) = &vuln.description {
        writeln!(out, "\n{}\n", desc)?;
    }
    let details = match &vuln.details {
        Some(d) => d,
        None => return Ok(()),
    };
    if let Some(score) = details.cve_details_score {
        writeln!(out, "  CVSS score   {:.1}", score)?;
    }
    if let Some(published) = &details.cve_details_published_date {
        writeln!(out, "  published    {}", format_date(published))?;
    }
    if let Some(score) = details.epss_score {
        let source = details.epss_data_source.as_deref().unwrap_or("");
        write!(out, "  EPSS         ")?;
        write_colored(out, epss_color(score), &format!("{:.3}", score))?;
        if let Some(pct) = details.epss_percentile {
            write!(out, " ({:.1}th percentile)", pct * 100.0)?;
        }
        if !source.is_empty() {
            write_dimmed(out, &format!(" via {}", epss_source_display(source)))?;
        }
        writeln!(out)?;
    }
    if details.cisa_kev_known_exploited {
        write_colored(out, Palette::Error, "  CISA KEV     known exploited")?;
        if let Some(added) = &details.cisa_kev_date_added {
            write!(out, ", added {}", added)?;
        }
        writeln!(out)?;
        if let Some(action) = &details.cisa_kev_required_action {
            writeln!(out, "  action       {}", action)?;
        }
    }
    if details.exploit_db_count > 0 {
        writeln!(
            out,
            "  exploit-db   {} ({} verified)",
            details.exploit_db_count, details.exploit_db_verified_count
        )?;
    }
    for link in details.cve_details_references.iter().flatten() {
        write_dimmed(out, &format!("  {}\n", link))?;
    }
    Ok(())
}

pub fn pp_component<W: WriteColor>(out: &mut W, component: &Component) -> Result<()> {
    write_colored(
        out,
        component_type_color(&component.kind),
        &format!("{:<8}", component.kind),
    )?;
    out.set_color(ColorSpec::new().set_bold(true))?;
    write!(out, " {:<40.40}", component.name)?;
    out.reset()?;
    write!(out, " {:>3} versions  ", component.versions.len())?;
    write_dimmed(out, &component.uuid)?;
    writeln!(out)?;
    Ok(())
}

pub fn pp_components<W: WriteColor>(out: &mut W, page: &Page<Component>) -> Result<()> {
    for component in &page.results {
        pp_component(out, component)?;
    }
    write_page_footer(out, page)
}

pub fn pp_component_version<W: WriteColor>(out: &mut W, cv: &ComponentVersion) -> Result<()> {
    let (kind, name) = match &cv.component {
        Some(c) => (c.kind.as_str(), c.name.as_str()),
        None => ("", ""),
    };
    write_colored(out, component_type_color(kind), &format!("{:<8}", kind))?;
    out.set_color(ColorSpec::new().set_bold(true))?;
    write!(out, " {}@{}", name, cv.version)?;
    out.reset()?;
    let vulns = if cv.vulnerabilities_count > 0 {
        cv.vulnerabilities_count
    } else {
        cv.vulnerabilities.len() as u64
    };
    if vulns > 0 {
        write_colored(out, Palette::Warning, &format!("  {} vulnerabilities", vulns))?;
    }
    write!(out, "  ")?;
    write_dimmed(out, &cv.uuid)?;
    writeln!(out)?;
    Ok(())
}

pub fn pp_component_versions<W: WriteColor>(
    out: &mut W,
    versions: &[ComponentVersion],
) -> Result<()> {
    for cv in versions {
        pp_component_version(out, cv)?;
    }
    Ok(())
}

pub fn pp_registry_repositories<W: WriteColor>(
    out: &mut W,
    listing: &RegistryRepositories,
) -> Result<()> {
    for repo in &listing.repositories {
        out.set_color(ColorSpec::new().set_bold(true))?;
        write!(out, "{:<40.40}", repo.name)?;
        out.reset()?;
        writeln!(out, " {}", repo.url)?;
    }
    if let Some(next) = &listing.pagination.next_page {
        write_dimmed(out, &format!("more: --last {}\n", next))?;
    }
    Ok(())
}

pub fn pp_add_repositories<W: WriteColor>(
    out: &mut W,
    response: &AddRepositoriesResponse,
) -> Result<()> {
    writeln!(out, "{}", response.message)?;
    for result in &response.results {
        let (palette, label) = if result.created {
            (Palette::Success, "added")
        } else {
            (Palette::Grey, "skipped")
        };
        write_colored(out, palette, &format!("  {:<8}", label))?;
        write!(out, " {}", result.repository)?;
        if let Some(msg) = &result.message {
            write_dimmed(out, &format!("  {}", msg))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Notifications go to stderr so they don't mix with JSON or table output on stdout
pub fn pp_notification<W: WriteColor>(out: &mut W, notification: &Notification) -> Result<()> {
    let palette = match notification.level {
        Level::Success => Palette::Success,
        Level::Error => Palette::Error,
        Level::Warning => Palette::Warning,
        Level::Info => Palette::Info,
    };
    out.set_color(spec_for(palette).set_bold(true))?;
    write!(out, "{}:", notification.level)?;
    out.reset()?;
    writeln!(out, " {}", notification.message)?;
    Ok(())
}

#[cfg(test)]
fn render<F: FnOnce(&mut termcolor::Buffer) -> Result<()>>(f: F) -> String {
    let mut buf = termcolor::Buffer::no_color();
    f(&mut buf).unwrap();
    String::from_utf8(buf.into_inner()).unwrap()
}

#[test]
fn test_terminal_color() {
    assert_eq!(terminal_color(Palette::Error), Some(Color::Red));
    assert_eq!(terminal_color(Palette::Warning), Some(Color::Yellow));
    assert_eq!(terminal_color(Palette::Grey), None);
}

#[test]
fn test_pp_severity_counts() {
    let mut counts = SeverityCounts::new();
    counts.insert("LOW".to_string(), 4);
    counts.insert("CRITICAL".to_string(), 1);
    counts.insert("MEDIUM".to_string(), 0);
    counts.insert("Negligible".to_string(), 2);
    assert_eq!(
        render(|b| pp_severity_counts(b, &counts)),
        "CRITICAL 1  LOW 4  Negligible 2"
    );
    assert_eq!(
        render(|b| pp_severity_counts(b, &SeverityCounts::new())),
        "no findings"
    );
}

#[test]
fn test_pp_vulnerability() {
    let vuln: Vulnerability = serde_json::from_value(serde_json::json!({
        "uuid": "v1",
        "vulnerability_id": "CVE-2024-3094",
        "vulnerability_type": "CVE",
        "severity": "critical",
        "epss": 0.85,
        "fix": "5.6.2",
        "cisa_kev": true,
        "created_at": "",
        "updated_at": ""
    }))
    .unwrap();
    let text = render(|b| pp_vulnerability(b, &vuln));
    assert!(text.starts_with("CVE-2024-3094"));
    assert!(text.contains("CRITICAL"));
    assert!(text.contains("epss 0.850"));
    assert!(text.contains("fix 5.6.2"));
    assert!(text.contains("KEV"));
}

#[test]
fn test_pp_notification() {
    let n = Notification {
        id: 1,
        level: Level::Warning,
        message: "Session expired, please log in again".to_string(),
        timeout: std::time::Duration::from_millis(3000),
    };
    assert_eq!(
        render(|b| pp_notification(b, &n)),
        "warning: Session expired, please log in again\n"
    );
}

#[test]
fn test_pp_tag_repository_key() {
    let tag: RepositoryTag = serde_json::from_value(serde_json::json!({
        "uuid": "t1",
        "tag": "1.2",
        "repository": 7,
        "images": [],
        "created_at": "not a date",
        "updated_at": "",
        "vulnerabilities_count": 0,
        "processing_status": "success"
    }))
    .unwrap();
    let line = render(|b| pp_tag(b, &tag));
    assert!(line.starts_with("#7:1.2 "));
    assert!(line.contains(" success "));
    assert!(line.trim_end().ends_with("not a date  t1"));
}
