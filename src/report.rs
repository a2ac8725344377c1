use std::{fmt::Write as _, path::Path, time::Duration};

use crate::{config::BenchmarkSummary, error::Result, types::ConsolidatedReport};

const RULE_WIDTH: usize = 80;

/// render_markdown
///
pub fn render_markdown(report: &ConsolidatedReport, summary: &BenchmarkSummary) -> String {
    let mut md = String::new();

    // writing into a String cannot fail
    let _ = write_markdown_to(&mut md, report, summary);
    md
}

fn write_markdown_to(
    md: &mut String,
    r: &ConsolidatedReport,
    summary: &BenchmarkSummary,
) -> std::fmt::Result {
    writeln!(md, "# FaaSKubeBench Benchmark Report\n")?;

    writeln!(md, "## Benchmark\n")?;
    writeln!(md, "| Parameter | Value |")?;
    writeln!(md, "| :--- | :--- |")?;
    writeln!(md, "| Platform | {} |", summary.platform)?;
    writeln!(md, "| Function | {} |", summary.function)?;
    writeln!(md, "| URL | {} |", summary.url)?;
    writeln!(md, "| Workload | {} |", summary.workload)?;
    writeln!(md, "| Requests | {} |", summary.requests)?;
    writeln!(md, "| Concurrency | {} |", summary.concurrency)?;
    writeln!(md, "| Executions | {} |", summary.executions)?;
    writeln!(md, "| hey Arguments | `{}` |", summary.hey_args.join(" "))?;
    for (key, value) in &summary.metadata {
        writeln!(md, "| {key} | {value} |")?;
    }
    writeln!(md)?;

    writeln!(md, "## 1. Load Generator Metrics\n")?;
    writeln!(md, "| Metric | Value |")?;
    writeln!(md, "| :--- | :--- |")?;
    writeln!(md, "| Requests per Second (RPS) | {:.2} |", r.requests_per_second())?;
    writeln!(md, "| Average Latency | {:.4} s |", r.average_latency_seconds())?;
    writeln!(md, "| Tail Latency (p99) | {} |", format_p99(r))?;
    writeln!(md, "| Total Requests | {} |", r.total_requests())?;
    writeln!(md, "| HTTP Error Rate (4xx/5xx) | {} |", format_percent(r.error_rate()))?;
    writeln!(md, "| Total Data Transferred | {} |", format_bytes(r.total_bytes() as f64))?;
    writeln!(
        md,
        "| Initialization Time | {} |",
        format_duration(r.initialization_latency())
    )?;
    writeln!(md, "| Runs Merged | {} |", r.runs_merged())?;

    writeln!(md, "\n## 2. Orchestration Metrics (Kubernetes Exporter)\n")?;
    writeln!(md, "| Metric | Value |")?;
    writeln!(md, "| :--- | :--- |")?;
    writeln!(md, "| Scaled Pods (Difference) | {} |", r.pod_scaling_delta())?;
    writeln!(
        md,
        "| CPU Usage (Cluster Total) | {} |",
        format_millicores(r.cluster_cpu_millicores())
    )?;
    writeln!(
        md,
        "| Memory Usage (Cluster Total) | {} |",
        format_bytes(r.cluster_memory_bytes())
    )?;
    writeln!(md, "| Cold-Started Instances | {} |", r.cold_started_instances())?;

    writeln!(md, "\n## 3. Notes\n")?;
    writeln!(
        md,
        "**Initialization Time** is the mean delay between the benchmark start and the \
         moment each instance provisioned during the run reported its container as `running`. \
         Instances that already existed when the benchmark started are not included."
    )
}

/// write_markdown
///
pub fn write_markdown<P: AsRef<Path>>(
    path: P,
    report: &ConsolidatedReport,
    summary: &BenchmarkSummary,
) -> Result<()> {
    std::fs::write(path.as_ref(), render_markdown(report, summary))?;
    tracing::info!("report written to {}", path.as_ref().display());

    Ok(())
}

/// render_summary
///
/// Plain-text summary for the terminal.
pub fn render_summary(report: &ConsolidatedReport) -> String {
    let mut out = String::new();
    let _ = write_summary_to(&mut out, report);
    out
}

fn write_summary_to(out: &mut String, r: &ConsolidatedReport) -> std::fmt::Result {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);

    writeln!(out, "\n{heavy}")?;
    writeln!(out, "{:^width$}", "FAASKUBEBENCH BENCHMARK REPORT", width = RULE_WIDTH)?;
    writeln!(out, "{heavy}")?;

    writeln!(out, "\n LOAD GENERATOR METRICS")?;
    writeln!(out, "{light}")?;
    writeln!(out, "   Requests per Second (RPS):      {:.2} req/s", r.requests_per_second())?;
    writeln!(
        out,
        "   Average Latency:                {:.4} s ({:.2} ms)",
        r.average_latency_seconds(),
        r.average_latency_seconds() * 1000.0
    )?;
    writeln!(out, "   Tail Latency (p99):             {}", format_p99(r))?;
    writeln!(out, "   Total Requests:                 {}", r.total_requests())?;
    writeln!(out, "   HTTP Error Rate (4xx/5xx):      {}", format_percent(r.error_rate()))?;
    writeln!(
        out,
        "   Total Data Transferred:         {:.2} MB",
        r.total_bytes() as f64 / (1024.0 * 1024.0)
    )?;

    writeln!(out, "\n ORCHESTRATION METRICS")?;
    writeln!(out, "{light}")?;
    writeln!(out, "   Scaled Pods (Difference):       {}", r.pod_scaling_delta())?;
    writeln!(
        out,
        "   CPU Usage (Cluster Total):      {}",
        format_millicores(r.cluster_cpu_millicores())
    )?;
    writeln!(
        out,
        "   Memory Usage (Cluster Total):   {:.2} MB",
        r.cluster_memory_bytes() / (1024.0 * 1024.0)
    )?;
    if let Some(latency) = r.initialization_latency() {
        writeln!(out, "   Initialization Time:            {latency:?}")?;
    }

    writeln!(out, "\n{heavy}")
}

fn format_p99(r: &ConsolidatedReport) -> String {
    if r.p99_available() {
        format!(
            "{:.4} s ({:.2} ms)",
            r.p99_latency_seconds(),
            r.p99_latency_seconds() * 1000.0
        )
    } else {
        "N/A".to_string()
    }
}

fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format!("{duration:?}"),
        None => "N/A".to_string(),
    }
}

fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

fn format_millicores(millicores: f64) -> String {
    format!("{millicores:.2} mCores")
}

/// Binary units, `B` up to `EB`.
fn format_bytes(bytes: f64) -> String {
    const UNIT: f64 = 1024.0;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{bytes:.2} B");
    }

    let mut value = bytes / UNIT;
    let mut exp = 0;
    while value >= UNIT && exp < PREFIXES.len() - 1 {
        value /= UNIT;
        exp += 1;
    }

    format!("{value:.2} {}B", PREFIXES[exp])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consolidate::ConsolidationEngine,
        types::{ClusterMetrics, LatencyPercentile, LoadRunResult},
    };
    use chrono::DateTime;
    use std::collections::{BTreeMap, HashMap};

    fn summary() -> BenchmarkSummary {
        BenchmarkSummary {
            platform: "knative".into(),
            function: "echo".into(),
            url: "http://echo.default.example.com".into(),
            workload: "cpu".into(),
            requests: 10,
            concurrency: 2,
            executions: 1,
            hey_args: vec!["-n".into(), "10".into(), "http://echo.default.example.com".into()],
            metadata: BTreeMap::from([("cluster".into(), "kind-local".into())]),
        }
    }

    fn report() -> ConsolidatedReport {
        let run = LoadRunResult {
            issued_requests: 10,
            total_bytes: 3 * 1024 * 1024,
            requests_per_second: 812.5,
            average_latency_seconds: 0.0125,
            latency_percentiles: vec![LatencyPercentile::new(0.99, 0.05)],
            status_code_counts: HashMap::from([("200".into(), 8), ("500".into(), 2)]),
            ..LoadRunResult::default()
        };
        let cluster = ClusterMetrics {
            cpu_millicores: 1234.5,
            memory_bytes: 512.0 * 1024.0 * 1024.0,
            pod_scaling_delta: 3,
            instance_start_timestamps: HashMap::from([("pod-a".into(), 1002.5)]),
        };

        ConsolidationEngine::default().consolidate(
            &[run],
            &cluster,
            DateTime::from_timestamp(1000, 0).unwrap(),
        )
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&report(), &summary());

        assert!(md.starts_with("# FaaSKubeBench Benchmark Report"));
        assert!(md.contains("| Requests per Second (RPS) | 812.50 |"));
        assert!(md.contains("| Tail Latency (p99) | 0.0500 s (50.00 ms) |"));
        assert!(md.contains("| HTTP Error Rate (4xx/5xx) | 20.00% |"));
        assert!(md.contains("| Total Data Transferred | 3.00 MB |"));
        assert!(md.contains("| Initialization Time | 2.5s |"));
        assert!(md.contains("| Scaled Pods (Difference) | 3 |"));
        assert!(md.contains("| CPU Usage (Cluster Total) | 1234.50 mCores |"));
        assert!(md.contains("| Memory Usage (Cluster Total) | 512.00 MB |"));
    }

    #[test]
    fn test_render_markdown_benchmark_section() {
        let md = render_markdown(&report(), &summary());

        assert!(md.contains("| Function | echo |"));
        assert!(md.contains("| hey Arguments | `-n 10 http://echo.default.example.com` |"));
        assert!(md.contains("| cluster | kind-local |"));
    }

    #[test]
    fn test_render_markdown_without_data() {
        let empty = ConsolidationEngine::default().consolidate(
            &[],
            &ClusterMetrics::default(),
            DateTime::from_timestamp(1000, 0).unwrap(),
        );
        let md = render_markdown(&empty, &BenchmarkSummary::default());

        assert!(md.contains("| Tail Latency (p99) | N/A |"));
        assert!(md.contains("| Initialization Time | N/A |"));
        assert!(md.contains("| Total Data Transferred | 0.00 B |"));
    }

    #[test]
    fn test_render_summary() {
        let summary = render_summary(&report());

        assert!(summary.contains("812.50 req/s"));
        assert!(summary.contains("Initialization Time:            2.5s"));
        assert!(summary.contains("512.00 MB"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0.0), "0.00 B");
        assert_eq!(format_bytes(1023.0), "1023.00 B");
        assert_eq!(format_bytes(1024.0), "1.00 KB");
        assert_eq!(format_bytes(1536.0), "1.50 KB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0 * 1024.0), "5.00 GB");
    }

    #[test]
    fn test_write_markdown() {
        let path = std::env::temp_dir().join(format!(
            "faaskubebench-report-{}.md",
            std::process::id()
        ));

        write_markdown(&path, &report(), &summary()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(written, render_markdown(&report(), &summary()));
    }
}
