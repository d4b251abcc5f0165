//! Human-readable progress and run summary

use colored::Colorize;
use harvest_core::application::PipelineObserver;
use harvest_core::domain::{Job, JobReport, JobStatus, PipelineReport};
use std::path::Path;
use tabled::{Table, Tabled};

/// Prints one line per job as the pipeline advances
pub struct ProgressPrinter;

impl PipelineObserver for ProgressPrinter {
    fn job_started(&self, index: usize, total: usize, job: &Job) {
        println!(
            "{} [{}/{}] Executing {}",
            "→".cyan().bold(),
            index + 1,
            total,
            job.display_name().bold()
        );
    }

    fn job_finished(&self, _index: usize, _total: usize, report: &JobReport) {
        match &report.status {
            JobStatus::Succeeded => println!(
                "  {} {} artifact(s), {} figure(s) in {}",
                "✓".green(),
                report.moved.len(),
                report.figures_saved.len(),
                format_duration(report.duration_ms)
            ),
            JobStatus::Skipped { reason } => {
                println!("  {} skipped: {}", "⚠".yellow(), reason.to_string().yellow())
            }
            JobStatus::Failed { cause } => println!("  {} {}", "✗".red(), cause.red()),
        }
        for failure in &report.save_failures {
            println!(
                "  {} figure {} not saved: {}",
                "⚠".yellow(),
                failure.figure,
                failure.error
            );
        }
        for failure in &report.move_failures {
            println!(
                "  {} {} left in place: {}",
                "⚠".yellow(),
                failure.source.display(),
                failure.reason
            );
        }
    }
}

#[derive(Tabled)]
pub struct JobRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Output")]
    output: String,
    #[tabled(rename = "Moved")]
    moved: usize,
    #[tabled(rename = "Figures")]
    figures: usize,
    #[tabled(rename = "Problems")]
    problems: usize,
    #[tabled(rename = "Duration")]
    duration: String,
}

impl JobRow {
    pub fn from_report(report: &JobReport, base: &Path) -> Self {
        Self {
            unit: report.job.display_name(),
            status: report.status.to_string(),
            output: relative_to(&report.job.output_dir, base),
            moved: report.moved.len(),
            figures: report.figures_saved.len(),
            problems: report.save_failures.len() + report.move_failures.len(),
            duration: format_duration(report.duration_ms),
        }
    }
}

/// Rows for the planned job table (`harvest jobs`)
#[derive(Tabled)]
pub struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Output")]
    output: String,
    #[tabled(rename = "Present")]
    present: String,
}

pub fn plan_table(jobs: &[Job], base: &Path) -> String {
    let rows: Vec<PlanRow> = jobs
        .iter()
        .enumerate()
        .map(|(i, job)| PlanRow {
            index: i + 1,
            unit: relative_to(&job.source_unit, base),
            kind: job
                .kind()
                .map_or_else(|| "unsupported".to_string(), |k| k.to_string()),
            output: relative_to(&job.output_dir, base),
            present: if job.source_unit.exists() { "yes" } else { "no" }.to_string(),
        })
        .collect();
    Table::new(rows).to_string()
}

pub fn print_summary(report: &PipelineReport, base: &Path) {
    let rows: Vec<JobRow> = report
        .jobs
        .iter()
        .map(|job| JobRow::from_report(job, base))
        .collect();

    println!();
    println!("{}", "Run summary".cyan().bold());
    println!("{}", Table::new(rows));
    println!(
        "  {} succeeded, {} skipped, {} failed, {} artifact(s) moved, {} figure(s) saved",
        report.succeeded().to_string().green(),
        report.skipped().to_string().yellow(),
        report.failed().to_string().red(),
        report.artifacts_moved(),
        report.figures_saved()
    );

    if report.has_failures() {
        println!("{}", "✗ Pipeline finished with failures".red().bold());
    } else {
        println!("{}", "✓ Execution finished, artifacts harvested".green().bold());
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn format_duration(ms: i64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::domain::SkipReason;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(12_340), "12.3s");
    }

    #[test]
    fn test_row_from_report() {
        let base = Path::new("/p");
        let job = Job::new("/p/Scripts/KPI_mine.ipynb", "/p/KPI");
        let report = JobReport::skipped(job, 0, SkipReason::MissingInput);
        let row = JobRow::from_report(&report, base);
        assert_eq!(row.unit, "KPI_mine.ipynb");
        assert_eq!(row.status, "SKIPPED");
        assert_eq!(row.output, "KPI");
        assert_eq!(row.problems, 0);
    }

    #[test]
    fn test_plan_table_lists_every_job() {
        let base = Path::new("/p");
        let jobs = vec![
            Job::new("/p/Scripts/a.ipynb", "/p/KPI"),
            Job::new("/p/Scripts/b.txt", "/p/KPI"),
        ];
        let table = plan_table(&jobs, base);
        assert!(table.contains("Scripts/a.ipynb"));
        assert!(table.contains("unsupported"));
    }
}
