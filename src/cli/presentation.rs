//! CLI presentation: text and json formatters for job commands.

use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::dispatcher::DispatcherStats;
use crate::error::EngineError;
use crate::job::{JobRecord, JobStatus};

fn colored_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => format!("{}", status.yellow()),
        JobStatus::Processing => format!("{}", status.cyan()),
        JobStatus::Completed => format!("{}", status.green()),
        JobStatus::Failed => format!("{}", status.red()),
        JobStatus::Cancelled => format!("{}", status.dimmed()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::InvalidInput(format!("Failed to render JSON: {}", e)))
}

pub fn format_job_table(jobs: &[JobRecord], format: &str) -> Result<String, EngineError> {
    if format == "json" {
        return to_json(&jobs);
    }
    if jobs.is_empty() {
        return Ok("No jobs found.".to_string());
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec![
        "ID", "Type", "Status", "Progress", "Step", "Retries", "Created",
    ]);
    for job in jobs {
        table.add_row(vec![
            job.id.to_string(),
            job.job_type.clone(),
            colored_status(job.status),
            format!("{}%", job.progress),
            job.current_step.clone().unwrap_or_else(|| "-".to_string()),
            format!("{}/{}", job.retry_count, job.max_retries),
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_job_detail(job: &JobRecord, format: &str) -> Result<String, EngineError> {
    if format == "json" {
        return to_json(job);
    }

    let mut s = format!(
        "{}\n  ID: {}\n  Type: {}\n  Status: {}\n  Progress: {}%",
        "Job".bold().underline(),
        job.id,
        job.job_type,
        colored_status(job.status),
        job.progress
    );
    if let Some(step) = &job.current_step {
        s.push_str(&format!("\n  Step: {}", step));
    }
    if let Some(user) = &job.user_id {
        s.push_str(&format!("\n  User: {}", user));
    }
    s.push_str(&format!(
        "\n  Retries: {}/{}\n  Created: {}",
        job.retry_count,
        job.max_retries,
        job.created_at.to_rfc3339()
    ));
    if let Some(started) = job.started_at {
        s.push_str(&format!("\n  Started: {}", started.to_rfc3339()));
    }
    if let Some(completed) = job.completed_at {
        s.push_str(&format!("\n  Finished: {}", completed.to_rfc3339()));
    }
    if let Some(err) = &job.error_message {
        s.push_str(&format!("\n  Error: {}", err.red()));
    }
    if let Some(result) = &job.result_data {
        s.push_str(&format!("\n\nResult:\n{}", to_json(result)?));
    }
    Ok(s)
}

pub fn format_dispatcher_summary(stats: &DispatcherStats) -> String {
    format!(
        "Dispatcher stopped:\n  Claimed: {}\n  Completed: {}\n  Failed: {}\n  Retries scheduled: {}\n  Skipped: {}\n  Unrecorded: {}\n  Stale evicted: {}\n  Late finishes: {}",
        stats.claimed,
        stats.completed,
        stats.failed,
        stats.retry_scheduled,
        stats.skipped,
        stats.unrecorded,
        stats.stale_evicted,
        stats.late_finishes
    )
}
