use crate::infra::{default_stage_registry, parse_date, start_of_day};
use admissions::config::AppConfig;
use admissions::error::AppError;
use admissions::workflows::admissions::{
    AdmissionsWorkflow, ApplicationId, FixedClock, InMemoryApplicationRepository,
    InMemoryPaymentLedger, NewApplication, PaymentOutcome, PaymentRequestStatus, PaymentStatus,
    WorkflowError,
};
use admissions::workflows::startups::{
    current_split, endangered, inactive_last_week, Startup, StartupFilter,
};
use chrono::{NaiveDate, Utc};
use clap::Args;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

type DemoWorkflow = AdmissionsWorkflow<InMemoryApplicationRepository, InMemoryPaymentLedger>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the walkthrough runs on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Team size declared on the demo application.
    #[arg(long, default_value_t = 2)]
    pub(crate) team_size: u8,
}

#[derive(Args, Debug)]
pub(crate) struct StartupActivityArgs {
    /// JSON array of startups with their karma history
    pub(crate) input: PathBuf,
    /// Reporting date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Only report startups carrying this tag
    #[arg(long)]
    pub(crate) tag: Option<String>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { today, team_size } = args;
    let now = today.map(start_of_day).unwrap_or_else(Utc::now);

    let registry = Arc::new(default_stage_registry(now)?);
    let clock = Arc::new(FixedClock::new(now));
    let workflow: DemoWorkflow = AdmissionsWorkflow::with_clock(
        registry.clone(),
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryPaymentLedger::default()),
        clock,
    );

    println!("Batch admissions demo ({})", now.date_naive());
    println!("Stages");
    for stage in registry.stages() {
        let window = match (stage.starts_at, stage.ends_at) {
            (Some(start), Some(end)) => format!("{} -> {}", start.date_naive(), end.date_naive()),
            (Some(start), None) => format!("from {}", start.date_naive()),
            (None, Some(end)) => format!("until {}", end.date_naive()),
            (None, None) => "always open".to_string(),
        };
        println!("- {} {}: {}", stage.number, stage.name, window);
    }

    let record = workflow.create_application(NewApplication {
        batch: "demo-batch".to_string(),
        team_lead_name: "Asha Lead".to_string(),
        team_lead_email: "asha@example.com".to_string(),
        team_size,
        college: Some("College of Engineering".to_string()),
    })?;
    let id = record.id().clone();
    println!("\nCreated application {} for a team of {}", id, team_size);
    print_state(&workflow, &id)?;

    let failed = PaymentOutcome {
        request_status: PaymentRequestStatus::Failed,
        payment_status: Some(PaymentStatus::Failed),
    };
    let payment = workflow.record_payment(&id, &record.team_lead.id, failed)?;
    println!("Payment {} failed at the gateway", payment.id.0);
    print_state(&workflow, &id)?;

    let payment = workflow.record_payment(&id, &record.team_lead.id, PaymentOutcome::credited())?;
    println!("Payment {} credited", payment.id.0);
    print_state(&workflow, &id)?;

    let payload = coding_payload();
    if team_size > 1 {
        report_rejection(workflow.submit(&id, 2, &payload));
        for index in 1..team_size {
            workflow.add_cofounder(
                &id,
                &format!("Cofounder {index}"),
                &format!("cofounder{index}@example.com"),
            )?;
        }
        println!("Added {} cofounder(s)", team_size - 1);
        print_state(&workflow, &id)?;
    }

    let mut incomplete = payload.clone();
    incomplete.remove("git_repo_url");
    incomplete.insert("video_url".to_string(), "not a url".to_string());
    report_rejection(workflow.submit(&id, 2, &incomplete));

    let accepted = workflow.submit(&id, 2, &payload)?;
    println!(
        "Stage {} submission {} accepted",
        accepted.stage_number, accepted.submission.id.0
    );
    print_state(&workflow, &id)?;

    workflow.redo_submission(&id, 2)?;
    println!("Submission withdrawn for a redo");
    print_state(&workflow, &id)?;
    workflow.submit(&id, 2, &payload)?;

    workflow.mark_advanced(&id)?;
    workflow.advance(&id)?;
    println!("Reviewer advanced the team");
    print_state(&workflow, &id)?;
    report_rejection(workflow.submit(&id, 3, &BTreeMap::new()));

    let view = workflow.get(&id)?.status_view();
    match serde_json::to_string_pretty(&view) {
        Ok(json) => println!("\nPublic status payload:\n{}", json),
        Err(err) => println!("\nPublic status payload unavailable: {}", err),
    }

    Ok(())
}

pub(crate) fn run_startup_activity(args: StartupActivityArgs) -> Result<(), AppError> {
    let StartupActivityArgs { input, date, tag } = args;
    let windows = AppConfig::load()?.admissions.activity_windows();
    let now = date.map(start_of_day).unwrap_or_else(Utc::now);

    let reader = BufReader::new(File::open(&input)?);
    let mut startups: Vec<Startup> = serde_json::from_reader(reader)?;
    if let Some(tag) = tag {
        startups = StartupFilter::default()
            .tagged(tag)
            .apply(&startups)
            .into_iter()
            .cloned()
            .collect();
    }

    let (start, end) = windows.week_containing(now - chrono::Duration::weeks(1));
    println!("Startup activity report ({})", now.date_naive());
    println!("Last week: {} -> {}", start, end);

    print_startups("Inactive last week", &inactive_last_week(&startups, now, &windows));
    print_startups(
        &format!("Endangered (no karma in {} weeks)", windows.endangered_weeks),
        &endangered(&startups, now, &windows),
    );

    let split = current_split(&startups);
    println!(
        "\nSplit: {} approved | {} dropped out",
        split.approved, split.dropped_out
    );
    Ok(())
}

fn print_startups(heading: &str, startups: &[&Startup]) {
    if startups.is_empty() {
        println!("\n{}: none", heading);
        return;
    }
    println!("\n{}", heading);
    for startup in startups {
        println!(
            "- {} (level {}, /{})",
            startup.display_name(),
            startup.level_number,
            startup.slug
        );
    }
}

fn print_state(workflow: &DemoWorkflow, id: &ApplicationId) -> Result<(), AppError> {
    let record = workflow.get(id)?;
    println!(
        "  -> stage {} | {}",
        record.application.stage_number,
        record.application.state.label()
    );
    Ok(())
}

fn report_rejection<T>(result: Result<T, WorkflowError>) {
    match result {
        Ok(_) => println!("  Unexpectedly accepted"),
        Err(WorkflowError::Validation(err)) => {
            println!("  Rejected:");
            for (field, issue) in &err.field_errors {
                println!("    - {}: {}", field, issue.label());
            }
        }
        Err(err) => println!("  Rejected: {}", err),
    }
}

fn coding_payload() -> BTreeMap<String, String> {
    [
        ("git_repo_url", "https://github.com/demo/app"),
        ("app_type", "website"),
        ("website", "demo.example.com"),
        ("video_url", "https://facebook.com/demo/videos/pitch"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}
