use std::{process, time::Duration};

use meshworks::{
    application::{
        customizer::parse_scad_variables,
        error::AppError,
        jobs::{QueueConfig, RenderQueue},
        pipeline::{EngineConfig, RenderPipeline},
        profiles::{ProfileStore, estimate_job_cost},
    },
    config,
    domain::{
        error::DomainError,
        jobs::{InputSource, JobOptions, JobRequest, OutputKind, PrintMetadata},
    },
    infra::{
        error::InfraError, profiles::InMemoryProfileStore, storage::StorageLayout, telemetry,
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(
            error = %error,
            classification = %error.presentation_message(),
            chain = ?report.messages,
            "application error"
        );
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Render(args) => run_render(settings, *args).await,
        config::Command::Estimate(args) => run_estimate(settings, args).await,
        config::Command::Variables(args) => run_variables(args).await,
    }
}

#[derive(Debug, Serialize)]
struct RenderOutput<'a> {
    job_id: String,
    output_kind: OutputKind,
    output_path: String,
    #[serde(flatten)]
    result: &'a meshworks::domain::jobs::JobResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    cost: Option<meshworks::domain::profiles::CostBreakdown>,
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let storage = StorageLayout::new(
        settings.storage.design_dir.clone(),
        settings.storage.render_dir.clone(),
    )
    .map_err(InfraError::from)?;
    let profiles = load_profiles(&settings).await?;

    let printer_override = match (args.printer, profiles.as_ref()) {
        (Some(id), Some(store)) => store
            .printer(id)
            .await?
            .ok_or_else(|| DomainError::not_found("printer"))?
            .slice_config_override,
        (Some(_), None) => {
            return Err(AppError::validation(
                "--printer requires a profile store (profiles.path)",
            ));
        }
        (None, _) => None,
    };
    let request = build_request(&args, printer_override).await?;
    let kind = request.output;

    let pipeline = RenderPipeline::new(storage.clone(), EngineConfig::from(&settings.engines));
    let queue = RenderQueue::start(pipeline, QueueConfig::from(&settings.jobs));
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(settings.jobs.wait_timeout);

    let handle = queue.submit(request)?;
    let job_id = handle.id();
    info!(
        target = "meshworks::render",
        job_id = %job_id,
        kind = kind.as_str(),
        timeout_secs = timeout.as_secs(),
        "Job submitted"
    );
    let outcome = queue.await_result(handle, timeout).await;
    queue.shutdown();
    let result = outcome?;

    let cost = match (&result.metadata, profiles.as_ref()) {
        (Some(metadata), Some(store)) if args.filament.is_some() => {
            estimate_job_cost(store, args.printer, args.filament, metadata).await?
        }
        _ => None,
    };

    print_json(&RenderOutput {
        job_id: job_id.to_string(),
        output_kind: kind,
        output_path: storage
            .render_path(&result.output_filename)
            .display()
            .to_string(),
        result: &result,
        cost,
    })
}

async fn run_estimate(settings: config::Settings, args: config::EstimateArgs) -> Result<(), AppError> {
    let store = load_profiles(&settings).await?.ok_or_else(|| {
        AppError::validation("no profile store configured; set profiles.path or pass --profiles")
    })?;

    let metadata = PrintMetadata {
        filament_used: args.filament_used,
        estimated_time: args.estimated_time,
    };
    let breakdown =
        estimate_job_cost(&store, Some(args.printer), Some(args.filament), &metadata).await?;
    print_json(&breakdown)
}

async fn run_variables(args: config::VariablesArgs) -> Result<(), AppError> {
    let source = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(InfraError::from)?;
    print_json(&parse_scad_variables(&source))
}

async fn load_profiles(
    settings: &config::Settings,
) -> Result<Option<InMemoryProfileStore>, AppError> {
    match settings.profiles.path.as_deref() {
        Some(path) => Ok(Some(InMemoryProfileStore::load(path).await?)),
        None => Ok(None),
    }
}

async fn build_request(
    args: &config::RenderArgs,
    printer_override: Option<String>,
) -> Result<JobRequest, AppError> {
    let input = match (&args.scad_file, &args.design, &args.mesh) {
        (Some(path), _, _) => InputSource::Inline(
            tokio::fs::read_to_string(path)
                .await
                .map_err(InfraError::from)?,
        ),
        (None, Some(reference), _) => InputSource::StoredDesign(reference.clone()),
        (None, None, Some(reference)) => InputSource::StoredMesh(reference.clone()),
        (None, None, None) => {
            return Err(AppError::validation(
                "one of --scad-file, --design or --mesh is required",
            ));
        }
    };

    let printer_config = match &args.printer_config {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .map_err(InfraError::from)?,
        ),
        None => printer_override,
    };

    let mut request = JobRequest::new(args.kind, input).with_options(JobOptions {
        camera: args.camera.clone(),
        distance: args.distance,
        color_scheme: args.color_scheme.clone(),
        printer_config,
    });
    for (name, value) in &args.params {
        request = request.with_parameter(name.clone(), value.clone());
    }
    Ok(request)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to serialize output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
