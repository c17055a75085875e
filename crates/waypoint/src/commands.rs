use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use waypoint_engine::backend::Backend;
use waypoint_engine::config::{ConfigLoader, WaypointConfig};
use waypoint_engine::formatter::format_run;
use waypoint_engine::journey::{Journey, JourneyLoader, LoaderError};
use waypoint_engine::runner::JourneyRunner;
use waypoint_engine::session::SessionManager;
use waypoint_h::HeadlessBackend;

/// Command-line settings layered over the loaded configuration.
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub base_url: Option<String>,
    pub headless: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub artifacts: Option<PathBuf>,
    pub record_video: bool,
    pub json: bool,
}

async fn load_config(options: &RunOptions) -> anyhow::Result<WaypointConfig> {
    let mut config = ConfigLoader::resolve(options.config.as_deref())
        .await
        .context("loading harness configuration")?;

    if let Some(url) = &options.base_url {
        config.target.base_url = Some(url.clone());
        config.target.pinned = true;
    }
    if let Some(headless) = options.headless {
        config.browser.headless = Some(headless);
    }
    if let Some(ms) = options.timeout_ms {
        config.timeouts.journey_timeout_ms = ms;
    }
    if let Some(dir) = &options.artifacts {
        config.artifacts.dir = dir.clone();
    }
    if !options.record_video {
        config.artifacts.record_video = false;
    }
    Ok(config)
}

fn load_journeys(paths: &[PathBuf]) -> anyhow::Result<Vec<Journey>> {
    let mut journeys = Vec::new();
    for path in paths {
        if path.is_dir() {
            let found = JourneyLoader::load_from_dir(path)
                .with_context(|| format!("scanning {}", path.display()))?;
            if found.is_empty() {
                anyhow::bail!("no valid journeys under {}", path.display());
            }
            journeys.extend(found);
        } else {
            let journey = JourneyLoader::load_file(path)
                .with_context(|| format!("loading journey {}", path.display()))?;
            journeys.push(journey);
        }
    }
    Ok(journeys)
}

/// Run every journey in turn; returns whether all of them completed.
pub async fn run(paths: &[PathBuf], options: RunOptions) -> anyhow::Result<bool> {
    let config = load_config(&options).await?;
    let journeys = load_journeys(paths)?;

    let sensitive_fields = config.report.sensitive_fields.clone();
    let sessions =
        SessionManager::new(|| -> Box<dyn Backend> { Box::new(HeadlessBackend::new()) });
    let runner = JourneyRunner::new(sessions, config);

    let mut all_ok = true;
    for journey in &journeys {
        info!("Running journey '{}' ({} steps)", journey.name, journey.steps.len());
        match runner.run(journey).await {
            Ok(report) => {
                all_ok &= report.is_success();
                if options.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{}\n", format_run(&report, &sensitive_fields));
                }
            }
            Err(e) => {
                all_ok = false;
                error!("Journey '{}' did not start: {}", journey.name, e);
                if options.json {
                    println!("{}", serde_json::to_string_pretty(&e)?);
                }
            }
        }
    }

    Ok(all_ok)
}

fn report_file(path: &Path, loaded: Result<Journey, LoaderError>) -> bool {
    match loaded {
        Ok(journey) => {
            println!(
                "ok    {} ({}, {} steps)",
                path.display(),
                journey.name,
                journey.steps.len()
            );
            true
        }
        Err(e) => {
            println!("error {}: {}", path.display(), e);
            false
        }
    }
}

/// Validate journey files without a browser; returns whether all were valid.
pub fn validate(paths: &[PathBuf]) -> bool {
    let mut all_ok = true;
    for path in paths {
        if path.is_dir() {
            match JourneyLoader::scan_dir(path) {
                Ok(files) if files.is_empty() => {
                    println!("error {}: no journey files", path.display());
                    all_ok = false;
                }
                Ok(files) => {
                    for (file, loaded) in files {
                        all_ok &= report_file(&file, loaded);
                    }
                }
                Err(e) => {
                    println!("error {}: {}", path.display(), e);
                    all_ok = false;
                }
            }
        } else {
            all_ok &= report_file(path, JourneyLoader::load_file(path));
        }
    }
    all_ok
}
