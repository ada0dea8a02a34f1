//! Entry point for hwcheck. Parses args, collects one domain and runs the selected mode.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use hwcheck::policy::{self, ConfigError, PolicyFile, Settings};
use hwcheck::ui::{grid, listing};
use hwcheck::{evaluate, Visualization};
use hwcheck_probe::{
    CollectionPass, Domain, ParallelCollector, PingPlan, ProviderChain, ProviderContext, Sampler,
};
use tracing::{debug, info};

const EXIT_VALIDATION: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_FAILURE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    List,
    Visualize,
    Check,
    CreateDefault,
}

#[derive(Debug, PartialEq)]
struct ParsedArgs {
    domain: Domain,
    mode: Mode,
    config: Option<PathBuf>,
    replay: Option<PathBuf>,
    json: bool,
    debug: bool,
    force: bool,
}

#[derive(Debug, PartialEq)]
enum Cli {
    Help(String),
    Run(ParsedArgs),
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} <network|power|ram|fan|bmc> [--list|-l] [--visualize|-v] [--check|-C] [--create-default-config] [--config PATH|-c PATH] [--replay FILE|-r FILE] [--json] [--debug|-d] [--force]"
    )
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Cli, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hwcheck".into());
    let rest: Vec<String> = it.collect();
    if rest.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(Cli::Help(usage(&prog)));
    }

    let mut domain: Option<Domain> = None;
    let mut mode: Option<Mode> = None;
    let mut config: Option<PathBuf> = None;
    let mut replay: Option<PathBuf> = None;
    let mut json = false;
    let mut debug = false;
    let mut force = false;

    let set_mode = |m: Mode, mode: &mut Option<Mode>| -> Result<(), String> {
        match mode {
            Some(prev) if *prev != m => Err(format!(
                "Only one of --list, --visualize, --check, --create-default-config may be given. {}",
                usage(&prog)
            )),
            _ => {
                *mode = Some(m);
                Ok(())
            }
        }
    };

    let mut it = rest.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--list" | "-l" => set_mode(Mode::List, &mut mode)?,
            "--visualize" | "-v" => set_mode(Mode::Visualize, &mut mode)?,
            "--check" | "-C" => set_mode(Mode::Check, &mut mode)?,
            "--create-default-config" => set_mode(Mode::CreateDefault, &mut mode)?,
            "--json" => json = true,
            "--debug" | "-d" => debug = true,
            "--force" => force = true,
            "--config" | "-c" => {
                config = Some(
                    it.next()
                        .ok_or_else(|| format!("--config needs a path. {}", usage(&prog)))?
                        .into(),
                );
            }
            "--replay" | "-r" => {
                replay = Some(
                    it.next()
                        .ok_or_else(|| format!("--replay needs a file. {}", usage(&prog)))?
                        .into(),
                );
            }
            _ if arg.starts_with("--config=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        config = Some(v.into());
                    }
                }
            }
            _ if arg.starts_with("--replay=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        replay = Some(v.into());
                    }
                }
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'. {}", usage(&prog)));
            }
            _ => {
                if domain.is_some() {
                    return Err(format!("Unexpected argument '{arg}'. {}", usage(&prog)));
                }
                domain = Some(arg.parse().map_err(|e| format!("{e}. {}", usage(&prog)))?);
            }
        }
    }

    let domain = domain.ok_or_else(|| format!("Missing domain. {}", usage(&prog)))?;
    Ok(Cli::Run(ParsedArgs {
        domain,
        mode: mode.unwrap_or(Mode::Check),
        config,
        replay,
        json,
        debug,
        force,
    }))
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("HWCHECK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn sampler_for(args: &ParsedArgs, settings: &Settings, ping: Option<PingPlan>) -> Sampler {
    let collector = ParallelCollector::new(
        settings.workers,
        Duration::from_secs(settings.probe_timeout_secs.max(1)),
    );
    let chain = match &args.replay {
        Some(path) => ProviderChain::replay(args.domain, path),
        None => ProviderChain::for_domain(args.domain),
    };
    let sampler = Sampler::new(chain, ProviderContext::system(collector));
    match ping {
        Some(plan) => sampler.with_ping(plan),
        None => sampler,
    }
}

fn ping_plan(policy: &PolicyFile) -> Option<PingPlan> {
    policy.wants_ping().then(|| PingPlan {
        targets: policy.ping_targets.clone(),
        retries: policy.settings.ping_retries,
        count: policy.settings.ping_count,
        ..PingPlan::default()
    })
}

async fn collect(args: &ParsedArgs, policy: Option<&PolicyFile>) -> anyhow::Result<CollectionPass> {
    let settings = policy.map(|p| p.settings.clone()).unwrap_or_default();
    let sampler = sampler_for(args, &settings, policy.and_then(ping_plan));
    let pass = sampler
        .run()
        .await
        .with_context(|| format!("collecting {} data", args.domain))?;
    if args.debug {
        for r in &pass.readings {
            debug!(reading = %serde_json::to_string(r).unwrap_or_default(), "raw");
        }
        for (target, reason) in &pass.probe_failures {
            debug!(%target, %reason, "probe failed");
        }
    }
    Ok(pass)
}

async fn run(args: ParsedArgs) -> anyhow::Result<u8> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| policy::policy_path(args.domain));

    match args.mode {
        Mode::List => {
            let pass = collect(&args, None).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&pass.entities)?);
            } else {
                listing::print_lines(&listing::entity_lines(
                    &pass.entities,
                    listing::color_enabled(),
                ))?;
            }
            Ok(0)
        }
        Mode::CreateDefault => {
            let pass = collect(&args, None).await?;
            let policy = PolicyFile::create_default(args.domain, &pass.entities);
            policy::save(&path, &policy, args.force)?;
            info!(path = %path.display(), requirements = policy.requirements.len(), "policy written");
            println!(
                "Wrote {} requirement(s) for {} entities to {}",
                policy.requirements.len(),
                pass.entities.len(),
                path.display()
            );
            Ok(0)
        }
        Mode::Visualize => {
            let policy = policy::load_optional(&path, args.domain)?;
            let pass = collect(&args, policy.as_ref()).await?;
            let model = match &policy {
                Some(p) => {
                    let run = evaluate(&pass.entities, &p.requirements, &p.settings);
                    grid::GridModel::build(
                        &pass.entities,
                        &p.visualization,
                        &p.required_positions(),
                        &run.position_severity(),
                    )
                }
                None => grid::GridModel::build(
                    &pass.entities,
                    &Visualization::from_entities(&pass.entities),
                    &[],
                    &Default::default(),
                ),
            };
            grid::print_grid(&model)?;
            Ok(0)
        }
        Mode::Check => {
            let policy = policy::load(&path, args.domain)?;
            let pass = collect(&args, Some(&policy)).await?;
            let run = evaluate(&pass.entities, &policy.requirements, &policy.settings);
            info!(domain = %args.domain, status = %run.status, issues = run.issues.len(), "check complete");
            if args.json {
                let host = hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let doc = serde_json::json!({
                    "host": host,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "domain": args.domain,
                    "provider": pass.provider,
                    "status": run.status,
                    "issues": run.issues,
                    "requirements": run.requirements,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                let color = listing::color_enabled();
                listing::print_lines(&listing::issue_lines(&run, color))?;
                println!("{}", listing::summary_line(&run, color));
            }
            Ok(if run.passed() { 0 } else { EXIT_VALIDATION })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(env::args()) {
        Ok(Cli::Help(text)) => {
            println!("{text}");
            return ExitCode::SUCCESS;
        }
        Ok(Cli::Run(a)) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    init_tracing(args.debug);

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            match e.downcast_ref::<ConfigError>() {
                Some(ce) => eprintln!("config error: {ce}"),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
