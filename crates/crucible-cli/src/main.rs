use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use crucible_campaign::{CampaignConfig, CampaignError, CampaignOrchestrator, CampaignReport, ProcessAgent};
use crucible_model::{CampaignStatus, Scenario, SkillDocument};
use crucible_store::{JsonDirStore, MemoryStore, PersistentStore, ScenarioCatalog, SkillVersionStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_ABANDONED: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

fn cli() -> Command {
    Command::new("crucible")
        .version(crucible_campaign::VERSION)
        .about("Pressure-test skill documents until they hold")
        .subcommand_required(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("validate")
                .about("Check every scenario file in a directory")
                .arg(
                    Arg::new("scenarios")
                        .long("scenarios")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of *.json scenarios"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run a campaign against an agent command")
                .arg(
                    Arg::new("skill")
                        .long("skill")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Skill document (markdown with frontmatter)"),
                )
                .arg(
                    Arg::new("scenarios")
                        .long("scenarios")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of *.json scenarios"),
                )
                .arg(
                    Arg::new("agent")
                        .long("agent")
                        .required(true)
                        .help("Agent command; document and scenario arrive on stdin"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Campaign configuration (TOML)"),
                )
                .arg(
                    Arg::new("store")
                        .long("store")
                        .value_parser(value_parser!(PathBuf))
                        .help("Persist records under this directory (default: in memory)"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_parser(value_parser!(PathBuf))
                        .help("Export the campaign report here"),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Verify a campaign report and print its summary")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Report file"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    let outcome = match matches.subcommand() {
        Some(("validate", args)) => validate(args),
        Some(("run", args)) => run(args).await,
        Some(("report", args)) => report(args),
        _ => Ok(0),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn validate(args: &ArgMatches) -> Result<i32> {
    let dir = required_path(args, "scenarios")?;
    let loaded = load_scenarios(dir)?;
    for scenario in &loaded.valid {
        println!(
            "ok       {} ({} pressures, {} options)",
            scenario.id(),
            scenario.pressure_count(),
            scenario.options().len()
        );
    }
    for (path, reason) in &loaded.invalid {
        println!("invalid  {}: {reason}", path.display());
    }
    println!();
    println!("{} valid, {} invalid", loaded.valid.len(), loaded.invalid.len());
    Ok(i32::from(!loaded.invalid.is_empty()))
}

async fn run(args: &ArgMatches) -> Result<i32> {
    let skill_path = required_path(args, "skill")?;
    let source = std::fs::read_to_string(skill_path)
        .with_context(|| format!("reading skill document {}", skill_path.display()))?;
    let document = SkillDocument::from_markdown(&source)
        .with_context(|| format!("parsing skill document {}", skill_path.display()))?;

    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => CampaignConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CampaignConfig::default(),
    };
    if let Some(path) = args.get_one::<PathBuf>("report") {
        config = config.with_report_path(path);
    }

    let command = args
        .get_one::<String>("agent")
        .map(String::as_str)
        .unwrap_or_default();
    let Some(agent) = ProcessAgent::from_command_line(command) else {
        bail!("--agent must name a command");
    };

    let store: Arc<dyn PersistentStore> = match args.get_one::<PathBuf>("store") {
        Some(root) => Arc::new(JsonDirStore::open(root).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let catalog = Arc::new(ScenarioCatalog::load(store.clone()).await?);
    let loaded = load_scenarios(required_path(args, "scenarios")?)?;
    for (path, reason) in &loaded.invalid {
        tracing::warn!(path = %path.display(), %reason, "skipping invalid scenario");
    }
    for scenario in loaded.valid {
        if catalog.get(scenario.id()).is_none() {
            catalog.add(scenario).await?;
        }
    }

    let skill = document.skill().clone();
    let versions = Arc::new(SkillVersionStore::new(store.clone()));
    match versions.load(&skill).await {
        Ok(head) => tracing::info!(%skill, version = head.version(), "continuing stored version chain"),
        Err(StoreError::UnknownSkill(_)) => {
            versions.init(document).await?;
        }
        Err(err) => return Err(err.into()),
    }

    let mut orchestrator = CampaignOrchestrator::new(config, store, catalog, versions, Arc::new(agent))?;
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current pass");
            cancel.cancel();
        }
    });

    let campaign = match orchestrator.run(&skill).await {
        Ok(campaign) => campaign,
        Err(CampaignError::Cancelled(partial)) => {
            println!("{}", orchestrator.report(&partial)?.render_text());
            return Ok(EXIT_CANCELLED);
        }
        Err(err) => return Err(err.into()),
    };

    println!("{}", orchestrator.report(&campaign)?.render_text());
    Ok(match campaign.status {
        CampaignStatus::Abandoned(_) => EXIT_ABANDONED,
        CampaignStatus::Bulletproof { .. } | CampaignStatus::Running => 0,
    })
}

fn report(args: &ArgMatches) -> Result<i32> {
    let path = required_path(args, "path")?;
    let report = CampaignReport::load(path).with_context(|| format!("loading report {}", path.display()))?;
    println!("{}", report.render_text());
    Ok(0)
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("--{name} is required"))
}

#[derive(Debug, Default)]
struct LoadedScenarios {
    valid: Vec<Scenario>,
    invalid: Vec<(PathBuf, String)>,
}

/// Parse every `*.json` file in `dir`, in file-name order
fn load_scenarios(dir: &Path) -> Result<LoadedScenarios> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading scenario directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut loaded = LoadedScenarios::default();
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Scenario>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(scenario) => loaded.valid.push(scenario),
            Err(reason) => loaded.invalid.push((path, reason)),
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "id": "prod-hotfix",
        "description": "Production is down. The fix is written but untested.",
        "pressure_set": ["time", "authority"],
        "options": [
            {"label": "A", "text": "Write the failing test first"},
            {"label": "B", "text": "Ship the fix now"}
        ],
        "compliant_option": "A"
    }"#;

    #[test]
    fn loads_valid_and_reports_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), VALID).unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            VALID.replace("\"compliant_option\": \"A\"", "\"compliant_option\": \"Z\""),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_scenarios(dir.path()).unwrap();
        assert_eq!(loaded.valid.len(), 1);
        assert_eq!(loaded.valid[0].pressure_count(), 2);
        assert_eq!(loaded.invalid.len(), 1);
        assert!(loaded.invalid[0].0.ends_with("b.json"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(load_scenarios(Path::new("/nonexistent/crucible/scenarios")).is_err());
    }

    #[test]
    fn run_requires_agent() {
        let result = cli().try_get_matches_from(["crucible", "run", "--skill", "s.md", "--scenarios", "dir"]);
        assert!(result.is_err());
    }

    #[test]
    fn json_flag_is_global() {
        let matches = cli()
            .try_get_matches_from(["crucible", "report", "r.json", "--json"])
            .unwrap();
        assert!(matches.get_flag("json"));
    }
}
