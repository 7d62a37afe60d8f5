//! effect-tuner CLI: adjust particle effects with natural language.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;

use effect_tuner::adjust::{Adjuster, Adjustment, PlanPreview};
use effect_tuner::config::TunerConfig;
use effect_tuner::host::{MemoryHost, scene};
use effect_tuner::paths::TunerPaths;
use effect_tuner::registry::ComponentRegistry;
use effect_tuner::schema::{SchemaCatalog, Snapshot};
use effect_tuner::store::ParameterStore;
use effect_tuner::translate::Translator;
use effect_tuner::translate::grammar::ParseWarning;
use effect_tuner::translate::service::{ChatCompletionsService, ReasoningService};
use effect_tuner::validate::Rejection;

#[derive(Parser)]
#[command(
    name = "effect-tuner",
    version,
    about = "Adjust particle effect parameters with natural language"
)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/effect-tuner/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scene file to load effects from (defaults to the built-in presets).
    #[arg(long, global = true)]
    scene: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List effect instances.
    Effects,

    /// Show an effect's parameters and current values.
    Params {
        /// Effect index, as listed by `effects`.
        index: usize,
    },

    /// Describe a change and apply it.
    Adjust {
        /// Effect index, as listed by `effects`.
        index: usize,

        /// What to change, e.g. "make the flame bigger and redder".
        #[arg(required = true, num_args = 1..)]
        instruction: Vec<String>,

        /// Seconds to wait for the reasoning service.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Show the validated plan without applying it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the configuration and credential.
    CheckConfig,

    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ureq=warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Effects => {
            let host = load_host(cli.scene.as_deref())?;
            let registry = ComponentRegistry::new(host);
            let entries = registry.entries();
            if entries.is_empty() {
                println!("No effect instances.");
            } else {
                println!("Effects ({}):", entries.len());
                for entry in &entries {
                    println!("  {}. {} [{}]", entry.index, entry.label, entry.handle);
                }
            }
        }

        Commands::Params { index } => {
            let host = load_host(cli.scene.as_deref())?;
            let registry = ComponentRegistry::new(host.clone());
            let handle = registry.resolve(index)?;
            let catalog = SchemaCatalog::introspect(host.as_ref(), handle)?;
            let snapshot = Snapshot::capture(host.as_ref(), handle, &catalog)?;

            let label = host.label(handle).unwrap_or_else(|| handle.to_string());
            println!("{label} [{handle}] ({} parameters):", snapshot.len());
            for entry in snapshot.entries() {
                let d = &entry.descriptor;
                let range = d.range.map(|r| r.to_string()).unwrap_or_default();
                println!(
                    "  {:<12} {:<8} {:<16} = {}",
                    d.name,
                    d.ty.to_string(),
                    range,
                    entry.value
                );
            }
        }

        Commands::Adjust {
            index,
            instruction,
            timeout_secs,
            dry_run,
        } => {
            let (config, _) = TunerConfig::resolve(cli.config.as_deref())?;
            let host = load_host(cli.scene.as_deref())?;
            let handle = ComponentRegistry::new(host.clone()).resolve(index)?;

            let service = ChatCompletionsService::from_env(config.to_service_config());
            tracing::debug!(model = service.model(), "using reasoning service");
            let translator =
                Translator::new(Arc::new(service), config.service.max_response_bytes);
            let adjuster = Adjuster::new(host, translator);
            let label = adjuster
                .store()
                .label(handle)
                .unwrap_or_else(|| handle.to_string());
            println!("Adjusting {label} [{handle}]");

            let timeout = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.default_timeout());
            let instruction = instruction.join(" ");

            if dry_run {
                let preview = adjuster.plan(handle, &instruction, timeout)?;
                print_preview(&preview);
            } else {
                let adjustment = adjuster.adjust_with_report(handle, &instruction, timeout)?;
                print_adjustment(&adjustment);
            }
        }

        Commands::CheckConfig => {
            let (config, path) = TunerConfig::resolve(cli.config.as_deref())?;
            println!("Config: {}", path.display());
            println!("  base_url:     {}", config.service.base_url);
            println!("  model:        {}", config.service.model);
            println!("  temperature:  {}", config.service.temperature);
            println!("  api_key_env:  {}", config.service.api_key_env);
            println!("  timeout:      {}s", config.adjust.default_timeout_secs);
            let service = ChatCompletionsService::from_env(config.to_service_config());
            let credential = if service.is_available() { "set" } else { "missing" };
            println!("  credential:   {credential}");

            let issues = config.validate();
            if issues.is_empty() {
                println!("OK");
            } else {
                println!("Issues ({}):", issues.len());
                for issue in &issues {
                    println!("  - {issue}");
                }
                miette::bail!("configuration has {} issue(s)", issues.len());
            }
        }

        Commands::InitConfig { force } => {
            let path = match cli.config {
                Some(path) => path,
                None => {
                    let paths = TunerPaths::resolve()?;
                    paths.ensure_dirs()?;
                    paths.config_file()
                }
            };
            if path.exists() && !force {
                miette::bail!(
                    "config file already exists: {} (pass --force to overwrite it)",
                    path.display()
                );
            }
            TunerConfig::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
        }
    }

    Ok(())
}

/// Build the host from `--scene`, the default scene file, or the presets.
fn load_host(scene_path: Option<&Path>) -> Result<Arc<MemoryHost>> {
    let default_scene = TunerPaths::resolve()
        .ok()
        .map(|p| p.default_scene_file())
        .filter(|p| p.exists());

    let host = match scene_path.map(Path::to_path_buf).or(default_scene) {
        Some(path) => {
            let host = MemoryHost::new();
            scene::load(&host, &path)?;
            host
        }
        None => MemoryHost::with_presets()?,
    };
    Ok(Arc::new(host))
}

fn print_adjustment(adjustment: &Adjustment) {
    let result = &adjustment.result;
    if result.applied.is_empty() && !result.is_rolled_back() {
        println!("No changes applied.");
    }
    if !result.applied.is_empty() {
        println!("Applied ({}):", result.applied.len());
        for change in &result.applied {
            let note = if change.clamped { " (clamped)" } else { "" };
            println!("  {}: {} -> {}{note}", change.name, change.old, change.new);
        }
    }
    if result.is_rolled_back() {
        println!("Rolled back ({}):", result.rolled_back.len());
        for change in &result.rolled_back {
            println!("  {}: restored {}", change.name, change.old);
        }
        for name in &result.unreverted {
            println!("  {name}: could not be restored");
        }
    }
    print_rejections(&result.rejected);
    print_notes(&adjustment.warnings, adjustment.explanation.as_deref(), adjustment.truncated);
}

fn print_preview(preview: &PlanPreview) {
    println!("Plan ({} change(s), not applied):", preview.accepted.len());
    for change in &preview.accepted {
        match &change.clamped_from {
            Some(from) => println!("  {} = {} (clamped from {from})", change.name, change.value),
            None => println!("  {} = {}", change.name, change.value),
        }
    }
    print_rejections(&preview.rejected);
    print_notes(&preview.warnings, preview.explanation.as_deref(), preview.truncated);
}

fn print_rejections(rejected: &[Rejection]) {
    if rejected.is_empty() {
        return;
    }
    println!("Rejected ({}):", rejected.len());
    for r in rejected {
        println!("  {}: {}", r.name, r.reason);
    }
}

fn print_notes(warnings: &[ParseWarning], explanation: Option<&str>, truncated: bool) {
    if truncated {
        println!("Note: the service response was truncated.");
    }
    if !warnings.is_empty() {
        println!("Ignored response lines ({}):", warnings.len());
        for w in warnings {
            println!("  {w}");
        }
    }
    if let Some(explanation) = explanation {
        println!("Explanation: {explanation}");
    }
}
