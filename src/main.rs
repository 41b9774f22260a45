use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use content_replace::config::{
    apply_rule_sets, build_failed, load_from_path, load_rule_sets, ApplicationError, ApplyOptions,
    FileResult,
};
use content_replace::{init_tracing, Environment, LogSink, StdoutSink, WorkspaceGuard};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "content-replace")]
#[command(about = "Validated regex search/replace over files as a build step", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply replacement rules to files in a workspace
    Apply {
        /// Path to workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Replacement config to apply (otherwise applies all in replacements/)
        #[arg(short, long)]
        config: Vec<PathBuf>,

        /// Build variable available to templates as ${NAME}
        #[arg(short, long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Refuse to touch files outside the workspace
        #[arg(long)]
        confine: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Evaluate every rule without writing, failing if any file would fail
    Check {
        /// Path to workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Replacement config to check (otherwise checks all in replacements/)
        #[arg(short, long)]
        config: Vec<PathBuf>,

        /// Build variable available to templates as ${NAME}
        #[arg(short, long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
    },

    /// List configured files and their rules
    List {
        /// Path to workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Replacement config to list (otherwise lists all in replacements/)
        #[arg(short, long)]
        config: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

struct RunOptions {
    dry_run: bool,
    diff: bool,
    confine: bool,
    format: OutputFormat,
}

fn main() -> Result<()> {
    init_tracing("warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            config,
            env,
            dry_run,
            diff,
            confine,
            format,
        } => cmd_apply(
            workspace,
            config,
            env,
            RunOptions {
                dry_run,
                diff,
                confine,
                format,
            },
        ),

        Commands::Check {
            workspace,
            config,
            env,
        } => cmd_apply(
            workspace,
            config,
            env,
            RunOptions {
                dry_run: true,
                diff: false,
                confine: false,
                format: OutputFormat::Text,
            },
        ),

        Commands::List { workspace, config } => cmd_list(workspace, config),
    }
}

/// Helper: Discover all .toml replacement configs in a replacements/ directory.
///
/// Discovery order:
/// 1. `<workspace>/replacements`
/// 2. `./replacements` relative to the current working directory
fn discover_config_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_dir = env::current_dir().ok().map(|cwd| cwd.join("replacements"));
    let workspace_dir = workspace.join("replacements");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(workspace_dir)
        .chain(cwd_dir)
        .collect();

    for dir in candidate_dirs {
        if !dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml replacement configs found in either ./replacements or {}/replacements",
        workspace.display()
    )
}

fn config_files(workspace: &Path, explicit: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    if explicit.is_empty() {
        discover_config_files(workspace)
    } else {
        Ok(explicit)
    }
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. CONTENT_REPLACE_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var("CONTENT_REPLACE_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: CONTENT_REPLACE_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Process environment overlaid with `--env` assignments, later wins.
fn build_environment(assignments: &[String]) -> Result<Environment> {
    let mut environment = Environment::from_process();
    for assignment in assignments {
        environment.assign(assignment)?;
    }
    Ok(environment)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (replaced)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    if !modified.ends_with('\n') {
        println!();
    }
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    config: &'a Path,
    file: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a FileResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    workspace: &'a Path,
    dry_run: bool,
    failed: bool,
    files: Vec<JsonEntry<'a>>,
    log: &'a [String],
}

type ConfigResults = (PathBuf, Vec<(PathBuf, Result<FileResult, ApplicationError>)>);

fn cmd_apply(
    workspace: Option<PathBuf>,
    config: Vec<PathBuf>,
    env_args: Vec<String>,
    options: RunOptions,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let config_files = config_files(&workspace, config)?;
    let environment = build_environment(&env_args)?;
    let guard = if options.confine {
        Some(WorkspaceGuard::new(&workspace)?)
    } else {
        None
    };
    let apply_options = ApplyOptions {
        dry_run: options.dry_run,
        guard: guard.as_ref(),
    };
    let text = options.format == OutputFormat::Text;

    if text {
        println!("Workspace: {}", workspace.display());
        if let Some(guard) = &guard {
            println!("Confined to {}", guard.workspace_root().display());
        }
        if options.dry_run {
            println!("{}", "[DRY RUN - no files will be modified]".cyan());
        }
        println!();
    }

    // Build log lines go straight to stdout in text mode and into the
    // report in JSON mode.
    let mut collected: Vec<String> = Vec::new();
    let mut stdout_sink = StdoutSink;
    let sink: &mut dyn LogSink = if text {
        &mut stdout_sink
    } else {
        &mut collected
    };

    let mut config_failures: Vec<(PathBuf, String)> = Vec::new();
    let mut all_results: Vec<ConfigResults> = Vec::new();

    for config_file in config_files {
        if text {
            println!("Loading replacements from {}...", config_file.display());
        }

        let rule_sets = match load_rule_sets(&config_file, &workspace) {
            Ok(rule_sets) => rule_sets,
            Err(e) => {
                if text {
                    eprintln!("{} {}: {:#}", "✗".red(), config_file.display(), e);
                    println!();
                }
                config_failures.push((config_file, format!("{:#}", e)));
                continue;
            }
        };

        let results = apply_rule_sets(&rule_sets, &environment, sink, apply_options);
        if text {
            report_results(&results, &options);
            println!();
        }
        all_results.push((config_file, results));
    }

    let failed = !config_failures.is_empty()
        || all_results.iter().any(|(_, results)| build_failed(results));

    if text {
        print_summary(&all_results, config_failures.len(), options.dry_run);
    } else {
        let mut files = Vec::new();
        for (config, message) in &config_failures {
            files.push(JsonEntry {
                config,
                file: config,
                result: None,
                error: Some(message.clone()),
            });
        }
        for (config, results) in &all_results {
            for (file, result) in results {
                files.push(JsonEntry {
                    config,
                    file,
                    result: result.as_ref().ok(),
                    error: result.as_ref().err().map(ToString::to_string),
                });
            }
        }
        let report = JsonReport {
            workspace: &workspace,
            dry_run: options.dry_run,
            failed,
            files,
            log: &collected,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}

fn report_results(
    results: &[(PathBuf, Result<FileResult, ApplicationError>)],
    options: &RunOptions,
) {
    for (file, result) in results {
        match result {
            Ok(replaced @ FileResult::Replaced { before, after, .. }) => {
                let matches: usize = replaced.outcomes().iter().map(|o| o.match_count).sum();
                let verb = if options.dry_run {
                    "Would replace"
                } else {
                    "Replaced"
                };
                println!(
                    "{} {} {} match(es) in {}",
                    "✓".green(),
                    verb,
                    matches,
                    file.display()
                );
                if options.diff {
                    display_diff(file, before, after);
                }
            }
            Ok(FileResult::Unchanged { .. }) => {
                println!("{} Unchanged {}", "⊙".yellow(), file.display());
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), file.display(), e);

                if let ApplicationError::MatchCountMismatch {
                    expected, actual, ..
                } = e
                {
                    eprintln!(
                        "  {}",
                        format!("CONFLICT: expected {} match(es), found {}", expected, actual)
                            .red()
                    );
                    eprintln!("  The file no longer matches what the rules expect.");
                    eprintln!("  It was left unmodified.");
                }
            }
        }
    }
}

fn print_summary(all_results: &[ConfigResults], config_failures: usize, dry_run: bool) {
    let mut replaced = 0;
    let mut unchanged = 0;
    let mut failed = config_failures;

    for (_, results) in all_results {
        for (_, result) in results {
            match result {
                Ok(FileResult::Replaced { .. }) => replaced += 1,
                Ok(FileResult::Unchanged { .. }) => unchanged += 1,
                Err(_) => failed += 1,
            }
        }
    }

    println!("{}", "Summary:".bold());
    let replaced_label = if dry_run { "would change" } else { "replaced" };
    println!("  {} {}", format!("{}", replaced).green(), replaced_label);
    println!("  {} unchanged", format!("{}", unchanged).yellow());
    println!("  {} failed", format!("{}", failed).red());
}

fn cmd_list(workspace: Option<PathBuf>, config: Vec<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let config_files = config_files(&workspace, config)?;

    for config_file in config_files {
        let config = load_from_path(&config_file)?;

        let title = if config.meta.name.is_empty() {
            config_file.display().to_string()
        } else {
            format!("{} ({})", config.meta.name, config_file.display())
        };
        println!("{}", title.bold());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }

        let rule_sets = config.rule_sets(&workspace)?;
        for rule_set in &rule_sets {
            println!(
                "  {} [{}, {}]",
                rule_set.path().display(),
                rule_set.encoding().name(),
                rule_set.line_separator()
            );
            for (index, rule) in rule_set.rules().iter().enumerate() {
                let count = match rule.expected_matches() {
                    0 => "any".to_string(),
                    n => n.to_string(),
                };
                let verbose = if rule.is_verbose() { ", verbose" } else { "" };
                println!(
                    "    #{} [{}] => [{}] (matches: {}{})",
                    index,
                    rule.pattern(),
                    rule.template().as_str(),
                    count,
                    verbose
                );
                let variables: Vec<&str> = rule.template().variables().collect();
                if !variables.is_empty() {
                    println!("       uses {}", variables.join(", ").dimmed());
                }
            }
        }
        println!();
    }

    Ok(())
}
