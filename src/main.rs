//! docs-as-code - documentation tooling for S-CORE style projects
//!
//! Schema generation, traceability linking and downstream consumer checks.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, warn};

use docs_as_code::consumer::report::DEFAULT_LOG_FILE;
use docs_as_code::consumer::{
    detect_metamodel_change, generate_report, print_report, replay_log, ConsumerTester, GitSource,
    ProcessRunner, ReportStyle,
};
use docs_as_code::source_links::{cache_filename, load_links, store_links};
use docs_as_code::testlink::{load_test_links, store_test_links};
use docs_as_code::{
    collect_test_reports, compile, current_git_hash, github_base_url, link_needs,
    load_needs, merge_junit, parse_broken_links, resolve_runfiles_dir, run_local_checks,
    scan_tree, write_issue_body, write_link_report, write_schemas, DocsError, LinkTarget,
    MetaModel, NeedLink, ProjectConfig, RealGit, CONFIG_FILE_NAME,
};

/// File test links are cached in, inside the output directory.
const TEST_LINKS_FILE_NAME: &str = "score_testlinks_cache.json";

#[derive(Parser)]
#[command(name = "docs-as-code")]
#[command(version)]
#[command(about = "Documentation tooling: schemas, traceability and consumer checks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the metamodel into schemas.json
    Schema {
        /// Metamodel YAML (defaults to the configured one)
        #[arg(short, long)]
        metamodel: Option<PathBuf>,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit network validation of linked need types
        #[arg(long)]
        network_validation: bool,

        /// Emit ID patterns for regex link constraints
        #[arg(long)]
        link_id_patterns: bool,

        /// Print the schema definitions to stdout instead of writing them
        #[arg(long)]
        stdout: bool,
    },

    /// Run local checks on exported needs
    Check {
        /// needs.json export
        needs: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Exit non-zero when any check reports a finding
        #[arg(long)]
        strict: bool,
    },

    /// Scan sources for requirement tags and cache the result
    SourceLinks {
        /// Cache file (defaults to the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Collect test links from test.xml reports
    TestLinks {
        /// Directory searched for test.xml (defaults to the configured test log dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Cache file (defaults to the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Attach source and test links to needs
    Link {
        /// needs.json export
        needs: PathBuf,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Commit hash to link to (defaults to HEAD)
        #[arg(long)]
        commit: Option<String>,
    },

    /// Turn link checker output into an issue body
    BrokenLinks {
        /// Link checker output file
        log: PathBuf,

        /// Directory the issue body is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Merge JUnit reports into one document
    MergeJunit {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Input reports
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Build the documentation of downstream consumers
    Consumers {
        /// Only test these consumers
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,

        /// Keep clones in this directory instead of a temporary one
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Also test with a git_override to the current commit
        #[arg(long)]
        git_override: bool,

        /// Write the report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Replay a colored consumer test log
    Replay {
        /// Log file
        #[arg(default_value = DEFAULT_LOG_FILE)]
        path: PathBuf,
    },

    /// Print the build runfiles directory
    Runfiles {
        /// Directory of the documentation configuration
        #[arg(long)]
        conf_dir: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration
    Validate,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        "docs_as_code=debug,info"
    } else {
        "docs_as_code=info,warn"
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    match run(cli.command, &project_path, cli.verbose).await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let docs_error = e.downcast_ref::<DocsError>();
            if docs_error.is_some_and(DocsError::is_input_error) {
                eprintln!(
                    "   Check {} and the input files passed on the command line.",
                    CONFIG_FILE_NAME
                );
            }
            std::process::exit(docs_error.map_or(1, DocsError::exit_code));
        }
    }
}

/// Runs one subcommand and returns the process exit code.
///
/// Exiting happens in `main` only, once every work directory owned here has
/// been dropped.
async fn run(command: Commands, project_path: &Path, verbose: bool) -> anyhow::Result<i32> {
    let config = ProjectConfig::load(project_path)?;

    match command {
        Commands::Schema {
            metamodel,
            output,
            network_validation,
            link_id_patterns,
            stdout,
        } => {
            let metamodel_path = metamodel.unwrap_or_else(|| config.metamodel_path(project_path));
            let mut options = config.schema;
            options.network_validation |= network_validation;
            options.link_id_patterns |= link_id_patterns;

            let model = MetaModel::load(&metamodel_path)?;
            let definitions = compile(&model, &options);

            if stdout {
                println!("{}", serde_json::to_string_pretty(&definitions)?);
                return Ok(0);
            }

            let dir = output.unwrap_or_else(|| config.output_path(project_path));
            let written = write_schemas(&dir, &definitions)?;
            println!(
                "{} Wrote {} schemas to {}",
                "OK".green().bold(),
                written.schema_count,
                written.path.display()
            );
            println!("   {} = {}", written.config_key, written.config_value);
        }

        Commands::Check {
            needs,
            json,
            strict,
        } => {
            let model = MetaModel::load(&config.metamodel_path(project_path))?;
            let needs = load_needs(&needs)?;
            let warnings = run_local_checks(&model, &needs);

            if json {
                println!("{}", serde_json::to_string_pretty(&warnings)?);
            } else if warnings.is_empty() {
                println!(
                    "{} {} needs checked, no findings",
                    "OK".green().bold(),
                    needs.len()
                );
            } else {
                for warning in &warnings {
                    println!("{} {}", "Warning:".yellow(), warning);
                }
                println!(
                    "\n{} findings in {} needs",
                    warnings.len().to_string().yellow().bold(),
                    needs.len()
                );
            }

            if strict && !warnings.is_empty() {
                return Ok(1);
            }
        }

        Commands::SourceLinks { output, json } => {
            let links = scan_configured_roots(&config, project_path)?;
            let path = output.unwrap_or_else(|| cache_filename(&config.output_path(project_path)));
            store_links(&path, &links)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else {
                println!(
                    "{} Found {} source links, cached in {}",
                    "OK".green().bold(),
                    links.len(),
                    path.display()
                );
            }
        }

        Commands::TestLinks { dir, output } => {
            let dir = dir.unwrap_or_else(|| config.test_log_path(project_path));
            let report = collect_test_reports(&dir)?;
            for error in &report.errors {
                println!("{} {}", "Warning:".yellow(), error);
            }

            let links = report.test_links();
            let path = output.unwrap_or_else(|| {
                config
                    .output_path(project_path)
                    .join(TEST_LINKS_FILE_NAME)
            });
            store_test_links(&path, &links)?;
            println!(
                "{} {} testcases, {} test links, cached in {}",
                "OK".green().bold(),
                report.cases.len(),
                links.len(),
                path.display()
            );
        }

        Commands::Link {
            needs,
            output,
            commit,
        } => {
            let needs = load_needs(&needs)?;
            let out_dir = output.unwrap_or_else(|| config.output_path(project_path));

            let source_cache = cache_filename(&out_dir);
            let source_links = if source_cache.exists() {
                debug!("Using cached source links from {}", source_cache.display());
                load_links(&source_cache)?
            } else {
                scan_configured_roots(&config, project_path)?
            };

            let test_cache = out_dir.join(TEST_LINKS_FILE_NAME);
            let test_links = if test_cache.exists() {
                load_test_links(&test_cache)?
            } else {
                let test_dir = config.test_log_path(project_path);
                if test_dir.is_dir() {
                    collect_test_reports(&test_dir)?.test_links()
                } else {
                    Vec::new()
                }
            };

            let git = RealGit::new(project_path);
            let base_url = match &config.github_base_url {
                Some(url) => url.clone(),
                None => github_base_url(&git)?,
            };
            let commit = match commit {
                Some(commit) => commit,
                None => current_git_hash(&git)?,
            };
            let target = LinkTarget { base_url, commit };

            let report = link_needs(&needs, &source_links, &test_links, &target, &config.prefixes);
            for warning in &report.warnings {
                println!("{} {}", "Warning:".yellow(), warning);
            }
            let path = write_link_report(&out_dir, &report)?;
            println!(
                "{} Linked {} needs ({} warnings) -> {}",
                "OK".green().bold(),
                report.needs.len(),
                report.warning_count,
                path.display()
            );
        }

        Commands::BrokenLinks { log, output } => {
            if !log.exists() {
                return Err(DocsError::MissingFile { path: log }.into());
            }
            let content = std::fs::read_to_string(&log)?;
            let links = parse_broken_links(&content);
            match write_issue_body(&output, &links)? {
                Some(path) => println!(
                    "{} {} broken links, issue body written to {}",
                    "Warning:".yellow(),
                    links.len(),
                    path.display()
                ),
                None => println!("{} No broken links found", "OK".green().bold()),
            }
        }

        Commands::MergeJunit { output, inputs } => {
            let merged = merge_junit(&inputs, &output)?;
            println!(
                "{} Merged {} reports into {}",
                "OK".green().bold(),
                merged,
                output.display()
            );
        }

        Commands::Consumers {
            only,
            work_dir,
            git_override,
            report,
        } => {
            let consumers: Vec<_> = config
                .consumers
                .iter()
                .filter(|c| only.is_empty() || only.contains(&c.name))
                .cloned()
                .collect();
            if consumers.is_empty() {
                return Err(DocsError::config("No consumers selected").into());
            }
            if which::which("git").is_err() {
                return Err(DocsError::MissingTool { tool: "git".into() }.into());
            }
            if which::which("bazel").is_err() {
                warn!("bazel not found on PATH, consumer builds will fail");
            }

            let local_git = RealGit::new(project_path);
            let metamodel_changed = detect_metamodel_change(&local_git);
            let mut tester = ConsumerTester::new(
                RealGit::new(project_path),
                ProcessRunner::new(),
                project_path,
                work_dir,
            )?
            .with_module_name(&config.module_name)
            .with_metamodel_changed(metamodel_changed);

            if git_override {
                let remote = match &config.github_base_url {
                    Some(url) => format!("{url}.git"),
                    None => format!("{}.git", github_base_url(&local_git)?),
                };
                let commit = current_git_hash(&local_git)?;
                tester = tester.with_git_source(GitSource { remote, commit });
            }

            let results = tester.test_all_consumers(&consumers).await;
            print_report(
                &results,
                ReportStyle {
                    verbose,
                    metamodel_changed,
                },
            );

            let summary = generate_report(&results);
            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
                println!("{} Report written to {}", "OK".green().bold(), path.display());
            }
            if !summary.all_passed() {
                return Ok(1);
            }
        }

        Commands::Replay { path } => {
            let path = if path.is_absolute() {
                path
            } else {
                project_path.join(path)
            };
            let mut stdout = std::io::stdout().lock();
            replay_log(&path, &mut stdout)?;
        }

        Commands::Runfiles { conf_dir } => {
            let conf_dir = conf_dir.unwrap_or_else(|| project_path.to_path_buf());
            let dir = resolve_runfiles_dir(&conf_dir)?;
            println!("{}", dir.display());
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    println!("\n{} Project Configuration", "Config:".cyan().bold());
                    println!("{}", "─".repeat(40));
                    println!("   Metamodel: {}", config.metamodel.display());
                    println!("   Output dir: {}", config.output_dir.display());
                    println!(
                        "   Network validation: {}",
                        config.schema.network_validation
                    );
                    println!("   Link ID patterns: {}", config.schema.link_id_patterns);
                    println!(
                        "   Source roots: {}",
                        config
                            .source
                            .roots
                            .iter()
                            .map(|r| r.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    println!("   Need ID prefixes: {}", config.prefixes.join(", "));
                    println!("   Test log dir: {}", config.test_log_dir.display());
                    println!("   Module name: {}", config.module_name);
                    println!("   Consumers: {}", config.consumers.len());
                }
            }

            ConfigAction::Validate => {
                let config_path = ProjectConfig::config_path(project_path);
                if config_path.exists() {
                    println!("{} {} parsed", "OK".green(), config_path.display());
                } else {
                    println!(
                        "{} {} not found (using defaults)",
                        "Info:".blue(),
                        config_path.display()
                    );
                }

                let report = config.validate(project_path);
                for warning in &report.warnings {
                    println!("{} {}", "Warning:".yellow(), warning);
                }
                for error in &report.errors {
                    eprintln!("{} {}", "Error:".red(), error);
                }
                if report.is_valid() {
                    println!("{} Configuration is valid", "OK".green().bold());
                } else {
                    return Ok(report.exit_code());
                }
            }
        },
    }

    Ok(0)
}

/// Scan every configured source root. Files are reported relative to the
/// project directory.
fn scan_configured_roots(
    config: &ProjectConfig,
    project_path: &Path,
) -> docs_as_code::Result<Vec<NeedLink>> {
    let mut links = Vec::new();
    for root in &config.source.roots {
        let dir = ProjectConfig::resolve(project_path, root);
        if !dir.is_dir() {
            warn!("Source root {} does not exist, skipping", dir.display());
            continue;
        }
        let prefix = dir.strip_prefix(project_path).unwrap_or(root).to_path_buf();
        links.extend(scan_tree(&dir, &config.source.scan)?.into_iter().map(|mut link| {
            link.file = prefix.join(&link.file);
            link
        }));
    }
    Ok(links)
}
