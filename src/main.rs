use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use revlane_core::{Config, RefInfo, Repository, Scope};
use revlane_graph::{
    Ancestry, CommitId, GraphRow, HistoryList, ParseMode, RefSpec, SortOrder, TextRenderer,
    TraversalPlan, TraversalRequest,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "revlane")]
#[command(about = "Commit history with a lane graph", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/revlane/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the history graph
    Log {
        /// Path inside the repository
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Number of commits to show
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Row order
        #[arg(long, value_enum)]
        order: Option<Order>,
        /// Start from local branches only
        #[arg(long)]
        local: bool,
        /// Start from these revisions or ref globs (`refs/heads/*`) instead of the branches
        #[arg(long = "rev")]
        revs: Vec<String>,
        /// Extra `git log` options, passed through as given
        #[arg(long = "filter", allow_hyphen_values = true)]
        filters: Vec<String>,
        /// Skip malformed records instead of failing
        #[arg(long)]
        lenient: bool,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
        /// Limit the history to these paths
        #[arg(last = true)]
        paths: Vec<PathBuf>,
    },
    /// Tell how two commits are related
    Ancestry {
        /// Path inside the repository
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Possible ancestor
        ancestor: String,
        /// Possible descendant
        descendant: String,
    },
    /// Summarize the loaded history
    Stats {
        /// Path inside the repository
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    Topo,
    Time,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Topo => SortOrder::Topo,
            Order::Time => SortOrder::Time,
        }
    }
}

/// Row as printed by `log --json`
#[derive(Serialize)]
struct JsonRow<'a> {
    #[serde(flatten)]
    row: &'a GraphRow,
    refs: Vec<String>,
    on_head_line: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Log {
            path,
            count,
            order,
            local,
            revs,
            filters,
            lenient,
            json,
            paths,
        } => {
            let repo = open(&path)?;
            let scope = if local { Scope::Local } else { config.scope };
            let roots = if revs.is_empty() {
                default_roots(&repo, scope)?
            } else {
                revs.iter()
                    .map(|rev| {
                        repo.root_for(rev)
                            .with_context(|| format!("Unknown revision '{}'", rev))
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            let sort = order.map(SortOrder::from).unwrap_or(config.sort);
            let request = TraversalRequest::new(roots, sort)
                .with_filters(filters)
                .with_paths(paths);

            let mut options = config.traversal_options();
            if lenient {
                options.parse_mode = ParseMode::Lenient;
            }
            if let Some(count) = count {
                options.page_size = count;
            }

            let mut list = HistoryList::new(plan_for(&repo, &config, &request)?, options);
            list.set_head(head_of(&repo)?);
            list.reload().context("Failed to read history")?;
            if !list.is_complete() {
                info!(rows = list.len(), "history truncated, raise --count for more");
            }

            let refs = repo.refs_by_oid()?;
            if json {
                print_json(&list, &refs)?;
            } else {
                print_graph(&list, &refs);
            }
        }
        Commands::Ancestry {
            path,
            ancestor,
            descendant,
        } => {
            let repo = open(&path)?;
            let ancestor = resolve(&repo, &ancestor)?;
            let descendant = resolve(&repo, &descendant)?;

            let roots = vec![
                RefSpec::Literal(ancestor.clone()),
                RefSpec::Literal(descendant.clone()),
            ];
            let request = TraversalRequest::new(roots, SortOrder::Topo);
            let mut list = HistoryList::new(
                plan_for(&repo, &config, &request)?,
                config.traversal_options(),
            );
            list.reload().context("Failed to read history")?;
            list.load_all().context("Failed to read history")?;

            for id in [&ancestor, &descendant] {
                let row = list.row(list.select(id)?).context("row disappeared")?;
                println!(
                    "{} {} {}",
                    id.short(),
                    row.record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    row.record.subject
                );
            }
            let answer = match list.ancestry(&ancestor, &descendant) {
                Ancestry::Yes => "yes",
                Ancestry::No => "no",
                Ancestry::Unknown => "unknown",
            };
            println!("ancestor:    {}", answer);
            println!(
                "same branch: {}",
                if list.same_branch(&ancestor, &descendant) { "yes" } else { "no" }
            );
        }
        Commands::Stats { path } => {
            let repo = open(&path)?;
            let request = TraversalRequest::new(default_roots(&repo, config.scope)?, config.sort);
            let mut list = HistoryList::new(
                plan_for(&repo, &config, &request)?,
                config.traversal_options(),
            );
            list.reload().context("Failed to read history")?;
            list.load_all().context("Failed to read history")?;

            let stats = list.graph().stats();
            println!("Commits:        {}", stats.total_commits);
            println!("Parent edges:   {}", stats.total_edges);
            println!("Merges:         {}", stats.merge_commits);
            println!("Roots:          {}", stats.root_commits);
            println!("Tips:           {}", stats.leaf_commits);
            println!("Not loaded:     {}", stats.boundary_commits);
            println!("Widest row:     {}", list.max_width());
            println!("Open lanes:     {}", list.open_lanes().len());
            let order: Vec<CommitId> = list.rows().iter().map(|row| row.id().clone()).collect();
            match list.graph().verify_topological(&order) {
                Ok(()) => println!("Row order:      topological"),
                Err(violation) => println!(
                    "Row order:      {} listed above its child {}",
                    violation.parent.short(),
                    violation.child.short()
                ),
            }
            if repo.is_detached()? {
                println!("HEAD:           detached");
            }
            if let (Some(newest), Some(oldest)) = (
                list.graph().iter().map(|r| r.timestamp).max(),
                list.graph().iter().map(|r| r.timestamp).min(),
            ) {
                println!(
                    "Span:           {} .. {}",
                    oldest.with_timezone(&Local).format("%Y-%m-%d"),
                    newest.with_timezone(&Local).format("%Y-%m-%d")
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path) -> Result<Repository> {
    Repository::discover(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))
}

fn plan_for(repo: &Repository, config: &Config, request: &TraversalRequest) -> Result<TraversalPlan> {
    let git = revlane_core::locate(config.git_executable.as_deref())?;
    debug!(
        git = %git.display(),
        workdir = %repo.workdir().display(),
        git_dir = %repo.git_dir().display(),
        "using git"
    );
    Ok(TraversalPlan::git(&repo.git_source(git), request))
}

fn head_of(repo: &Repository) -> Result<Option<CommitId>> {
    match repo.head_id()? {
        Some(head) => Ok(Some(CommitId::parse(&head)?)),
        None => Ok(None),
    }
}

/// The scope's refs plus HEAD, which may be detached
fn default_roots(repo: &Repository, scope: Scope) -> Result<Vec<RefSpec>> {
    let mut roots = scope.roots();
    if let Some(head) = head_of(repo)? {
        roots.push(RefSpec::Literal(head));
    }
    Ok(roots)
}

fn resolve(repo: &Repository, revision: &str) -> Result<CommitId> {
    let id = repo
        .resolve(revision)
        .with_context(|| format!("Unknown revision '{}'", revision))?;
    Ok(CommitId::parse(&id)?)
}

fn labels(refs: &HashMap<String, Vec<RefInfo>>, id: &CommitId) -> Vec<String> {
    refs.get(id.as_str())
        .map(|refs| refs.iter().map(RefInfo::label).collect())
        .unwrap_or_default()
}

fn print_graph(list: &HistoryList, refs: &HashMap<String, Vec<RefInfo>>) {
    let renderer = TextRenderer::default();
    let columns = 2 * list.max_width();
    for row in list.rows() {
        for line in renderer.render_row(row, columns, &labels(refs, row.id())) {
            println!("{}", line);
        }
    }
}

fn print_json(list: &HistoryList, refs: &HashMap<String, Vec<RefInfo>>) -> Result<()> {
    let rows: Vec<JsonRow> = list
        .rows()
        .iter()
        .map(|row| JsonRow {
            row,
            refs: labels(refs, row.id()),
            on_head_line: list.is_on_head_line(row.id()),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
