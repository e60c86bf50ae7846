use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::auth::Token;
use crate::config::Config;
use crate::error::RefsError;
use crate::governor::RatePolicy;
use crate::output::{print_create_summary, print_fetch_summary, PhaseProgress};
use crate::providers::github::{GitHubClient, GitHubRepo, DEFAULT_API_URL};
use crate::providers::gitlab::{
    parse_repo_path, resolve_base_url, FetchStats, GitLabClient, MergeRequestFetcher,
};
use crate::refs_file::{generate_filename, read_refs_file, RefRecord, RefsFileSink};

const FETCH_LONG_ABOUT: &str = "\
Fetch all merge request references from a GitLab repository and write them to a CSV file.

The repository can be specified in various formats:
- Full URL: https://gitlab.com/group/project
- Group/project: group/project
- Nested groups: group/subgroup/project or group/subgroup/subgroup/project

The output CSV file contains two columns and no header:
1. Merge request number (IID)
2. Head SHA from diff_refs

Examples:
  gl-create-refs fetch-refs --repository group/project
  gl-create-refs fetch-refs --repository https://gitlab.example.com/group/subgroup/project
  gl-create-refs fetch-refs -r group/subgroup/subgroup/project";

const CREATE_LONG_ABOUT: &str = "\
Create a branch named migration-pr-<IID> on a GitHub repository for every merge request
reference, pointing at the merge request's head SHA.

References are read from a CSV file produced by fetch-refs, or fetched live with --fetch.

Examples:
  gl-create-refs create-refs -r group/project -g octo-org/project -i group-project.csv
  gl-create-refs create-refs -r group/project -g octo-org/project --fetch";

#[derive(Parser)]
#[command(name = "gl-create-refs")]
#[command(author, version, about = "Export GitLab merge request refs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ./gl-create-refs.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch merge request references from a GitLab repository
    #[command(long_about = FETCH_LONG_ABOUT)]
    FetchRefs(FetchArgs),

    /// Create GitHub branches from merge request references
    #[command(long_about = CREATE_LONG_ABOUT)]
    CreateRefs(CreateArgs),
}

#[derive(Args)]
struct GitLabArgs {
    /// GitLab access token
    #[arg(short, long, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitLab base URL (default: https://gitlab.com)
    #[arg(short, long)]
    base_url: Option<String>,
}

#[derive(Args)]
struct FetchArgs {
    /// GitLab repository path or URL
    #[arg(short, long)]
    repository: String,

    #[command(flatten)]
    gitlab: GitLabArgs,

    /// Output CSV file path (default: derived from the repository name)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CreateArgs {
    /// GitLab repository path or URL
    #[arg(short, long)]
    repository: Option<String>,

    /// Target GitHub repository (owner/repo)
    #[arg(short, long)]
    github_repo: String,

    /// CSV file produced by fetch-refs
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Fetch references from GitLab instead of reading a file
    #[arg(long, default_value_t = false)]
    fetch: bool,

    #[command(flatten)]
    gitlab: GitLabArgs,

    /// GitHub access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub API base URL (default: https://api.github.com)
    #[arg(long)]
    github_url: Option<String>,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::FetchRefs(args) => execute_fetch_refs(args, &config).await,
            Commands::CreateRefs(args) => execute_create_refs(args, &config).await,
        }
    }
}

fn validate_create_refs(repository: Option<&str>, fetch: bool, input: Option<&Path>) -> Result<()> {
    if repository.is_none_or(str::is_empty) {
        bail!("--repository is required");
    }
    if !fetch && input.is_none_or(|path| path.as_os_str().is_empty()) {
        bail!("--input is required unless --fetch is used");
    }
    Ok(())
}

fn default_output_path(repository: &str, config: &Config) -> PathBuf {
    let filename = generate_filename(repository);
    match &config.output.directory {
        Some(dir) => dir.join(filename),
        None => PathBuf::from(filename),
    }
}

/// Turns fetch failures into messages an operator can act on.
fn explain_fetch_error(err: RefsError, project_path: &str) -> anyhow::Error {
    match err.status() {
        Some(404) => anyhow!(
            "repository not found: {project_path}. Please check the repository path and your access permissions"
        ),
        Some(401 | 403) => anyhow!(
            "authentication failed: please check your GitLab token has access to repository {project_path}"
        ),
        _ => anyhow::Error::new(err).context(format!(
            "failed to fetch merge request references from {project_path}"
        )),
    }
}

/// GitLab connection details resolved from flags, environment and config.
struct GitLabTarget {
    client: GitLabClient,
    project_path: String,
}

fn gitlab_target(repository: &str, args: &GitLabArgs, config: &Config) -> Result<GitLabTarget> {
    let repo = parse_repo_path(repository).context("failed to parse repository path")?;

    let explicit_base = args.base_url.as_deref().or(config.gitlab.base_url.as_deref());
    let base_url = resolve_base_url(explicit_base, repo.base_url.as_deref());

    let token = args
        .token
        .as_deref()
        .or(config.gitlab.token.as_deref())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "GitLab token is required. Use --token flag or set GITLAB_TOKEN environment variable"
            )
        })?;

    let client = GitLabClient::new(&base_url, Some(Token::from(token)))
        .context("failed to create GitLab client")?;
    info!("Using GitLab API at {}", client.api_url());

    Ok(GitLabTarget {
        client,
        project_path: repo.project_path,
    })
}

/// Runs the fetch pipeline into `sink`, with a spinner.
async fn fetch_into_file(
    target: &GitLabTarget,
    policy: RatePolicy,
    sink: &mut RefsFileSink,
    progress: &PhaseProgress,
) -> std::result::Result<FetchStats, RefsError> {
    let mut fetcher = MergeRequestFetcher::new(&target.client, policy);
    let result = fetcher
        .fetch(&target.project_path, |mr_ref| {
            sink.write(&mr_ref)?;
            progress.update(format!("{} refs, last !{}", sink.written(), mr_ref.iid));
            Ok::<_, std::io::Error>(())
        })
        .await;

    let governor = fetcher.governor();
    debug!(
        "Rate governor finished in {:?} tier, spacing {:?}",
        governor.tier(),
        governor.min_interval()
    );
    result
}

async fn execute_fetch_refs(args: &FetchArgs, config: &Config) -> Result<()> {
    let target = gitlab_target(&args.repository, &args.gitlab, config)?;
    let policy = config.rate_limit.policy()?;

    let output = match &args.output {
        Some(path) => path.clone(),
        None => default_output_path(&args.repository, config),
    };
    let output = std::path::absolute(&output)
        .with_context(|| format!("failed to resolve output path {}", output.display()))?;

    info!("Fetching merge requests from {}", target.project_path);
    let progress = PhaseProgress::start(format!(
        "Phase 1/1: Fetching merge requests from {}",
        target.project_path
    ));

    let mut sink = RefsFileSink::new(&output);
    let stats = match fetch_into_file(&target, policy, &mut sink, &progress).await {
        Ok(stats) => stats,
        Err(err) => {
            progress.fail();
            return Err(explain_fetch_error(err, &target.project_path));
        }
    };
    progress.finish("Phase 1/1: Fetched merge requests");

    info!(
        "Exported {} of {} merge requests to {}",
        stats.emitted,
        stats.visited,
        output.display()
    );
    let written = (sink.written() > 0).then_some(output.as_path());
    print_fetch_summary(&target.project_path, &stats, written);

    Ok(())
}

async fn execute_create_refs(args: &CreateArgs, config: &Config) -> Result<()> {
    validate_create_refs(args.repository.as_deref(), args.fetch, args.input.as_deref())?;
    let repository = args.repository.as_deref().unwrap_or_default();

    let github_repo = GitHubRepo::parse(&args.github_repo)?;
    let github_token = args
        .github_token
        .as_deref()
        .or(config.github.token.as_deref())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "GitHub token is required. Use --github-token flag or set GITHUB_TOKEN environment variable"
            )
        })?;
    let policy = config.rate_limit.policy()?;

    let (records, progress) = if args.fetch {
        let target = gitlab_target(repository, &args.gitlab, config)?;
        let progress = PhaseProgress::start(format!(
            "Phase 1/2: Fetching merge requests from {}",
            target.project_path
        ));

        // With --input the fetched refs are also kept on disk, so a failed
        // branch run can be resumed from the file.
        let fetched: Result<Vec<RefRecord>> = match &args.input {
            Some(output) => {
                let mut sink = RefsFileSink::new(output);
                match fetch_into_file(&target, policy.clone(), &mut sink, &progress).await {
                    Ok(_) if sink.written() > 0 => read_refs_file(output).map_err(Into::into),
                    Ok(_) => Ok(Vec::new()),
                    Err(err) => Err(explain_fetch_error(err, &target.project_path)),
                }
            }
            None => MergeRequestFetcher::new(&target.client, policy.clone())
                .collect(&target.project_path)
                .await
                .map(|refs| refs.into_iter().map(RefRecord::from).collect())
                .map_err(|err| explain_fetch_error(err, &target.project_path)),
        };
        let records = match fetched {
            Ok(records) => records,
            Err(err) => {
                progress.fail();
                return Err(err);
            }
        };

        let progress = progress.next(
            "Phase 1/2: Fetched merge requests",
            format!("Phase 2/2: Creating branches in {github_repo}"),
        );
        (records, progress)
    } else {
        let input = args.input.as_deref().unwrap_or(Path::new(""));
        let records = read_refs_file(input)
            .with_context(|| format!("failed to read refs file {}", input.display()))?;
        let progress =
            PhaseProgress::start(format!("Phase 1/1: Creating branches in {github_repo}"));
        (records, progress)
    };

    if records.is_empty() {
        progress.finish("No merge request references to create");
        return Ok(());
    }

    let github_url = args
        .github_url
        .as_deref()
        .or(config.github.base_url.as_deref())
        .unwrap_or(DEFAULT_API_URL);
    let mut github = GitHubClient::new(github_url, Some(Token::from(github_token)), policy)?;

    info!("Creating {} branches in {github_repo}", records.len());
    let result = github
        .create_branches(&github_repo, &records, |record: &RefRecord, _| {
            progress.update(format!("!{}", record.iid));
        })
        .await;

    let stats = match result {
        Ok(stats) => stats,
        Err(err) => {
            progress.fail();
            return Err(err).context(format!("failed to create branches in {github_repo}"));
        }
    };
    progress.finish("Created branches");

    print_create_summary(&github_repo, records.len(), &stats);

    Ok(())
}
