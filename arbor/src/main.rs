mod output;

use anyhow::{Context, Result};
use arbor_core::{
    BRANCH_PREFIX, CommitOptions, DiskRepository, FsWorktree, HEAD, Hash, ObjectStore,
    ObjectType, RefStore, Reference, Signature, decode_tree, normalize_path,
};
use clap::{Parser, Subcommand};
use output::{
    AddOutput, BranchEntry, BranchesOutput, CommitInfo, CommitOutput, FileStatusInfo, InitOutput,
    LogOutput, LsOutput, OutputWriter, RmOutput, StagedFile, StatusOutput, TreeEntryInfo,
    WriteTreeOutput,
};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

/// Arbor - commits over a content-addressed object store
#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Stage files and record commits in a BLAKE3 object store", long_about = None)]
#[command(version)]
struct Cli {
    /// Working tree root (defaults to ARBOR_REPO env var or the current directory)
    #[arg(short = 'C', long, global = true)]
    repo: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a repository in the working tree root
    Init {
        /// Default commit author name
        #[arg(long)]
        user_name: Option<String>,

        /// Default commit author email
        #[arg(long)]
        user_email: Option<String>,
    },

    /// Stage files; directories are expanded honouring .gitignore
    Add {
        /// Paths relative to the working tree root
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove paths from the index, leaving the files alone
    Rm {
        /// Paths or directories relative to the working tree root
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show modified and deleted tracked files
    Status,

    /// Store the tree for the current index and print its hash
    WriteTree,

    /// Record the index as a new commit on the current branch
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Stage modified and deleted tracked files first
        #[arg(short, long)]
        all: bool,

        /// Author as "Name <email>"
        #[arg(long)]
        author: Option<String>,
    },

    /// Show first-parent history
    Log {
        /// Commit, branch or HEAD to start from
        #[arg(default_value = "HEAD")]
        rev: String,

        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List branches, most recently authored first
    Branches,

    /// Output the payload of an object
    Cat {
        /// Object hash, branch or HEAD
        rev: String,
    },

    /// List a tree, or the tree of a commit
    Ls {
        /// Tree or commit hash, branch or HEAD
        #[arg(default_value = "HEAD")]
        rev: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputWriter::new(cli.json);
    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.write_error(&e, 1);
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Determine working tree root: CLI arg > ARBOR_REPO env var > current directory
    let root = cli
        .repo
        .or_else(|| std::env::var("ARBOR_REPO").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Init {
            user_name,
            user_email,
        } => cmd_init(&root, user_name, user_email, output),
        Commands::Add { paths } => cmd_add(&root, &paths, output),
        Commands::Rm { paths } => cmd_rm(&root, &paths, output),
        Commands::Status => cmd_status(&root, output),
        Commands::WriteTree => cmd_write_tree(&root, output),
        Commands::Commit {
            message,
            all,
            author,
        } => cmd_commit(&root, &message, all, author.as_deref(), output),
        Commands::Log { rev, limit } => cmd_log(&root, &rev, limit, output),
        Commands::Branches => cmd_branches(&root, output),
        Commands::Cat { rev } => cmd_cat(&root, &rev, output),
        Commands::Ls { rev } => cmd_ls(&root, &rev, output),
    }
}

fn open_repo(root: &Path) -> Result<DiskRepository> {
    DiskRepository::open(root)
        .with_context(|| format!("Failed to open repository at {}", root.display()))
}

/// Resolve `HEAD`, a branch name or a full hash to a hash.
fn resolve_rev(repo: &DiskRepository, rev: &str) -> Result<Hash> {
    if rev == HEAD {
        return repo
            .head()
            .context("Failed to resolve HEAD")?
            .context("HEAD has no commits yet");
    }
    let branch = format!("{}{}", BRANCH_PREFIX, rev);
    if let Ok(Some(Reference::Direct(hash))) = repo.refs().resolve(&branch) {
        return Ok(hash);
    }
    Hash::from_hex(rev).with_context(|| format!("Not a branch or hash: {}", rev))
}

fn cmd_init(
    root: &Path,
    user_name: Option<String>,
    user_email: Option<String>,
    output: &OutputWriter,
) -> Result<()> {
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create {}", root.display()))?;
    let repo = DiskRepository::init(root)
        .with_context(|| format!("Failed to initialize repository at {}", root.display()))?;

    if user_name.is_some() || user_email.is_some() {
        let mut config = repo.store().config().clone();
        config.user_name = user_name;
        config.user_email = user_email;
        config
            .save(&repo.store().config_path())
            .context("Failed to write config")?;
    }

    let branch = repo
        .current_branch()?
        .unwrap_or_else(|| HEAD.to_string());
    let algorithm = repo.store().algorithm().as_str().to_string();
    let data = InitOutput {
        success: true,
        result_code: 0,
        root: root.display().to_string(),
        algorithm: algorithm.clone(),
        branch: branch.clone(),
    };
    output.write(&data, || {
        format!(
            "Initialized arbor repository in {}\nAlgorithm: {}\nBranch: {}\n",
            repo.store().root().display(),
            algorithm,
            branch
        )
    })
}

/// Expand directory arguments into the files under them.
fn expand_paths(worktree: &FsWorktree, paths: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for path in paths {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed == "." {
            files.extend(worktree.files_under("")?);
            continue;
        }
        let normalized = normalize_path(trimmed)?;
        let is_dir = fs::symlink_metadata(worktree.full_path(&normalized))
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        if is_dir {
            files.extend(
                worktree
                    .files_under(&normalized)
                    .with_context(|| format!("Failed to walk {}", normalized))?,
            );
        } else {
            files.push(normalized);
        }
    }
    Ok(files)
}

fn cmd_add(root: &Path, paths: &[String], output: &OutputWriter) -> Result<()> {
    let mut repo = open_repo(root)?;
    let files = expand_paths(repo.worktree(), paths)?;

    let mut staged = Vec::with_capacity(files.len());
    for path in &files {
        let entry = repo
            .stage(path)
            .with_context(|| format!("Failed to stage {}", path))?;
        staged.push(StagedFile {
            path: entry.path.clone(),
            mode: entry.mode.to_string(),
            hash: entry.hash,
        });
    }
    repo.save_index().context("Failed to save index")?;

    let data = AddOutput {
        success: true,
        result_code: 0,
        staged,
    };
    output.write(&data, || {
        let mut text = String::new();
        for file in &data.staged {
            let _ = writeln!(text, "{} {}", file.hash, file.path);
        }
        text
    })
}

fn cmd_rm(root: &Path, paths: &[String], output: &OutputWriter) -> Result<()> {
    let mut repo = open_repo(root)?;

    let mut removed = Vec::new();
    let mut not_tracked = Vec::new();
    for path in paths {
        let normalized = normalize_path(path)?;
        if repo.unstage(&normalized).is_some() {
            removed.push(normalized);
            continue;
        }
        // a directory removes everything staged under it
        let prefix = format!("{}/", normalized);
        let under: Vec<String> = repo
            .index()
            .entries()
            .iter()
            .filter(|entry| entry.path.starts_with(&prefix))
            .map(|entry| entry.path.clone())
            .collect();
        if under.is_empty() {
            not_tracked.push(normalized);
        }
        for path in under {
            repo.unstage(&path);
            removed.push(path);
        }
    }
    repo.save_index().context("Failed to save index")?;

    let data = RmOutput {
        success: true,
        result_code: 0,
        removed,
        not_tracked,
    };
    output.write(&data, || {
        let mut text = String::new();
        for path in &data.removed {
            let _ = writeln!(text, "rm {}", path);
        }
        for path in &data.not_tracked {
            let _ = writeln!(text, "not tracked: {}", path);
        }
        text
    })
}

fn cmd_status(root: &Path, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let status = repo.status().context("Failed to compute status")?;

    let data = StatusOutput {
        success: true,
        result_code: 0,
        branch: repo.current_branch()?,
        head: repo.head()?,
        tracked: repo.index().len(),
        changes: status
            .changed()
            .map(|(path, state)| FileStatusInfo::new(path, state))
            .collect(),
    };
    output.write(&data, || {
        let mut text = String::new();
        match &data.branch {
            Some(branch) => {
                let _ = writeln!(text, "On branch {}", branch);
            }
            None => {
                let _ = writeln!(text, "HEAD detached");
            }
        }
        if data.head.is_none() {
            let _ = writeln!(text, "No commits yet");
        }
        if data.changes.is_empty() {
            let _ = writeln!(text, "{} tracked files, nothing changed", data.tracked);
        }
        for change in &data.changes {
            let _ = writeln!(text, "{:>10}: {}", change.state, change.path);
        }
        text
    })
}

fn cmd_write_tree(root: &Path, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let tree = repo.write_tree().context("Failed to write tree")?;
    let data = WriteTreeOutput {
        success: true,
        result_code: 0,
        tree,
    };
    output.write(&data, || format!("{}\n", tree))
}

/// Identity from the config file, then from the environment.
fn default_identity(repo: &DiskRepository) -> Option<Signature> {
    let config = repo.store().config();
    let name = config
        .user_name
        .clone()
        .or_else(|| std::env::var("ARBOR_AUTHOR_NAME").ok())?;
    let email = config
        .user_email
        .clone()
        .or_else(|| std::env::var("ARBOR_AUTHOR_EMAIL").ok())?;
    Some(Signature::new(name, email))
}

fn cmd_commit(
    root: &Path,
    message: &str,
    all: bool,
    author: Option<&str>,
    output: &OutputWriter,
) -> Result<()> {
    let mut repo = open_repo(root)?;

    let identity = default_identity(&repo);
    let author = match author {
        Some(author) => Some(Signature::parse_identity(author)?),
        None => identity.clone(),
    };
    let options = CommitOptions {
        committer: identity.or_else(|| author.clone()),
        author,
        parents: repo.head()?.into_iter().collect(),
        all,
    };

    let commit = repo
        .commit(message, &options)
        .context("Failed to commit")?;
    if all {
        repo.save_index().context("Failed to save index")?;
    }

    let record = repo.read_commit(&commit)?;
    let data = CommitOutput {
        success: true,
        result_code: 0,
        commit,
        tree: record.tree,
        parents: record.parents.clone(),
        reference: repo.head_target()?,
        summary: record.summary().to_string(),
    };
    output.write(&data, || {
        format!("[{} {}] {}\n", data.reference, commit.short(), data.summary)
    })
}

fn cmd_log(root: &Path, rev: &str, limit: Option<usize>, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let start = resolve_rev(&repo, rev)?;
    let commits: Vec<CommitInfo> = repo
        .log(&start, limit)
        .context("Failed to read history")?
        .iter()
        .map(|(hash, commit)| CommitInfo::new(*hash, commit))
        .collect();

    let data = LogOutput {
        success: true,
        result_code: 0,
        commits,
    };
    output.write(&data, || {
        let mut text = String::new();
        for commit in &data.commits {
            let _ = writeln!(text, "commit {}", commit.hash);
            let _ = writeln!(text, "Author: {} <{}>", commit.author, commit.email);
            let _ = writeln!(text, "Date:   {}", commit.date.to_rfc2822());
            let _ = writeln!(text);
            for line in commit.message.lines() {
                let _ = writeln!(text, "    {}", line);
            }
            let _ = writeln!(text);
        }
        text
    })
}

fn cmd_branches(root: &Path, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let branches: Vec<BranchEntry> = repo
        .branches()
        .context("Failed to list branches")?
        .into_iter()
        .map(BranchEntry::from)
        .collect();

    let data = BranchesOutput {
        success: true,
        result_code: 0,
        branches,
    };
    output.write(&data, || {
        if data.branches.is_empty() {
            return "No branches yet\n".to_string();
        }
        let mut text = String::new();
        for branch in &data.branches {
            let marker = if branch.is_head { '*' } else { ' ' };
            let _ = writeln!(
                text,
                "{} {:<20} {} {} {} {}",
                marker,
                branch.name,
                branch.commit.short(),
                branch.date.format("%Y-%m-%d"),
                branch.author,
                branch.summary
            );
        }
        text
    })
}

fn cmd_cat(root: &Path, rev: &str, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let hash = resolve_rev(&repo, rev)?;
    let (kind, payload) = repo
        .store()
        .get(&hash)
        .with_context(|| format!("Failed to read object {}", hash))?;

    if kind == ObjectType::Tree {
        let entries: Vec<TreeEntryInfo> =
            decode_tree(&payload)?.iter().map(TreeEntryInfo::from).collect();
        return write_tree_listing(hash, entries, output);
    }
    output.write_raw(&payload)
}

fn cmd_ls(root: &Path, rev: &str, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let mut hash = resolve_rev(&repo, rev)?;
    if repo.store().object_type(&hash)? == ObjectType::Commit {
        hash = repo.read_commit(&hash)?.tree;
    }
    let entries: Vec<TreeEntryInfo> = repo
        .store()
        .read_tree(&hash)
        .with_context(|| format!("Failed to read tree {}", hash))?
        .iter()
        .map(TreeEntryInfo::from)
        .collect();
    write_tree_listing(hash, entries, output)
}

fn write_tree_listing(
    hash: Hash,
    entries: Vec<TreeEntryInfo>,
    output: &OutputWriter,
) -> Result<()> {
    let data = LsOutput {
        success: true,
        result_code: 0,
        hash,
        entries,
    };
    output.write(&data, || {
        let mut text = String::new();
        for entry in &data.entries {
            let _ = writeln!(
                text,
                "{} {} {}\t{}",
                entry.mode, entry.entry_type, entry.hash, entry.name
            );
        }
        text
    })
}
