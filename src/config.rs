//! Resolving a jobset from CLI flags, the sagequeue env file, and the sage
//! invocation recorded in it.

use crate::combinatorics::JobDescriptor;
use crate::layout::ArtifactLayout;
use crate::log_scan::DEFAULT_LOG_MAX_LINES;
use crate::ProgressError;
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_ENV_FILE: &str = "~/.config/sagequeue/sagequeue.env";
const DEFAULT_NOTEBOOK_DIR: &str = "~/Jupyter";
const DEFAULT_VAR_DIR: &str = "./var";

#[derive(Parser, Debug, Clone)]
#[command(name = "sqprogress")]
#[command(about = "Scan sagequeue progress from state files and worker logs", long_about = None)]
pub struct ProgressArgs {
    /// Path to sagequeue.env (defaults to ~/.config/sagequeue/sagequeue.env when present)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Jobset name (e.g. shri_r3)
    #[arg(long)]
    pub jobset: Option<String>,

    /// Graph name (e.g. shrikhande)
    #[arg(long)]
    pub graph: Option<String>,

    /// Target rank bound
    #[arg(long)]
    pub rank: Option<u32>,

    /// Number of offsets the case space is split into
    #[arg(long)]
    pub stride: Option<u64>,

    /// Number of vertices (required for graphs outside the built-in list)
    #[arg(long)]
    pub n: Option<u32>,

    /// Directory holding the per-offset state files
    #[arg(long)]
    pub notebook_dir: Option<PathBuf>,

    /// Project var directory holding queue and log trees
    #[arg(long)]
    pub var_dir: Option<PathBuf>,

    /// Skip per-worker attribution from logs
    #[arg(long)]
    pub no_worker_breakdown: bool,

    /// Max tail lines to read from each log
    #[arg(long, default_value_t = DEFAULT_LOG_MAX_LINES)]
    pub log_max_lines: usize,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub job: JobDescriptor,
    pub layout: ArtifactLayout,
    pub log_max_lines: usize,
    pub worker_breakdown: bool,
    pub json: bool,
}

/// Key/value pairs from a sagequeue env file.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    vars: HashMap<String, String>,
}

impl EnvFile {
    /// Read `KEY=value` lines. Blank lines, `#` comments and lines without
    /// `=` are skipped. One pair of matching surrounding quotes is stripped
    /// from the value, and nothing else is interpreted: no escapes, no `$VAR`
    /// expansion, no `export` prefix.
    pub fn load(path: &Path) -> Result<Self, ProgressError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProgressError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse_text(&text))
    }

    pub fn parse_text(text: &str) -> Self {
        let mut vars = HashMap::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line, "env line without '=' skipped");
                continue;
            };
            vars.insert(key.trim().to_string(), strip_quotes(value.trim()).to_string());
        }
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ProgressError> {
        self.get(key)
            .map(|raw| {
                raw.trim().parse().map_err(|_| ProgressError::InvalidConfig {
                    field: key,
                    value: raw.to_string(),
                })
            })
            .transpose()
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// `--graph` and `--rank` as written in `SAGE_BASE_ARGS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SageArgs {
    pub graph: Option<String>,
    pub rank: Option<String>,
}

/// Split on whitespace, treating single- or double-quoted runs as one word.
/// Returns `None` on an unterminated quote.
fn split_words(s: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return None;
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}

pub fn infer_from_base_args(base_args: &str) -> SageArgs {
    let mut inferred = SageArgs::default();
    let Some(words) = split_words(base_args) else {
        return inferred;
    };
    for pair in words.windows(2) {
        match pair[0].as_str() {
            "--graph" => inferred.graph = Some(pair[1].clone()),
            "--rank" => inferred.rank = Some(pair[1].clone()),
            _ => {}
        }
    }
    inferred
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Parent directory, with a bare file name resolving to `.`.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn missing(flag: &'static str, fallback: &'static str) -> ProgressError {
    ProgressError::MissingConfig { flag, fallback }
}

impl ProgressConfig {
    /// Load the env file named by the args (or the default one if it exists)
    /// and resolve.
    pub fn from_args(args: &ProgressArgs) -> Result<Self, ProgressError> {
        let env_path = match &args.env_file {
            Some(path) => Some(expand_tilde(path)),
            None => Some(expand_tilde(Path::new(DEFAULT_ENV_FILE))).filter(|p| p.exists()),
        };
        let env = match env_path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading env file");
                EnvFile::load(&path)?
            }
            None => EnvFile::default(),
        };
        Self::resolve(args, &env)
    }

    /// Flags win over the env file, which wins over built-in defaults.
    pub fn resolve(args: &ProgressArgs, env: &EnvFile) -> Result<Self, ProgressError> {
        let inferred = env
            .get("SAGE_BASE_ARGS")
            .map(infer_from_base_args)
            .unwrap_or_default();

        let jobset = args
            .jobset
            .clone()
            .or_else(|| env.get("JOBSET").map(str::to_string))
            .ok_or_else(|| missing("--jobset", "JOBSET"))?;
        let graph = args
            .graph
            .clone()
            .or(inferred.graph)
            .ok_or_else(|| missing("--graph", "--graph in SAGE_BASE_ARGS"))?;
        let rank = match args.rank {
            Some(rank) => rank,
            None => {
                let raw = inferred
                    .rank
                    .ok_or_else(|| missing("--rank", "--rank in SAGE_BASE_ARGS"))?;
                raw.parse().map_err(|_| ProgressError::InvalidConfig {
                    field: "rank",
                    value: raw,
                })?
            }
        };
        let stride = match args.stride {
            Some(stride) => stride,
            None => env
                .parse::<u64>("STRIDE")?
                .ok_or_else(|| missing("--stride", "STRIDE"))?,
        };

        let var_dir = match &args.var_dir {
            Some(dir) => expand_tilde(dir),
            None => {
                if let Some(root) = env.get("PROJECT_ROOT") {
                    PathBuf::from(root).join("var")
                } else if let Some(state_dir) = env.get("STATE_DIR") {
                    // STATE_DIR is <var>/<jobset>
                    parent_dir(Path::new(state_dir))
                } else {
                    PathBuf::from(DEFAULT_VAR_DIR)
                }
            }
        };

        let notebook_dir = match &args.notebook_dir {
            Some(dir) => expand_tilde(dir),
            None => match env.get("STOP_FILE_HOST") {
                Some(stop_file) => parent_dir(&expand_tilde(Path::new(stop_file))),
                None => expand_tilde(Path::new(DEFAULT_NOTEBOOK_DIR)),
            },
        };

        let job = JobDescriptor::new(jobset, graph, rank, args.n, stride)?;

        Ok(Self {
            job,
            layout: ArtifactLayout::new(notebook_dir, var_dir),
            log_max_lines: args.log_max_lines,
            worker_breakdown: !args.no_worker_breakdown,
            json: args.json,
        })
    }
}
