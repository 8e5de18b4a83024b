//! Configuration types deserialized from `vesta.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use vesta_common::{CompileOption, SpecKey};
use vesta_compiler::BuildRequest;

/// The top-level configuration parsed from `vesta.toml`.
#[derive(Debug, Deserialize)]
pub struct VestaConfig {
    /// The kernel whose variants are built.
    pub kernel: KernelConfig,
    /// Toolchain settings.
    #[serde(default)]
    pub compiler: CompilerConfig,
    /// Local cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Peer exchange settings.
    #[serde(default)]
    pub peer: PeerConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// The kernel source, its entry symbols, and its base option list.
#[derive(Debug, Deserialize)]
pub struct KernelConfig {
    /// Logical function name, used in directory keys and file names.
    pub name: String,
    /// Source files, as one path or a list.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub sources: Vec<String>,
    /// Entry symbols, as one name or a list.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub symbols: Vec<String>,
    /// Base options in command-line order.
    #[serde(default)]
    pub options: Vec<CompileOption>,
    /// How a key's bounds become defines.
    #[serde(default)]
    pub range: RangeDefines,
}

impl KernelConfig {
    /// Builds the request for `key`: the base options in declared order,
    /// then the lower and upper bound defines, then `-fPIC` unless already
    /// listed.
    pub fn request_for(&self, key: SpecKey) -> BuildRequest {
        let range = [
            CompileOption::new("min range", self.range.min_prefix.clone(), key.lower().to_string()),
            CompileOption::new("max range", self.range.max_prefix.clone(), key.upper().to_string()),
        ];
        BuildRequest::new(
            self.sources.iter().map(PathBuf::from).collect(),
            self.symbols.clone(),
        )
        .with_options(self.options.iter().cloned().chain(range))
        .with_option(CompileOption::pic())
        .with_label(key.directory_key(&self.name))
    }
}

/// Option prefixes carrying a key's bounds into the kernel.
#[derive(Debug, Clone, Deserialize)]
pub struct RangeDefines {
    /// Prefix for the inclusive lower bound.
    #[serde(default = "default_min_prefix")]
    pub min_prefix: String,
    /// Prefix for the exclusive upper bound.
    #[serde(default = "default_max_prefix")]
    pub max_prefix: String,
}

impl Default for RangeDefines {
    fn default() -> Self {
        Self {
            min_prefix: default_min_prefix(),
            max_prefix: default_max_prefix(),
        }
    }
}

fn default_min_prefix() -> String {
    "-D_MIN_VALUE_RANGE=".to_string()
}

fn default_max_prefix() -> String {
    "-D_MAX_VALUE_RANGE=".to_string()
}

/// External toolchain settings.
#[derive(Debug, Deserialize)]
pub struct CompilerConfig {
    /// The compiler driver to invoke.
    #[serde(default = "default_program")]
    pub program: String,
    /// Where built binaries are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Arguments appended after the option list.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub extra_args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            output_dir: default_output_dir(),
            extra_args: Vec::new(),
        }
    }
}

fn default_program() -> String {
    vesta_compiler::system::DEFAULT_PROGRAM.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".vesta/bin")
}

/// Local cache settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the registry manifest.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Record built binaries so a later process can reuse them.
    #[serde(default)]
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            persist: false,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".vesta/cache")
}

/// How a consumer waits for a publication.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Subscribe and wake on publication.
    #[default]
    Listen,
    /// Re-read at `poll_interval_ms`.
    Poll,
}

/// Peer exchange settings.
#[derive(Debug, Deserialize)]
pub struct PeerConfig {
    /// This node's identifier; defaults to a random one.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Directory node to join; without one this node hosts the directory.
    #[serde(default)]
    pub join: Option<String>,
    /// Address the hosted directory listens on.
    #[serde(default = "default_directory_listen")]
    pub directory_listen: String,
    /// Address the transfer endpoint binds.
    #[serde(default = "default_transfer_bind")]
    pub transfer_bind: String,
    /// Host advertised to consumers instead of the bound IP.
    #[serde(default)]
    pub transfer_advertise: Option<String>,
    /// Transfers after which a producer stops serving.
    #[serde(default = "default_transfers")]
    pub transfers: usize,
    /// Consumer wait strategy.
    #[serde(default)]
    pub wait: WaitMode,
    /// Poll interval for [`WaitMode::Poll`].
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Longest a consumer waits for a publication.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Longest a single download may take.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Longest a producer serves.
    #[serde(default = "default_serve_timeout_secs")]
    pub serve_timeout_secs: u64,
    /// Elect a single producer per key.
    #[serde(default = "default_true")]
    pub elect: bool,
    /// Where fetched binaries are written.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl PeerConfig {
    /// The poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The consumer wait bound as a duration.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// The download bound as a duration.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The producer serve bound as a duration.
    pub fn serve_timeout(&self) -> Duration {
        Duration::from_secs(self.serve_timeout_secs)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            join: None,
            directory_listen: default_directory_listen(),
            transfer_bind: default_transfer_bind(),
            transfer_advertise: None,
            transfers: default_transfers(),
            wait: WaitMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            serve_timeout_secs: default_serve_timeout_secs(),
            elect: true,
            download_dir: default_download_dir(),
        }
    }
}

fn default_directory_listen() -> String {
    "127.0.0.1:7400".to_string()
}

fn default_transfer_bind() -> String {
    "127.0.0.1:0".to_string()
}

fn default_transfers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_wait_timeout_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_serve_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".vesta/downloads")
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Progress messages.
    #[default]
    Info,
    /// Workflow transitions.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// The level name understood by log filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Logging settings.
#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// Default verbosity when no command-line flag overrides it.
    #[serde(default)]
    pub level: LogLevel,
}

fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
