#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vesta_common::{CompileOption, SpecKey};
use vesta_compiler::{Backend, BuildFailure, BuildRequest, Linkable};
use vesta_peer::{PeerOptions, WaitStrategy};

/// An artifact whose "code" is a text file listing its symbols and options.
pub struct TextArtifact {
    binary: PathBuf,
    symbols: Vec<String>,
    linked: AtomicBool,
}

impl TextArtifact {
    pub fn contents(&self) -> String {
        std::fs::read_to_string(&self.binary).unwrap()
    }
}

impl Linkable for TextArtifact {
    fn link(&self) -> Result<(), BuildFailure> {
        let text = std::fs::read_to_string(&self.binary).map_err(|e| BuildFailure::Load {
            path: self.binary.clone(),
            reason: e.to_string(),
        })?;
        for symbol in &self.symbols {
            if !text.lines().any(|l| l == format!("symbol {symbol}")) {
                return Err(BuildFailure::UnresolvedSymbol {
                    symbol: symbol.clone(),
                    path: self.binary.clone(),
                });
            }
        }
        self.linked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn fold(&self) {
        self.linked.store(false, Ordering::SeqCst);
    }

    fn is_linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }

    fn binary_path(&self) -> &Path {
        &self.binary
    }

    fn symbol_names(&self) -> &[String] {
        &self.symbols
    }
}

/// A backend writing text artifacts, with counters and failure switches.
pub struct TextBackend {
    dir: PathBuf,
    pub builds: AtomicUsize,
    pub loads: AtomicUsize,
    pub fail_builds: AtomicBool,
    pub build_delay: Duration,
}

impl TextBackend {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self::with_delay(dir, Duration::ZERO))
    }

    pub fn with_delay(dir: &Path, build_delay: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            builds: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            fail_builds: AtomicBool::new(false),
            build_delay,
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_builds.store(failing, Ordering::SeqCst);
    }
}

impl Backend for TextBackend {
    type Artifact = TextArtifact;

    fn build(&self, request: &BuildRequest) -> Result<TextArtifact, BuildFailure> {
        std::thread::sleep(self.build_delay);
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(BuildFailure::CompilerExit {
                program: "text-cc".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "forced failure".to_string(),
            });
        }
        let n = self.builds.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(&self.dir).unwrap();
        let binary = self.dir.join(format!("{}_{n}.txt", request.stem()));
        let mut text = String::new();
        for symbol in &request.symbols {
            text.push_str(&format!("symbol {symbol}\n"));
        }
        for option in request.rendered_options() {
            text.push_str(&format!("option {option}\n"));
        }
        std::fs::write(&binary, text).unwrap();
        let artifact = TextArtifact {
            binary,
            symbols: request.symbols.clone(),
            linked: AtomicBool::new(false),
        };
        artifact.link()?;
        Ok(artifact)
    }

    fn load(&self, binary: &Path, symbols: &[String]) -> Result<TextArtifact, BuildFailure> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let artifact = TextArtifact {
            binary: binary.to_path_buf(),
            symbols: symbols.to_vec(),
            linked: AtomicBool::new(false),
        };
        artifact.link()?;
        Ok(artifact)
    }
}

pub fn request_for(dir: &Path, key: SpecKey) -> BuildRequest {
    let source = dir.join("vc_sort.c");
    std::fs::write(&source, "int vc_sort(int x) { return x; }\n").unwrap();
    BuildRequest::new(vec![source], vec!["vc_sort".to_string()]).with_options([
        CompileOption::new("opt lv", "-O", "2"),
        CompileOption::new("min range", "-DMIN_V=", key.lower().to_string()),
        CompileOption::new("max range", "-DMAX_V=", key.upper().to_string()),
    ])
}

pub fn options(dir: &Path) -> PeerOptions {
    PeerOptions {
        serve_timeout: Duration::from_secs(10),
        wait_timeout: Duration::from_secs(10),
        download_dir: dir.join("downloads"),
        ..PeerOptions::default()
    }
}

pub fn poll_options(dir: &Path) -> PeerOptions {
    PeerOptions {
        wait: WaitStrategy::Poll {
            interval: Duration::from_millis(10),
        },
        ..options(dir)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
