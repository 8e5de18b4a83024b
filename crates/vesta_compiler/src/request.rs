//! Build requests and their content fingerprints.

use std::path::{Path, PathBuf};

use vesta_common::{CompileOption, ContentHash, ContentHasher};

use crate::error::BuildFailure;

/// Everything a backend needs to produce one artifact.
///
/// Options are kept in the order given and passed verbatim; the cache treats
/// the whole request as opaque and never derives options on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Source files compiled into the artifact.
    pub sources: Vec<PathBuf>,
    /// Entry symbols that must be resolvable once the artifact is linked.
    pub symbols: Vec<String>,
    /// Ordered option list rendered onto the toolchain command line.
    pub options: Vec<CompileOption>,
    /// Optional stem for the produced binary's file name.
    pub label: Option<String>,
}

impl BuildRequest {
    /// Creates a request with no options.
    pub fn new(sources: Vec<PathBuf>, symbols: Vec<String>) -> Self {
        Self {
            sources,
            symbols,
            options: Vec::new(),
            label: None,
        }
    }

    /// Appends options in order.
    pub fn with_options(mut self, options: impl IntoIterator<Item = CompileOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Appends a single option unless an identical one is already present.
    pub fn with_option(mut self, option: CompileOption) -> Self {
        if !self.options.contains(&option) {
            self.options.push(option);
        }
        self
    }

    /// Sets the file name stem for the produced binary.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The options as toolchain arguments.
    pub fn rendered_options(&self) -> Vec<String> {
        self.options.iter().map(CompileOption::render).collect()
    }

    /// File name stem: the label, else the first symbol, else `"kernel"`.
    pub fn stem(&self) -> &str {
        self.label
            .as_deref()
            .or(self.symbols.first().map(String::as_str))
            .unwrap_or("kernel")
    }

    /// Checks that every source file exists.
    pub fn check_sources(&self) -> Result<(), BuildFailure> {
        match self.sources.iter().find(|p| !p.is_file()) {
            Some(path) => Err(BuildFailure::MissingSource { path: path.clone() }),
            None => Ok(()),
        }
    }

    /// Hashes source contents, symbol names, and rendered options.
    ///
    /// Two requests with equal fingerprints produce functionally equivalent
    /// artifacts, so a binary recorded under a fingerprint can be reused
    /// instead of recompiled.
    pub fn fingerprint(&self) -> Result<ContentHash, BuildFailure> {
        let mut hasher = ContentHasher::new();
        for path in &self.sources {
            hasher.part(&read_source(path)?);
        }
        hasher.part(b"symbols");
        for symbol in &self.symbols {
            hasher.part(symbol.as_bytes());
        }
        hasher.part(b"options");
        for option in self.rendered_options() {
            hasher.part(option.as_bytes());
        }
        Ok(hasher.finish())
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>, BuildFailure> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BuildFailure::MissingSource {
            path: path.to_path_buf(),
        },
        _ => BuildFailure::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_in(dir: &Path) -> BuildRequest {
        let src = dir.join("kernel.c");
        std::fs::write(&src, "int vc_sort(void) { return 0; }").unwrap();
        BuildRequest::new(vec![src], vec!["vc_sort".to_string()])
            .with_options([CompileOption::new("opt lv", "-O", "3")])
    }

    #[test]
    fn fingerprint_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let req = request_in(dir.path());
        assert_eq!(req.fingerprint().unwrap(), req.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_tracks_options() {
        let dir = tempfile::tempdir().unwrap();
        let req = request_in(dir.path());
        let other = req
            .clone()
            .with_option(CompileOption::new("max range", "-D_MAX_VALUE_RANGE=", "256"));
        assert_ne!(req.fingerprint().unwrap(), other.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_tracks_source_content() {
        let dir = tempfile::tempdir().unwrap();
        let req = request_in(dir.path());
        let before = req.fingerprint().unwrap();
        std::fs::write(&req.sources[0], "int vc_sort(void) { return 1; }").unwrap();
        assert_ne!(before, req.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_missing_source() {
        let req = BuildRequest::new(vec![PathBuf::from("/nonexistent/k.c")], vec![]);
        assert!(matches!(
            req.fingerprint(),
            Err(BuildFailure::MissingSource { .. })
        ));
        assert!(req.check_sources().is_err());
    }

    #[test]
    fn with_option_skips_duplicates() {
        let req = BuildRequest::new(vec![], vec![])
            .with_option(CompileOption::pic())
            .with_option(CompileOption::pic());
        assert_eq!(req.rendered_options(), vec!["-fPIC"]);
    }

    #[test]
    fn options_keep_order() {
        let req = BuildRequest::new(vec![], vec![]).with_options([
            CompileOption::new("opt lv", "-O", "3"),
            CompileOption::new("std", "-std=", "c++11"),
            CompileOption::new("include dir", "-I", "../"),
        ]);
        assert_eq!(req.rendered_options(), vec!["-O3", "-std=c++11", "-I../"]);
    }

    #[test]
    fn stem_prefers_label() {
        let req = BuildRequest::new(vec![], vec!["vc_sort".to_string()]);
        assert_eq!(req.stem(), "vc_sort");
        assert_eq!(req.clone().with_label("vc_sort_0_256").stem(), "vc_sort_0_256");
        assert_eq!(BuildRequest::new(vec![], vec![]).stem(), "kernel");
    }
}
