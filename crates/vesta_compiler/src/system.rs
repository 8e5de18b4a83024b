//! Backend that shells out to a system C/C++ compiler.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::backend::Backend;
use crate::error::BuildFailure;
use crate::request::BuildRequest;
use crate::shared_object::SharedObject;

/// Default compiler program when none is configured.
pub const DEFAULT_PROGRAM: &str = "c++";

/// Compiles requests into shared libraries with an external toolchain.
///
/// The command line is `<program> <rendered options> <extra args> -shared
/// -o <output> <sources>`. Output binaries are written to `output_dir` and
/// named `<stem>_<fingerprint>.<dll ext>`, so identical requests map to the
/// same file.
#[derive(Debug, Clone)]
pub struct SystemCompiler {
    program: String,
    output_dir: PathBuf,
    extra_args: Vec<String>,
}

impl SystemCompiler {
    /// Creates a backend using `program` and writing into `output_dir`.
    pub fn new(program: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            output_dir: output_dir.into(),
            extra_args: Vec::new(),
        }
    }

    /// Adds arguments placed after the rendered options.
    pub fn with_extra_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }

    /// The directory that receives compiled binaries.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The binary path a request would be compiled to.
    pub fn output_path(&self, request: &BuildRequest) -> Result<PathBuf, BuildFailure> {
        let fingerprint = request.fingerprint()?;
        Ok(self.output_dir.join(format!(
            "{}_{}.{}",
            request.stem(),
            fingerprint.short(),
            std::env::consts::DLL_EXTENSION
        )))
    }

    fn command(&self, request: &BuildRequest, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(request.rendered_options())
            .args(&self.extra_args)
            .arg("-shared")
            .arg("-o")
            .arg(output)
            .args(&request.sources);
        cmd
    }
}

impl Backend for SystemCompiler {
    type Artifact = SharedObject;

    fn build(&self, request: &BuildRequest) -> Result<SharedObject, BuildFailure> {
        request.check_sources()?;
        let output = self.output_path(request)?;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| BuildFailure::Io {
            path: self.output_dir.clone(),
            source: e,
        })?;

        tracing::info!(
            program = %self.program,
            output = %output.display(),
            options = ?request.rendered_options(),
            "compiling kernel variant"
        );

        let result = self
            .command(request, &output)
            .output()
            .map_err(|e| BuildFailure::Toolchain {
                program: self.program.clone(),
                source: e,
            })?;

        if !result.status.success() {
            return Err(BuildFailure::CompilerExit {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        SharedObject::open(output, request.symbols.clone())
    }

    fn load(&self, binary: &Path, symbols: &[String]) -> Result<SharedObject, BuildFailure> {
        SharedObject::open(binary, symbols.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Linkable;
    use vesta_common::CompileOption;

    type Kernel = extern "C" fn(i32) -> i32;

    const SOURCE: &str = r#"
int clamp_max(int x) { return x < MAX_V ? x : MAX_V - 1; }
int clamp_min(int x) { return x >= MIN_V ? x : MIN_V; }
"#;

    fn have_cc() -> bool {
        let ok = Command::new("cc").arg("--version").output().is_ok();
        if !ok {
            eprintln!("NOTE: no `cc` on PATH, skipping toolchain test");
        }
        ok
    }

    fn request(dir: &Path, min: i32, max: i32) -> BuildRequest {
        let src = dir.join("clamp.c");
        std::fs::write(&src, SOURCE).unwrap();
        BuildRequest::new(
            vec![src],
            vec!["clamp_max".to_string(), "clamp_min".to_string()],
        )
        .with_options([
            CompileOption::new("opt lv", "-O", "2"),
            CompileOption::pic(),
            CompileOption::new("min range", "-DMIN_V=", min.to_string()),
            CompileOption::new("max range", "-DMAX_V=", max.to_string()),
        ])
    }

    #[test]
    fn build_and_call() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let so = backend.build(&request(dir.path(), 0, 256)).unwrap();
        assert!(so.is_linked());
        assert!(so.binary_path().exists());

        let max = unsafe { so.symbol::<Kernel>(0) }.unwrap();
        let min = unsafe { so.symbol::<Kernel>(1) }.unwrap();
        assert_eq!((max.get())(1000), 255);
        assert_eq!((min.get())(-5), 0);
    }

    #[test]
    fn symbol_index_out_of_range() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let so = backend.build(&request(dir.path(), 0, 10)).unwrap();
        assert!(unsafe { so.symbol::<Kernel>(2) }.is_none());
    }

    #[test]
    fn fold_then_relink() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let so = backend.build(&request(dir.path(), -8, 8)).unwrap();

        so.fold();
        so.fold();
        assert!(!so.is_linked());
        assert!(so.binary_path().exists());
        assert!(unsafe { so.symbol::<Kernel>(0) }.is_none());

        so.link().unwrap();
        so.link().unwrap();
        let max = unsafe { so.symbol::<Kernel>(0) }.unwrap();
        assert_eq!((max.get())(100), 7);
    }

    #[test]
    fn handle_survives_fold() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let so = backend.build(&request(dir.path(), 0, 3)).unwrap();
        let max = unsafe { so.symbol::<Kernel>(0) }.unwrap();
        so.fold();
        assert_eq!((max.get())(9), 2);
    }

    #[test]
    fn load_copied_binary() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let so = backend.build(&request(dir.path(), 0, 64)).unwrap();
        let copy = dir.path().join(format!("copy.{}", std::env::consts::DLL_EXTENSION));
        std::fs::copy(so.binary_path(), &copy).unwrap();

        let loaded = backend.load(&copy, so.symbol_names()).unwrap();
        let max = unsafe { loaded.symbol::<Kernel>(0) }.unwrap();
        assert_eq!((max.get())(64), 63);
    }

    #[test]
    fn unresolved_symbol_is_reported() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let mut req = request(dir.path(), 0, 4);
        req.symbols.push("does_not_exist".to_string());
        let err = backend.build(&req).unwrap_err();
        assert!(matches!(err, BuildFailure::UnresolvedSymbol { ref symbol, .. } if symbol == "does_not_exist"));
    }

    #[test]
    fn compile_error_is_reported() {
        if !have_cc() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.c");
        std::fs::write(&src, "int broken( { return }").unwrap();
        let backend = SystemCompiler::new("cc", dir.path().join("bin"));
        let req = BuildRequest::new(vec![src], vec!["broken".to_string()])
            .with_option(CompileOption::pic());
        let err = backend.build(&req).unwrap_err();
        assert!(matches!(err, BuildFailure::CompilerExit { .. }));
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path());
        let req = BuildRequest::new(
            vec![dir.path().join("absent.c")],
            vec!["f".to_string()],
        );
        assert!(matches!(
            backend.build(&req),
            Err(BuildFailure::MissingSource { .. })
        ));
    }

    #[test]
    fn missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("k.c");
        std::fs::write(&src, "int f(void) { return 0; }").unwrap();
        let backend = SystemCompiler::new("vesta-no-such-compiler", dir.path().join("bin"));
        let req = BuildRequest::new(vec![src], vec!["f".to_string()]);
        assert!(matches!(
            backend.build(&req),
            Err(BuildFailure::Toolchain { .. })
        ));
    }

    #[test]
    fn output_path_uses_stem_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemCompiler::new("cc", dir.path());
        let req = request(dir.path(), 0, 256).with_label("clamp_0_256");
        let path = backend.output_path(&req).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("clamp_0_256_"));
        assert_eq!(path, backend.output_path(&req).unwrap());
    }
}
