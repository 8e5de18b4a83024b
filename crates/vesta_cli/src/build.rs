//! `vesta build`: build one variant locally through the registry.

use vesta_cache::Registry;
use vesta_compiler::Linkable;

use crate::{setup, BuildArgs, GlobalArgs, ReportFormat};

/// Runs the `vesta build` command.
///
/// With `[cache].persist` the registry manifest in `[cache].dir` is used,
/// so a variant built by an earlier run is loaded instead of recompiled.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = setup::load(global)?;
    let key = args.key.key()?;
    let backend = setup::backend(&config);
    let registry = if config.cache.persist {
        Registry::with_manifest(backend, &config.cache.dir)
    } else {
        Registry::new(backend)
    };

    if !global.quiet && args.format == ReportFormat::Text {
        eprintln!("   Building {} {key}", config.kernel.name);
    }
    let request = config.kernel.request_for(key);
    let artifact = registry.resolve(key, &request)?;
    let stats = registry.stats();

    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                let how = if stats.reloads > 0 { "Reused" } else { "Built" };
                eprintln!("   {how} {}", artifact.binary_path().display());
            }
            println!("{}", artifact.binary_path().display());
        }
        ReportFormat::Json => {
            let report = serde_json::json!({
                "function": config.kernel.name,
                "min": key.lower(),
                "max": key.upper(),
                "binary": artifact.binary_path(),
                "symbols": artifact.symbol_names(),
                "built": stats.builds,
                "reused": stats.reloads,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}
