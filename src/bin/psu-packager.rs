use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use psu_packager::{PackageError, PackagerConfig, Pipeline};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  psu-packager build [deb|tar-zst] [--config <path>] [--keep-staging] [--json]\n  psu-packager check [--config <path>]"
}

#[derive(Debug, Default)]
struct Options {
    positional: Vec<String>,
    config: Option<PathBuf>,
    keep_staging: bool,
    json: bool,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .with_context(|| format!("--config needs a path\n{}", usage()))?;
                options.config = Some(PathBuf::from(path));
            }
            "--keep-staging" => options.keep_staging = true,
            "--json" => options.json = true,
            "-h" | "--help" => bail!(usage()),
            flag if flag.starts_with("--") => bail!("unknown flag '{flag}'\n{}", usage()),
            _ => options.positional.push(arg.clone()),
        }
    }
    Ok(options)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<PackageError>() {
                Some(pkg) => eprintln!("{}", pkg.diagnostic()),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let options = parse_options(args)?;
    let positional: Vec<&str> = options.positional.iter().map(String::as_str).collect();

    match positional.as_slice() {
        ["build"] => build(&options, None),
        ["build", format] => build(&options, Some(*format)),
        ["check"] if !options.keep_staging && !options.json => check(&options),
        _ => bail!(usage()),
    }
}

fn load_config(options: &Options, work_dir: &Path) -> Result<PackagerConfig> {
    Ok(PackagerConfig::load(work_dir, options.config.as_deref())?)
}

fn build(options: &Options, format: Option<&str>) -> Result<()> {
    let work_dir = std::env::current_dir().context("resolving current directory")?;
    let mut config = load_config(options, &work_dir)?;
    if let Some(format) = format {
        config.layout.format = format.to_string();
    }

    let report = Pipeline::new(config, &work_dir)?
        .keep_staging(options.keep_staging)
        .run()?;

    if options.json {
        let json = serde_json::to_string_pretty(&report).context("serializing build report")?;
        println!("{json}");
        return Ok(());
    }

    println!("Built {}", report.artifact_name);
    println!("  sha256: {}", report.sha256);
    println!("  size:   {} bytes", report.size_bytes);
    println!();
    println!("Install: {}", report.install_hint);
    println!("Remove:  {}", report.remove_hint);
    Ok(())
}

fn check(options: &Options) -> Result<()> {
    let work_dir = std::env::current_dir().context("resolving current directory")?;
    let config = load_config(options, &work_dir)?;
    let identity = config.identity.clone();
    let pipeline = Pipeline::new(config, &work_dir)?;
    let sources = pipeline.check()?;

    println!(
        "{} ready ({})",
        identity.artifact_filename(pipeline.backend().extension()),
        pipeline.backend().name()
    );
    println!("  payload:  {}", sources.payload.display());
    println!("  metadata: {}", sources.metadata.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let options =
            parse_options(&args(&["build", "tar-zst", "--config", "p.toml", "--json"])).unwrap();
        assert_eq!(options.positional, vec!["build", "tar-zst"]);
        assert_eq!(options.config, Some(PathBuf::from("p.toml")));
        assert!(options.json);
        assert!(!options.keep_staging);
    }

    #[test]
    fn test_parse_options_rejects_unknown_flag() {
        assert!(parse_options(&args(&["build", "--fast"])).is_err());
        assert!(parse_options(&args(&["build", "--config"])).is_err());
    }

    #[test]
    fn test_unknown_command_prints_usage() {
        let err = run(&args(&["publish"])).unwrap_err();
        assert!(err.to_string().contains("Usage:"));
    }
}
