use aapt_toolchain::core::archive::ZipArchiveReader;
use aapt_toolchain::core::config::{self, ToolchainConfig};
use aapt_toolchain::core::logging::{self, LogFacade};
use aapt_toolchain::core::process::SystemCommandRunner;
use aapt_toolchain::toolchain::elf::{self, Interpreter};
use aapt_toolchain::toolchain::locator::{self, ToolchainLocator};
use aapt_toolchain::toolchain::{FrameworkCacheResolver, SelectorOptions, ToolchainSelector};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// TOML file providing defaults for every command
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    logging::init_logger(config::LOG_TAG);
    let args = Args::parse();
    let config = args
        .config
        .as_deref()
        .map(config::parse_config)
        .unwrap_or_default();
    args.command.run(&config)
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a native binary and tell whether Android can run it
    Probe { binary: PathBuf },
    /// Pick the toolchain binary to use for an archive
    Select {
        #[clap(long)]
        primary: Option<String>,
        #[clap(long)]
        fallback: Option<String>,
        #[clap(long)]
        apk: PathBuf,
        /// Split or bundle archives inspected alongside the APK
        #[clap(long = "aux")]
        auxiliary: Vec<PathBuf>,
        #[clap(long)]
        prefer_primary: bool,
        #[clap(long)]
        modern_target_sdk: Option<u32>,
    },
    /// Compute (and create) the framework cache directory
    Framework {
        #[clap(long)]
        base_dir: Option<PathBuf>,
        #[clap(long)]
        tag: Option<String>,
        #[clap(long)]
        apk: PathBuf,
        #[clap(long)]
        aapt: PathBuf,
    },
    /// Find a runnable toolchain binary for this device
    Locate {
        #[clap(long)]
        library: String,
        #[clap(long)]
        lib_dir: PathBuf,
        /// Installed base and split APKs
        #[clap(long = "apk")]
        code_paths: Vec<PathBuf>,
        /// Device ABIs, most preferred first
        #[clap(long = "abi", required = true)]
        abis: Vec<String>,
        #[clap(long)]
        out: PathBuf,
    },
}

impl Commands {
    pub fn run(self, config: &ToolchainConfig) -> Result<()> {
        match self {
            Self::Probe { binary } => {
                let header = elf::read_header(&binary)
                    .with_context(|| format!("Reading `{}`", binary.display()))?;
                match elf::inspect(&header) {
                    Ok(summary) => {
                        let interpreter = match &summary.interpreter {
                            Interpreter::NoProgramHeaders => "<no program headers>".to_string(),
                            Interpreter::NotFound => "<none>".to_string(),
                            Interpreter::Path(path) => path.clone(),
                        };
                        println!(
                            "{:?} {:?} machine={} interpreter={} runnable={}",
                            summary.class,
                            summary.endian,
                            summary.machine,
                            interpreter,
                            summary.is_runnable()
                        );
                    }
                    Err(e) => println!("not runnable: {}", e),
                }
            }
            Self::Select {
                primary,
                fallback,
                apk,
                auxiliary,
                prefer_primary,
                modern_target_sdk,
            } => {
                let Some(primary) = primary.or_else(|| config.toolchain.primary.clone()) else {
                    bail!("no primary toolchain given (--primary or [toolchain] primary)");
                };
                let fallback = fallback.or_else(|| config.toolchain.fallback.clone());
                let options = SelectorOptions {
                    prefer_primary: prefer_primary || config.selector.prefer_primary,
                    modern_target_sdk: modern_target_sdk.or(config.selector.modern_target_sdk),
                };
                let selector = ToolchainSelector::new(&SystemCommandRunner, &ZipArchiveReader)
                    .with_log(&LogFacade)
                    .with_options(options);
                println!(
                    "{}",
                    selector.select(&primary, fallback.as_deref(), &apk, &auxiliary)
                );
            }
            Self::Framework {
                base_dir,
                tag,
                apk,
                aapt,
            } => {
                let base_dir =
                    base_dir.unwrap_or_else(|| PathBuf::from(&config.framework.base_dir));
                let tag = tag.unwrap_or_else(|| config.framework.runtime_tag.clone());
                let resolved = FrameworkCacheResolver::new(&SystemCommandRunner)
                    .with_log(&LogFacade)
                    .resolve(&base_dir, &tag, &apk, &aapt)
                    .with_context(|| format!("Creating framework cache under `{}`", base_dir.display()))?;
                println!("{}", resolved.display());
            }
            Self::Locate {
                library,
                lib_dir,
                code_paths,
                abis,
                out,
            } => {
                if !locator::supports_device(&abis) {
                    bail!("none of {:?} is supported by the bundled toolchain", abis);
                }
                let locator = ToolchainLocator {
                    library_name: library,
                    native_library_dir: lib_dir,
                    code_paths,
                    device_abis: abis,
                    output_dir: out,
                    archives: &ZipArchiveReader,
                };
                match locator.locate() {
                    Some(path) => println!("{}", path.display()),
                    None => bail!("no runnable `{}` found", locator.library_name),
                }
            }
        }
        Ok(())
    }
}
