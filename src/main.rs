//! swupack CLI
//!
//! Entry point for the `swupack` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use swupack::config;
use swupack::{Pipeline, PipelineConfig, SignTool};

#[derive(Parser)]
#[command(name = "swupack")]
#[command(about = "SWU firmware-update package builder", version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    loglevel: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an SWU package from a sw-description template
    Create(CreateArgs),
}

#[derive(Args)]
struct CreateArgs {
    /// sw-description template
    #[arg(short = 's', long)]
    sw_description: PathBuf,

    /// SWU output file
    #[arg(short = 'o', long)]
    swu_file: PathBuf,

    /// Configuration file with a `variables` section
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Comma-separated list of directories where artifacts are searched
    #[arg(short = 'a', long)]
    artifactory: Option<String>,

    /// File with the AES key and initial IV (`key=<hex>`, `iv=<hex>`)
    #[arg(short = 'K', long)]
    encryption_key_file: Option<PathBuf>,

    /// Signing selector: CMS,<key>,<cert>[,<passfile>] | RSA,<key>[,<passfile>]
    /// | PKCS11,<pin> | CUSTOM,<command>
    #[arg(short = 'k', long)]
    sign: Option<String>,

    /// Encrypt the sw-description itself
    #[arg(short = 't', long)]
    encrypt_swdesc: bool,

    /// Do not compress files
    #[arg(short = 'n', long)]
    no_compress: bool,

    /// Do not encrypt files
    #[arg(short = 'e', long)]
    no_encrypt: bool,

    /// Do not generate IVs, reuse the initial IV for every artifact
    #[arg(short = 'x', long)]
    no_ivt: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.loglevel);

    match cli.command {
        Commands::Create(args) => run_create(args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();
}

fn run_create(args: CreateArgs) {
    let mut config = PipelineConfig::new(args.sw_description, args.swu_file);

    if let Some(ref path) = args.config {
        match config::load_variables(path) {
            Ok(vars) => config.variables = vars,
            Err(err) => fatal(&format!("cannot load configuration: {err}"), 1),
        }
    }

    if let Some(ref selector) = args.sign {
        match SignTool::parse(selector) {
            Ok(tool) => config.sign = Some(tool),
            Err(err) => fatal(&err.to_string(), 1),
        }
    }

    if let Some(ref path) = args.encryption_key_file {
        match config::load_key_file(path) {
            Ok(material) => {
                config.aes_key = material.key;
                config.first_iv = material.iv;
            }
            Err(err) => fatal(&err.to_string(), 1),
        }
    }

    // The working directory is always searched first, then the
    // operator-supplied directories in the order given.
    if let Some(ref dirs) = args.artifactory {
        for dir in dirs.split(',') {
            config.search_dirs.push(PathBuf::from(dir));
        }
    }

    config.encrypt_manifest = args.encrypt_swdesc;
    config.no_compress = args.no_compress;
    config.no_encrypt = args.no_encrypt;
    config.no_ivt = args.no_ivt;

    let mut pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(err) => fatal(&format!("cannot create build directory: {err}"), 1),
    };

    if let Err(err) = pipeline.run() {
        error!("package build failed: {err}");
        process::exit(err.exit_code());
    }
}

fn fatal(message: &str, code: i32) -> ! {
    error!("{message}");
    process::exit(code);
}
