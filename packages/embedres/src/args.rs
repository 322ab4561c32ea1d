use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, error::ErrorKind};
use embedres_build::{ErrorMode, Options};

/// Embeds files and directory trees into generated C++ sources.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Accept upper-case letters in paths inside directory resources
    #[arg(long)]
    pub no_upcase_check: bool,

    /// Throw std::runtime_error instead of OrthancException
    #[arg(long)]
    pub system_exception: bool,

    /// Dot-separated namespace wrapping the generated code
    #[arg(long, value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Directory holding OrthancException.h
    #[arg(long, value_name = "DIR")]
    pub framework_path: Option<String>,

    /// TOML file listing further resources and settings
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Base filename; <TARGET>.h and <TARGET>.cpp are written
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Resources to embed, as pairs of name and path
    #[arg(value_name = "NAME PATH")]
    pub resources: Vec<String>,
}

impl Args {
    /// Parses the command line, exiting with usage when resources are not given in pairs.
    pub fn parse_checked() -> Self {
        let args = Self::parse();
        if args.resources.len() % 2 != 0 {
            Self::command()
                .error(
                    ErrorKind::WrongNumberOfValues,
                    "resources must be given as <NAME> <PATH> pairs",
                )
                .exit();
        }
        args
    }

    /// Positional resources come first, then the manifest's; flags override manifest settings.
    pub fn into_options(self) -> Result<Options> {
        let mut opts = Options::new(self.target);
        for pair in self.resources.chunks_exact(2) {
            opts.add_resource(&pair[0], &pair[1]);
        }
        if let Some(manifest) = &self.manifest {
            opts.load_manifest(manifest)?;
        }

        if self.no_upcase_check {
            opts = opts.with_upcase_check(false);
        }
        if self.system_exception {
            opts = opts.with_error_mode(ErrorMode::System);
        }
        if let Some(namespace) = self.namespace {
            opts = opts.with_namespace(namespace);
        }
        if let Some(framework_path) = self.framework_path {
            opts = opts.with_framework_path(framework_path);
        }
        Ok(opts)
    }
}
