use crate::config::{BuilderConfig, OrphanPolicy};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "srcgraph",
    version,
    about = "Resolved cross-file graph of a Python source tree",
    after_help = r#"Examples:
  srcgraph build --repo .
  srcgraph build --repo . --orphans prune --third-party requests,numpy
  srcgraph dump --repo src --pretty
  RUST_LOG=srcgraph=debug srcgraph build --sequential
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the graph and print stats, diagnostics summary and fingerprint.
    Build {
        #[command(flatten)]
        opts: BuildArgs,
    },
    /// Build the graph and print every node, edge and diagnostic.
    Dump {
        #[command(flatten)]
        opts: BuildArgs,
        /// Indent the JSON output.
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BuildArgs {
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// Include files ignored by .gitignore.
    #[arg(long)]
    pub no_ignore: bool,
    /// What to do with nodes left without edges: debug|prune.
    #[arg(long, value_enum)]
    pub orphans: Option<OrphanPolicy>,
    /// Top-level packages to classify as third-party.
    #[arg(long = "third-party", value_delimiter = ',')]
    pub third_party: Vec<String>,
    /// Classify every unknown top-level import as third-party.
    #[arg(long)]
    pub assume_third_party: bool,
    /// Visit files on the calling thread instead of the rayon pool.
    #[arg(long)]
    pub sequential: bool,
}

impl BuildArgs {
    /// Environment configuration with the flags applied on top.
    pub fn builder_config(&self) -> BuilderConfig {
        self.apply(BuilderConfig::get().clone())
    }

    fn apply(&self, mut config: BuilderConfig) -> BuilderConfig {
        if let Some(policy) = self.orphans {
            config.orphan_policy = policy;
        }
        for package in &self.third_party {
            let package = package.trim();
            if !package.is_empty() && !config.third_party.iter().any(|p| p == package) {
                config.third_party.push(package.to_string());
            }
        }
        if self.assume_third_party {
            config.assume_third_party = true;
        }
        if self.sequential {
            config.parallel = false;
        }
        config
    }
}
