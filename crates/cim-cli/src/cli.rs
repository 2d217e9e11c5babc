use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cimrepo",
    about = "Inspect and maintain a CIM class repository",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository root, overriding the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Registry backend, overriding the configuration
    #[arg(long, global = true)]
    pub backend: Option<BackendArg>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BackendArg {
    Eager,
    Cached,
}

#[derive(Subcommand)]
pub enum Command {
    /// List loaded namespaces
    Namespaces(NamespacesArgs),
    /// Enumerate classes of a namespace
    Classes(ClassesArgs),
    /// Show one class
    Show(ShowArgs),
    /// List subclasses of a class
    Children(ChildrenArgs),
    /// Validate every class store under the root
    Check(CheckArgs),
    /// Write a compressed copy of a namespace's class store
    Compress(CompressArgs),
    /// Remove a class without subclasses
    Remove(RemoveArgs),
    /// Show the key properties of classes
    Keys(KeysArgs),
}

#[derive(Args)]
pub struct NamespacesArgs {}

#[derive(Args)]
pub struct ClassesArgs {
    pub namespace: String,
    /// Start below this class instead of at the top level
    #[arg(long)]
    pub scope: Option<String>,
    #[arg(long)]
    pub deep: bool,
    #[arg(long)]
    pub associations: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub namespace: String,
    pub class: String,
    /// Only include these properties
    #[arg(long, value_delimiter = ',')]
    pub properties: Vec<String>,
}

#[derive(Args)]
pub struct ChildrenArgs {
    pub namespace: String,
    pub class: String,
    /// Every descendant instead of direct subclasses
    #[arg(long)]
    pub all: bool,
    /// Classes whose instances live in the repository
    #[arg(long, conflicts_with = "all")]
    pub candidates: bool,
}

#[derive(Args)]
pub struct CheckArgs {}

#[derive(Args)]
pub struct CompressArgs {
    pub namespace: String,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub namespace: String,
    pub class: String,
}

#[derive(Args)]
pub struct KeysArgs {
    pub namespace: String,
    #[arg(required = true)]
    pub classes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cimrepo", "classes", "root/cimv2", "--deep", "--format", "json", "--root", "/tmp/r",
        ])
        .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/r")));
        match cli.command {
            Command::Classes(args) => {
                assert_eq!(args.namespace, "root/cimv2");
                assert!(args.deep);
                assert!(args.scope.is_none());
            }
            _ => panic!("expected classes"),
        }
    }

    #[test]
    fn property_list_is_comma_separated() {
        let cli = Cli::try_parse_from(["cimrepo", "show", "root/cimv2", "CIM_Disk", "--properties", "Name,Size"])
            .unwrap();
        match cli.command {
            Command::Show(args) => assert_eq!(args.properties, vec!["Name", "Size"]),
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn keys_needs_a_class() {
        assert!(Cli::try_parse_from(["cimrepo", "keys", "root/cimv2"]).is_err());
        assert!(Cli::try_parse_from(["cimrepo", "children", "ns", "C", "--all", "--candidates"]).is_err());
    }
}
