use std::sync::Arc;

use anyhow::Context;
use cim_instance::{ClassSource, KeyListCache};
use cim_registry::{
    BackendKind, BackingStore, ClassRepository, EnumerateOptions, NamespaceDirectory, RepositoryConfig,
};
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Namespaces(_) => cmd_namespaces(&config, &format),
        Command::Classes(args) => cmd_classes(&config, &format, args),
        Command::Show(args) => cmd_show(&config, &format, args),
        Command::Children(args) => cmd_children(&config, &format, args),
        Command::Check(_) => cmd_check(&config, &format),
        Command::Compress(args) => cmd_compress(&config, args),
        Command::Remove(args) => cmd_remove(&config, args),
        Command::Keys(args) => cmd_keys(&config, &format, args),
    }
}

/// Configuration file (or defaults) with command-line overrides applied.
pub fn load_config(cli: &Cli) -> anyhow::Result<RepositoryConfig> {
    let mut config = match &cli.config {
        Some(path) => RepositoryConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RepositoryConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = match backend {
            BackendArg::Eager => BackendKind::Eager,
            BackendArg::Cached => BackendKind::Cached,
        };
    }
    Ok(config)
}

fn open_directory(config: &RepositoryConfig) -> anyhow::Result<NamespaceDirectory> {
    NamespaceDirectory::open(config)
        .with_context(|| format!("opening repository at {}", config.root.display()))
}

fn resolve(directory: &NamespaceDirectory, namespace: &str) -> anyhow::Result<Arc<dyn ClassRepository>> {
    Ok(directory.resolve(namespace)?)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_namespaces(config: &RepositoryConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let mut rows = Vec::new();
    for name in directory.namespaces() {
        let registry = resolve(&directory, &name)?;
        rows.push((name, registry));
    }

    match format {
        OutputFormat::Json => print_json(&json!(rows
            .iter()
            .map(|(name, reg)| json!({
                "name": name,
                "classes": reg.len(),
                "associations": reg.association_count(),
                "version": reg.version(),
            }))
            .collect::<Vec<_>>())),
        OutputFormat::Text => {
            for (name, reg) in &rows {
                println!(
                    "{}  {} classes, {} associations",
                    name.bold(),
                    reg.len().to_string().cyan(),
                    reg.association_count()
                );
            }
            for skipped in directory.skipped() {
                println!("{}  {} {}", skipped.name.dimmed(), "skipped:".red(), skipped.reason);
            }
            Ok(())
        }
    }
}

fn cmd_classes(config: &RepositoryConfig, format: &OutputFormat, args: ClassesArgs) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let registry = resolve(&directory, &args.namespace)?;
    let mut options = if args.deep {
        EnumerateOptions::deep()
    } else {
        EnumerateOptions::shallow()
    };
    if args.associations {
        options = options.associations();
    }
    let names = registry.enumerate_names(args.scope.as_deref(), options)?;

    match format {
        OutputFormat::Json => print_json(&json!(names)),
        OutputFormat::Text => {
            for name in &names {
                if registry.is_association(name) {
                    println!("{} {}", name, "(association)".dimmed());
                } else {
                    println!("{name}");
                }
            }
            Ok(())
        }
    }
}

fn cmd_show(config: &RepositoryConfig, format: &OutputFormat, args: ShowArgs) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let registry = resolve(&directory, &args.namespace)?;
    let class = if args.properties.is_empty() {
        registry.get_class(&args.class)?
    } else {
        let names: Vec<&str> = args.properties.iter().map(String::as_str).collect();
        Arc::new(registry.get_class_filtered(&args.class, &names)?)
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(class.to_descriptor())?),
        OutputFormat::Text => {
            println!("{class}");
            Ok(())
        }
    }
}

fn cmd_children(config: &RepositoryConfig, format: &OutputFormat, args: ChildrenArgs) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let registry = resolve(&directory, &args.namespace)?;
    let names = if args.candidates {
        registry.instance_candidates(&args.class, directory.providers())?
    } else if args.all {
        registry.descendant_names(&args.class)?
    } else {
        registry.children(&args.class)?
    };

    match format {
        OutputFormat::Json => print_json(&json!(names)),
        OutputFormat::Text => {
            if names.is_empty() {
                println!("{} has no matching subclasses.", args.class.yellow());
            }
            for name in &names {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn cmd_check(config: &RepositoryConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let directory = open_directory(config)?;

    match format {
        OutputFormat::Json => {
            let loaded = directory
                .namespaces()
                .into_iter()
                .map(|name| {
                    let reg = resolve(&directory, &name)?;
                    Ok(json!({ "name": name, "classes": reg.len(), "version": reg.version() }))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let skipped: Vec<_> = directory
                .skipped()
                .iter()
                .map(|s| json!({ "name": s.name, "path": s.path, "reason": s.reason }))
                .collect();
            print_json(&json!({ "loaded": loaded, "skipped": skipped }))?;
        }
        OutputFormat::Text => {
            for name in directory.namespaces() {
                let reg = resolve(&directory, &name)?;
                let version = match reg.version() {
                    Some(v) => format!("v{} level {}", v.version, v.obj_impl_level),
                    None => "unversioned".to_string(),
                };
                println!("{} {}  {} classes, {}", "✓".green(), name.bold(), reg.len(), version);
            }
            for skipped in directory.skipped() {
                println!("{} {}  {}", "✗".red().bold(), skipped.name.bold(), skipped.reason);
            }
        }
    }

    let failed = directory.skipped().len();
    if failed > 0 {
        anyhow::bail!("{failed} namespace(s) could not be loaded");
    }
    Ok(())
}

fn cmd_compress(config: &RepositoryConfig, args: CompressArgs) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let dir = directory.namespace_path(&args.namespace)?;
    let store = BackingStore::locate(&dir, &config.store_file)
        .with_context(|| format!("no class store in {}", dir.display()))?;
    let target = store.compress()?;
    println!("{} Compressed {} to {}", "✓".green().bold(), args.namespace.bold(), target.display());
    Ok(())
}

fn cmd_remove(config: &RepositoryConfig, args: RemoveArgs) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let registry = resolve(&directory, &args.namespace)?;
    registry
        .remove_class(&args.class)
        .with_context(|| format!("removing {} from {}", args.class, args.namespace))?;
    println!("{} Removed class {}", "✓".green().bold(), args.class.yellow());
    Ok(())
}

fn cmd_keys(config: &RepositoryConfig, format: &OutputFormat, args: KeysArgs) -> anyhow::Result<()> {
    let directory = open_directory(config)?;
    let keys = KeyListCache::new(directory, config.key_cache_limit);
    let mut rows = Vec::new();
    for class in &args.classes {
        rows.push((class.clone(), keys.key_list(Some(args.namespace.as_str()), class)?));
    }

    match format {
        OutputFormat::Json => print_json(&json!(rows
            .iter()
            .map(|(class, keys)| json!({ "class": class, "keys": keys }))
            .collect::<Vec<_>>())),
        OutputFormat::Text => {
            for (class, names) in &rows {
                if names.is_empty() {
                    println!("{}: {}", class.bold(), "no key properties".dimmed());
                } else {
                    println!("{}: {}", class.bold(), names.join(", "));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn overrides_apply_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cimrepo.toml");
        std::fs::write(&path, "root = \"/srv/cim\"\ncache_limit = 4\n").unwrap();

        let cli = Cli::try_parse_from([
            "cimrepo".to_string(),
            "--config".to_string(),
            path.display().to_string(),
            "--backend".to_string(),
            "cached".to_string(),
            "namespaces".to_string(),
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/cim"));
        assert_eq!(config.backend, BackendKind::Cached);
        assert_eq!(config.cache_limit, 4);

        let cli = Cli::try_parse_from(["cimrepo", "--root", "/elsewhere", "namespaces"]).unwrap();
        assert_eq!(load_config(&cli).unwrap().root, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from(["cimrepo", "--config", "/nonexistent/cimrepo.toml", "check"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
