use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use prefsync_core::{SyncConfig, Synchronizer};
use prefsync_store::{FileNativeStore, NativeStore};
use prefsync_tree::{Preferences, PrefsNode};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

/// Result of one command, rendered once the store has been closed.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Value {
        path: String,
        key: String,
        value: Option<String>,
    },
    List {
        path: String,
        kind: &'static str,
        items: Vec<String>,
    },
    Done(String),
    Config(SyncConfig),
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let outcome = execute(cli)?;
    render(&outcome, format)
}

pub fn execute(cli: Cli) -> anyhow::Result<Outcome> {
    let native: Arc<dyn NativeStore> = Arc::new(FileNativeStore::open(&cli.root));
    let sync = match &cli.config {
        Some(path) => Synchronizer::new(native, SyncConfig::load(path)?)?,
        None => Synchronizer::with_process_config(native)?,
    };
    let prefs = Preferences::new(sync);
    let root = if cli.system {
        prefs.system_root()
    } else {
        prefs.user_root()
    };
    debug!(root = %cli.root.display(), tree = %root, "store opened");

    let outcome = match cli.command {
        Command::Get(args) => {
            let value = match existing(&root, &args.path)? {
                Some(node) => node.get(&args.key)?,
                None => None,
            };
            Outcome::Value {
                path: args.path,
                key: args.key,
                value,
            }
        }
        Command::Put(args) => {
            let node = root.node(&args.path)?;
            node.put(&args.key, &args.value)?;
            node.flush()?;
            Outcome::Done(format!("set {} on {}", args.key, node.absolute_path()))
        }
        Command::Remove(args) => {
            let node = required(&root, &args.path)?;
            node.remove(&args.key)?;
            node.flush()?;
            Outcome::Done(format!("removed {} from {}", args.key, node.absolute_path()))
        }
        Command::Keys(args) => Outcome::List {
            items: required(&root, &args.path)?.keys()?,
            path: args.path,
            kind: "keys",
        },
        Command::Children(args) => Outcome::List {
            items: required(&root, &args.path)?.children_names()?,
            path: args.path,
            kind: "children",
        },
        Command::RemoveNode(args) => {
            let node = required(&root, &args.path)?;
            node.remove_node()?;
            node.flush()?;
            Outcome::Done(format!("removed node {}", node.absolute_path()))
        }
        Command::Flush => {
            root.flush()?;
            Outcome::Done(format!("flushed {} preferences", root.scope()))
        }
        Command::Sync => {
            root.sync()?;
            Outcome::Done(format!("synced {} preferences", root.scope()))
        }
        Command::Config => Outcome::Config(prefs.synchronizer().config().clone()),
    };
    debug!(stats = ?prefs.synchronizer().stats(), "command finished");
    Ok(outcome)
}

fn existing(root: &PrefsNode, path: &str) -> anyhow::Result<Option<PrefsNode>> {
    if !root.node_exists(path)? {
        return Ok(None);
    }
    Ok(Some(root.node(path)?))
}

fn required(root: &PrefsNode, path: &str) -> anyhow::Result<PrefsNode> {
    existing(root, path)?.with_context(|| format!("no such node: {path}"))
}

pub fn render(outcome: &Outcome, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&to_json(outcome)?)?),
        OutputFormat::Text => render_text(outcome),
    }
    Ok(())
}

fn to_json(outcome: &Outcome) -> anyhow::Result<serde_json::Value> {
    Ok(match outcome {
        Outcome::Value { path, key, value } => json!({ "path": path, "key": key, "value": value }),
        Outcome::List { path, kind, items } => {
            let mut object = serde_json::Map::new();
            object.insert("path".into(), json!(path));
            object.insert((*kind).into(), json!(items));
            serde_json::Value::Object(object)
        }
        Outcome::Done(message) => json!({ "ok": true, "message": message }),
        Outcome::Config(config) => {
            let mut value = serde_json::to_value(config)?;
            let effective = json!({
                "flush_delay_ms": config.flush_delay().as_millis() as u64,
                "sync_interval_ms": config.sync_interval().map(|d| d.as_millis() as u64),
            });
            value
                .as_object_mut()
                .context("configuration did not serialize to an object")?
                .insert("effective".into(), effective);
            value
        }
    })
}

fn render_text(outcome: &Outcome) {
    match outcome {
        Outcome::Value { value: Some(value), .. } => println!("{value}"),
        Outcome::Value { path, key, value: None } => {
            println!("{} {} is not set on {}", "∅".dimmed(), key.yellow(), path.bold());
        }
        Outcome::List { path, kind, items } if items.is_empty() => {
            println!("{} has no {kind}", path.bold());
        }
        Outcome::List { items, .. } => {
            for item in items {
                println!("{item}");
            }
        }
        Outcome::Done(message) => println!("{} {}", "✓".green().bold(), message),
        Outcome::Config(config) => {
            println!("flush delay:   {} units ({:?})", config.flush_delay, config.flush_delay());
            match config.sync_interval() {
                Some(every) => println!("sync interval: {} units ({every:?})", config.sync_interval),
                None => println!("sync interval: {}", "disabled".dimmed()),
            }
            println!("unit:          {:?}", config.unit());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    fn run(root: &Path, args: &[&str]) -> anyhow::Result<Outcome> {
        let mut argv = vec!["prefsync", "--root", root.to_str().unwrap()];
        argv.extend_from_slice(args);
        execute(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn put_then_get_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let done = run(dir.path(), &["put", "/com.acme/window", "width", "800"]).unwrap();
        assert!(matches!(done, Outcome::Done(_)));

        let got = run(dir.path(), &["get", "/com.acme/window", "width"]).unwrap();
        assert_eq!(
            got,
            Outcome::Value {
                path: "/com.acme/window".into(),
                key: "width".into(),
                value: Some("800".into()),
            }
        );
    }

    #[test]
    fn get_on_missing_node_does_not_create_it() {
        let dir = tempfile::tempdir().unwrap();
        let got = run(dir.path(), &["get", "/nowhere", "k"]).unwrap();
        assert!(matches!(got, Outcome::Value { value: None, .. }));

        let children = run(dir.path(), &["children", "/"]).unwrap();
        assert!(matches!(children, Outcome::List { ref items, .. } if items.is_empty()));
    }

    #[test]
    fn scopes_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["put", "--system", "/svc", "port", "80"]).unwrap();

        let user = run(dir.path(), &["get", "/svc", "port"]).unwrap();
        assert!(matches!(user, Outcome::Value { value: None, .. }));
        let system = run(dir.path(), &["--system", "get", "/svc", "port"]).unwrap();
        assert!(matches!(system, Outcome::Value { value: Some(ref v), .. } if v == "80"));
    }

    #[test]
    fn keys_children_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["put", "/app/a", "k1", "v"]).unwrap();
        run(dir.path(), &["put", "/app/a", "k2", "v"]).unwrap();
        run(dir.path(), &["put", "/app/b", "k", "v"]).unwrap();

        let keys = run(dir.path(), &["keys", "/app/a"]).unwrap();
        assert!(matches!(keys, Outcome::List { ref items, .. } if items == &["k1", "k2"]));

        run(dir.path(), &["remove-node", "/app/a"]).unwrap();
        let children = run(dir.path(), &["children", "/app"]).unwrap();
        assert!(matches!(children, Outcome::List { ref items, .. } if items == &["b"]));
        assert!(run(dir.path(), &["keys", "/app/a"]).is_err());
    }

    #[test]
    fn config_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("prefsync.toml");
        std::fs::write(&file, "flush_delay = 7\nsync_interval = 30\n").unwrap();

        let outcome = run(dir.path(), &["config", "--config", file.to_str().unwrap()]).unwrap();
        let Outcome::Config(config) = outcome else {
            panic!("wrong outcome");
        };
        assert_eq!(config.flush_delay, 7);
        assert_eq!(config.sync_interval, 30);

        let json = to_json(&Outcome::Config(config)).unwrap();
        assert_eq!(json["effective"]["flush_delay_ms"], 7000);
    }

    #[test]
    fn config_defaults_to_process_settings() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(dir.path(), &["config"]).unwrap();
        assert_eq!(outcome, Outcome::Config(SyncConfig::process().clone()));
    }

    #[test]
    fn oversized_config_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("huge.toml");
        std::fs::write(
            &file,
            "unit_ms = \"18446744073709551615\"\nflush_delay = 4294967295\n",
        )
        .unwrap();

        let outcome = run(dir.path(), &["--config", file.to_str().unwrap(), "config"]).unwrap();
        let Outcome::Config(config) = outcome else {
            panic!("wrong outcome");
        };
        assert_eq!(config.flush_delay(), prefsync_core::config::MAX_EFFECTIVE_PERIOD);
        assert!(to_json(&Outcome::Config(config)).is_ok());
    }
}
