//! Argument definitions and config layering

use std::path::PathBuf;

use anyhow::{Context, Result};
use canvas_engine::AdapterPreference;
use canvas_runner::CanvasConfig;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

fn graph_arg(required: bool) -> Arg {
    Arg::new("graph")
        .long("graph")
        .value_name("FILE")
        .required(required)
        .value_parser(value_parser!(PathBuf))
        .help("Graph JSON with `nodes` and `edges`")
}

fn template_arg() -> Arg {
    Arg::new("template")
        .long("template")
        .short('t')
        .default_value("pricing-v1")
        .help("Template to analyse")
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .value_parser(value_parser!(u64))
        .help("Seed for a deterministic run")
}

pub(crate) fn command() -> Command {
    Command::new("canvasctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decision canvas run core")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("adapter")
                .long("adapter")
                .global(true)
                .value_parser(["auto", "live", "httpv1", "mock"])
                .help("Adapter preference; overrides config and CANVAS_ADAPTER"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .global(true)
                .help("Live backend base URL; overrides config and CANVAS_BASE_URL"),
        )
        .arg(
            Arg::new("storage-dir")
                .long("storage-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Persistence directory; overrides config and CANVAS_STORAGE_DIR"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run an analysis and print the report")
                .arg(template_arg())
                .arg(seed_arg())
                .arg(graph_arg(false))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Bypass the completion cache with a bumped seed"),
                ),
        )
        .subcommand(
            Command::new("preview")
                .about("Preview a graph with staged edits applied")
                .arg(template_arg())
                .arg(seed_arg())
                .arg(graph_arg(true))
                .arg(
                    Arg::new("staged")
                        .long("staged")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Staged edits JSON"),
                ),
        )
        .subcommand(Command::new("probe").about("Probe the live backend"))
        .subcommand(Command::new("limits").about("Fetch engine limits"))
        .subcommand(
            Command::new("templates")
                .about("List templates, or show one")
                .arg(Arg::new("id").help("Template id")),
        )
        .subcommand(
            Command::new("state")
                .about("Saved canvas state")
                .subcommand_required(true)
                .subcommand(
                    Command::new("save")
                        .about("Save a graph as the canvas state")
                        .arg(graph_arg(true)),
                )
                .subcommand(Command::new("load").about("Print the saved state"))
                .subcommand(Command::new("clear").about("Remove the saved state")),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Named snapshots")
                .subcommand_required(true)
                .subcommand(
                    Command::new("save")
                        .about("Snapshot a graph")
                        .arg(Arg::new("name").required(true))
                        .arg(graph_arg(true)),
                )
                .subcommand(Command::new("list").about("List snapshots, newest first"))
                .subcommand(
                    Command::new("load")
                        .about("Print a snapshot")
                        .arg(Arg::new("id").required(true)),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete a snapshot")
                        .arg(Arg::new("id").required(true)),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export the saved state")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write to a file instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("import")
                .about("Import a canvas file as the saved state")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

/// Defaults, then the config file, then environment, then flags
pub(crate) fn load_config(matches: &ArgMatches) -> Result<CanvasConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };
    let mut config = config.apply_env()?;

    if let Some(adapter) = matches.get_one::<String>("adapter") {
        let preference: AdapterPreference = adapter
            .parse()
            .map_err(anyhow::Error::msg)
            .context("invalid --adapter")?;
        config = config.with_preference(preference);
    }
    if let Some(url) = matches.get_one::<String>("base-url") {
        config = config.with_base_url(url.clone());
    }
    if let Some(dir) = matches.get_one::<PathBuf>("storage-dir") {
        config = config.with_storage_dir(dir.clone());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let matches = command()
            .try_get_matches_from([
                "canvasctl",
                "--adapter",
                "mock",
                "--storage-dir",
                "/tmp/canvas-test",
                "templates",
            ])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.adapter.preference, AdapterPreference::Mock);
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/canvas-test"));
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.toml");
        std::fs::write(&path, "[run]\nthrottle_ms = 50\n").unwrap();
        let matches = command()
            .try_get_matches_from(["canvasctl", "probe", "--config", path.to_str().unwrap()])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.run.throttle_ms, 50);
    }

    #[test]
    fn run_arguments_parse() {
        let matches = command()
            .try_get_matches_from(["canvasctl", "run", "-t", "hiring-v1", "--seed", "7", "--force"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(args.get_one::<String>("template").map(String::as_str), Some("hiring-v1"));
        assert_eq!(args.get_one::<u64>("seed"), Some(&7));
        assert!(args.get_flag("force"));
    }
}
