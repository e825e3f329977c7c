//! Subcommand handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use canvas_engine::{AdapterResolver, AnalysisAdapter};
use canvas_model::{Graph, RunRequest, Seed, StagedEdits, SystemClock};
use canvas_persist::{CanvasPersistence, FileStore};
use canvas_runner::{
    CanvasConfig, LimitsFetcher, PreviewOrchestrator, RunOrchestrator, RunStatus, RunView,
};
use clap::ArgMatches;
use serde_json::{json, Value};

pub(crate) async fn dispatch(matches: &ArgMatches, config: &CanvasConfig) -> Result<()> {
    match matches.subcommand() {
        Some(("run", args)) => run(config, args).await,
        Some(("preview", args)) => preview(config, args).await,
        Some(("probe", _)) => probe(config).await,
        Some(("limits", _)) => limits(config).await,
        Some(("templates", args)) => templates(config, args).await,
        Some(("state", args)) => state(config, args),
        Some(("snapshot", args)) => snapshot(config, args),
        Some(("export", args)) => export(config, args),
        Some(("import", args)) => import(config, args),
        Some((other, _)) => bail!("unknown command '{other}'"),
        None => bail!("no command given"),
    }
}

fn resolver(config: &CanvasConfig) -> Result<Arc<AdapterResolver>> {
    let resolver =
        AdapterResolver::from_config(&config.adapter, config.mock.clone(), Arc::new(SystemClock))
            .context("failed to configure adapters")?;
    Ok(Arc::new(resolver))
}

fn persistence(config: &CanvasConfig) -> Result<CanvasPersistence> {
    let store = FileStore::open(&config.storage.dir)
        .with_context(|| format!("cannot open storage at {}", config.storage.dir.display()))?;
    Ok(CanvasPersistence::new(Arc::new(store)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn seed_arg(args: &ArgMatches) -> Option<Seed> {
    args.get_one::<u64>("seed").copied().map(Seed)
}

fn template_arg(args: &ArgMatches) -> Result<String> {
    args.get_one::<String>("template")
        .cloned()
        .ok_or_else(|| anyhow!("missing --template"))
}

/// Print a finished view; non-complete outcomes become errors
fn report_view(view: &RunView) -> Result<()> {
    match view.status {
        RunStatus::Complete => {
            let completion = view
                .completion
                .as_ref()
                .ok_or_else(|| anyhow!("completed run carried no report"))?;
            print_json(&json!({
                "run_id": view.run_id.map(|id| id.to_string()),
                "hash": view.hash().map(|h| h.to_string()),
                "report": completion.report,
                "review": completion.review,
                "meta": {
                    "diagnostics": view.meta.diagnostics,
                    "degraded": view.meta.degraded,
                    "correlation_id": view.meta.correlation_id,
                    "reconnects": view.meta.reconnects,
                },
            }))
        }
        RunStatus::Error => {
            if let Some(message) = &view.message {
                eprintln!("{}: {}", message.title, message.message);
                eprintln!("{}", message.suggestion);
                if !message.fields.is_empty() {
                    eprintln!("fields: {}", message.fields.join(", "));
                }
            }
            let code = view.error.as_ref().map_or("UNKNOWN", |e| e.code.as_str());
            bail!("run failed with {code}")
        }
        RunStatus::Cancelled => bail!("run cancelled"),
        other => bail!("run ended in unexpected state '{other}'"),
    }
}

async fn run(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let resolver = resolver(config)?;
    let fetcher = LimitsFetcher::new(resolver.clone()).with_config(config.limits.clone());
    fetcher.fetch_limits().await;
    let orchestrator = RunOrchestrator::with_config(resolver, config.run.clone())
        .with_limits(fetcher.subscribe());

    let mut request = RunRequest::new(template_arg(args)?);
    request.seed = seed_arg(args);
    if let Some(path) = args.get_one::<PathBuf>("graph") {
        request = request.with_graph(read_json::<Graph>(path)?);
    }

    let run_id = orchestrator.run(request, args.get_flag("force")).await;
    let mut rx = orchestrator.subscribe();
    let mut last = None;
    loop {
        let (status, progress) = {
            let view = rx.borrow_and_update();
            (view.status, view.progress)
        };
        if last != Some((status, progress)) {
            tracing::info!(%run_id, %status, progress, "run update");
            last = Some((status, progress));
        }
        if !status.is_active() {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            interrupted = tokio::signal::ctrl_c() => {
                interrupted.context("cannot listen for ctrl-c")?;
                orchestrator.cancel();
            }
        }
    }

    let view = orchestrator.wait().await;
    report_view(&view)
}

async fn preview(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let graph_path = args
        .get_one::<PathBuf>("graph")
        .ok_or_else(|| anyhow!("missing --graph"))?;
    let committed: Graph = read_json(graph_path)?;
    let staged: StagedEdits = match args.get_one::<PathBuf>("staged") {
        Some(path) => read_json(path)?,
        None => StagedEdits::default(),
    };

    let preview = PreviewOrchestrator::new(resolver(config)?).with_config(config.preview.clone());
    let run_id =
        preview.request_preview(&template_arg(args)?, &committed, &staged, seed_arg(args));
    let mut rx = preview.subscribe();
    let view = rx
        .wait_for(|view| view.run_id == Some(run_id) && !view.status.is_active())
        .await
        .map(|view| view.clone())
        .context("preview slot closed")?;
    report_view(&view)
}

async fn probe(config: &CanvasConfig) -> Result<()> {
    let resolver = resolver(config)?;
    let status = resolver.reprobe().await;
    let mode = resolver.adapter_mode().await;
    print_json(&json!({
        "preference": resolver.preference().to_string(),
        "mode": mode.as_str(),
        "probe": status,
    }))
}

async fn limits(config: &CanvasConfig) -> Result<()> {
    let resolver = resolver(config)?;
    resolver.ensure_probed().await;
    let fetcher = LimitsFetcher::new(resolver).with_config(config.limits.clone());
    let state = fetcher.fetch_limits().await;
    print_json(&json!({
        "limits": state.limits,
        "source": state.source,
        "fetched_at_ms": state.fetched_at_ms,
        "error": state.error,
    }))
}

async fn templates(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let resolver = resolver(config)?;
    match args.get_one::<String>("id") {
        Some(id) => {
            let detail = resolver.template(id).await?;
            print_json(&serde_json::to_value(detail.as_ref())?)
        }
        None => {
            let list = resolver.templates().await?;
            print_json(&serde_json::to_value(list.as_ref())?)
        }
    }
}

fn state(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let persistence = persistence(config)?;
    match args.subcommand() {
        Some(("save", sub)) => {
            let path = sub
                .get_one::<PathBuf>("graph")
                .ok_or_else(|| anyhow!("missing --graph"))?;
            let graph: Graph = read_json(path)?;
            let saved = persistence.try_save_state(&graph)?;
            tracing::info!(nodes = saved.nodes.len(), edges = saved.edges.len(), "state saved");
            Ok(())
        }
        Some(("load", _)) => {
            let state = persistence
                .load_state()
                .ok_or_else(|| anyhow!("no saved canvas state"))?;
            print_json(&serde_json::to_value(state)?)
        }
        Some(("clear", _)) => {
            persistence.clear_state();
            Ok(())
        }
        _ => bail!("unknown state command"),
    }
}

fn snapshot(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let persistence = persistence(config)?;
    match args.subcommand() {
        Some(("save", sub)) => {
            let name = sub
                .get_one::<String>("name")
                .ok_or_else(|| anyhow!("missing snapshot name"))?;
            let path = sub
                .get_one::<PathBuf>("graph")
                .ok_or_else(|| anyhow!("missing --graph"))?;
            let graph: Graph = read_json(path)?;
            let meta = persistence.try_save_snapshot(name, &graph)?;
            print_json(&serde_json::to_value(meta)?)
        }
        Some(("list", _)) => print_json(&serde_json::to_value(persistence.list_snapshots())?),
        Some(("load", sub)) => {
            let id = sub
                .get_one::<String>("id")
                .ok_or_else(|| anyhow!("missing snapshot id"))?;
            let state = persistence
                .load_snapshot(id)
                .ok_or_else(|| anyhow!("snapshot '{id}' not found or invalid"))?;
            print_json(&serde_json::to_value(state)?)
        }
        Some(("delete", sub)) => {
            let id = sub
                .get_one::<String>("id")
                .ok_or_else(|| anyhow!("missing snapshot id"))?;
            if !persistence.delete_snapshot(id) {
                bail!("snapshot '{id}' not found");
            }
            Ok(())
        }
        _ => bail!("unknown snapshot command"),
    }
}

fn export(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let persistence = persistence(config)?;
    let state = persistence
        .load_state()
        .ok_or_else(|| anyhow!("no saved canvas state to export"))?;
    let json = persistence.export_canvas(&state)?;
    match args.get_one::<PathBuf>("out") {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn import(config: &CanvasConfig, args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("missing file"))?;
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let persistence = persistence(config)?;
    let state = persistence
        .import_canvas(&raw)
        .ok_or_else(|| anyhow!("{} is not a valid canvas export", path.display()))?;
    persistence.try_save_state(&state)?;
    tracing::info!(nodes = state.nodes.len(), edges = state.edges.len(), "canvas imported");
    Ok(())
}
