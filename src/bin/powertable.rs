use powertable::catalog::types::CellValue;
use powertable::config::{RuntimeConfig, TableConfig};
use powertable::mutation::MutationOutcome;
use powertable::permission::StaticPrincipal;
use powertable::persist::SaveOutcome;
use powertable::source::{AttributeSource, HostStates, NoSource, StatesDocument};
use powertable::store::FileStore;
use powertable::{HostAdapters, PowerTable, PresetConfirmation};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    let rest = &args[2..];
    match args[1].as_str() {
        "view" => cmd_view(rest),
        "set" => cmd_set(rest),
        "toggle" => cmd_cell(rest, |table, row, col, id| table.toggle_checkbox(row, col, id)),
        "cycle" => cmd_cell(rest, |table, row, col, id| table.cycle_value(row, col, id)),
        "step" => {
            let delta = parse_number(rest, "--delta")?.unwrap_or(1.0);
            cmd_cell(rest, |table, row, col, id| {
                table.step_number(row, col, id, delta)
            })
        }
        "add-row" => {
            let table = open_table(rest)?;
            let after = parse_index(rest, "--after")?;
            report(table.add_row_below(after).map_err(|e| e.to_string())?)
        }
        "swap-up" => {
            let table = open_table(rest)?;
            let row = parse_index(rest, "--row")?.ok_or("--row is required")?;
            report(table.swap_rows_up(row).map_err(|e| e.to_string())?)
        }
        "swap-down" => {
            let table = open_table(rest)?;
            let row = parse_index(rest, "--row")?.ok_or("--row is required")?;
            report(table.swap_rows_down(row).map_err(|e| e.to_string())?)
        }
        "delete-row" => {
            let table = open_table(rest)?;
            let item_id = parse_flag_value(rest, "--item").ok_or("--item is required")?;
            report(table.delete_row(&item_id).map_err(|e| e.to_string())?)
        }
        "template" => {
            let table = open_table(rest)?;
            let text = parse_flag_value(rest, "--text").ok_or("--text is required")?;
            println!("{}", table.expand_template(&text));
            Ok(())
        }
        other => {
            print_usage();
            Err(format!("unknown command: {other}"))
        }
    }
}

fn cmd_view(args: &[String]) -> Result<(), String> {
    // A one-shot process must not exit before a migration re-save lands.
    let table = open_table(args)?.with_runtime_config(
        RuntimeConfig::default().with_migration_resave_delay(Duration::ZERO),
    );
    if let Some(resave) = table.snapshot().resave {
        match resave.wait_blocking() {
            Some(event) if !event.is_saved() => {
                eprintln!("migration re-save {}: {:?}", event.entity, event.outcome);
            }
            Some(_) => {}
            None => eprintln!("migration re-save did not complete"),
        }
    }
    let view = if has_flag(args, "--sanitized") {
        table.sanitized_view()
    } else {
        table.table_view()
    };
    let out = serde_json::to_string_pretty(&view).map_err(|e| format!("encode view: {e}"))?;
    println!("{out}");
    Ok(())
}

fn cmd_set(args: &[String]) -> Result<(), String> {
    let raw = parse_flag_value(args, "--value").ok_or("--value is required")?;
    let value = serde_json::from_str::<serde_json::Value>(&raw)
        .map(CellValue::from)
        .unwrap_or_else(|_| CellValue::text(raw.as_str()));
    cmd_cell(args, move |table, row, col, id| {
        table.update_cell(row, col, id, value)
    })
}

/// Runs one cell mutation addressed by `--item`, `--col` and an optional
/// `--row` hint.
fn cmd_cell(
    args: &[String],
    mutate: impl FnOnce(
        &PowerTable,
        usize,
        usize,
        &str,
    ) -> Result<MutationOutcome, powertable::error::PowerTableError>,
) -> Result<(), String> {
    let table = open_table(args)?;
    let item_id = parse_flag_value(args, "--item").ok_or("--item is required")?;
    let col = parse_index(args, "--col")?.ok_or("--col is required")?;
    let row = parse_index(args, "--row")?.unwrap_or(usize::MAX);
    report(mutate(&table, row, col, &item_id).map_err(|e| e.to_string())?)
}

fn open_table(args: &[String]) -> Result<PowerTable, String> {
    let config_path = parse_flag_value(args, "--config").ok_or("--config is required")?;
    let raw = fs::read_to_string(&config_path).map_err(|e| format!("read {config_path}: {e}"))?;
    let mut config = TableConfig::from_json_str(&raw).map_err(|e| e.to_string())?;
    if let Some(store) = parse_flag_value(args, "--store") {
        config = config.with_storage_path(store);
    }
    if config.entity.is_none() {
        config = config.with_entity("local");
    }
    let store = Arc::new(FileStore::from_config(&config).map_err(|e| e.to_string())?);

    let mut host = match parse_flag_value(args, "--states") {
        Some(path) => {
            let raw = fs::read_to_string(&path).map_err(|e| format!("read {path}: {e}"))?;
            let states: Arc<dyn HostStates> =
                Arc::new(StatesDocument::from_json_str(&raw).map_err(|e| e.to_string())?);
            HostAdapters::new(
                Arc::new(AttributeSource::new(Arc::clone(&states))),
                store.clone(),
                store,
            )
            .with_states(states)
        }
        None => HostAdapters::new(Arc::new(NoSource), store.clone(), store),
    };
    if let Some(user) = parse_flag_value(args, "--user") {
        host = host.with_principal(Arc::new(StaticPrincipal::new(user)));
    }
    host = host.with_confirmation(Arc::new(PresetConfirmation(has_flag(args, "--yes"))));
    PowerTable::new(config, host).map_err(|e| e.to_string())
}

fn report(outcome: MutationOutcome) -> Result<(), String> {
    match outcome {
        MutationOutcome::Rejected(reason) => Err(format!("rejected: {}", reason.as_str())),
        MutationOutcome::Applied(pending) => match pending.event() {
            Some(event) => match &event.outcome {
                SaveOutcome::Saved => {
                    println!("ok\t{}\t{}\t{}", event.entity, event.reason.as_str(), event.rows);
                    Ok(())
                }
                SaveOutcome::Failed { code, message } => Err(format!("save failed ({code}): {message}")),
                SaveOutcome::Superseded => Err("save superseded by a later save".into()),
            },
            None => Err("save did not complete".into()),
        },
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| args.get(idx + 1).cloned())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn parse_index(args: &[String], flag: &str) -> Result<Option<usize>, String> {
    parse_flag_value(args, flag)
        .map(|raw| raw.parse::<usize>().map_err(|e| format!("{flag} {raw}: {e}")))
        .transpose()
}

fn parse_number(args: &[String], flag: &str) -> Result<Option<f64>, String> {
    parse_flag_value(args, flag)
        .map(|raw| raw.parse::<f64>().map_err(|e| format!("{flag} {raw}: {e}")))
        .transpose()
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!(
        "  powertable view --config <card.json> [--store <data.json>] [--states <states.json>] [--user <name>] [--sanitized]"
    );
    eprintln!("  powertable set --config <card.json> --item <id> --col <n> --value <json|text> [--row <n>]");
    eprintln!("  powertable toggle --config <card.json> --item <id> --col <n>");
    eprintln!("  powertable step --config <card.json> --item <id> --col <n> [--delta <f>]");
    eprintln!("  powertable cycle --config <card.json> --item <id> --col <n>");
    eprintln!("  powertable add-row --config <card.json> [--after <n>]");
    eprintln!("  powertable swap-up --config <card.json> --row <n>");
    eprintln!("  powertable swap-down --config <card.json> --row <n>");
    eprintln!("  powertable delete-row --config <card.json> --item <id> --yes");
    eprintln!("  powertable template --config <card.json> --text <text>");
}
