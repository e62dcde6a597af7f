use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dirsync_core::{SyncApp, SyncPaths, SyncRecordDto};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "dirsync")]
#[command(about = "Directory synchronization engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List sync records in registry order.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one record, including its resolved source folder.
    Show { id: String },
    Create {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value_t = false)]
        auto_sync: bool,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "#ffffff")]
        color: String,
    },
    /// Replace a record's rule, keeping its id and list position.
    Update {
        id: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value_t = false)]
        auto_sync: bool,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "#ffffff")]
        color: String,
    },
    Delete { id: String },
    /// Exchange a record's source and destination templates.
    Swap { id: String },
    MoveUp { id: String },
    MoveDown { id: String },
    Duplicate { id: String },
    /// Trigger a one-shot sync and wait for the copy queue to drain.
    Sync { id: String },
    /// Toggle continuous watching for a record.
    AutoSync {
        id: String,
        #[arg(long)]
        enabled: bool,
    },
    /// Keep the process alive so auto-sync records mirror continuously.
    Watch,
    Var {
        #[command(subcommand)]
        command: VarCommands,
    },
    /// Set the copy queue's concurrency limit.
    SetConcurrency { max: usize },
    /// Print the most recent log entries.
    Logs {
        #[arg(long, default_value_t = 50)]
        tail: usize,
    },
    Doctor,
}

#[derive(Subcommand, Debug)]
enum VarCommands {
    List {
        #[arg(long)]
        json: bool,
    },
    Get { name: String },
    Set { name: String, value: String },
    /// Drop variables no longer referenced by any record template.
    Prune,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut app = SyncApp::open(SyncPaths::detect()).context("failed to open dirsync state")?;

    match cli.command {
        Commands::List { json } => {
            let dtos: Vec<SyncRecordDto> = app
                .registry
                .records()
                .iter()
                .map(|record| record.to_dto())
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&dtos)?);
            } else {
                for record in app.registry.records() {
                    println!(
                        "{}\t{} -> {}\tauto={}\tlast={}",
                        record.id(),
                        record.from_template().raw(),
                        record.to_template().raw(),
                        record.auto_sync(),
                        record.last_sync().to_rfc3339()
                    );
                }
            }
        }
        Commands::Show { id } => {
            let record = app
                .registry
                .record(&id)
                .ok_or_else(|| anyhow!("sync record not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&record.to_dto())?);
            println!("source folder: {}", record.resolved_source_folder());
        }
        Commands::Create {
            from,
            to,
            auto_sync,
            description,
            color,
        } => {
            let id = app.registry.add(SyncRecordDto {
                id: None,
                from,
                to,
                auto_sync,
                last_sync: None,
                description,
                color,
            })?;
            println!("created {id}");
        }
        Commands::Update {
            id,
            from,
            to,
            auto_sync,
            description,
            color,
        } => {
            app.registry.replace_by_id(
                &id,
                SyncRecordDto {
                    id: Some(id.clone()),
                    from,
                    to,
                    auto_sync,
                    last_sync: None,
                    description,
                    color,
                },
            )?;
            println!("updated {id}");
        }
        Commands::Delete { id } => {
            app.registry.delete_by_id(&id)?;
            println!("deleted {id}");
        }
        Commands::Swap { id } => {
            app.registry.swap_direction(&id)?;
            println!("swapped {id}");
        }
        Commands::MoveUp { id } => {
            app.registry.move_up(&id)?;
            println!("moved {id} up");
        }
        Commands::MoveDown { id } => {
            app.registry.move_down(&id)?;
            println!("moved {id} down");
        }
        Commands::Duplicate { id } => {
            let source = app
                .registry
                .record(&id)
                .ok_or_else(|| anyhow!("sync record not found: {id}"))?
                .to_dto();
            let copy = app.registry.duplicate(source)?;
            println!("duplicated {id} as {copy}");
        }
        Commands::Sync { id } => {
            app.registry.sync_once(&id)?;
            drain(&app);
        }
        Commands::AutoSync { id, enabled } => {
            app.registry.set_auto_sync(&id, enabled)?;
            println!("auto-sync for {id}: {enabled}");
        }
        Commands::Watch => {
            let watching = app
                .registry
                .records()
                .iter()
                .filter(|record| record.auto_sync())
                .count();
            println!("watching {watching} record(s); Ctrl-C to stop");
            let mut printed = 0;
            loop {
                printed = print_new_logs(&app, printed);
                std::thread::sleep(Duration::from_millis(500));
            }
        }
        Commands::Var { command } => match command {
            VarCommands::List { json } => {
                let mut variables = app.variables.snapshot();
                variables.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
                if json {
                    println!("{}", serde_json::to_string_pretty(&variables)?);
                } else {
                    for variable in variables {
                        println!("{}={}", variable.name, variable.value);
                    }
                }
            }
            VarCommands::Get { name } => {
                let value = app
                    .variables
                    .get(&name)
                    .ok_or_else(|| anyhow!("variable not found: {name}"))?;
                println!("{value}");
            }
            VarCommands::Set { name, value } => {
                app.variables.set(&name, &value);
                println!("{name}={value}");
            }
            VarCommands::Prune => {
                app.registry.prune_unused_variables();
                println!("pruned to {} variable(s)", app.variables.snapshot().len());
            }
        },
        Commands::SetConcurrency { max } => {
            app.set_max_concurrency(max)?;
            println!("max concurrency set to {max}");
        }
        Commands::Logs { tail } => {
            for entry in app.log.tail(tail) {
                println!("{}", entry.serialize());
            }
        }
        Commands::Doctor => {
            let paths = app.paths();
            println!("runtime={}", paths.runtime_directory.display());
            println!("records={}", paths.records_path.display());
            println!("variables={}", paths.variables_path.display());
            println!("settings={}", paths.settings_path.display());
            println!("records_loaded={}", app.registry.records().len());
            println!("variables_loaded={}", app.variables.snapshot().len());
            println!("max_concurrency={}", app.settings.max_concurrency);
        }
    }

    Ok(())
}

/// Waits until the copy queue has stayed idle long enough for the
/// one-shot watcher to have settled, printing log entries as they come.
fn drain(app: &SyncApp) {
    let mut printed = 0;
    let mut idle_since: Option<Instant> = None;
    loop {
        printed = print_new_logs(app, printed);
        if app.executor.is_idle() {
            let since = idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() > Duration::from_secs(2) {
                break;
            }
        } else {
            idle_since = None;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    print_new_logs(app, printed);
}

fn print_new_logs(app: &SyncApp, printed: usize) -> usize {
    let entries = app.log.entries();
    for entry in &entries[printed..] {
        println!("{}", entry.serialize());
    }
    entries.len()
}
