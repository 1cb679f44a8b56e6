//! `arena` command surface.
//!
//! External harnesses drive the core through these commands. Every command
//! prints one JSON document with `--format json` and returns an
//! [`ExitCode`].
//!
//! Each invocation is its own process while a practice session spans
//! several (`practice begin`, `practice record`, `practice end`), so an
//! on-disk marker cannot tell a live session from a crashed one. Commands
//! therefore never restore on their own; the host runs `arena recover` when
//! it starts.

use std::path::{Path, PathBuf};

use arena_common::{Error, LoadoutId, OutputFormat, STORE_SCHEMA_VERSION};
use arena_config::{ConfigOverrides, ResolvedConfig};
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::exit_codes::ExitCode;
use crate::model::{CharacterClass, FightResult, Loadout, Outcome, RunRecord};
use crate::recovery::{RecoveryOutcome, RecoverySupervisor};
use crate::session::{
    PracticeRequest, PracticeTarget, RestoreReport, SessionFiles, SessionManager,
};
use crate::stats::{EncounterStats, StatsAggregator};
use crate::store::{ArenaStore, HistoryFilter};

/// Loadout store and practice session core for the Practice Arena
#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(version, about = "Loadout store and practice session core for the Practice Arena")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/practice-arena/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the database and session files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Database file, overriding the data directory default
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalOpts {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            data_dir: self.data_dir.clone(),
            db_path: self.db.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore the real save if a previous process died mid-practice
    Recover,

    /// Show store and practice session status
    Status,

    /// Manage saved loadouts
    Loadout(LoadoutArgs),

    /// List recorded runs, newest first
    History(HistoryArgs),

    /// Per-encounter win rates and Pareto-optimal victories
    Stats(StatsArgs),

    /// Begin, record, and end practice sessions
    Practice(PracticeArgs),
}

#[derive(Args, Debug)]
pub struct LoadoutArgs {
    #[command(subcommand)]
    pub command: LoadoutCommands,
}

#[derive(Subcommand, Debug)]
pub enum LoadoutCommands {
    /// List loadouts, favorites first
    List,

    /// Show one loadout in full
    Show {
        /// Loadout id
        id: i64,
    },

    /// Rename a loadout
    Rename {
        /// Loadout id
        id: i64,
        /// New name
        name: String,
    },

    /// Delete a loadout; its runs are kept and detached
    Delete {
        /// Loadout id
        id: i64,
    },

    /// Toggle the favorite flag
    Favorite {
        /// Loadout id
        id: i64,
    },
}

#[derive(Args, Debug, Default)]
pub struct HistoryArgs {
    /// Only runs of this loadout
    #[arg(long)]
    pub loadout: Option<i64>,

    /// Only runs against this encounter id
    #[arg(long)]
    pub encounter: Option<String>,

    /// Only runs of this character class
    #[arg(long = "class")]
    pub class: Option<String>,

    /// Only victories or defeats (VICTORY, DEFEAT)
    #[arg(long)]
    pub outcome: Option<Outcome>,

    /// Maximum number of runs to list
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// Only this loadout's encounters
    #[arg(long)]
    pub loadout: Option<i64>,
}

#[derive(Args, Debug)]
pub struct PracticeArgs {
    #[command(subcommand)]
    pub command: PracticeCommands,
}

#[derive(Subcommand, Debug)]
pub enum PracticeCommands {
    /// Snapshot the run, back up the real save, and start practice
    #[command(group(ArgGroup::new("target").required(true).args(["loadout", "capture"])))]
    Begin {
        /// Run state file (snapshot envelope, any supported format version)
        #[arg(long)]
        state: PathBuf,

        /// Host save file to protect during practice
        #[arg(long)]
        save: PathBuf,

        /// Practise with this stored loadout
        #[arg(long)]
        loadout: Option<i64>,

        /// Save the live run as a new loadout with this name and practise with it
        #[arg(long)]
        capture: Option<String>,
    },

    /// Record one concluded practice fight
    Record(RecordArgs),

    /// End practice and put the real save back
    End,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Encounter id
    #[arg(long)]
    pub encounter: String,

    /// Display name (defaults to the encounter id)
    #[arg(long)]
    pub name: Option<String>,

    /// VICTORY or DEFEAT
    #[arg(long)]
    pub outcome: Outcome,

    #[arg(long)]
    pub turns: u32,

    #[arg(long, default_value_t = 0)]
    pub damage_dealt: u32,

    #[arg(long, default_value_t = 0)]
    pub damage_taken: u32,

    /// HP when the fight started
    #[arg(long)]
    pub start_hp: u32,

    /// HP when the fight ended
    #[arg(long)]
    pub end_hp: u32,

    /// Potion used during the fight (repeatable)
    #[arg(long = "potion")]
    pub potions: Vec<String>,

    #[arg(long, default_value_t = 0)]
    pub floor: u32,
}

impl RecordArgs {
    fn to_fight(&self) -> FightResult {
        FightResult {
            encounter_id: self.encounter.clone(),
            encounter_name: self.name.clone().unwrap_or_else(|| self.encounter.clone()),
            outcome: self.outcome,
            turns_taken: self.turns,
            damage_dealt: self.damage_dealt,
            damage_taken: self.damage_taken,
            starting_hp: self.start_hp,
            ending_hp: self.end_hp,
            potions_used: self.potions.clone(),
            floor_num: self.floor,
        }
    }
}

/// Open the store and session files named by `resolved`, then dispatch.
pub fn run(cli: &Cli, resolved: &ResolvedConfig) -> ExitCode {
    let format = cli.global.format;
    let files = SessionFiles::new(&resolved.session_dir);
    let open_store = || -> Result<ArenaStore, Error> {
        let store = ArenaStore::open_with_config(resolved)?;
        debug!(db = %resolved.db_path.display(), session_dir = %files.dir().display(), "store ready");
        Ok(store)
    };

    let result = match &cli.command {
        // Recovery must not depend on the store opening.
        Commands::Recover => return run_recover(&format, &files),
        Commands::Status => {
            open_store().and_then(|store| run_status(&format, resolved, &store, files.clone()))
        }
        Commands::Loadout(args) => open_store().and_then(|store| run_loadout(&format, &store, args)),
        Commands::History(args) => open_store().and_then(|store| run_history(&format, &store, args)),
        Commands::Stats(args) => open_store().and_then(|store| run_stats(&format, &store, args)),
        Commands::Practice(args) => {
            open_store().and_then(|store| run_practice(&format, store, files.clone(), args))
        }
    };
    match result {
        Ok(()) => ExitCode::Clean,
        Err(e) => fail(&format, command_name(&cli.command), e),
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Recover => "recover",
        Commands::Status => "status",
        Commands::Loadout(args) => match args.command {
            LoadoutCommands::List => "loadout list",
            LoadoutCommands::Show { .. } => "loadout show",
            LoadoutCommands::Rename { .. } => "loadout rename",
            LoadoutCommands::Delete { .. } => "loadout delete",
            LoadoutCommands::Favorite { .. } => "loadout favorite",
        },
        Commands::History(_) => "history",
        Commands::Stats(_) => "stats",
        Commands::Practice(args) => match args.command {
            PracticeCommands::Begin { .. } => "practice begin",
            PracticeCommands::Record(_) => "practice record",
            PracticeCommands::End => "practice end",
        },
    }
}

/// Report `error` and map it to an exit code.
fn fail(format: &OutputFormat, command: &str, error: Error) -> ExitCode {
    let code = ExitCode::for_error(&error);
    let fatal = error.is_fatal();
    if fatal {
        error!(command, code = error.code(), error = %error, "command failed; store or session unusable");
    } else {
        warn!(command, code = error.code(), error = %error, "command failed");
    }
    match format {
        OutputFormat::Json => {
            let output = json!({
                "schema_version": STORE_SCHEMA_VERSION,
                "command": command,
                "error": {
                    "code": error.code(),
                    "message": error.to_string(),
                    "fatal": fatal,
                },
                "exit_code": code.as_i32(),
            });
            match serde_json::to_string_pretty(&output) {
                Ok(text) => println!("{text}"),
                Err(_) => eprintln!("arena {command}: {error}"),
            }
        }
        OutputFormat::Text => eprintln!("arena {command}: {error}"),
    }
    code
}

fn emit(command: &str, body: serde_json::Value) -> Result<(), Error> {
    let mut output = json!({
        "schema_version": STORE_SCHEMA_VERSION,
        "generated_at": Utc::now().to_rfc3339(),
        "command": command,
    });
    if let (Some(out), serde_json::Value::Object(fields)) = (output.as_object_mut(), body) {
        out.extend(fields);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_recover(format: &OutputFormat, files: &SessionFiles) -> ExitCode {
    let outcome = RecoverySupervisor::new(files.clone()).check_and_recover();
    let code = match &outcome {
        RecoveryOutcome::None => ExitCode::Clean,
        RecoveryOutcome::Restored { .. } => ExitCode::Recovered,
        RecoveryOutcome::RestoreFailed { .. } => ExitCode::RecoveryFailed,
    };

    match format {
        OutputFormat::Json => {
            let printed = serde_json::to_value(&outcome)
                .map_err(Error::from)
                .and_then(|recovery| {
                    emit(
                        "recover",
                        json!({ "recovery": recovery, "exit_code": code.as_i32() }),
                    )
                });
            if let Err(e) = printed {
                return fail(format, "recover", e);
            }
        }
        OutputFormat::Text => match &outcome {
            RecoveryOutcome::None => println!("No interrupted practice session."),
            RecoveryOutcome::Restored { report } => {
                println!("Interrupted practice session recovered.");
                println!("  {}", describe_report(report));
            }
            RecoveryOutcome::RestoreFailed { reason } => {
                eprintln!("arena recover: restore failed: {reason}");
                eprintln!("  The practice marker was kept; fix the cause and run `arena recover` again.");
            }
        },
    }
    code
}

fn describe_report(report: &RestoreReport) -> String {
    match report {
        RestoreReport::NothingToRestore => "nothing to restore".to_string(),
        RestoreReport::SaveUnchanged { session_id } => {
            format!("session {session_id}: real save was untouched")
        }
        RestoreReport::SaveRestored { session_id, bytes } => {
            format!("session {session_id}: real save restored ({bytes} bytes)")
        }
        RestoreReport::SaveRemoved { session_id } => {
            format!("session {session_id}: practice save removed (there was no real save)")
        }
    }
}

fn run_status(
    format: &OutputFormat,
    resolved: &ResolvedConfig,
    store: &ArenaStore,
    files: SessionFiles,
) -> Result<(), Error> {
    let schema_version = store.schema_version()?;
    let loadouts = store.list_loadouts()?.len();
    let file_status = files.status();
    let manager = SessionManager::open(store.clone(), files);
    let session = manager.active_session();

    match format {
        OutputFormat::Json => emit(
            "status",
            json!({
                "db_path": resolved.db_path,
                "session_dir": resolved.session_dir,
                "config_source": resolved.source,
                "store_schema_version": schema_version,
                "loadouts": loadouts,
                "session_state": manager.status(),
                "session_files": file_status,
                "session": session,
            }),
        ),
        OutputFormat::Text => {
            println!("# Practice Arena");
            println!();
            println!("  Database: {}", resolved.db_path.display());
            println!("  Schema:   v{schema_version}");
            println!("  Loadouts: {loadouts}");
            match session {
                Some(session) => println!(
                    "  Practice: active since {} with '{}' (#{})",
                    session.started_at.to_rfc3339(),
                    session.loadout.name,
                    session.loadout.id
                ),
                None if file_status.marker => {
                    println!("  Practice: marker present but unreadable; run `arena recover`")
                }
                None if !file_status.is_clean() => {
                    println!("  Practice: stray session files (removed by `arena recover`)")
                }
                None => println!("  Practice: idle"),
            }
            Ok(())
        }
    }
}

fn run_loadout(format: &OutputFormat, store: &ArenaStore, args: &LoadoutArgs) -> Result<(), Error> {
    match &args.command {
        LoadoutCommands::List => run_loadout_list(format, store),
        LoadoutCommands::Show { id } => run_loadout_show(format, store, LoadoutId(*id)),
        LoadoutCommands::Rename { id, name } => {
            let id = LoadoutId(*id);
            store.rename_loadout(id, name)?;
            info!(loadout_id = %id, name = %name, "loadout renamed");
            let loadout = store.get_loadout(id)?;
            match format {
                OutputFormat::Json => emit("loadout rename", json!({ "loadout": loadout })),
                OutputFormat::Text => {
                    println!("Renamed #{} to '{}'", loadout.id, loadout.name);
                    Ok(())
                }
            }
        }
        LoadoutCommands::Delete { id } => {
            let id = LoadoutId(*id);
            let detached = store.delete_loadout(id)?;
            match format {
                OutputFormat::Json => emit(
                    "loadout delete",
                    json!({ "loadout_id": id, "detached_runs": detached }),
                ),
                OutputFormat::Text => {
                    println!("Deleted #{id}; {detached} run(s) kept as detached history");
                    Ok(())
                }
            }
        }
        LoadoutCommands::Favorite { id } => {
            let id = LoadoutId(*id);
            let is_favorite = store.toggle_favorite(id)?;
            match format {
                OutputFormat::Json => emit(
                    "loadout favorite",
                    json!({ "loadout_id": id, "is_favorite": is_favorite }),
                ),
                OutputFormat::Text => {
                    let verb = if is_favorite { "Marked" } else { "Unmarked" };
                    println!("{verb} #{id} as favorite");
                    Ok(())
                }
            }
        }
    }
}

fn loadout_line(loadout: &Loadout) -> String {
    let c = &loadout.character;
    format!(
        "{} #{} {} [{} A{}] hp={}/{} gold={} deck={} relics={} potions={}",
        if loadout.is_favorite { "*" } else { " " },
        loadout.id,
        loadout.name,
        c.character_class,
        c.ascension_level,
        c.current_hp,
        c.max_hp,
        c.gold,
        c.deck.len(),
        c.relics.total(),
        c.potions.total(),
    )
}

fn run_loadout_list(format: &OutputFormat, store: &ArenaStore) -> Result<(), Error> {
    let loadouts = store.list_loadouts()?;
    match format {
        OutputFormat::Json => emit(
            "loadout list",
            json!({ "count": loadouts.len(), "loadouts": loadouts }),
        ),
        OutputFormat::Text => {
            println!("# Loadouts ({} total)", loadouts.len());
            println!();
            for loadout in &loadouts {
                println!("  {}", loadout_line(loadout));
            }
            Ok(())
        }
    }
}

fn run_loadout_show(format: &OutputFormat, store: &ArenaStore, id: LoadoutId) -> Result<(), Error> {
    let loadout = store.get_loadout(id)?;
    match format {
        OutputFormat::Json => emit("loadout show", json!({ "loadout": loadout })),
        OutputFormat::Text => {
            let c = &loadout.character;
            println!("# Loadout #{}: {}", loadout.id, loadout.name);
            println!();
            println!("  UUID:      {}", loadout.uuid);
            println!("  Class:     {} (ascension {})", c.character_class, c.ascension_level);
            println!("  HP:        {}/{}", c.current_hp, c.max_hp);
            println!("  Gold:      {}", c.gold);
            println!("  Slots:     {}", loadout.potion_slots);
            println!("  Hash:      {}", loadout.content_hash);
            println!("  Favorite:  {}", loadout.is_favorite);
            println!("  Updated:   {}", loadout.updated_at.to_rfc3339());
            println!();
            println!("  Deck ({} cards):", c.deck.len());
            for card in &c.deck {
                if card.upgrades > 0 {
                    println!("    {}+{}", card.id, card.upgrades);
                } else {
                    println!("    {}", card.id);
                }
            }
            println!("  Relics:");
            for (relic, count) in c.relics.iter() {
                println!("    {relic} x{count}");
            }
            println!("  Potions:");
            for (potion, count) in c.potions.iter() {
                println!("    {potion} x{count}");
            }
            Ok(())
        }
    }
}

impl HistoryArgs {
    fn filter(&self) -> HistoryFilter {
        let mut filter = HistoryFilter::all();
        if let Some(id) = self.loadout {
            filter = filter.loadout(LoadoutId(id));
        }
        if let Some(encounter) = &self.encounter {
            filter = filter.encounter(encounter.clone());
        }
        if let Some(class) = &self.class {
            filter = filter.character_class(CharacterClass::new(class));
        }
        if let Some(outcome) = self.outcome {
            filter = filter.outcome(outcome);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        filter
    }
}

fn run_line(run: &RunRecord) -> String {
    let loadout = run
        .loadout_id
        .map(|id| format!("#{id}"))
        .unwrap_or_else(|| "detached".to_string());
    format!(
        "{} run {} {} vs {}: {} in {} turns, took {} dmg, {} potion(s) [{}]",
        run.fought_at.format("%Y-%m-%d %H:%M"),
        run.id,
        run.character_class,
        run.encounter_name,
        run.outcome,
        run.turns_taken,
        run.damage_taken,
        run.potions_used.len(),
        loadout,
    )
}

fn run_history(format: &OutputFormat, store: &ArenaStore, args: &HistoryArgs) -> Result<(), Error> {
    let mut iter = store.query_history(args.filter());
    let mut runs = Vec::new();
    for run in iter.by_ref() {
        runs.push(run?);
    }
    let skipped = iter.skipped();

    match format {
        OutputFormat::Json => emit(
            "history",
            json!({ "count": runs.len(), "skipped": skipped, "runs": runs }),
        ),
        OutputFormat::Text => {
            println!("# History ({} runs)", runs.len());
            println!();
            for run in &runs {
                println!("  {}", run_line(run));
            }
            if skipped > 0 {
                println!();
                println!("  ({skipped} unreadable record(s) skipped)");
            }
            Ok(())
        }
    }
}

fn run_stats(format: &OutputFormat, store: &ArenaStore, args: &StatsArgs) -> Result<(), Error> {
    let stats: Vec<EncounterStats> =
        StatsAggregator::new(store.clone()).stats_for(args.loadout.map(LoadoutId))?;
    match format {
        OutputFormat::Json => emit("stats", json!({ "count": stats.len(), "encounters": stats })),
        OutputFormat::Text => {
            println!("# Encounter stats ({} groups)", stats.len());
            for group in &stats {
                println!();
                println!(
                    "  #{} vs {}: {}W/{}L of {} ({:.1}%)",
                    group.loadout_id,
                    group.encounter_name,
                    group.wins,
                    group.losses,
                    group.total_runs,
                    group.win_rate * 100.0
                );
                for victory in &group.pareto_victories {
                    println!(
                        "    best: run {} turns={} damage_taken={} potions={}",
                        victory.run_id,
                        victory.turns_taken,
                        victory.damage_taken,
                        victory.potions_used
                    );
                }
                if group.skipped_victories > 0 {
                    println!(
                        "    ({} undecodable victories left out)",
                        group.skipped_victories
                    );
                }
            }
            Ok(())
        }
    }
}

fn read_state(path: &Path) -> Result<crate::model::RunState, Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(codec::decode(&text)?)
}

fn run_practice(
    format: &OutputFormat,
    store: ArenaStore,
    files: SessionFiles,
    args: &PracticeArgs,
) -> Result<(), Error> {
    let mut manager = SessionManager::open(store, files);
    match &args.command {
        PracticeCommands::Begin {
            state,
            save,
            loadout,
            capture,
        } => {
            let target = match (loadout, capture) {
                (Some(id), _) => PracticeTarget::ExistingLoadout(LoadoutId(*id)),
                (None, Some(name)) => PracticeTarget::CaptureLive { name: name.clone() },
                (None, None) => {
                    return Err(Error::Config(
                        "practice begin needs --loadout or --capture".to_string(),
                    ))
                }
            };
            let request = PracticeRequest {
                state: read_state(state)?,
                save_path: save.clone(),
                target,
            };
            let session = manager.begin_practice(request)?;
            match format {
                OutputFormat::Json => emit("practice begin", json!({ "session": session })),
                OutputFormat::Text => {
                    println!(
                        "Practice started with '{}' (#{}); session {}",
                        session.loadout.name, session.loadout.id, session.session_id
                    );
                    Ok(())
                }
            }
        }
        PracticeCommands::Record(record) => {
            let run_id = manager.record_fight(record.to_fight())?;
            match format {
                OutputFormat::Json => emit("practice record", json!({ "run_id": run_id })),
                OutputFormat::Text => {
                    println!("Recorded run {run_id}");
                    Ok(())
                }
            }
        }
        PracticeCommands::End => {
            let report = manager.end_practice()?;
            match format {
                OutputFormat::Json => emit("practice end", json!({ "restore": report })),
                OutputFormat::Text => {
                    println!("{}", describe_report(&report));
                    Ok(())
                }
            }
        }
    }
}
