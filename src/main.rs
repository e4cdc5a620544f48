//! Kingdom Checks - Entry Point
//!
//! Runs a kingdom turn from the terminal. Checks are rolled on the async
//! runtime; the REPL confirms, cancels or rerolls them and answers the
//! sub-step questions their outcomes ask.

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use kingdom_checks::catalog::StaticCatalog;
use kingdom_checks::core::error::Result;
use kingdom_checks::core::types::{
    CheckId, CheckType, HexId, InstanceId, KingdomPhase, ResourceKind, Turn,
};
use kingdom_checks::core::PipelineConfig;
use kingdom_checks::dice::SeededDice;
use kingdom_checks::interaction::{ChannelCollector, PendingInput};
use kingdom_checks::kingdom::{Army, KingdomState, Settlement};
use kingdom_checks::pipeline::{
    CheckContext, InstanceStatus, PipelineCoordinator, PipelineInstance, PipelineOutcome,
    ProficiencyRank,
};
use kingdom_checks::store::{JsonFileStore, MemoryStore, SharedStateStore};
use kingdom_checks::ui::{describe_kind, parse_answer, ConsoleUI, LogCategory};

#[derive(Parser, Debug)]
#[command(name = "kingdom-checks")]
#[command(about = "Roll, preview, confirm and commit kingdom checks")]
struct Args {
    /// Extra checks (TOML) loaded on top of the built-in catalog
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Kingdom document (JSON); in-memory when omitted
    #[arg(long)]
    store: Option<PathBuf>,

    /// Pipeline config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dice seed, overrides the config
    #[arg(long)]
    seed: Option<u64>,
}

type Running = Vec<(CheckId, JoinHandle<Result<PipelineOutcome>>)>;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const WAIT_LIMIT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("kingdom_checks=info")
        .init();

    let args = Args::parse();
    let rt = Runtime::new()?;

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_toml(path)?,
        None => PipelineConfig::new(),
    };
    if let Some(seed) = args.seed {
        config.dice_seed = seed;
    }
    if args.store.is_some() {
        config.store_path = args.store.clone();
    }

    let mut catalog = StaticCatalog::builtin()?;
    if let Some(path) = &args.catalog {
        catalog.extend(StaticCatalog::load_from_toml(path)?);
    }
    tracing::info!(checks = catalog.len(), "Catalog loaded");

    let store: Arc<dyn SharedStateStore> = match &config.store_path {
        Some(path) => Arc::new(rt.block_on(JsonFileStore::open(path.clone(), starting_kingdom()))?),
        None => Arc::new(MemoryStore::new(starting_kingdom())),
    };
    let (collector, mut inputs) = ChannelCollector::new();
    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::new(catalog.clone()),
        Arc::new(SeededDice::new(config.dice_seed)),
        store.clone(),
        Arc::new(collector),
        config,
    ));

    let mut ui = ConsoleUI::new();
    let mut running: Running = Vec::new();

    let report = rt.block_on(coordinator.resume_persisted())?;
    for resumed in report.resumed {
        let open = coordinator.pending_instances();
        if let Some(instance) = open.into_iter().find(|i| i.instance_id == resumed.instance_id) {
            println!("Resumed {} awaiting confirmation", instance.check_id);
            running.push((instance.check_id, resumed.handle));
        }
    }

    println!("\n=== KINGDOM CHECKS ===");
    println!();
    println!("Commands:");
    println!("  perform <check> [skill] [rank]  - Roll a check and preview its outcome");
    println!("  confirm [n]                     - Apply a previewed outcome");
    println!("  cancel [n]                      - Abandon a check before it commits");
    println!("  reroll [n]                      - Spend fame to roll again");
    println!("  answer <value...>               - Answer the oldest question (empty = dismiss)");
    println!("  phase <name>                    - Enter a turn phase");
    println!("  checks                          - List the catalog");
    println!("  status / s                      - Show the kingdom");
    println!("  end-turn                        - Cancel open checks and advance the turn");
    println!("  quit / q                        - Exit");
    println!();

    loop {
        drain_inputs(&mut inputs, &mut ui);
        let turn = rt.block_on(store.read())?.turn_state.turn;
        reap_finished(&rt, &mut running, &mut ui, turn);

        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let words: Vec<&str> = input.split_whitespace().collect();
        let Some((&command, rest)) = words.split_first() else {
            continue;
        };

        match command {
            "quit" | "q" => break,
            "status" | "s" => {
                let state = rt.block_on(store.read())?;
                display_status(&state, &coordinator, &ui);
            }
            "checks" => {
                for check_type in CheckType::ALL {
                    for check in catalog.of_type(check_type) {
                        let repeat = if check.repeatable { "" } else { " (once per turn)" };
                        println!(
                            "  {:<9} {:<22} {}{}",
                            check_type.to_string(),
                            check.id.to_string(),
                            check.name,
                            repeat
                        );
                    }
                }
            }
            "perform" => {
                let Some(check) = rest.first() else {
                    println!("Usage: perform <check> [skill] [rank]");
                    continue;
                };
                let check_id = CheckId::from(*check);
                let Some(definition) = catalog.definition(&check_id) else {
                    println!("Unknown check: {}", check_id);
                    continue;
                };
                let mut context = CheckContext::new(definition.check_type).with_user("console");
                if let Some(skill) = rest.get(1) {
                    let rank = rest
                        .get(2)
                        .map(|r| parse_rank(r))
                        .unwrap_or(ProficiencyRank::Trained);
                    context = context.with_skill(*skill, rank);
                }

                let worker = coordinator.clone();
                let id = check_id.clone();
                let handle = rt.spawn(async move { worker.execute_pipeline(&id, context).await });
                let check_type = definition.check_type;
                let waiting = await_preview(&coordinator, check_type, &check_id, &handle);
                let started = rt.block_on(waiting);
                running.push((check_id.clone(), handle));

                if let Some(instance) = started {
                    ui.select(instance.instance_id);
                    let name = definition.name.as_str();
                    rt.block_on(show_preview(&coordinator, &instance, name, turn, &mut ui))?;
                }
            }
            "confirm" => match pick_instance(&coordinator, &ui, rest) {
                Some(id) => {
                    println!("{:?}", coordinator.confirm_apply(id));
                    rt.block_on(await_progress(&coordinator, id, &mut inputs, &mut ui));
                }
                None => println!("No such check. Use 'status' to list open checks."),
            },
            "cancel" => match pick_instance(&coordinator, &ui, rest) {
                Some(id) => {
                    let outcome = rt.block_on(coordinator.cancel(id));
                    ui.forget_inputs_for(id);
                    ui.deselect(id);
                    println!("{:?}", outcome);
                }
                None => println!("No such check. Use 'status' to list open checks."),
            },
            "reroll" => match pick_instance(&coordinator, &ui, rest) {
                Some(id) => match rt.block_on(coordinator.reroll(id)) {
                    Ok(summary) => {
                        println!("Rerolled: {} ({})", summary.degree, summary.breakdown);
                        ui.log(turn, format!("rerolled to {}", summary.degree), LogCategory::Roll);
                    }
                    Err(e) => println!("Reroll failed: {}", e),
                },
                None => println!("No such check. Use 'status' to list open checks."),
            },
            "answer" => match ui.next_input() {
                None => println!("Nothing is waiting for an answer."),
                Some(pending) if rest.is_empty() => {
                    pending.dismiss();
                    println!("Dismissed.");
                }
                Some(pending) => match parse_answer(&pending.request.kind, rest) {
                    Ok(value) => {
                        let id = pending.request.instance_id;
                        pending.answer(value);
                        rt.block_on(await_progress(&coordinator, id, &mut inputs, &mut ui));
                    }
                    Err(e) => {
                        println!("{} (expected {})", e, describe_kind(&pending.request.kind));
                        ui.pending_inputs.push_front(pending);
                    }
                },
            },
            "phase" => match rest.first().map(|p| p.parse::<KingdomPhase>()) {
                Some(Ok(phase)) => {
                    let reset = rt.block_on(coordinator.begin_phase(phase))?;
                    println!("Entered the {} phase ({} previews reset)", phase, reset);
                }
                Some(Err(e)) => println!("{}", e),
                None => println!("Usage: phase <status|resources|unrest|events|actions|upkeep>"),
            },
            "end-turn" => {
                let summary = rt.block_on(coordinator.end_turn())?;
                ui.pending_inputs.clear();
                ui.selected_instance = None;
                ui.log(
                    summary.turn,
                    format!(
                        "turn {} begins ({} checks cancelled)",
                        summary.turn, summary.cancelled
                    ),
                    LogCategory::System,
                );
                println!("Turn {} begins.", summary.turn);
            }
            _ => println!(
                "Unknown command. Available: perform, confirm, cancel, reroll, answer, phase, \
                 checks, status, end-turn, quit"
            ),
        }
    }

    println!("\nGoodbye!");
    Ok(())
}

/// Wait for a freshly spawned check to show its preview
///
/// Returns None when the pipeline finished first (rejected or failed).
async fn await_preview(
    coordinator: &PipelineCoordinator,
    check_type: CheckType,
    check_id: &CheckId,
    handle: &JoinHandle<Result<PipelineOutcome>>,
) -> Option<PipelineInstance> {
    let waiting = async {
        loop {
            if let Some(instance) = coordinator.get_pending_instance(check_type, check_id) {
                if instance.status == InstanceStatus::AwaitingConfirmation {
                    return Some(instance);
                }
            }
            if handle.is_finished() {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };
    tokio::time::timeout(WAIT_LIMIT, waiting).await.ok().flatten()
}

/// Wait until a resumed check asks its next question or leaves the registry
async fn await_progress(
    coordinator: &PipelineCoordinator,
    instance_id: InstanceId,
    inputs: &mut UnboundedReceiver<PendingInput>,
    ui: &mut ConsoleUI,
) {
    let waiting = async {
        loop {
            tokio::select! {
                Some(pending) = inputs.recv() => {
                    show_input(pending, ui);
                    return;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    let open = coordinator.pending_instances();
                    if !open.iter().any(|i| i.instance_id == instance_id) {
                        return;
                    }
                }
            }
        }
    };
    if tokio::time::timeout(WAIT_LIMIT, waiting).await.is_err() {
        tracing::debug!(instance_id = %instance_id, "Still running, continuing");
    }
}

/// Print the rolled outcome of a check waiting for confirmation
async fn show_preview(
    coordinator: &PipelineCoordinator,
    instance: &PipelineInstance,
    name: &str,
    turn: Turn,
    ui: &mut ConsoleUI,
) -> Result<()> {
    let Some(preview_id) = instance.preview_id else {
        return Ok(());
    };
    let Some(preview) = coordinator.previews().get(preview_id).await? else {
        return Ok(());
    };
    let Some(outcome) = preview.applied_outcome else {
        return Ok(());
    };

    println!("{}: {} ({})", name, outcome.degree, outcome.roll_breakdown);
    println!("  {}", outcome.effect);
    for modifier in &outcome.modifiers {
        println!("  {:+} {} [{}]", modifier.value, modifier.resource, modifier.source);
    }
    for shortfall in &preview.shortfall {
        println!("  short {} {}", shortfall.missing, shortfall.resource);
    }
    ui.log(turn, format!("{} rolled {}", name, outcome.degree), LogCategory::Roll);
    Ok(())
}

fn show_input(pending: PendingInput, ui: &mut ConsoleUI) {
    println!(
        "? {} [{}]: {} ({})",
        pending.request.check_id,
        pending.request.step_id,
        pending.request.prompt,
        describe_kind(&pending.request.kind)
    );
    ui.queue_input(pending);
}

fn drain_inputs(inputs: &mut UnboundedReceiver<PendingInput>, ui: &mut ConsoleUI) {
    while let Ok(pending) = inputs.try_recv() {
        show_input(pending, ui);
    }
}

fn reap_finished(rt: &Runtime, running: &mut Running, ui: &mut ConsoleUI, turn: u32) {
    let mut still_running = Vec::with_capacity(running.len());
    for (check_id, handle) in running.drain(..) {
        if !handle.is_finished() {
            still_running.push((check_id, handle));
            continue;
        }
        match rt.block_on(handle) {
            Ok(Ok(outcome)) => {
                if let Some(id) = outcome.instance_id {
                    ui.deselect(id);
                }
                let category = match outcome.status {
                    Some(InstanceStatus::Applied) => LogCategory::Commit,
                    _ => LogCategory::Cancel,
                };
                let message = match (&outcome.execution_result.error, category) {
                    (None, _) => format!("{} applied", check_id),
                    (Some(error), LogCategory::Commit) => {
                        format!("{} applied with errors: {}", check_id, error)
                    }
                    (Some(error), _) => format!("{} did not apply: {}", check_id, error),
                };
                println!("{}", message);
                for delta in &outcome.applied {
                    println!("  {} {:+}", delta.resource, delta.applied);
                }
                ui.log(turn, message, category);
            }
            Ok(Err(e)) => println!("{} failed: {}", check_id, e),
            Err(e) => println!("{} task aborted: {}", check_id, e),
        }
    }
    *running = still_running;
}

/// `n` from the status list, a full instance id, or the current selection
fn pick_instance(
    coordinator: &PipelineCoordinator,
    ui: &ConsoleUI,
    rest: &[&str],
) -> Option<InstanceId> {
    let open = coordinator.pending_instances();
    match rest.first() {
        None => ui.selected_instance.or_else(|| open.first().map(|i| i.instance_id)),
        Some(word) => {
            if let Ok(n) = word.parse::<usize>() {
                return open.get(n.checked_sub(1)?).map(|i| i.instance_id);
            }
            word.parse::<InstanceId>().ok()
        }
    }
}

fn parse_rank(word: &str) -> ProficiencyRank {
    match word.to_lowercase().as_str() {
        "trained" => ProficiencyRank::Trained,
        "expert" => ProficiencyRank::Expert,
        "master" => ProficiencyRank::Master,
        "legendary" => ProficiencyRank::Legendary,
        _ => ProficiencyRank::Untrained,
    }
}

fn display_status(state: &KingdomState, coordinator: &PipelineCoordinator, ui: &ConsoleUI) {
    println!();
    println!(
        "=== {} | Turn {} | {} phase ===",
        state.name, state.turn_state.turn, state.turn_state.phase
    );
    let stock: Vec<String> = ResourceKind::STOCK
        .iter()
        .map(|r| format!("{} {}", r, state.amount(*r)))
        .collect();
    println!("  {}", stock.join(", "));
    println!(
        "  Unrest {}, Fame {}, {} hexes claimed",
        state.unrest,
        state.fame,
        state.claimed_hexes()
    );
    for settlement in &state.settlements {
        println!("  Settlement {} ({}) at {}", settlement.name, settlement.id, settlement.hex);
    }
    for army in &state.armies {
        let location = army.location.as_ref().map(|h| h.to_string()).unwrap_or_else(|| "-".into());
        println!("  Army {} ({}) at {}", army.name, army.id, location);
    }

    let open = coordinator.pending_instances();
    if !open.is_empty() {
        println!();
        println!("Open checks:");
        for (i, instance) in open.iter().enumerate() {
            let marker = if ui.selected_instance == Some(instance.instance_id) { "*" } else { " " };
            println!(
                " {}{}. {} [{:?}] rerolls {}",
                marker,
                i + 1,
                instance.check_id,
                instance.status,
                instance.context.rerolls_used
            );
        }
    }
    if !ui.pending_inputs.is_empty() {
        println!();
        println!("Waiting for answers: {}", ui.pending_inputs.len());
    }
    if !ui.turn_log.is_empty() {
        println!();
        for entry in ui.recent(5) {
            println!("  [turn {}] {}", entry.turn, entry.message);
        }
    }
    println!();
}

/// A small starting kingdom for fresh documents
fn starting_kingdom() -> KingdomState {
    let mut state = KingdomState::new("Stolen Lands")
        .with_amount(ResourceKind::Gold, 10)
        .with_amount(ResourceKind::Food, 4)
        .with_amount(ResourceKind::Lumber, 4)
        .with_amount(ResourceKind::Stone, 2)
        .with_amount(ResourceKind::Unrest, 2)
        .with_amount(ResourceKind::Fame, 1);
    state.claim_hex(HexId::from("0.0"));
    state.settlements.push(Settlement {
        id: "capital".into(),
        name: "Tatzlford".into(),
        hex: HexId::from("0.0"),
        garrison: vec!["army-1".into()],
    });
    state.armies.push(Army {
        id: "army-1".into(),
        name: "Swordlords".into(),
        home_settlement: Some("capital".into()),
        location: Some(HexId::from("0.0")),
        route: Vec::new(),
    });
    state
}
