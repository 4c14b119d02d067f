use anyhow::anyhow;
use brewflow::brewing::{BrewingSession, CompletionHandler, NoteDraft, ParamEdit, WorkflowInput};
use brewflow::recipes::{builtin_equipment, MethodLibrary};
use brewflow::system::{BeanInventory, ConfigManager, EngineEvent, EventBus, MemoryBeanInventory, MemoryStore};
use brewflow::types::{CoffeeBean, Step};
use brewflow::total_duration;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use log::{debug, error, info};

// The demo clock runs ten times faster than a real brew.
const TICK_INTERVAL_MS: u64 = 100;
const SIMULATED_SECONDS_PER_TICK: f64 = 1.0;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting brewflow demo session");

    if let Err(e) = run_session().await {
        error!("Demo session failed: {:?}", e);
    }
}

async fn run_session() -> anyhow::Result<()> {
    let equipment_id = std::env::args().nth(1).unwrap_or_else(|| "V60".to_string());

    let store = MemoryStore::new();
    let inventory = MemoryBeanInventory::new(vec![CoffeeBean {
        id: "demo-bean".to_string(),
        name: "Ethiopia Guji".to_string(),
        remaining: 200.0,
        capacity: 250.0,
        roast_level: Some("Light".to_string()),
    }]);

    let config = ConfigManager::load(&store).await?.get_config().await;
    let library = MethodLibrary::load(&store, &config.custom_methods_key).await?;

    let equipment = builtin_equipment()
        .into_iter()
        .find(|equipment| equipment.id == equipment_id)
        .ok_or_else(|| anyhow!("unknown equipment '{}'", equipment_id))?;
    let method = library
        .methods_for(&equipment.id)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no methods for '{}'", equipment.id))?;

    let bus = EventBus::new();
    let publisher = bus.publisher()?;
    let mut workflow_events = bus.workflow_subscriber()?;
    let mut progress_events = bus.progress_subscriber()?;

    let mut session = BrewingSession::new(config);
    let bean = inventory.get_all_beans().await?.into_iter().next();
    publisher.publish_all(session.select_coffee_bean(bean));
    publisher.publish_all(session.select_equipment(equipment));
    publisher.publish_all(session.select_method(method));
    publisher.publish_all(session.handle_input(WorkflowInput::StartTimer));

    let token = session
        .timer_token()
        .ok_or_else(|| anyhow!("timer did not start"))?;
    let halfway = total_duration(session.timeline()) / 2.0;

    let mut elapsed = 0.0;
    let mut rescaled = false;
    let mut last_index = None;

    while !session.state().is_complete {
        Timer::after(Duration::from_millis(TICK_INTERVAL_MS)).await;
        elapsed += SIMULATED_SECONDS_PER_TICK;
        publisher.publish_all(session.tick(token, elapsed));

        // Halfway through, make the cup a little stronger.
        if !rescaled && elapsed >= halfway {
            rescaled = true;
            if let Some(params) = session.editable_params() {
                publisher.publish_all(session.rescale(ParamEdit::Coffee(params.coffee_g + 2.0)));
            }
        }

        for event in workflow_events.drain() {
            info!("📣 {:?}", event);
        }
        for event in progress_events.drain() {
            match event {
                EngineEvent::StageChange {
                    index,
                    progress_percent,
                    is_waiting,
                    current_water_g,
                    elapsed_s,
                } => {
                    if last_index != Some(index) {
                        last_index = Some(index);
                        let label = session
                            .timeline()
                            .get(index)
                            .map(|stage| stage.label.as_str())
                            .unwrap_or("");
                        info!(
                            "{} {:>5.0}s  {} ({})",
                            if is_waiting { "⏳" } else { "💧" },
                            elapsed_s,
                            label,
                            if is_waiting { "wait" } else { "pour" }
                        );
                    }
                    debug!(
                        "t={:.0}s stage={} {:.0}% water={:.1}g",
                        elapsed_s, index, progress_percent, current_water_g
                    );
                }
                EngineEvent::Completion {
                    total_elapsed_seconds,
                } => info!("✅ Done in {:.0}s", total_elapsed_seconds),
                other => debug!("{:?}", other),
            }
        }
    }

    publisher.publish_all(session.navigate_to(Step::Notes));

    let handler = CompletionHandler::new(&store, &inventory);
    let draft = NoteDraft {
        rating: 4,
        notes: "Bright, clean finish".to_string(),
        ..NoteDraft::default()
    };
    let (note, events) = handler.save_note(&mut session, draft).await?;
    publisher.publish_all(events);

    let remaining = inventory
        .get_all_beans()
        .await?
        .first()
        .map(|bean| bean.remaining)
        .unwrap_or(0.0);
    info!(
        "📝 Note {} saved: {} / {} with {} coffee, {:.0}g beans left",
        note.id, note.equipment, note.method_name, note.params.coffee, remaining
    );

    Ok(())
}
