//! Note saving at the end of a brew: inventory deduction, persistence, session reset.

use crate::brewing::states::{BrewingSession, EngineEvents};
use crate::brewing::timeline::total_duration;
use crate::system::storage::{BeanInventory, KeyValueStore};
use crate::types::{MethodParams, Stage, Step};
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasteRatings {
    pub acidity: u8,
    pub sweetness: u8,
    pub bitterness: u8,
    pub body: u8,
}

/// What the user filled in on the notes form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub rating: u8,
    pub taste: TasteRatings,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrewNote {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub equipment: String,
    pub method_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coffee_bean_id: Option<String>,
    pub params: MethodParams,
    pub stages: Vec<Stage>,
    pub total_time_s: f64,
    pub rating: u8,
    pub taste: TasteRatings,
    pub notes: String,
}

pub struct CompletionHandler<'a, S, B> {
    store: &'a S,
    beans: &'a B,
}

impl<'a, S, B> CompletionHandler<'a, S, B>
where
    S: KeyValueStore,
    B: BeanInventory,
{
    pub fn new(store: &'a S, beans: &'a B) -> Self {
        Self { store, beans }
    }

    /// Records the finished brew and resets the session.
    ///
    /// The coffee deducted is the working method's mass, so edits made while
    /// brewing count. On a storage error the session stays in place and the
    /// caller may retry; the bean is only charged once per run.
    pub async fn save_note(
        &self,
        session: &mut BrewingSession,
        draft: NoteDraft,
    ) -> anyhow::Result<(BrewNote, EngineEvents)> {
        let state = session.state();
        if state.active_step != Step::Notes && !state.is_complete {
            bail!("cannot save a note before the brew is complete");
        }
        let Some(method) = state.current_brewing_method.clone() else {
            bail!("no brewing method to record");
        };

        let coffee_used_g = method.coffee_grams();
        let bean_id = state.selected_coffee_bean.as_ref().map(|bean| bean.id.clone());
        match &bean_id {
            Some(bean_id) if !state.coffee_deducted => {
                let updated = self
                    .beans
                    .update_remaining(bean_id, coffee_used_g)
                    .await
                    .with_context(|| format!("deducting {}g from bean {}", coffee_used_g, bean_id))?;
                if updated.is_none() {
                    warn!("Bean {} not found in inventory, nothing deducted", bean_id);
                }
                session.mark_coffee_deducted();
            }
            Some(bean_id) => debug!("Coffee for this brew already deducted from {}", bean_id),
            None => {}
        }
        let state = session.state();

        let note = BrewNote {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            equipment: state
                .selected_equipment
                .as_ref()
                .map(|equipment| equipment.name.clone())
                .unwrap_or_default(),
            method_name: method.name.clone(),
            coffee_bean_id: bean_id,
            stages: method.params.stages.clone(),
            params: method.params,
            total_time_s: total_duration(session.timeline()),
            rating: draft.rating,
            taste: draft.taste,
            notes: draft.notes,
        };

        let notes_key = session.config().notes_key.clone();
        let mut notes = load_notes(self.store, &notes_key).await?;
        notes.push(note.clone());
        let text = serde_json::to_string(&notes).context("serializing brew notes")?;
        self.store
            .set(&notes_key, &text)
            .await
            .context("writing brew notes")?;

        info!(
            "📝 Saved note {} for '{}' ({:.1}g coffee, {} notes stored)",
            note.id,
            note.method_name,
            coffee_used_g,
            notes.len()
        );

        let events = session.reset();
        Ok((note, events))
    }
}

pub async fn load_notes<S: KeyValueStore>(store: &S, key: &str) -> anyhow::Result<Vec<BrewNote>> {
    match store.get(key).await.context("reading brew notes")? {
        None => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text).context("parsing brew notes"),
    }
}
