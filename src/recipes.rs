//! Built-in recipe catalog and user-defined methods.
//!
//! Custom methods are stored as a versioned document keyed by equipment id.
//! Older unversioned layouts (a flat array, or an object keyed by equipment)
//! are migrated once on load and written back in the current format.

use crate::system::storage::KeyValueStore;
use crate::types::{
    Equipment, Method, MethodParams, PourType, Stage, TimingRole, ValveStatus,
};
use anyhow::{bail, Context};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const METHODS_SCHEMA_VERSION: u32 = 2;

/// Equipment id used for legacy flat-array entries that name no equipment.
pub const UNASSIGNED_EQUIPMENT: &str = "custom";

const EXTRACTION_KEYWORDS: &[&str] = &["萃取", "意式", "extraction", "espresso"];
const BEVERAGE_KEYWORDS: &[&str] = &["饮料", "加水", "加奶", "beverage", "milk"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMethodsDocument {
    pub version: u32,
    pub methods: BTreeMap<String, Vec<Method>>,
}

impl Default for CustomMethodsDocument {
    fn default() -> Self {
        Self {
            version: METHODS_SCHEMA_VERSION,
            methods: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFlatEntry {
    #[serde(default)]
    equipment_id: Option<String>,
    #[serde(flatten)]
    method: Method,
}

pub fn builtin_equipment() -> Vec<Equipment> {
    vec![
        Equipment::new("V60", "Hario V60"),
        Equipment::new("Kalita", "Kalita Wave"),
        Equipment::new("CleverDripper", "Clever Dripper"),
        Equipment::new("Espresso", "Espresso Machine"),
    ]
}

fn params(coffee: &str, water: &str, ratio: &str, grind: &str, temp: &str, stages: Vec<Stage>) -> MethodParams {
    MethodParams {
        coffee: coffee.to_string(),
        water: water.to_string(),
        ratio: ratio.to_string(),
        grind_size: grind.to_string(),
        temp: temp.to_string(),
        stages,
    }
}

fn builtin(name: &str, params: MethodParams) -> Method {
    Method {
        id: None,
        name: name.to_string(),
        params,
    }
}

/// Catalog methods for one piece of equipment, empty for unknown ids.
pub fn builtin_methods(equipment_id: &str) -> Vec<Method> {
    match equipment_id {
        "V60" => vec![
            builtin(
                "Three-stage pour",
                params("15g", "225g", "1:15", "Medium-fine", "92°C", vec![
                    Stage::new(25.0, "Bloom", "30g")
                        .with_pour_time(10.0)
                        .with_pour_type(PourType::Circle)
                        .with_detail("Wet all grounds evenly"),
                    Stage::new(70.0, "Second pour", "140g")
                        .with_pour_time(15.0)
                        .with_pour_type(PourType::Circle)
                        .with_detail("Slow concentric circles"),
                    Stage::new(120.0, "Final pour", "225g")
                        .with_pour_time(20.0)
                        .with_pour_type(PourType::Center)
                        .with_detail("Steady centre pour, then drawdown"),
                ]),
            ),
            builtin(
                "One pour",
                params("16g", "240g", "1:15", "Medium", "93°C", vec![
                    Stage::new(30.0, "Bloom", "40g").with_pour_type(PourType::Circle),
                    Stage::new(150.0, "Main pour", "240g")
                        .with_pour_time(40.0)
                        .with_pour_type(PourType::Circle),
                ]),
            ),
        ],
        "Kalita" => vec![builtin(
            "Pulse pour",
            params("20g", "320g", "1:16", "Medium", "93°C", vec![
                Stage::new(35.0, "Bloom", "50g").with_pour_time(10.0),
                Stage::new(80.0, "First pulse", "150g").with_pour_time(15.0),
                Stage::new(125.0, "Second pulse", "250g").with_pour_time(15.0),
                Stage::new(180.0, "Third pulse", "320g").with_pour_time(15.0),
            ]),
        )],
        "CleverDripper" => vec![builtin(
            "Steep and release",
            params("18g", "270g", "1:15", "Medium-coarse", "94°C", vec![
                Stage {
                    valve_status: Some(ValveStatus::Closed),
                    ..Stage::new(20.0, "Pour all water", "270g").with_pour_time(20.0)
                },
                Stage {
                    valve_status: Some(ValveStatus::Closed),
                    ..Stage::new(140.0, "Steep", "270g").with_pour_time(0.0)
                },
                Stage {
                    valve_status: Some(ValveStatus::Open),
                    ..Stage::new(200.0, "Release", "270g").with_pour_time(0.0)
                },
            ]),
        )],
        "Espresso" => vec![builtin(
            "Americano",
            params("18g", "36g", "1:2", "Fine", "93°C", vec![
                Stage::new(28.0, "Extraction", "36g")
                    .with_pour_type(PourType::Extraction)
                    .with_detail("Aim for 25-30s"),
                Stage::new(0.0, "Hot water", "150g")
                    .with_pour_type(PourType::Beverage)
                    .with_detail("Top up to taste"),
            ]),
        )],
        _ => Vec::new(),
    }
}

/// Assigns explicit timing roles to stages written before roles existed.
pub fn infer_timing_role(stage: &Stage) -> Option<TimingRole> {
    let text = format!("{} {}", stage.label, stage.detail).to_lowercase();
    if EXTRACTION_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        Some(TimingRole::Extraction)
    } else if BEVERAGE_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        Some(TimingRole::Beverage)
    } else {
        None
    }
}

fn tag_legacy_roles(method: &mut Method) {
    for stage in &mut method.params.stages {
        if stage.effective_role().is_none() {
            stage.timing_role = infer_timing_role(stage);
        }
    }
}

/// Upgrades any stored layout to the current document.
/// Returns the document and whether it was migrated.
pub fn migrate(raw: Value) -> anyhow::Result<(CustomMethodsDocument, bool)> {
    if raw.get("version").is_some() {
        let document: CustomMethodsDocument =
            serde_json::from_value(raw).context("parsing custom methods document")?;
        if document.version > METHODS_SCHEMA_VERSION {
            bail!(
                "custom methods schema version {} is newer than supported {}",
                document.version,
                METHODS_SCHEMA_VERSION
            );
        }
        return Ok((document, false));
    }

    match raw {
        Value::Array(_) => {
            let entries: Vec<LegacyFlatEntry> =
                serde_json::from_value(raw).context("parsing legacy custom method list")?;
            let mut document = CustomMethodsDocument::default();
            for entry in entries {
                let equipment = entry
                    .equipment_id
                    .unwrap_or_else(|| UNASSIGNED_EQUIPMENT.to_string());
                let mut method = entry.method;
                tag_legacy_roles(&mut method);
                document.methods.entry(equipment).or_default().push(method);
            }
            Ok((document, true))
        }
        Value::Object(_) => {
            let methods: BTreeMap<String, Vec<Method>> =
                serde_json::from_value(raw).context("parsing legacy keyed custom methods")?;
            let mut document = CustomMethodsDocument {
                version: METHODS_SCHEMA_VERSION,
                methods,
            };
            for method in document.methods.values_mut().flatten() {
                tag_legacy_roles(method);
            }
            Ok((document, true))
        }
        other => bail!("unexpected custom methods layout: {}", other),
    }
}

/// User-defined methods persisted through a [`KeyValueStore`].
pub struct MethodLibrary<'a, S> {
    store: &'a S,
    key: String,
    document: CustomMethodsDocument,
}

impl<'a, S: KeyValueStore> MethodLibrary<'a, S> {
    pub async fn load(store: &'a S, key: &str) -> anyhow::Result<Self> {
        let document = match store.get(key).await.context("reading custom methods")? {
            None => CustomMethodsDocument::default(),
            Some(text) => {
                let raw: Value = serde_json::from_str(&text).context("parsing custom methods JSON")?;
                let (document, migrated) = migrate(raw)?;
                if migrated {
                    info!("📦 Migrated custom methods to schema v{}", METHODS_SCHEMA_VERSION);
                    let text = serde_json::to_string(&document).context("serializing custom methods")?;
                    store.set(key, &text).await.context("writing migrated custom methods")?;
                }
                document
            }
        };

        debug!(
            "Loaded {} custom methods",
            document.methods.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self {
            store,
            key: key.to_string(),
            document,
        })
    }

    pub fn document(&self) -> &CustomMethodsDocument {
        &self.document
    }

    /// Catalog methods first, then the user's own.
    pub fn methods_for(&self, equipment_id: &str) -> Vec<Method> {
        let mut methods = builtin_methods(equipment_id);
        if let Some(custom) = self.document.methods.get(equipment_id) {
            methods.extend(custom.iter().cloned());
        }
        methods
    }

    /// Inserts or replaces (matched by id, else by name) and persists.
    pub async fn save_method(&mut self, equipment_id: &str, mut method: Method) -> anyhow::Result<Method> {
        if method.id.is_none() {
            method.id = Some(Uuid::new_v4().to_string());
        }

        let methods = self.document.methods.entry(equipment_id.to_string()).or_default();
        match methods
            .iter_mut()
            .find(|existing| existing.id == method.id || existing.name == method.name)
        {
            Some(existing) => *existing = method.clone(),
            None => methods.push(method.clone()),
        }

        self.persist().await?;
        info!("💾 Saved custom method '{}' for {}", method.name, equipment_id);
        Ok(method)
    }

    /// Returns whether a method with that id existed.
    pub async fn delete_method(&mut self, equipment_id: &str, method_id: &str) -> anyhow::Result<bool> {
        let Some(methods) = self.document.methods.get_mut(equipment_id) else {
            return Ok(false);
        };
        let before = methods.len();
        methods.retain(|method| method.id.as_deref() != Some(method_id));
        let removed = methods.len() != before;
        if methods.is_empty() {
            self.document.methods.remove(equipment_id);
        }

        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let text = serde_json::to_string(&self.document).context("serializing custom methods")?;
        self.store
            .set(&self.key, &text)
            .await
            .context("writing custom methods")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brewing::timeline::build_timeline;
    use crate::system::storage::MemoryStore;
    use crate::types::CUSTOM_METHODS_KEY;
    use embassy_futures::block_on;

    const LEGACY_FLAT: &str = r#"[
        {"equipmentId":"V60","name":"Mine","params":{"coffee":"15g","water":"240g","ratio":"1:16",
         "grindSize":"Medium","temp":"92°C","stages":[{"time":30,"label":"Bloom","water":"40g","detail":""}]}},
        {"name":"Shot","params":{"coffee":"18g","water":"36g","ratio":"1:2",
         "stages":[{"time":27,"label":"萃取","water":"36g","detail":""},
                   {"time":0,"label":"加奶","water":"120g","detail":""}]}}
    ]"#;

    const LEGACY_KEYED: &str = r#"{"Kalita":[{"name":"Slow","params":{"coffee":"20g","water":"300g",
        "ratio":"1:15","stages":[{"time":40,"label":"Bloom","water":"50g","detail":""}]}}]}"#;

    #[test]
    fn test_every_builtin_method_builds() {
        for equipment in builtin_equipment() {
            let methods = builtin_methods(&equipment.id);
            assert!(!methods.is_empty(), "no methods for {}", equipment.id);
            for method in methods {
                assert!(!build_timeline(&method.params.stages).is_empty());
            }
        }
    }

    #[test]
    fn test_espresso_catalog_excludes_beverage_from_timer() {
        let method = &builtin_methods("Espresso")[0];
        let timeline = build_timeline(&method.params.stages);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].end_time, 28.0);
    }

    #[test]
    fn test_migrate_flat_array() {
        let (document, migrated) = migrate(serde_json::from_str(LEGACY_FLAT).unwrap()).unwrap();
        assert!(migrated);
        assert_eq!(document.version, METHODS_SCHEMA_VERSION);
        assert_eq!(document.methods["V60"][0].name, "Mine");

        let shot = &document.methods[UNASSIGNED_EQUIPMENT][0];
        assert_eq!(shot.params.stages[0].timing_role, Some(TimingRole::Extraction));
        assert_eq!(shot.params.stages[1].timing_role, Some(TimingRole::Beverage));
        assert_eq!(document.methods["V60"][0].params.stages[0].timing_role, None);
    }

    #[test]
    fn test_migrate_keyed_object() {
        let (document, migrated) = migrate(serde_json::from_str(LEGACY_KEYED).unwrap()).unwrap();
        assert!(migrated);
        assert_eq!(document.methods["Kalita"][0].params.coffee, "20g");
    }

    #[test]
    fn test_current_document_is_not_migrated() {
        let text = serde_json::to_string(&CustomMethodsDocument::default()).unwrap();
        let (_, migrated) = migrate(serde_json::from_str(&text).unwrap()).unwrap();
        assert!(!migrated);
    }

    #[test]
    fn test_future_version_is_rejected() {
        let raw = serde_json::json!({"version": 99, "methods": {}});
        assert!(migrate(raw).is_err());
        assert!(migrate(serde_json::json!("nope")).is_err());
    }

    #[test]
    fn test_load_writes_back_migrated_document() {
        let store = MemoryStore::new();
        block_on(async {
            store.set(CUSTOM_METHODS_KEY, LEGACY_FLAT).await.unwrap();
            let library = MethodLibrary::load(&store, CUSTOM_METHODS_KEY).await.unwrap();
            assert_eq!(library.methods_for("V60").len(), builtin_methods("V60").len() + 1);

            let stored = store.get(CUSTOM_METHODS_KEY).await.unwrap().unwrap();
            let value: Value = serde_json::from_str(&stored).unwrap();
            assert_eq!(value["version"], METHODS_SCHEMA_VERSION);
        });
    }

    #[test]
    fn test_save_replace_and_delete() {
        let store = MemoryStore::new();
        block_on(async {
            let mut library = MethodLibrary::load(&store, CUSTOM_METHODS_KEY).await.unwrap();
            let mut method = builtin_methods("V60")[0].clone();
            method.name = "House recipe".to_string();

            let saved = library.save_method("V60", method).await.unwrap();
            let id = saved.id.clone().unwrap();

            let mut edited = saved.clone();
            edited.params.coffee = "16g".to_string();
            library.save_method("V60", edited).await.unwrap();
            assert_eq!(library.document().methods["V60"].len(), 1);
            assert_eq!(library.document().methods["V60"][0].params.coffee, "16g");

            let reloaded = MethodLibrary::load(&store, CUSTOM_METHODS_KEY).await.unwrap();
            assert_eq!(reloaded.document(), library.document());

            assert!(library.delete_method("V60", &id).await.unwrap());
            assert!(!library.delete_method("V60", &id).await.unwrap());
            assert!(library.document().methods.is_empty());
        });
    }
}
