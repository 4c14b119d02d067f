use serde::{Deserialize, Serialize};

/// How a pour is performed. `Extraction` and `Beverage` mark espresso recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PourType {
    Center,
    Circle,
    Other,
    Extraction,
    Beverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveStatus {
    Open,
    Closed,
}

/// Explicit espresso timing attribute of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingRole {
    /// Drives the shot timer, always measured from zero.
    Extraction,
    /// Informational only (milk, added water); never part of the timeline.
    Beverage,
}

/// A recipe checkpoint. `time` and `water` are cumulative from brew start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour_time: Option<f64>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub water: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour_type: Option<PourType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve_status: Option<ValveStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_role: Option<TimingRole>,
}

impl Stage {
    pub fn new(time: f64, label: &str, water: &str) -> Self {
        Self {
            time,
            pour_time: None,
            label: label.to_string(),
            water: water.to_string(),
            detail: String::new(),
            pour_type: None,
            valve_status: None,
            timing_role: None,
        }
    }

    pub fn with_pour_time(mut self, pour_time: f64) -> Self {
        self.pour_time = Some(pour_time);
        self
    }

    pub fn with_pour_type(mut self, pour_type: PourType) -> Self {
        self.pour_type = Some(pour_type);
        self
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = detail.to_string();
        self
    }

    pub fn water_grams(&self) -> f64 {
        parse_grams(&self.water)
    }

    /// Explicit role first, then the legacy `pourType` tags.
    pub fn effective_role(&self) -> Option<TimingRole> {
        self.timing_role.or(match self.pour_type {
            Some(PourType::Extraction) => Some(TimingRole::Extraction),
            Some(PourType::Beverage) => Some(TimingRole::Beverage),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodParams {
    pub coffee: String,
    pub water: String,
    pub ratio: String,
    #[serde(default)]
    pub grind_size: String,
    #[serde(default)]
    pub temp: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// A full recipe. Sessions copy it before editing so catalog entries stay pristine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub params: MethodParams,
}

impl Method {
    pub fn coffee_grams(&self) -> f64 {
        parse_grams(&self.params.coffee)
    }

    pub fn water_grams(&self) -> f64 {
        parse_grams(&self.params.water)
    }

    pub fn ratio_value(&self) -> f64 {
        parse_ratio(&self.params.ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Pour,
    Wait,
}

/// A pour or wait slice of the timeline, derived from one [`Stage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedStage {
    #[serde(rename = "type")]
    pub kind: StageKind,
    pub label: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Duration of this slice in seconds.
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour_time: Option<f64>,
    pub water: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour_type: Option<PourType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve_status: Option<ValveStatus>,
    pub original_index: usize,
}

impl ExpandedStage {
    pub fn water_grams(&self) -> f64 {
        parse_grams(&self.water)
    }

    pub fn is_waiting(&self) -> bool {
        self.kind == StageKind::Wait
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub name: String,
}

impl Equipment {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Bean inventory entry. Only `remaining` is ever changed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoffeeBean {
    pub id: String,
    pub name: String,
    pub remaining: f64,
    pub capacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roast_level: Option<String>,
}

/// Workflow steps in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    CoffeeBean,
    Equipment,
    Method,
    Brewing,
    Notes,
}

impl Step {
    pub fn index(self) -> usize {
        match self {
            Step::CoffeeBean => 0,
            Step::Equipment => 1,
            Step::Method => 2,
            Step::Brewing => 3,
            Step::Notes => 4,
        }
    }
}

/// Session state owned by the workflow machine.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub active_step: Step,
    pub selected_equipment: Option<Equipment>,
    pub selected_method: Option<Method>,
    /// Working copy of `selected_method`; the only one parameter edits touch.
    pub current_brewing_method: Option<Method>,
    pub selected_coffee_bean: Option<CoffeeBean>,
    pub elapsed_time: f64,
    pub current_stage_index: usize,
    pub is_timer_running: bool,
    pub is_complete: bool,
    /// Set once this run's coffee has left the bean inventory.
    pub coffee_deducted: bool,
    /// Bumped on every reset so ticks from an earlier run are dropped.
    pub epoch: u32,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            active_step: Step::CoffeeBean,
            selected_equipment: None,
            selected_method: None,
            current_brewing_method: None,
            selected_coffee_bean: None,
            elapsed_time: 0.0,
            current_stage_index: 0,
            is_timer_running: false,
            is_complete: false,
            coffee_deducted: false,
            epoch: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub version: u8,
    /// Default pour time is `floor(interval / pour_time_divisor)` when a stage omits it.
    pub pour_time_divisor: u32,
    pub espresso_fallback_extraction_s: f64,
    pub ratio_decimal_places: u32,
    pub custom_methods_key: String,
    pub notes_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            pour_time_divisor: DEFAULT_POUR_TIME_DIVISOR,
            espresso_fallback_extraction_s: ESPRESSO_FALLBACK_EXTRACTION_S,
            ratio_decimal_places: 1,
            custom_methods_key: CUSTOM_METHODS_KEY.to_string(),
            notes_key: NOTES_KEY.to_string(),
        }
    }
}

pub const CONFIG_VERSION: u8 = 1;
pub const DEFAULT_POUR_TIME_DIVISOR: u32 = 3;
pub const ESPRESSO_FALLBACK_EXTRACTION_S: f64 = 25.0;
pub const CUSTOM_METHODS_KEY: &str = "customMethods";
pub const NOTES_KEY: &str = "brewingNotes";
pub const CONFIG_KEY: &str = "engineConfig";

/// Parses `"30g"`, `"30 g"` or `"30"`. Anything unparsable is 0.
pub fn parse_grams(text: &str) -> f64 {
    let trimmed = text
        .trim()
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace());
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Parses `"1:15"` (or a bare `"15"`) into 15.
pub fn parse_ratio(text: &str) -> f64 {
    let value = match text.split_once(':') {
        Some((_, right)) => right.trim(),
        None => text.trim(),
    };
    match value.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Masses keep this many decimals when written back to text.
pub const GRAM_DECIMAL_PLACES: u32 = 3;

fn round_to(value: f64, decimal_places: u32) -> f64 {
    let factor = 10f64.powi(decimal_places as i32);
    (value * factor).round() / factor
}

// f64 Display is the shortest text that parses back to the same value.
pub fn format_grams(value: f64) -> String {
    format!("{}g", round_to(value, GRAM_DECIMAL_PLACES))
}

pub fn format_ratio(value: f64, decimal_places: u32) -> String {
    format!("1:{}", round_to(value, decimal_places))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grams() {
        assert_eq!(parse_grams("30g"), 30.0);
        assert_eq!(parse_grams(" 22.5 g "), 22.5);
        assert_eq!(parse_grams("225"), 225.0);
        assert_eq!(parse_grams("lots"), 0.0);
        assert_eq!(parse_grams(""), 0.0);
    }

    #[test]
    fn test_parse_ratio() {
        assert_eq!(parse_ratio("1:15"), 15.0);
        assert_eq!(parse_ratio("1:15.5"), 15.5);
        assert_eq!(parse_ratio("16"), 16.0);
        assert_eq!(parse_ratio("1:x"), 0.0);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_grams(300.0), "300g");
        assert_eq!(format_grams(250.5), "250.5g");
        assert_eq!(format_grams(17.35), "17.35g");
        assert_eq!(format_grams(0.1 + 0.2), "0.3g");
        assert_eq!(format_ratio(15.0, 1), "1:15");
        assert_eq!(format_ratio(250.0 / 15.0, 1), "1:16.7");
        assert_eq!(format_ratio(250.0 / 15.0, 2), "1:16.67");
    }

    #[test]
    fn test_effective_role_prefers_explicit_attribute() {
        let stage = Stage::new(25.0, "Shot", "36g").with_pour_type(PourType::Beverage);
        assert_eq!(stage.effective_role(), Some(TimingRole::Beverage));

        let mut stage = Stage::new(25.0, "Shot", "36g").with_pour_type(PourType::Circle);
        assert_eq!(stage.effective_role(), None);
        stage.timing_role = Some(TimingRole::Extraction);
        assert_eq!(stage.effective_role(), Some(TimingRole::Extraction));
    }

    #[test]
    fn test_stage_json_shape() {
        let json = r#"{"time":25,"pourTime":10,"label":"Bloom","water":"30g","detail":"","pourType":"circle"}"#;
        let stage: Stage = serde_json::from_str(json).unwrap();
        assert_eq!(stage.time, 25.0);
        assert_eq!(stage.pour_time, Some(10.0));
        assert_eq!(stage.pour_type, Some(PourType::Circle));

        let back: Stage = serde_json::from_str(&serde_json::to_string(&stage).unwrap()).unwrap();
        assert_eq!(back, stage);
    }
}
