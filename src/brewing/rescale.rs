//! Proportional recipe rescaling driven by coffee, water or ratio edits.

use crate::types::{format_grams, format_ratio, Method, Stage, TimingRole};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamField {
    Coffee,
    Water,
    Ratio,
}

/// A validated edit of one top-level parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEdit {
    Coffee(f64),
    Water(f64),
    Ratio(f64),
}

impl ParamEdit {
    /// Parses raw user input. Non-numeric, non-finite and non-positive values are rejected.
    /// Ratio input may be written as `16` or `1:16`.
    pub fn parse(field: ParamField, input: &str) -> Option<Self> {
        let raw = input.trim();
        let raw = match field {
            ParamField::Ratio => raw.split_once(':').map(|(_, r)| r).unwrap_or(raw),
            _ => raw.trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace()),
        };
        let value = raw.trim().parse::<f64>().ok()?;
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        Some(match field {
            ParamField::Coffee => ParamEdit::Coffee(value),
            ParamField::Water => ParamEdit::Water(value),
            ParamField::Ratio => ParamEdit::Ratio(value),
        })
    }

    fn value(self) -> f64 {
        match self {
            ParamEdit::Coffee(v) | ParamEdit::Water(v) | ParamEdit::Ratio(v) => v,
        }
    }
}

/// The coffee/water/ratio triple mirrored onto the working method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditableParams {
    pub coffee_g: f64,
    pub water_g: f64,
    pub ratio: f64,
}

impl EditableParams {
    pub fn from_method(method: &Method) -> Self {
        Self {
            coffee_g: method.coffee_grams(),
            water_g: method.water_grams(),
            ratio: method.ratio_value(),
        }
    }
}

/// Rescales copies of a pristine base method. Every edit scales from the base,
/// so rounding never accumulates across edits.
#[derive(Debug, Clone)]
pub struct ParameterRescaler {
    base: Method,
    params: EditableParams,
    ratio_decimal_places: u32,
}

impl ParameterRescaler {
    pub fn new(base: &Method, ratio_decimal_places: u32) -> Self {
        Self {
            base: base.clone(),
            params: EditableParams::from_method(base),
            ratio_decimal_places,
        }
    }

    pub fn params(&self) -> EditableParams {
        self.params
    }

    /// Applies an edit and returns the rescaled working method, or `None` when
    /// the edit is rejected. A rejected edit leaves the current params untouched.
    pub fn apply(&mut self, edit: ParamEdit) -> Option<Method> {
        if !edit.value().is_finite() || edit.value() <= 0.0 {
            debug!("Rejected parameter edit {:?}", edit);
            return None;
        }

        let current = self.params;
        let next = match edit {
            ParamEdit::Coffee(coffee) => EditableParams {
                coffee_g: coffee,
                water_g: (coffee * current.ratio).round(),
                ratio: current.ratio,
            },
            ParamEdit::Water(water) => {
                if current.coffee_g <= 0.0 {
                    debug!("Rejected water edit: coffee is {:.1}g", current.coffee_g);
                    return None;
                }
                EditableParams {
                    coffee_g: current.coffee_g,
                    water_g: water,
                    ratio: self.round_ratio(water / current.coffee_g),
                }
            }
            ParamEdit::Ratio(ratio) => EditableParams {
                coffee_g: current.coffee_g,
                water_g: (current.coffee_g * ratio).round(),
                ratio,
            },
        };

        if next.water_g <= 0.0 {
            debug!("Rejected parameter edit {:?}: water would be {:.1}g", edit, next.water_g);
            return None;
        }

        self.params = next;
        let method = self.rescaled_method();
        info!(
            "⚖️ Rescaled '{}': {} coffee, {} water, {}",
            method.name, method.params.coffee, method.params.water, method.params.ratio
        );
        Some(method)
    }

    /// Working copy of the base method carrying the current params.
    pub fn rescaled_method(&self) -> Method {
        let mut method = self.base.clone();
        method.params.coffee = format_grams(self.params.coffee_g);
        method.params.water = format_grams(self.params.water_g);
        method.params.ratio = format_ratio(self.params.ratio, self.ratio_decimal_places);
        method.params.stages = scale_stages(&self.base.params.stages, self.base.water_grams(), self.params.water_g);
        method
    }

    fn round_ratio(&self, ratio: f64) -> f64 {
        let factor = 10f64.powi(self.ratio_decimal_places as i32);
        (ratio * factor).round() / factor
    }
}

/// Scales every stage's water by `new_total / original_total`, rounding per stage.
/// The final timed stage lands exactly on `new_total`.
pub fn scale_stages(stages: &[Stage], original_total: f64, new_total: f64) -> Vec<Stage> {
    if original_total <= 0.0 {
        debug!("Base method has no total water, stages left unscaled");
        return stages.to_vec();
    }

    let factor = new_total / original_total;
    let mut scaled: Vec<Stage> = stages
        .iter()
        .map(|stage| {
            let mut stage = stage.clone();
            stage.water = format_grams((stage.water_grams() * factor).round());
            stage
        })
        .collect();

    if let Some(last) = scaled
        .iter_mut()
        .rev()
        .find(|stage| stage.effective_role() != Some(TimingRole::Beverage))
    {
        last.water = format_grams(new_total);
    }

    scaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_grams, MethodParams, PourType};

    fn v60_method() -> Method {
        Method {
            id: None,
            name: "Classic".to_string(),
            params: MethodParams {
                coffee: "15g".to_string(),
                water: "225g".to_string(),
                ratio: "1:15".to_string(),
                grind_size: "Medium-fine".to_string(),
                temp: "92°C".to_string(),
                stages: vec![
                    Stage::new(25.0, "Bloom", "30g").with_pour_time(10.0),
                    Stage::new(70.0, "Second", "130g").with_pour_time(20.0),
                    Stage::new(120.0, "Final", "225g").with_pour_time(20.0),
                ],
            },
        }
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert_eq!(ParamEdit::parse(ParamField::Coffee, "abc"), None);
        assert_eq!(ParamEdit::parse(ParamField::Coffee, "0"), None);
        assert_eq!(ParamEdit::parse(ParamField::Water, "-5"), None);
        assert_eq!(ParamEdit::parse(ParamField::Water, "NaN"), None);
        assert_eq!(ParamEdit::parse(ParamField::Coffee, "20g"), Some(ParamEdit::Coffee(20.0)));
        assert_eq!(ParamEdit::parse(ParamField::Ratio, "1:16"), Some(ParamEdit::Ratio(16.0)));
    }

    #[test]
    fn test_coffee_edit_scenario_b() {
        let mut rescaler = ParameterRescaler::new(&v60_method(), 1);
        let method = rescaler.apply(ParamEdit::Coffee(20.0)).unwrap();

        assert_eq!(method.params.coffee, "20g");
        assert_eq!(method.params.water, "300g");
        assert_eq!(method.params.ratio, "1:15");

        let waters: Vec<f64> = method.params.stages.iter().map(Stage::water_grams).collect();
        assert_eq!(waters, vec![40.0, 173.0, 300.0]);
    }

    #[test]
    fn test_coffee_scaling_within_rounding_tolerance() {
        let base = v60_method();
        let mut rescaler = ParameterRescaler::new(&base, 1);

        for coffee in [12.0, 14.5, 18.0, 22.0, 31.0] {
            let method = rescaler.apply(ParamEdit::Coffee(coffee)).unwrap();
            let factor = coffee / 15.0;
            for (scaled, original) in method.params.stages.iter().zip(&base.params.stages) {
                let exact = original.water_grams() * factor;
                assert!((scaled.water_grams() - exact).abs() <= 1.0);
            }
        }
    }

    #[test]
    fn test_water_edit_updates_ratio() {
        let mut rescaler = ParameterRescaler::new(&v60_method(), 1);
        let method = rescaler.apply(ParamEdit::Water(250.0)).unwrap();

        assert_eq!(method.params.coffee, "15g");
        assert_eq!(method.params.water, "250g");
        assert_eq!(method.params.ratio, "1:16.7");
        assert_eq!(method.params.stages[0].water, "33g");
    }

    #[test]
    fn test_edited_values_keep_their_precision() {
        let mut rescaler = ParameterRescaler::new(&v60_method(), 2);

        let method = rescaler.apply(ParamEdit::Water(250.0)).unwrap();
        assert_eq!(rescaler.params().ratio, 16.67);
        assert_eq!(method.params.ratio, "1:16.67");

        let method = rescaler.apply(ParamEdit::Coffee(17.35)).unwrap();
        assert_eq!(method.params.coffee, "17.35g");
        assert_eq!(method.coffee_grams(), 17.35);
    }

    #[test]
    fn test_ratio_edit_recomputes_water() {
        let mut rescaler = ParameterRescaler::new(&v60_method(), 1);
        let method = rescaler.apply(ParamEdit::Ratio(16.0)).unwrap();

        assert_eq!(method.params.water, "240g");
        assert_eq!(method.params.ratio, "1:16");
        assert_eq!(rescaler.params().water_g, 240.0);
    }

    #[test]
    fn test_last_stage_matches_total_after_any_edit() {
        let mut rescaler = ParameterRescaler::new(&v60_method(), 1);
        for edit in [
            ParamEdit::Coffee(17.3),
            ParamEdit::Water(263.5),
            ParamEdit::Ratio(14.2),
            ParamEdit::Coffee(9.0),
        ] {
            let method = rescaler.apply(edit).unwrap();
            let last = method.params.stages.last().unwrap();
            assert_eq!(last.water_grams(), parse_grams(&method.params.water));
        }
    }

    #[test]
    fn test_rejected_edit_keeps_params() {
        let mut rescaler = ParameterRescaler::new(&v60_method(), 1);
        rescaler.apply(ParamEdit::Coffee(18.0)).unwrap();
        let before = rescaler.params();

        assert!(rescaler.apply(ParamEdit::Coffee(0.0)).is_none());
        assert!(rescaler.apply(ParamEdit::Water(f64::NAN)).is_none());
        assert_eq!(rescaler.params(), before);
    }

    #[test]
    fn test_base_method_is_not_mutated() {
        let base = v60_method();
        let mut rescaler = ParameterRescaler::new(&base, 1);
        rescaler.apply(ParamEdit::Coffee(30.0)).unwrap();
        assert_eq!(base, v60_method());
        assert_eq!(rescaler.rescaled_method().params.stages[0].water, "60g");
    }

    #[test]
    fn test_beverage_stage_keeps_its_own_target() {
        let stages = vec![
            Stage::new(28.0, "Shot", "36g").with_pour_type(PourType::Extraction),
            Stage::new(40.0, "Hot water", "120g").with_pour_type(PourType::Beverage),
        ];
        let scaled = scale_stages(&stages, 36.0, 40.0);
        assert_eq!(scaled[0].water, "40g");
        assert_eq!(scaled[1].water, "133g");
    }
}
