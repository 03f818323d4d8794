//! Roast recipes and the forward-only section sequencer.

use crate::config::RoastConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecipeError {
    #[error("Recipe has no steps")]
    Empty,
    #[error("Step {index}: section time must be greater than zero")]
    ZeroSectionTime { index: usize },
    #[error("Step {index}: fan speed {speed} outside {min}..={max}")]
    FanSpeedOutOfRange { index: usize, speed: u8, min: u8, max: u8 },
    #[error("Step {index}: target temperature {temp}°F outside 1..={max}")]
    TargetTempOutOfRange { index: usize, temp: i32, max: i32 },
    #[error("Step {index}: heating step follows a cooling step")]
    HeatingAfterCooling { index: usize },
}

/// One section of a roast. A step without a target temperature is a cooling
/// step: heater off, fan keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoastStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temp: Option<i32>,
    pub fan_speed: u8,
    pub section_time: u32,
}

impl RoastStep {
    pub fn heating(target_temp: i32, fan_speed: u8, section_time: u32) -> Self {
        Self { target_temp: Some(target_temp), fan_speed, section_time }
    }

    pub fn cooling(fan_speed: u8, section_time: u32) -> Self {
        Self { target_temp: None, fan_speed, section_time }
    }

    pub fn is_cooling(&self) -> bool {
        self.target_temp.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub steps: Vec<RoastStep>,
    #[serde(default)]
    pub total_time: u32,
    #[serde(default)]
    pub roast_name: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
}

impl Recipe {
    pub fn new(steps: Vec<RoastStep>) -> Self {
        let total_time = steps.iter().map(|s| s.section_time).sum();
        Self { steps, total_time, roast_name: None, creator: None }
    }

    /// Reject malformed step data before a roast is allowed to start.
    pub fn validate(&self, limits: &RoastConfig) -> Result<(), RecipeError> {
        if self.steps.is_empty() {
            return Err(RecipeError::Empty);
        }
        let mut seen_cooling = false;
        for (index, step) in self.steps.iter().enumerate() {
            if step.section_time == 0 {
                return Err(RecipeError::ZeroSectionTime { index });
            }
            if step.fan_speed < limits.min_fan_speed || step.fan_speed > limits.max_fan_speed {
                return Err(RecipeError::FanSpeedOutOfRange {
                    index,
                    speed: step.fan_speed,
                    min: limits.min_fan_speed,
                    max: limits.max_fan_speed,
                });
            }
            match step.target_temp {
                Some(_) if seen_cooling => return Err(RecipeError::HeatingAfterCooling { index }),
                Some(temp) if temp <= 0 || temp > limits.max_target_temp => {
                    return Err(RecipeError::TargetTempOutOfRange {
                        index,
                        temp,
                        max: limits.max_target_temp,
                    });
                }
                Some(_) => {}
                None => seen_cooling = true,
            }
        }
        Ok(())
    }
}

/// Walks a recipe strictly forward, one section at a time.
#[derive(Debug, Clone)]
pub struct RecipeSequencer {
    steps: Vec<RoastStep>,
    index: usize,
    exhausted: bool,
}

impl RecipeSequencer {
    pub fn new(recipe: &Recipe) -> Self {
        Self { steps: recipe.steps.clone(), index: 0, exhausted: recipe.steps.is_empty() }
    }

    pub fn current_step(&self) -> Option<&RoastStep> {
        self.steps.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Move to the next section. Returns false, and keeps returning false, once
    /// no further section exists; the index never moves backwards.
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.index + 1 < self.steps.len() {
            self.index += 1;
            true
        } else {
            self.exhausted = true;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step() -> Recipe {
        Recipe::new(vec![RoastStep::heating(400, 5, 60), RoastStep::cooling(3, 30)])
    }

    #[test]
    fn test_new_recipe_sums_total_time() {
        assert_eq!(two_step().total_time, 90);
    }

    #[test]
    fn test_recipe_json_shape() {
        let json = r#"{
            "roastName": "City Roast",
            "creator": "Jane",
            "totalTime": 90,
            "roastDescription": {"roastType": "City"},
            "steps": [
                {"targetTemp": 400, "fanSpeed": 5, "sectionTime": 60},
                {"fanSpeed": 3, "sectionTime": 30}
            ]
        }"#;
        let recipe: Recipe = serde_json::from_str(json).unwrap();
        assert_eq!(recipe.steps, two_step().steps);
        assert_eq!(recipe.total_time, 90);
        assert_eq!(recipe.roast_name.as_deref(), Some("City Roast"));
        assert!(recipe.steps[1].is_cooling());
    }

    #[test]
    fn test_validate_accepts_well_formed_recipe() {
        assert_eq!(two_step().validate(&RoastConfig::default()), Ok(()));
    }

    #[test]
    fn test_validate_rejects_malformed_steps() {
        let limits = RoastConfig::default();
        assert_eq!(Recipe::new(vec![]).validate(&limits), Err(RecipeError::Empty));
        assert_eq!(
            Recipe::new(vec![RoastStep::heating(400, 5, 0)]).validate(&limits),
            Err(RecipeError::ZeroSectionTime { index: 0 })
        );
        assert!(matches!(
            Recipe::new(vec![RoastStep::heating(400, 12, 10)]).validate(&limits),
            Err(RecipeError::FanSpeedOutOfRange { index: 0, speed: 12, .. })
        ));
        assert!(matches!(
            Recipe::new(vec![RoastStep::heating(900, 5, 10)]).validate(&limits),
            Err(RecipeError::TargetTempOutOfRange { index: 0, temp: 900, .. })
        ));
        assert_eq!(
            Recipe::new(vec![
                RoastStep::heating(400, 5, 10),
                RoastStep::cooling(3, 10),
                RoastStep::heating(420, 5, 10),
            ])
            .validate(&limits),
            Err(RecipeError::HeatingAfterCooling { index: 2 })
        );
    }

    #[test]
    fn test_sequencer_is_forward_only() {
        let recipe = Recipe::new(vec![
            RoastStep::heating(350, 9, 30),
            RoastStep::heating(420, 6, 60),
            RoastStep::cooling(9, 45),
        ]);
        let mut seq = RecipeSequencer::new(&recipe);
        let mut last = seq.current_index();
        assert_eq!(seq.current_step(), Some(&recipe.steps[0]));

        assert!(seq.advance());
        assert!(seq.current_index() > last);
        last = seq.current_index();
        assert!(seq.advance());
        assert!(seq.current_index() > last);
        assert_eq!(seq.current_step(), Some(&recipe.steps[2]));

        assert!(!seq.advance());
        assert!(seq.is_exhausted());
        assert_eq!(seq.current_index(), 2);
        assert!(!seq.advance());
        assert_eq!(seq.current_index(), 2);
    }

    #[test]
    fn test_single_step_sequencer_exhausts_immediately() {
        let mut seq = RecipeSequencer::new(&Recipe::new(vec![RoastStep::heating(400, 5, 10)]));
        assert!(!seq.advance());
        assert_eq!(seq.current_index(), 0);
    }
}
