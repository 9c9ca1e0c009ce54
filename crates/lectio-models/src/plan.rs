//! Choreography plan: the structured output of the refiner's planning stage.
//!
//! The plan is schema-constrained when the model supports it; when it does
//! not, the raw text is kept in a `plan_text` envelope on disk. Readers
//! treat unknown fields as opaque.

use serde::{Deserialize, Serialize};

/// Scene-level parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SceneSpec {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub camera: String,
    /// `[x_limit, y_limit]` the plan promises to stay within
    #[serde(default)]
    pub safe_bounds: Vec<f64>,
}

/// One visual object the plan introduces.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    /// Layout zone name (e.g. "title", "left_half", "footer")
    #[serde(default)]
    pub zone: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

/// One timed event on the plan's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimelineEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub at: f64,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub object_ids: Vec<String>,
    /// Narration cue this event is synchronized to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,
}

/// The full plan consumed by the implementation stage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChoreographyPlan {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub scene: SceneSpec,
    #[serde(default)]
    pub objects: Vec<PlanObject>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub constraints: serde_json::Value,
    #[serde(default)]
    pub notes: String,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl ChoreographyPlan {
    /// A plan is usable when it declares at least one object and one event.
    pub fn is_usable(&self) -> bool {
        !self.objects.is_empty() && !self.timeline.is_empty()
    }

    /// Events near a timestamp, for frame inspection.
    pub fn events_around(&self, timestamp: f64, window: f64) -> Vec<&TimelineEvent> {
        self.timeline
            .iter()
            .filter(|e| (e.at - timestamp).abs() <= window)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_defaults_tolerate_sparse_json() {
        let plan: ChoreographyPlan =
            serde_json::from_value(json!({"objects": [], "timeline": []})).unwrap();
        assert_eq!(plan.version, "2.0");
        assert!(!plan.is_usable());
    }

    #[test]
    fn test_events_around() {
        let plan = ChoreographyPlan {
            timeline: vec![
                TimelineEvent {
                    id: "e1".into(),
                    at: 2.0,
                    ..Default::default()
                },
                TimelineEvent {
                    id: "e2".into(),
                    at: 9.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let hits = plan.events_around(2.5, 1.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");
    }
}
