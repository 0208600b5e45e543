//! Runtime Configuration

use serde::{Deserialize, Serialize};

/// Runtime configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Class toggled by `d-show` and `d-debounce-show`
    pub hidden_class: String,

    /// Delay used by `.debounce` and the debounced directives when the
    /// node carries no `d-debounce-duration` (milliseconds)
    pub debounce_duration_ms: u64,

    /// Debounced render delay per level of tree depth (milliseconds)
    pub render_step_ms: u64,

    /// Depth at which the debounced render delay stops growing
    pub max_render_depth: usize,

    /// Coalescing window for attribute-driven hook updates (milliseconds)
    pub hooks_update_delay_ms: u64,

    /// Delay before sweeping hooks of detached nodes (milliseconds)
    pub housekeeping_delay_ms: u64,

    /// Write the serialized state back into `d-state` after each transition
    pub reflect_state: bool,

    /// Class name given to loop items that do not name one
    pub shadow_component: String,

    /// Item variable of a `d-loop` without `d-loop-var`
    pub default_loop_var: String,

    /// Upper bound on mutation delivery rounds per flush
    pub max_mutation_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hidden_class: "d-render-hidden".to_string(),
            debounce_duration_ms: 400,
            render_step_ms: 1,
            max_render_depth: 20,
            hooks_update_delay_ms: 10,
            housekeeping_delay_ms: 500,
            reflect_state: false,
            shadow_component: "ShadowComponent".to_string(),
            default_loop_var: "loopItem".to_string(),
            max_mutation_rounds: 64,
        }
    }
}

impl Config {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Debounced render delay for a component at `depth`
    pub fn render_delay(&self, depth: usize) -> u64 {
        depth.min(self.max_render_depth) as u64 * self.render_step_ms
    }
}
