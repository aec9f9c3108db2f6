//! Bridge configuration types
//!
//! The bridge needs very little configuration: payload limits, whether
//! notification failures are echoed into the engine, and the symbol names
//! used when the engine is loaded as a shared library.

use serde::{Deserialize, Serialize};

/// Configuration for the bridge runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Longest text payload (excluding the terminator) accepted from the engine
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Post notification-callback failures to the engine's error channel
    #[serde(default = "default_true")]
    pub report_notification_errors: bool,

    /// Exported symbol names of the engine library
    #[serde(default)]
    pub symbols: SymbolTable,
}

fn default_true() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            report_notification_errors: true,
            symbols: SymbolTable::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the payload limit
    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Builder method: enable or disable error echoing for notifications
    pub fn with_notification_error_reports(mut self, enabled: bool) -> Self {
        self.report_notification_errors = enabled;
        self
    }

    /// Builder method: replace the symbol table
    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = symbols;
        self
    }
}

/// Names of the registration functions exported by the engine library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolTable {
    pub register_plot: String,
    pub register_write: String,
    pub register_init_controls: String,
    pub register_check_controls: String,
    pub register_step_controls: String,
    pub register_event: String,
    pub unregister_event: String,
    /// Optional `void (*)(void* ctx)` dropping all callbacks of a context
    pub release_context: Option<String>,
    /// Optional `void (*)(void* ctx, const char* text)` setting the engine error
    pub set_error: Option<String>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self {
            register_plot: "sim_register_plot_callback".to_string(),
            register_write: "sim_register_write_callback".to_string(),
            register_init_controls: "sim_register_init_controls_callback".to_string(),
            register_check_controls: "sim_register_check_controls_callback".to_string(),
            register_step_controls: "sim_register_step_controls_callback".to_string(),
            register_event: "sim_register_event_callback".to_string(),
            unregister_event: "sim_unregister_event_callback".to_string(),
            release_context: Some("sim_release_context".to_string()),
            set_error: Some("sim_set_error".to_string()),
        }
    }
}

impl SymbolTable {
    /// Builder method: prefix every symbol (e.g. `ctx_` for context-aware builds)
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefixed = |name: &mut String| *name = format!("{}{}", prefix, name);
        prefixed(&mut self.register_plot);
        prefixed(&mut self.register_write);
        prefixed(&mut self.register_init_controls);
        prefixed(&mut self.register_check_controls);
        prefixed(&mut self.register_step_controls);
        prefixed(&mut self.register_event);
        prefixed(&mut self.unregister_event);
        for name in [&mut self.release_context, &mut self.set_error].into_iter().flatten() {
            prefixed(name);
        }
        self
    }
}
