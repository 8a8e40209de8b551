//! # Config Renderer
//!
//! Renders the service configuration from the bundled templates.
//!
//! Output is destined for INI files, so nothing is escaped. Undefined
//! bindings are an error rather than an empty string, and the trailing
//! newline of each template is preserved.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;

pub const OCTAVIA_CONF_TEMPLATE: &str = include_str!("../../templates/octavia.conf.j2");
pub const MY_CNF: &str = include_str!("../../templates/my.cnf");
pub const INIT_SCRIPT: &str = include_str!("../../templates/scripts/init.sh");
pub const DB_SYNC_SCRIPT: &str = include_str!("../../templates/scripts/db-sync.sh");

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(#[from] minijinja::Error),
}

/// Everything `octavia.conf` is rendered from
#[derive(Debug, Clone, Serialize)]
pub struct ConfigBindings {
    pub service_user: String,
    pub service_password: String,
    pub tenant_name: String,
    pub keystone_url: String,
    pub transport_url: String,
    /// Connection string of the primary database
    pub connection: String,
    /// Connection string of the task-flow persistence database
    pub persistence_connection: String,
}

/// SQLAlchemy URL for one logical database
#[must_use]
pub fn connection_string(user: &str, password: &str, host: &str, database: &str) -> String {
    format!("mysql+pymysql://{user}:{password}@{host}/{database}?read_default_file=/etc/my.cnf")
}

/// Deterministic template renderer
#[derive(Debug)]
pub struct ConfigRenderer {
    env: Environment<'static>,
}

impl Default for ConfigRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRenderer {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
        Self { env }
    }

    /// Render `template` against `bindings`
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] on a syntax error or an undefined binding.
    pub fn render<S: Serialize>(&self, template: &str, bindings: &S) -> Result<String, RenderError> {
        Ok(self.env.render_str(template, bindings)?)
    }

    /// Render the bundled `octavia.conf`
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the template references a missing binding.
    pub fn octavia_conf(&self, bindings: &ConfigBindings) -> Result<String, RenderError> {
        self.render(OCTAVIA_CONF_TEMPLATE, bindings)
    }
}
