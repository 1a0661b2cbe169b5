// ABOUTME: Config scaffolding for new deployments.
// ABOUTME: Creates bulwark.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ComponentName;

use super::CONFIG_FILENAME;

const DEFAULT_PROJECT: &str = "my-app";

pub fn init_config(dir: &Path, project: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let project = ComponentName::new(project.unwrap_or(DEFAULT_PROJECT))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    std::fs::write(&config_path, template_yaml(&project))?;

    Ok(())
}

fn template_yaml(project: &ComponentName) -> String {
    format!(
        r#"project: {}
components:
  - app
  - db

sources:
  - name: uploads
    kind: filesystem
    path: data/uploads
  - name: db
    kind: relational
    container: db
    database: app
    # password: {{ env: POSTGRES_PASSWORD }}

catalog:
  dir: backups
  retention_days: 14
  min_free_space: 1G

health:
  timeout: 5m
  interval: 5s

notify:
  channels:
    - kind: log
"#,
        project
    )
}
