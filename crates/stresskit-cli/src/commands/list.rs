use std::path::Path;

use anyhow::{Context, Result};
use stresskit_core::StresskitConfig;

/// Print every configured scenario, one per line.
pub fn execute(config_path: &Path) -> Result<()> {
    for line in describe(config_path)? {
        println!("{line}");
    }
    Ok(())
}

fn describe(config_path: &Path) -> Result<Vec<String>> {
    let config = StresskitConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    Ok(config
        .scenarios
        .iter()
        .map(|scenario| {
            let case = scenario.test_case();
            format!("{:<32} {}", case.name, case.description)
        })
        .collect())
}
