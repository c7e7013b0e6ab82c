//! Tool availability checks run at the start of setup.

use crate::config::EnvironmentConfig;
use std::path::PathBuf;
use std::time::Duration;
use testrig_common::Result;
use testrig_process::{find_executable, require_tool, ToolInvocation, ToolRunner};
use tracing::{info, warn};

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// What the environment check found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentReport {
    pub required: Vec<(String, PathBuf)>,
    pub optional_found: Vec<String>,
    pub optional_missing: Vec<String>,
}

/// Resolve every required tool (the first missing one is an environment
/// error) and report optional ones. The runner's version is logged.
pub async fn validate_environment(
    config: &EnvironmentConfig,
    runner_program: &str,
    tools: &dyn ToolRunner,
) -> Result<EnvironmentReport> {
    info!("Validating environment");
    let mut report = EnvironmentReport::default();

    for tool in &config.required_tools {
        let path = require_tool(tool)?;
        info!("  found {} at {}", tool, path.display());
        report.required.push((tool.clone(), path));
    }

    if report.required.iter().any(|(name, _)| name == runner_program) {
        let invocation = ToolInvocation::new(runner_program)
            .arg("version")
            .timeout(VERSION_TIMEOUT);
        match tools.run(&invocation).await {
            Ok(output) if output.success() => info!("  {}", output.stdout.trim()),
            Ok(output) => warn!("  {} version check exited with {:?}", runner_program, output.exit_code),
            Err(e) => warn!("  {} version check failed: {}", runner_program, e),
        }
    }

    for tool in &config.optional_tools {
        if find_executable(tool).is_some() {
            info!("  found {}", tool);
            report.optional_found.push(tool.clone());
        } else {
            warn!("  {} not found (optional)", tool);
            report.optional_missing.push(tool.clone());
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use testrig_common::Error;
    use testrig_process::ProcessToolRunner;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_required_and_optional_tools() {
        let config = EnvironmentConfig {
            required_tools: vec!["sh".to_string()],
            optional_tools: vec!["not-installed-tool-91b2".to_string()],
        };
        let report = validate_environment(&config, "go", &ProcessToolRunner)
            .await
            .unwrap();
        assert_eq!(report.required.len(), 1);
        assert_eq!(report.optional_missing, vec!["not-installed-tool-91b2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_required_tool_is_fatal() {
        let config = EnvironmentConfig {
            required_tools: vec!["not-installed-tool-91b2".to_string()],
            optional_tools: Vec::new(),
        };
        let err = validate_environment(&config, "go", &ProcessToolRunner)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Environment { .. }));
    }
}
