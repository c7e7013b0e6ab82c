use super::*;
use anyhow::{anyhow, Result};

/// Validate the complete configuration
pub fn validate_config(config: &OrchestratorConfig) -> Result<()> {
    validate_runner_config(&config.runner)?;
    validate_environment_config(&config.environment)?;

    if let Some(ref dependent) = config.dependent_service {
        validate_dependent_service_config(dependent)?;
    }
    if let Some(ref service) = config.service_under_test {
        validate_service_under_test_config(service)?;
    }

    validate_probe_config(&config.probes)?;
    validate_load_config(&config.load)?;

    Ok(())
}

fn validate_runner_config(runner: &RunnerConfig) -> Result<()> {
    if runner.program.trim().is_empty() {
        return Err(anyhow!("Runner program cannot be empty"));
    }
    for (name, timeout) in [
        ("unit_timeout", runner.unit_timeout),
        ("integration_timeout", runner.integration_timeout),
        ("benchmark_timeout", runner.benchmark_timeout),
        ("coverage_timeout", runner.coverage_timeout),
    ] {
        if timeout.is_zero() {
            return Err(anyhow!("Runner {} must be greater than 0", name));
        }
    }
    if runner.benchmark_time.trim().is_empty() {
        return Err(anyhow!("Runner benchmark_time cannot be empty"));
    }
    Ok(())
}

fn validate_environment_config(environment: &EnvironmentConfig) -> Result<()> {
    for tool in environment
        .required_tools
        .iter()
        .chain(environment.optional_tools.iter())
    {
        if tool.trim().is_empty() {
            return Err(anyhow!("Tool names cannot be empty"));
        }
    }
    Ok(())
}

fn validate_dependent_service_config(dependent: &DependentServiceConfig) -> Result<()> {
    if dependent.program.trim().is_empty() {
        return Err(anyhow!("Dependent service program cannot be empty"));
    }
    if !dependent.client_url.starts_with("http://") {
        return Err(anyhow!(
            "Dependent service client_url must be an http:// URL, got: {}",
            dependent.client_url
        ));
    }
    validate_readiness(
        &dependent.name,
        dependent.ready_timeout,
        dependent.poll_interval,
    )
}

fn validate_service_under_test_config(service: &ServiceUnderTestConfig) -> Result<()> {
    if service.binary.as_os_str().is_empty() {
        return Err(anyhow!("Service under test binary cannot be empty"));
    }
    if let Some(ref build) = service.build {
        if build.program.trim().is_empty() {
            return Err(anyhow!("Build program cannot be empty"));
        }
        if build.timeout.is_zero() {
            return Err(anyhow!("Build timeout must be greater than 0"));
        }
    }
    if service.api_port == 0 {
        return Err(anyhow!("API port must be between 1 and 65535, got: 0"));
    }
    if service.alerts.min_available_nodes == 0 {
        return Err(anyhow!("min_available_nodes must be at least 1"));
    }
    validate_readiness(&service.name, service.ready_timeout, service.poll_interval)
}

fn validate_readiness(name: &str, ready_timeout: Duration, poll_interval: Duration) -> Result<()> {
    if poll_interval.is_zero() {
        return Err(anyhow!("{}: poll_interval must be greater than 0", name));
    }
    if poll_interval >= ready_timeout {
        return Err(anyhow!(
            "{}: poll_interval ({:?}) must be smaller than ready_timeout ({:?})",
            name,
            poll_interval,
            ready_timeout
        ));
    }
    Ok(())
}

fn validate_probe_config(probes: &ProbeConfig) -> Result<()> {
    if probes.request_timeout.is_zero() {
        return Err(anyhow!("Probe request_timeout must be greater than 0"));
    }
    Ok(())
}

fn validate_load_config(load: &LoadConfig) -> Result<()> {
    if load.total_requests == 0 {
        return Err(anyhow!("Load total_requests must be greater than 0"));
    }
    if load.concurrency == 0 {
        return Err(anyhow!("Load concurrency must be greater than 0"));
    }
    if load.request_timeout.is_zero() {
        return Err(anyhow!("Load request_timeout must be greater than 0"));
    }
    if !(0.0..=1.0).contains(&load.success_threshold) {
        return Err(anyhow!(
            "Load success_threshold must be within [0, 1], got: {}",
            load.success_threshold
        ));
    }
    if !load.path.starts_with('/') {
        return Err(anyhow!("Load path must start with '/', got: {}", load.path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rejected(yaml: &str, needle: &str) {
        let err = OrchestratorConfig::load_from_string(yaml).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains(needle), "'{}' not in '{}'", needle, message);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(OrchestratorConfig::default().validate().is_ok());

        let mut config = OrchestratorConfig::default();
        config.dependent_service = Some(DependentServiceConfig::default());
        config.service_under_test = Some(ServiceUnderTestConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_settings_rejected() {
        assert_rejected("load:\n  total_requests: 0\n", "total_requests");
        assert_rejected("load:\n  concurrency: 0\n", "concurrency");
        assert_rejected("load:\n  success_threshold: 1.5\n", "success_threshold");
        assert_rejected("load:\n  success_threshold: -0.1\n", "success_threshold");
        assert_rejected("load:\n  path: health\n", "Load path");
    }

    #[test]
    fn test_readiness_settings_rejected() {
        assert_rejected(
            "dependent_service:\n  poll_interval: 0ms\n",
            "poll_interval must be greater than 0",
        );
        assert_rejected(
            "dependent_service:\n  ready_timeout: 1s\n  poll_interval: 1s\n",
            "must be smaller than ready_timeout",
        );
    }

    #[test]
    fn test_service_settings_rejected() {
        assert_rejected("service_under_test:\n  api_port: 0\n", "API port");
        assert_rejected("runner:\n  program: ''\n", "Runner program");
        assert_rejected(
            "dependent_service:\n  client_url: https://127.0.0.1:2379\n",
            "http:// URL",
        );
    }
}
