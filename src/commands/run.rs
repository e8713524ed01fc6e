//! `sweeper run` command.

use tracing::info;

use crate::cli::RunArgs;
use crate::config::SweepConfig;
use crate::context::ServiceContext;
use crate::sweep::{StaleSweeper, SweepError};

/// Environment variable naming the repository a CI job runs in.
pub const REPOSITORY_ENV: &str = "GITHUB_REPOSITORY";

/// Execute the `run` command.
///
/// # Errors
///
/// Returns an error string if the config is unusable, the tracker cannot be
/// reached, or the sweep is aborted. Per-item failures do not fail the run.
pub fn run(args: &RunArgs) -> Result<(), String> {
    let mut settings = SweepConfig::load(&args.config)
        .and_then(|config| config.resolve())
        .map_err(|e| e.to_string())?;
    settings.options.dry_run |= args.dry_run;

    let env_repository = std::env::var(REPOSITORY_ENV).ok();
    let target = target_repository(
        args.repository.as_deref(),
        env_repository.as_deref(),
        settings.repository.as_deref(),
    );

    let ctx = if let Some(fixture) = &args.fixture {
        ServiceContext::fixture(fixture, args.now)?
    } else {
        if !is_intended_repository(settings.repository.as_deref(), target.as_deref()) {
            let configured = settings.repository.as_deref().unwrap_or_default();
            let actual = target.as_deref().unwrap_or_default();
            info!(configured, actual, "repository guard not satisfied, nothing to do");
            println!("Skipping: configured for {configured}, running in {actual}.");
            return Ok(());
        }
        let repository = target.ok_or_else(|| {
            format!("No repository to sweep: pass --repository, set {REPOSITORY_ENV}, or set `repository` in the config")
        })?;
        ServiceContext::live(&settings.api_url, &repository)?
    };

    let sweeper = StaleSweeper::new(&*ctx.tracker, &*ctx.clock, &settings.policies, &settings.options);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;

    match runtime.block_on(sweeper.sweep(args.trigger.into())) {
        Ok(report) => {
            print!("{}", report.render());
            Ok(())
        }
        Err(err) => {
            let SweepError::Aborted { report, .. } = &err;
            print!("{}", report.render());
            Err(err.to_string())
        }
    }
}

/// Picks the repository to sweep: the flag, then the CI environment, then the config.
fn target_repository(
    flag: Option<&str>,
    env: Option<&str>,
    configured: Option<&str>,
) -> Option<String> {
    [flag, env, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|r| !r.is_empty())
        .map(String::from)
}

/// Returns false when the config names a repository and the run targets another.
fn is_intended_repository(configured: Option<&str>, target: Option<&str>) -> bool {
    match (configured, target) {
        (Some(configured), Some(target)) => configured.eq_ignore_ascii_case(target),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::TriggerArg;

    fn args(config: PathBuf) -> RunArgs {
        RunArgs {
            config,
            dry_run: false,
            trigger: TriggerArg::Manual,
            repository: None,
            fixture: None,
            now: None,
        }
    }

    #[test]
    fn target_prefers_flag_then_env_then_config() {
        assert_eq!(target_repository(Some("a/b"), Some("c/d"), Some("e/f")).as_deref(), Some("a/b"));
        assert_eq!(target_repository(None, Some("c/d"), Some("e/f")).as_deref(), Some("c/d"));
        assert_eq!(target_repository(None, Some(" "), Some("e/f")).as_deref(), Some("e/f"));
        assert!(target_repository(None, None, None).is_none());
    }

    #[test]
    fn guard_only_blocks_a_different_repository() {
        assert!(is_intended_repository(Some("netbox-community/netbox"), Some("NetBox-Community/NetBox")));
        assert!(!is_intended_repository(Some("netbox-community/netbox"), Some("someone/netbox")));
        assert!(is_intended_repository(None, Some("someone/netbox")));
        assert!(is_intended_repository(Some("netbox-community/netbox"), None));
    }

    #[test]
    fn foreign_repository_is_a_no_op() {
        let dir = std::env::temp_dir().join("sweeper_run_guard");
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join("stale.yaml");
        std::fs::write(&config, "repository: netbox-community/netbox\n").unwrap();

        let args = RunArgs { repository: Some("fork-owner/netbox".into()), ..args(config) };
        assert!(run(&args).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_config_is_an_error() {
        let result = run(&args(PathBuf::from("/nonexistent/sweeper/stale.yaml")));
        assert!(result.unwrap_err().contains("failed to read config"));
    }

    #[test]
    fn fixture_run_succeeds() {
        let dir = std::env::temp_dir().join("sweeper_run_fixture");
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join("stale.yaml");
        std::fs::write(&config, "days-before-issue-stale: 90\nstale-issue-label: pending closure\n").unwrap();
        let fixture = dir.join("items.yaml");
        std::fs::write(
            &fixture,
            "- id: '1'\n  class: issue\n  last_activity_at: 2024-01-01T00:00:00Z\n",
        )
        .unwrap();

        let args = RunArgs {
            fixture: Some(fixture),
            now: Some("2024-06-01T00:00:00Z".parse().unwrap()),
            ..args(config)
        };
        assert!(run(&args).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
