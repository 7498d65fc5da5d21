use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Remote app-configuration key carrying the pin limit.
pub const PINNED_LIMIT_APP_CONFIG_KEY: &str = "stargifts_pinned_to_top_limit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_pinned_count: usize,
    pub long_tap_delay_ms: u64,
    pub long_press_delay_ms: u64,
    pub jitter_threshold_px: f64,
    pub commit_grace_ms: u64,
    pub require_long_press: bool,
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_pinned_count: 6,
            long_tap_delay_ms: 250,
            long_press_delay_ms: 600,
            jitter_threshold_px: 3.0,
            commit_grace_ms: 1000,
            require_long_press: true,
            event_capacity: 256,
        }
    }
}

impl EngineSettings {
    pub fn long_tap_delay(&self) -> Duration {
        Duration::from_millis(self.long_tap_delay_ms)
    }

    pub fn long_press_delay(&self) -> Duration {
        Duration::from_millis(self.long_press_delay_ms)
    }

    pub fn commit_grace(&self) -> Duration {
        Duration::from_millis(self.commit_grace_ms)
    }

    pub fn with_max_pinned_count(mut self, max_pinned_count: usize) -> Self {
        self.max_pinned_count = max_pinned_count;
        self
    }

    /// Applies values pushed through the remote app configuration. The pin
    /// limit arrives as a JSON number, possibly fractional.
    pub fn apply_app_config(&mut self, data: &serde_json::Value) {
        if let Some(limit) = data
            .get(PINNED_LIMIT_APP_CONFIG_KEY)
            .and_then(serde_json::Value::as_f64)
        {
            if limit >= 0.0 {
                self.max_pinned_count = limit as usize;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.long_press_delay_ms < self.long_tap_delay_ms {
            bail!(
                "long_press_delay_ms ({}) must not be shorter than long_tap_delay_ms ({})",
                self.long_press_delay_ms,
                self.long_tap_delay_ms
            );
        }
        if self.jitter_threshold_px.is_nan() || self.jitter_threshold_px < 0.0 {
            bail!(
                "jitter_threshold_px must be a non-negative number, got {}",
                self.jitter_threshold_px
            );
        }
        if self.event_capacity == 0 {
            bail!("event_capacity must be at least 1");
        }
        Ok(())
    }
}

/// Defaults, then the optional TOML file, then `APP__*` environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<EngineSettings> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read engine settings '{}'", path.display()))?;
            toml::from_str::<EngineSettings>(&raw)
                .with_context(|| format!("invalid engine settings '{}'", path.display()))?
        }
        None => EngineSettings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

fn apply_env_overrides(
    settings: &mut EngineSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("APP__MAX_PINNED_COUNT") {
        settings.max_pinned_count = v
            .parse()
            .with_context(|| format!("APP__MAX_PINNED_COUNT is not a count: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__LONG_TAP_DELAY_MS") {
        settings.long_tap_delay_ms = v
            .parse()
            .with_context(|| format!("APP__LONG_TAP_DELAY_MS is not a duration: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__LONG_PRESS_DELAY_MS") {
        settings.long_press_delay_ms = v
            .parse()
            .with_context(|| format!("APP__LONG_PRESS_DELAY_MS is not a duration: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__JITTER_THRESHOLD_PX") {
        settings.jitter_threshold_px = v
            .parse()
            .with_context(|| format!("APP__JITTER_THRESHOLD_PX is not a number: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__COMMIT_GRACE_MS") {
        settings.commit_grace_ms = v
            .parse()
            .with_context(|| format!("APP__COMMIT_GRACE_MS is not a duration: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__REQUIRE_LONG_PRESS") {
        settings.require_long_press = v
            .parse()
            .with_context(|| format!("APP__REQUIRE_LONG_PRESS is not a bool: '{v}'"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn defaults_match_gesture_and_grace_timings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_pinned_count, 6);
        assert_eq!(settings.long_tap_delay(), Duration::from_millis(250));
        assert_eq!(settings.long_press_delay(), Duration::from_millis(600));
        assert_eq!(settings.commit_grace(), Duration::from_secs(1));
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_toml_file_keeps_other_defaults() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("reorder_core_settings_{suffix}.toml"));
        fs::write(&path, "max_pinned_count = 2\ncommit_grace_ms = 1500\n").expect("write");

        let settings = load_settings(Some(&path)).expect("load");
        assert_eq!(settings.max_pinned_count, 2);
        assert_eq!(settings.commit_grace_ms, 1500);
        assert_eq!(settings.long_press_delay_ms, 600);

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn missing_settings_file_is_reported_with_its_path() {
        let path = env::temp_dir().join("reorder_core_settings_missing.toml");
        let err = load_settings(Some(&path)).expect_err("should fail");
        assert!(err.to_string().contains("reorder_core_settings_missing.toml"));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let vars: HashMap<&str, &str> = [
            ("APP__MAX_PINNED_COUNT", "3"),
            ("APP__REQUIRE_LONG_PRESS", "false"),
        ]
        .into_iter()
        .collect();
        let mut settings = EngineSettings::default();
        apply_env_overrides(&mut settings, |key| vars.get(key).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(settings.max_pinned_count, 3);
        assert!(!settings.require_long_press);
    }

    #[test]
    fn malformed_env_override_is_reported() {
        let mut settings = EngineSettings::default();
        let err = apply_env_overrides(&mut settings, |key| {
            (key == "APP__COMMIT_GRACE_MS").then(|| "soon".to_string())
        })
        .expect_err("should fail");
        assert!(err.to_string().contains("APP__COMMIT_GRACE_MS"));
    }

    #[test]
    fn app_config_limit_is_read_as_number() {
        let mut settings = EngineSettings::default();
        settings.apply_app_config(&serde_json::json!({ "stargifts_pinned_to_top_limit": 4.0 }));
        assert_eq!(settings.max_pinned_count, 4);

        settings.apply_app_config(&serde_json::json!({ "unrelated": 1 }));
        assert_eq!(settings.max_pinned_count, 4);
    }

    #[test]
    fn rejects_inverted_timers() {
        let settings = EngineSettings {
            long_tap_delay_ms: 700,
            long_press_delay_ms: 600,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
