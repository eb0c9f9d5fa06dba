use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MC_MASTERY_THRESHOLD, DEFAULT_REINSERT_OFFSET, DEFAULT_WRITTEN_MASTERY_THRESHOLD,
};
use crate::learn::error::LearnError;
use crate::learn::types::AnswerMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryThresholds {
    pub multiple_choice: u32,
    pub written: u32,
}

impl Default for MasteryThresholds {
    fn default() -> Self {
        Self {
            multiple_choice: DEFAULT_MC_MASTERY_THRESHOLD,
            written: DEFAULT_WRITTEN_MASTERY_THRESHOLD,
        }
    }
}

impl MasteryThresholds {
    pub fn for_mode(&self, mode: AnswerMode) -> u32 {
        match mode {
            AnswerMode::MultipleChoice => self.multiple_choice,
            AnswerMode::Written => self.written,
        }
    }
}

/// 调度器全局参数，进程级别，所有会话共享
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub mastery: MasteryThresholds,
    /// How many Active terms a missed term is pushed behind.
    pub reinsert_offset: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mastery: MasteryThresholds::default(),
            reinsert_offset: DEFAULT_REINSERT_OFFSET,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env(env_config: &crate::config::LearnEnvConfig) -> Self {
        let mut config = Self::default();
        config.mastery.multiple_choice = env_config.mc_mastery_threshold;
        config.mastery.written = env_config.written_mastery_threshold;
        config.reinsert_offset = env_config.reinsert_offset;
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.mastery.multiple_choice == 0 {
            return Err("mastery.multiple_choice must be >= 1".to_string());
        }
        if self.mastery.written == 0 {
            return Err("mastery.written must be >= 1".to_string());
        }
        if self.reinsert_offset == 0 {
            return Err("reinsert_offset must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Per-session mode configuration; immutable once the session is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeConfig {
    pub review_only: bool,
    pub starred_only: bool,
    #[serde(default)]
    pub starred_term_ids: HashSet<String>,
    #[serde(default)]
    pub answer_mode: AnswerMode,
    /// Overrides the per-mode threshold from [`SchedulerConfig`].
    #[serde(default)]
    pub mastery_threshold: Option<u32>,
    #[serde(default)]
    pub shuffle: bool,
}

impl ModeConfig {
    pub fn validate(&self) -> Result<(), LearnError> {
        if self.starred_only && self.starred_term_ids.is_empty() {
            return Err(LearnError::InvalidModeConfig(
                "starredOnly requires at least one starred term".to_string(),
            ));
        }
        if self.mastery_threshold == Some(0) {
            return Err(LearnError::InvalidModeConfig(
                "masteryThreshold must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Starred and review sessions only see part of the set.
    pub fn is_filtered(&self) -> bool {
        self.starred_only || self.review_only
    }

    pub fn effective_threshold(&self, scheduler: &SchedulerConfig) -> u32 {
        self.mastery_threshold
            .unwrap_or_else(|| scheduler.mastery.for_mode(self.answer_mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_is_stricter_by_default() {
        let cfg = SchedulerConfig::default();
        assert!(
            cfg.mastery.for_mode(AnswerMode::Written)
                > cfg.mastery.for_mode(AnswerMode::MultipleChoice)
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_offset_is_rejected() {
        let cfg = SchedulerConfig {
            reinsert_offset: 0,
            ..SchedulerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn starred_only_without_stars_is_invalid() {
        let mode = ModeConfig {
            starred_only: true,
            ..ModeConfig::default()
        };
        assert!(matches!(mode.validate(), Err(LearnError::InvalidModeConfig(_))));
    }

    #[test]
    fn explicit_threshold_overrides_answer_mode() {
        let scheduler = SchedulerConfig::default();
        let mode = ModeConfig {
            answer_mode: AnswerMode::Written,
            mastery_threshold: Some(5),
            ..ModeConfig::default()
        };
        assert_eq!(mode.effective_threshold(&scheduler), 5);

        let mode = ModeConfig {
            answer_mode: AnswerMode::Written,
            ..ModeConfig::default()
        };
        assert_eq!(mode.effective_threshold(&scheduler), scheduler.mastery.written);
    }

    #[test]
    fn zero_threshold_override_is_invalid() {
        let mode = ModeConfig {
            mastery_threshold: Some(0),
            ..ModeConfig::default()
        };
        assert!(mode.validate().is_err());
    }
}
