use crate::common::now_nanos;
use crate::error::{BirdsNestError, Result};
use crate::key::TimestampKey;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

const NANOS_PER_SEC: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    AbsoluteExpireTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct RulesConfig {
    /// Replay window in seconds around now; 0 disables the rule
    #[builder(default = "0")]
    pub absolute_expire_time: u64,
}

/// Key check independent of filter membership.
pub trait Rule: Send + Sync {
    fn validate(&self, key: &TimestampKey) -> Result<()>;
}

/// Rejects keys stamped further than `window` seconds from now in either
/// direction.
#[derive(Debug, Clone)]
pub struct AbsoluteExpireTimeRule {
    window_nanos: i64,
}

impl AbsoluteExpireTimeRule {
    pub fn new(window_secs: u64) -> Self {
        let window_nanos = i64::try_from(window_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(NANOS_PER_SEC);
        Self { window_nanos }
    }

    fn validate_at(&self, key: &TimestampKey, now: i64) -> Result<()> {
        let nano = key.nano()?;
        let min = now.saturating_sub(self.window_nanos);
        let max = now.saturating_add(self.window_nanos);
        if nano < min || nano > max {
            warn!(
                "key {} out of range, stamp {nano} not in [{min}, {max}]",
                key
            );
            return Err(BirdsNestError::KeyOutOfRange { nano, min, max });
        }
        Ok(())
    }
}

impl Rule for AbsoluteExpireTimeRule {
    fn validate(&self, key: &TimestampKey) -> Result<()> {
        self.validate_at(key, now_nanos()?)
    }
}

/// Configured rules by type.
#[derive(Default)]
pub struct Rules {
    rules: HashMap<RuleType, Box<dyn Rule>>,
}

impl Rules {
    pub fn from_config(config: &RulesConfig) -> Self {
        let mut rules = Self::default();
        if config.absolute_expire_time > 0 {
            rules.insert(
                RuleType::AbsoluteExpireTime,
                Box::new(AbsoluteExpireTimeRule::new(config.absolute_expire_time)),
            );
        }
        rules
    }

    pub fn insert(&mut self, rule_type: RuleType, rule: Box<dyn Rule>) {
        self.rules.insert(rule_type, rule);
    }

    pub fn contains(&self, rule_type: RuleType) -> bool {
        self.rules.contains_key(&rule_type)
    }

    /// Applies the named rules in order. Rule types that are not configured
    /// are skipped.
    pub fn validate(&self, key: &TimestampKey, rule_types: &[RuleType]) -> Result<()> {
        for rule_type in rule_types {
            if let Some(rule) = self.rules.get(rule_type) {
                rule.validate(key)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = NANOS_PER_SEC;

    #[test]
    fn test_absolute_expire_window() {
        let rule = AbsoluteExpireTimeRule::new(1);
        let now = 1_000 * SEC;

        let key = TimestampKey::with_nano(now).unwrap();
        assert!(rule.validate_at(&key, now).is_ok());

        let edge = TimestampKey::with_nano(now + SEC).unwrap();
        assert!(rule.validate_at(&edge, now).is_ok());

        let future = TimestampKey::with_nano(now + 2 * SEC).unwrap();
        assert!(matches!(
            rule.validate_at(&future, now),
            Err(BirdsNestError::KeyOutOfRange { .. })
        ));

        let past = TimestampKey::with_nano(now - 2 * SEC).unwrap();
        assert!(rule.validate_at(&past, now).is_err());
    }

    #[test]
    fn test_validate_against_wall_clock() {
        let rules = Rules::from_config(&RulesConfig {
            absolute_expire_time: 1,
        });
        let now = now_nanos().unwrap();

        let fresh = TimestampKey::with_nano(now).unwrap();
        assert!(rules.validate(&fresh, &[RuleType::AbsoluteExpireTime]).is_ok());

        let future = TimestampKey::with_nano(now + 2 * SEC).unwrap();
        assert!(
            rules
                .validate(&future, &[RuleType::AbsoluteExpireTime])
                .is_err()
        );
    }

    #[test]
    fn test_unconfigured_rules_are_skipped() {
        let rules = Rules::from_config(&RulesConfig::default());
        assert!(!rules.contains(RuleType::AbsoluteExpireTime));

        let ancient = TimestampKey::with_nano(1).unwrap();
        assert!(rules.validate(&ancient, &[RuleType::AbsoluteExpireTime]).is_ok());
        assert!(rules.validate(&ancient, &[]).is_ok());
    }

    #[test]
    fn test_malformed_key_fails_rule() {
        let rule = AbsoluteExpireTimeRule::new(10);
        let key = TimestampKey::from_bytes(vec![1, 2, 3]);
        assert!(rule.validate(&key).is_err());
    }
}
