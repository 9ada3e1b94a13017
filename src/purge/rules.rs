use crate::cache::{CacheRule, ProxyRegistry};
use crate::error::{PurgeError, Result};

use super::criteria::WILDCARD_NAME;

/// Changes requested through the management entry point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    pub enabled: Option<bool>,
    pub ttl_seconds: Option<u64>,
}

impl RuleUpdate {
    /// Builds an update from raw `state` and `ttl` tokens. Unrecognised values
    /// are ignored, as if the token were absent.
    pub fn from_tokens(state: Option<&[u8]>, ttl: Option<&[u8]>) -> Self {
        Self {
            enabled: state.and_then(parse_state),
            ttl_seconds: ttl.and_then(parse_ttl),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.ttl_seconds.is_none()
    }

    fn apply(&self, rule: &CacheRule) {
        if let Some(enabled) = self.enabled {
            rule.set_enabled(enabled);
        }
        if let Some(ttl) = self.ttl_seconds {
            rule.set_ttl_seconds(ttl);
        }
    }
}

pub fn parse_state(raw: &[u8]) -> Option<bool> {
    match raw {
        b"enable" => Some(true),
        b"disable" => Some(false),
        _ => None,
    }
}

/// Parses `90`, `30s`, `5m`, `2h`, `1d` and concatenations such as `1d2h30m`.
pub fn parse_ttl(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut digits: Option<u64> = None;
    for &b in raw {
        match b {
            b'0'..=b'9' => {
                let value = digits.unwrap_or(0);
                digits = Some(value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?);
            }
            b's' | b'm' | b'h' | b'd' => {
                let unit = match b {
                    b's' => 1,
                    b'm' => 60,
                    b'h' => 60 * 60,
                    _ => 24 * 60 * 60,
                };
                total = total.checked_add(digits.take()?.checked_mul(unit)?)?;
            }
            _ => return None,
        }
    }

    match digits {
        Some(seconds) => total.checked_add(seconds),
        None => Some(total),
    }
}

/// Applies `update` to the rules selected by `name`: every rule for `*`,
/// every rule of the first proxy with that id, otherwise every rule with
/// that name. Returns how many rules were touched.
pub fn apply_rule_update(
    registry: &ProxyRegistry,
    name: Option<&[u8]>,
    update: RuleUpdate,
) -> Result<usize> {
    if update.is_empty() {
        return Err(PurgeError::bad_request("state or ttl is required"));
    }
    let Some(name) = name else {
        return Err(PurgeError::bad_request("name is required"));
    };

    if name == WILDCARD_NAME {
        return Ok(apply_all(registry.rules(), update));
    }

    if let Some(proxy) = registry.find_proxy(name) {
        return Ok(apply_all(proxy.rules.iter(), update));
    }

    let updated = apply_all(
        registry.rules().filter(|rule| rule.name.as_bytes() == name),
        update,
    );
    if updated == 0 {
        return Err(PurgeError::not_found(format!(
            "no proxy or rule named {:?}",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(updated)
}

fn apply_all<'a>(rules: impl Iterator<Item = &'a CacheRule>, update: RuleUpdate) -> usize {
    let mut updated = 0;
    for rule in rules {
        update.apply(rule);
        updated += 1;
    }
    updated
}
