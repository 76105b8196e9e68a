use std::time::Instant;

#[cfg(feature = "profiling")]
use crate::telemetry::tags;
#[cfg(feature = "profiling")]
use std::collections::BTreeSet;
#[cfg(feature = "profiling")]
use std::sync::{OnceLock, RwLock};

/// Converts elapsed time since `started_at` to microseconds, clamped to `u64::MAX`.
#[inline]
pub fn elapsed_us(started_at: Instant) -> u64 {
    started_at.elapsed().as_micros().min(u64::MAX as u128) as u64
}

#[cfg(feature = "profiling")]
const PROFILE_TAGS_ENV: &str = "PGZ_PROFILE_TAGS";

// None => every tag enabled.
#[cfg(feature = "profiling")]
fn parse_tags(raw: &str) -> Option<BTreeSet<String>> {
    let mut tags = BTreeSet::new();
    for token in raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        let normalized = token.to_ascii_lowercase();
        if normalized == "*" || normalized == "all" {
            return None;
        }
        tags.insert(normalized);
    }

    if tags.is_empty() { None } else { Some(tags) }
}

#[cfg(feature = "profiling")]
fn filter_state() -> &'static RwLock<Option<BTreeSet<String>>> {
    static STATE: OnceLock<RwLock<Option<BTreeSet<String>>>> = OnceLock::new();
    STATE.get_or_init(|| {
        let enabled = std::env::var(PROFILE_TAGS_ENV)
            .ok()
            .and_then(|raw| parse_tags(&raw));
        RwLock::new(enabled)
    })
}

/// Restricts profiling output to the given tags. An empty slice enables all tags.
#[cfg(feature = "profiling")]
pub fn set_enabled_tags(tags: &[&str]) {
    let parsed = parse_tags(&tags.join(","));
    let mut guard = match filter_state().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = parsed;
}

#[cfg(not(feature = "profiling"))]
pub fn set_enabled_tags(_tags: &[&str]) {}

/// Removes any tag restriction.
pub fn enable_all_tags() {
    set_enabled_tags(&[]);
}

/// Returns true when at least one tag in the stack is enabled.
#[cfg(feature = "profiling")]
pub fn is_tag_stack_enabled(tag_stack: &[&str]) -> bool {
    let guard = match filter_state().read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match guard.as_ref() {
        None => true,
        Some(enabled) => tag_stack
            .iter()
            .any(|tag| enabled.contains(&tag.to_ascii_lowercase())),
    }
}

#[cfg(not(feature = "profiling"))]
pub fn is_tag_stack_enabled(_tag_stack: &[&str]) -> bool {
    false
}

/// Emits a profiling event through `tracing` when its tag stack is enabled.
#[cfg(feature = "profiling")]
#[inline]
pub fn event(
    target: &'static str,
    tag_stack: &[&str],
    op: &'static str,
    result: &'static str,
    elapsed_us: u64,
    message: &'static str,
) {
    if !is_tag_stack_enabled(tag_stack) {
        return;
    }

    // tracing targets must be constants, hence one arm per subsystem.
    match target {
        tags::PROFILE_CODEC => {
            tracing::debug!(target: tags::PROFILE_CODEC, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_PRODUCER => {
            tracing::debug!(target: tags::PROFILE_PRODUCER, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_WORKER => {
            tracing::debug!(target: tags::PROFILE_WORKER, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_CONSUMER => {
            tracing::debug!(target: tags::PROFILE_CONSUMER, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_PIPELINE => {
            tracing::debug!(target: tags::PROFILE_PIPELINE, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        _ => {
            tracing::debug!(target: "pgz.profile", op, result, elapsed_us, original_target = target, tags = ?tag_stack, "{message}");
        }
    }
}

#[cfg(not(feature = "profiling"))]
#[inline]
pub fn event(
    _target: &'static str,
    _tag_stack: &[&str],
    _op: &'static str,
    _result: &'static str,
    _elapsed_us: u64,
    _message: &'static str,
) {
}
