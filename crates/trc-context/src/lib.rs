//! trc-context
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Builds, rebuilds, and enriches per-task context packs.
//!
//! Pins are sanitized before they enter a pack: absolute paths, traversal,
//! and secret-looking names are dropped and counted. A rebuild always mints
//! a fresh `pack_id`; the old pack is retained by the store.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use trc_bridge::RunnerSession;
use trc_core::{
    ContextPack, FileEntry, PackBudgets, PackMode, PackSignals, RedactionStats,
};
use trc_policy::CommandClass;
use uuid::Uuid;

/// Process-wide sequence making pack ids unique within one millisecond.
static PACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Substrings that mark a pin as secret-looking, checked case-insensitively.
const SECRET_MARKERS: [&str; 4] = ["secret", "token", "password", "apikey"];

/// Result of sanitizing a pin list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPins {
    /// Pins that survived.
    pub accepted: Vec<String>,
    /// Number of pins dropped.
    pub dropped: u64,
}

/// Drop unsafe pins: absolute paths, `..` traversal, `.env*` files, and any
/// name containing a secret marker.
pub fn sanitize_pins(pins: &[String]) -> SanitizedPins {
    let mut accepted = Vec::new();
    let mut dropped = 0u64;
    for pin in pins {
        if is_safe_pin(pin) {
            accepted.push(pin.clone());
        } else {
            debug!(pin, "dropping unsafe context pin");
            dropped += 1;
        }
    }
    SanitizedPins { accepted, dropped }
}

fn is_safe_pin(pin: &str) -> bool {
    if pin.is_empty() || pin.starts_with('/') || pin.starts_with('\\') {
        return false;
    }
    // Windows drive prefix counts as absolute.
    if pin.len() >= 2 && pin.as_bytes()[1] == b':' {
        return false;
    }
    if pin.split(['/', '\\']).any(|part| part == "..") {
        return false;
    }
    let file_name = pin.rsplit(['/', '\\']).next().unwrap_or(pin);
    if file_name.starts_with(".env") {
        return false;
    }
    let lowered = pin.to_ascii_lowercase();
    !SECRET_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn mint_pack_id(run_id: Uuid, task_id: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = PACK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("pack-{run_id}-{task_id}-{millis}-{seq}")
}

/// Build a fresh manifest pack from sanitized pins and gathered signals.
pub fn build(
    run_id: Uuid,
    task_id: &str,
    project_id: Uuid,
    budgets: PackBudgets,
    pins: &[String],
    signals: PackSignals,
) -> ContextPack {
    let sanitized = sanitize_pins(pins);
    let file_entries = sanitized
        .accepted
        .iter()
        .take(budgets.max_files as usize)
        .map(|path| FileEntry {
            path: path.clone(),
            why: "pinned".into(),
            range: None,
            hash: None,
        })
        .collect();

    ContextPack {
        pack_id: mint_pack_id(run_id, task_id),
        run_id,
        task_id: task_id.to_string(),
        project_id,
        mode: PackMode::Manifest,
        pinned_sources: sanitized.accepted,
        file_entries,
        signals,
        budgets,
        redaction_stats: RedactionStats::default(),
        created_at: Utc::now(),
    }
}

/// Rebuild a pack with new budgets and/or pins. Preserves `run_id` and
/// `task_id`; mints a new `pack_id`.
pub fn rebuild(
    pack: &ContextPack,
    new_budgets: Option<PackBudgets>,
    new_pins: Option<&[String]>,
) -> ContextPack {
    let budgets = new_budgets.unwrap_or(pack.budgets);
    let pins: Vec<String> = match new_pins {
        Some(pins) => pins.to_vec(),
        None => pack.pinned_sources.clone(),
    };
    let mut rebuilt = build(
        pack.run_id,
        &pack.task_id,
        pack.project_id,
        budgets,
        &pins,
        pack.signals.clone(),
    );
    rebuilt.mode = pack.mode;
    rebuilt
}

/// Fill `hash` and `range` for every entry by reading files through the
/// runner, and accumulate redaction stats for the content that will reach
/// prompts. Marks the pack hydrated.
pub async fn enrich(pack: &mut ContextPack, session: &RunnerSession) {
    let mut stats = pack.redaction_stats;
    for entry in &mut pack.file_entries {
        let Ok(result) = session.read(&entry.path).await else {
            continue;
        };
        if result.exit_code != 0 {
            continue;
        }
        let redaction = trc_redact::redact(&result.stdout);
        stats.masked_entries += redaction.masked_entries;
        stats.masked_chars += redaction.masked_chars;

        let mut hasher = Sha256::new();
        hasher.update(result.stdout.as_bytes());
        entry.hash = Some(format!("{:x}", hasher.finalize()));
        let lines = result.stdout.lines().count().max(1) as u32;
        entry.range = Some((1, lines));
    }
    pack.redaction_stats = stats;
    if pack.budgets.hydrate {
        pack.mode = PackMode::Hydrated;
    }
}

/// Gather working-tree signals through the bridge: diff summary, short
/// status, and the most recent verify failure passed by the caller.
pub async fn gather_signals(
    session: &RunnerSession,
    last_verify_failure: Option<String>,
) -> PackSignals {
    let diff_summary = match session
        .exec("git diff --stat", CommandClass::Allow, Some(15_000))
        .await
    {
        Ok(result) if result.exit_code == 0 && !result.stdout.trim().is_empty() => {
            Some(result.stdout)
        }
        _ => None,
    };
    let logs = match session
        .exec("git status --short", CommandClass::Allow, Some(15_000))
        .await
    {
        Ok(result) if result.exit_code == 0 && !result.stdout.trim().is_empty() => {
            Some(result.stdout)
        }
        _ => None,
    };
    PackSignals {
        failing_tests: last_verify_failure,
        logs,
        diff_summary,
    }
}

/// Render the pack into prompt context for the model: signals first, then
/// the file list with reasons.
pub fn render_for_prompt(pack: &ContextPack) -> String {
    let mut out = String::new();
    if let Some(diff) = &pack.signals.diff_summary {
        out.push_str("## Recent changes\n");
        out.push_str(diff);
        out.push('\n');
    }
    if let Some(failing) = &pack.signals.failing_tests {
        out.push_str("## Failing checks\n");
        out.push_str(failing);
        out.push('\n');
    }
    out.push_str("## Files in scope\n");
    for entry in &pack.file_entries {
        out.push_str(&format!("- {} ({})\n", entry.path, entry.why));
    }
    trc_redact::redact(&out).text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budgets() -> PackBudgets {
        PackBudgets::default()
    }

    #[test]
    fn sanitize_drops_absolute_and_traversal() {
        let pins = vec![
            "src/lib.rs".to_string(),
            "/etc/passwd".to_string(),
            "../outside.txt".to_string(),
            "a/../b.txt".to_string(),
            "C:\\windows\\system32".to_string(),
        ];
        let result = sanitize_pins(&pins);
        assert_eq!(result.accepted, vec!["src/lib.rs"]);
        assert_eq!(result.dropped, 4);
    }

    #[test]
    fn sanitize_drops_env_and_secret_names() {
        let pins = vec![
            ".env".to_string(),
            ".env.production".to_string(),
            "config/.env".to_string(),
            "src/secrets.rs".to_string(),
            "auth/token_store.rs".to_string(),
            "PASSWORD.txt".to_string(),
            "ApiKey.json".to_string(),
            "src/main.rs".to_string(),
        ];
        let result = sanitize_pins(&pins);
        assert_eq!(result.accepted, vec!["src/main.rs"]);
        assert_eq!(result.dropped, 7);
    }

    #[test]
    fn environment_dot_rs_is_not_env() {
        let pins = vec!["src/environment.rs".to_string()];
        let result = sanitize_pins(&pins);
        assert_eq!(result.accepted, vec!["src/environment.rs"]);
    }

    #[test]
    fn build_caps_entries_at_max_files() {
        let pins: Vec<String> = (0..40).map(|i| format!("src/file{i}.rs")).collect();
        let pack = build(
            Uuid::new_v4(),
            "task-001",
            Uuid::new_v4(),
            budgets(),
            &pins,
            PackSignals::default(),
        );
        assert_eq!(pack.file_entries.len(), budgets().max_files as usize);
        assert_eq!(pack.pinned_sources.len(), 40);
    }

    #[test]
    fn rebuild_mints_new_id_and_preserves_scope() {
        let pack = build(
            Uuid::new_v4(),
            "task-001",
            Uuid::new_v4(),
            budgets(),
            &["src/lib.rs".to_string()],
            PackSignals::default(),
        );
        let rebuilt = rebuild(&pack, None, None);
        assert_ne!(pack.pack_id, rebuilt.pack_id);
        assert_eq!(pack.run_id, rebuilt.run_id);
        assert_eq!(pack.task_id, rebuilt.task_id);
        assert_eq!(pack.pinned_sources, rebuilt.pinned_sources);
    }

    #[test]
    fn rebuild_applies_new_budgets() {
        let pins: Vec<String> = (0..10).map(|i| format!("src/file{i}.rs")).collect();
        let pack = build(
            Uuid::new_v4(),
            "task-001",
            Uuid::new_v4(),
            budgets(),
            &pins,
            PackSignals::default(),
        );
        let tight = PackBudgets {
            max_files: 3,
            ..budgets()
        };
        let rebuilt = rebuild(&pack, Some(tight), None);
        assert_eq!(rebuilt.file_entries.len(), 3);
        assert_eq!(rebuilt.budgets.max_files, 3);
    }

    #[test]
    fn pack_ids_are_unique_under_rapid_minting() {
        let run_id = Uuid::new_v4();
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..100 {
            let pack = build(
                run_id,
                "task-001",
                Uuid::new_v4(),
                budgets(),
                &[],
                PackSignals::default(),
            );
            assert!(seen.insert(pack.pack_id));
        }
    }

    #[test]
    fn prompt_rendering_is_redacted() {
        let mut pack = build(
            Uuid::new_v4(),
            "task-001",
            Uuid::new_v4(),
            budgets(),
            &["src/lib.rs".to_string()],
            PackSignals::default(),
        );
        pack.signals.diff_summary = Some("API_KEY=sk-live-1234 changed".into());
        let prompt = render_for_prompt(&pack);
        assert!(prompt.contains("API_KEY=[REDACTED]"));
        assert!(!prompt.contains("sk-live-1234"));
        assert!(prompt.contains("src/lib.rs"));
    }
}
