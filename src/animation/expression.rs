//! Expression blending.
//!
//! Authoring-time aliases ("joy", "happy", "a") are resolved to the concrete
//! channels a rig exposes, then every channel is eased toward the larger of
//! its frame target and its persistent target.
//!
//! Frame targets are transient: a target that is not re-asserted fades out at
//! `frame_decay_rate`. Persistent targets hold until explicitly zeroed.

use std::collections::{HashMap, HashSet};

use crate::rig::{ExpressionChannel, ExpressionGroup};

/// Changes smaller than this are not written to the rig.
pub const WRITE_EPSILON: f32 = 1e-4;
/// Upper bound on cached alias resolutions
const MAX_CACHED_ALIASES: usize = 512;
/// Upper bound on rejected channels remembered for warn-once logging
const MAX_UNKNOWN_CHANNELS: usize = 256;

/// Old preset names still found in character files, mapped to current presets.
const LEGACY_REMAP: &[(&str, &str)] = &[
    ("happy", "joy"),
    ("sad", "sorrow"),
    ("angry", "angry"),
    ("surprise", "surprised"),
    ("relaxed", "fun"),
    ("a", "aa"),
    ("i", "ih"),
    ("u", "ou"),
    ("e", "ee"),
    ("o", "oh"),
    ("blink_l", "blinkLeft"),
    ("blink_r", "blinkRight"),
];

/// Blends expression channels toward alias-driven targets.
#[derive(Debug, Default)]
pub struct ExpressionBlender {
    /// Per-character alias table (alias → channels, used verbatim)
    aliases: HashMap<String, Vec<String>>,
    /// Expression groups declared by the attached rig
    groups: Vec<ExpressionGroup>,
    /// Resolved aliases, invalidated when aliases or groups change
    cache: HashMap<String, Vec<String>>,
    /// Aliases whose activity disallows automatic blinking
    blink_suppressors: Vec<String>,

    alias_targets: HashMap<String, f32>,
    fresh_aliases: HashSet<String>,
    persistent_aliases: HashMap<String, f32>,

    frame: HashMap<String, f32>,
    fresh: HashSet<String>,
    persistent: HashMap<String, f32>,
    current: HashMap<String, f32>,
    written: HashMap<String, f32>,
    /// Channels the rig rejected (logged once each)
    unknown: HashSet<String>,
}

impl ExpressionBlender {
    pub fn new(aliases: HashMap<String, Vec<String>>, blink_suppressors: Vec<String>) -> Self {
        Self {
            aliases,
            blink_suppressors,
            ..Default::default()
        }
    }

    /// Replace the rig's group catalog (on attach).
    pub fn set_groups(&mut self, groups: Vec<ExpressionGroup>) {
        self.groups = groups;
        self.cache.clear();
    }

    /// Replace the per-character alias table (on profile reload).
    pub fn set_aliases(
        &mut self,
        aliases: HashMap<String, Vec<String>>,
        blink_suppressors: Vec<String>,
    ) {
        self.aliases = aliases;
        self.blink_suppressors = blink_suppressors;
        self.cache.clear();
    }

    /// Resolve an alias to one or more channel names. Hits are cached;
    /// identity fallbacks are not.
    pub fn resolve(&mut self, alias: &str) -> Vec<String> {
        if let Some(hit) = self.cache.get(alias) {
            return hit.clone();
        }
        match self.lookup(alias) {
            Some(resolved) => {
                if self.cache.len() < MAX_CACHED_ALIASES {
                    self.cache.insert(alias.to_string(), resolved.clone());
                }
                resolved
            }
            None => vec![alias.to_string()],
        }
    }

    /// Number of cached alias resolutions.
    pub fn cached_aliases(&self) -> usize {
        self.cache.len()
    }

    fn lookup(&self, alias: &str) -> Option<Vec<String>> {
        if let Some(channels) = self.aliases.get(alias) {
            if !channels.is_empty() {
                return Some(channels.clone());
            }
        }

        if let Some(g) = self.groups.iter().find(|g| g.preset.as_deref() == Some(alias)) {
            return Some(vec![g.name.clone()]);
        }

        if self.groups.iter().any(|g| g.name == alias) {
            return Some(vec![alias.to_string()]);
        }

        if let Some(&(_, remapped)) = LEGACY_REMAP
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(alias))
        {
            let hit = self
                .groups
                .iter()
                .find(|g| g.preset.as_deref() == Some(remapped))
                .or_else(|| self.groups.iter().find(|g| g.name == remapped));
            if let Some(g) = hit {
                return Some(vec![g.name.clone()]);
            }
        }

        let lower = alias.to_lowercase();
        if lower.is_empty() {
            return None;
        }

        let matches_ci = |g: &&ExpressionGroup| {
            g.name.to_lowercase() == lower
                || g.preset.as_deref().map(str::to_lowercase).as_deref() == Some(lower.as_str())
        };
        if let Some(g) = self.groups.iter().find(matches_ci) {
            return Some(vec![g.name.clone()]);
        }

        let overlaps = |candidate: &str| {
            let c = candidate.to_lowercase();
            !c.is_empty() && (c.contains(&lower) || lower.contains(&c))
        };
        if let Some(g) = self
            .groups
            .iter()
            .find(|g| overlaps(g.name.as_str()) || g.preset.as_deref().is_some_and(overlaps))
        {
            return Some(vec![g.name.clone()]);
        }

        None
    }

    /// Set a frame target for an alias. Assigns (not max) to every resolved channel.
    pub fn add_target(&mut self, alias: &str, value: f32) {
        let value = sanitize(value);
        self.alias_targets.insert(alias.to_string(), value);
        self.fresh_aliases.insert(alias.to_string());

        for channel in self.resolve(alias) {
            self.frame.insert(channel.clone(), value);
            self.fresh.insert(channel);
        }
    }

    /// Set or clear a persistent target. Positive values are visible on the
    /// rig immediately, before the next blend pass.
    pub fn set_persistent(&mut self, name: &str, value: f32, sink: &mut dyn ExpressionChannel) {
        let value = sanitize(value);
        let channels = self.resolve(name);

        if value <= 0.0 {
            self.persistent_aliases.remove(name);
            for channel in &channels {
                self.persistent.remove(channel);
            }
            tracing::debug!("Cleared persistent expression {}", name);
            return;
        }

        self.persistent_aliases.insert(name.to_string(), value);
        for channel in channels {
            self.persistent.insert(channel.clone(), value);
            self.current.insert(channel.clone(), value);
            self.write(sink, &channel, value);
        }
        tracing::debug!("Persistent expression {} = {:.2}", name, value);
    }

    /// Decay pass: frame targets not assigned since the previous tick fall
    /// toward zero. Targets assigned this frame are untouched.
    pub fn decay_pass(&mut self, dt: f32, decay_rate: f32) {
        let step = (decay_rate * dt).max(0.0);
        decay_map(&mut self.frame, &self.fresh, step);
        decay_map(&mut self.alias_targets, &self.fresh_aliases, step);
        self.fresh.clear();
        self.fresh_aliases.clear();
    }

    /// Merge-apply pass: ease each channel toward max(frame, persistent).
    pub fn merge_apply(&mut self, dt: f32, rate: f32, sink: &mut dyn ExpressionChannel) {
        let step = (rate * dt).clamp(0.0, 1.0);

        let mut channels: Vec<String> = self.current.keys().cloned().collect();
        for name in self.frame.keys().chain(self.persistent.keys()) {
            if !self.current.contains_key(name) {
                channels.push(name.clone());
            }
        }
        channels.sort_unstable();
        channels.dedup();

        for channel in channels {
            let frame = self.frame.get(&channel).copied().unwrap_or(0.0);
            let persistent = self.persistent.get(&channel).copied().unwrap_or(0.0);
            let target = frame.max(persistent);
            let current = self.current.get(&channel).copied().unwrap_or(0.0);

            let mut next = current + (target - current) * step;
            if target == 0.0 && next < WRITE_EPSILON {
                next = 0.0;
            }

            if next == 0.0 && target == 0.0 {
                self.current.remove(&channel);
            } else {
                self.current.insert(channel.clone(), next);
            }

            let last = self.written.get(&channel).copied().unwrap_or(0.0);
            if (next - last).abs() > WRITE_EPSILON || (next == 0.0 && last != 0.0) {
                self.write(sink, &channel, next);
            }
        }
    }

    /// Full blend step: decay pass then merge-apply pass.
    pub fn tick(&mut self, dt: f32, rate: f32, decay_rate: f32, sink: &mut dyn ExpressionChannel) {
        self.decay_pass(dt, decay_rate);
        self.merge_apply(dt, rate, sink);
    }

    fn write(&mut self, sink: &mut dyn ExpressionChannel, channel: &str, value: f32) {
        if value == 0.0 {
            self.written.remove(channel);
        } else {
            self.written.insert(channel.to_string(), value);
        }
        if sink.set_value(channel, value) || self.unknown.contains(channel) {
            return;
        }
        if self.unknown.len() < MAX_UNKNOWN_CHANNELS {
            self.unknown.insert(channel.to_string());
            tracing::warn!("Rig has no expression channel '{}', ignoring", channel);
        } else {
            tracing::debug!("Rig has no expression channel '{}', ignoring", channel);
        }
    }

    /// False while an eye-closing expression is active.
    pub fn blink_allowed(&self) -> bool {
        !self.blink_suppressors.iter().any(|alias| {
            self.alias_targets.get(alias).copied().unwrap_or(0.0) > 0.5
                || self.persistent_aliases.get(alias).copied().unwrap_or(0.0) > 0.5
        })
    }

    pub fn frame_target(&self, channel: &str) -> f32 {
        self.frame.get(channel).copied().unwrap_or(0.0)
    }

    pub fn persistent_target(&self, channel: &str) -> f32 {
        self.persistent.get(channel).copied().unwrap_or(0.0)
    }

    pub fn alias_target(&self, alias: &str) -> f32 {
        self.alias_targets.get(alias).copied().unwrap_or(0.0)
    }

    pub fn current(&self, channel: &str) -> f32 {
        self.current.get(channel).copied().unwrap_or(0.0)
    }

    /// Number of channels with a nonzero current value.
    pub fn active_count(&self) -> usize {
        self.current.len()
    }

    /// Channels sorted by current value, highest first.
    pub fn strongest(&self, limit: usize) -> Vec<(String, f32)> {
        let mut all: Vec<(String, f32)> =
            self.current.iter().map(|(k, &v)| (k.clone(), v)).collect();
        all.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all.truncate(limit);
        all
    }

    /// Drop all runtime state (targets, blended values, logs). Alias tables stay.
    pub fn clear(&mut self) {
        self.alias_targets.clear();
        self.fresh_aliases.clear();
        self.persistent_aliases.clear();
        self.frame.clear();
        self.fresh.clear();
        self.persistent.clear();
        self.current.clear();
        self.written.clear();
        self.unknown.clear();
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn decay_map(map: &mut HashMap<String, f32>, fresh: &HashSet<String>, step: f32) {
    if step <= 0.0 {
        return;
    }
    map.retain(|name, value| {
        if fresh.contains(name) {
            return true;
        }
        *value -= step;
        *value > 0.0
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records every write and only knows a fixed channel set.
    #[derive(Default)]
    struct RecordingSink {
        known: Vec<ExpressionGroup>,
        writes: Vec<(String, f32)>,
    }

    impl RecordingSink {
        fn with(groups: Vec<ExpressionGroup>) -> Self {
            Self {
                known: groups,
                writes: Vec::new(),
            }
        }

        fn last(&self, name: &str) -> Option<f32> {
            self.writes
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
        }
    }

    impl ExpressionChannel for RecordingSink {
        fn set_value(&mut self, name: &str, value: f32) -> bool {
            self.writes.push((name.to_string(), value));
            self.known.iter().any(|g| g.name == name)
        }

        fn groups(&self) -> Vec<ExpressionGroup> {
            self.known.clone()
        }
    }

    fn vrm_groups() -> Vec<ExpressionGroup> {
        vec![
            ExpressionGroup::new("Fcl_ALL_Joy").with_preset("joy"),
            ExpressionGroup::new("Fcl_ALL_Sorrow").with_preset("sorrow"),
            ExpressionGroup::new("Fcl_MTH_A").with_preset("aa"),
            ExpressionGroup::new("Fcl_EYE_Close").with_preset("blink"),
            ExpressionGroup::new("Wink"),
            ExpressionGroup::new("Cheek_Puff"),
        ]
    }

    fn blender() -> ExpressionBlender {
        let mut aliases = HashMap::new();
        aliases.insert(
            "joy".to_string(),
            vec!["Joy_A".to_string(), "Joy_B".to_string()],
        );
        let mut b = ExpressionBlender::new(aliases, vec!["laugh".to_string()]);
        b.set_groups(vrm_groups());
        b
    }

    #[test]
    fn test_alias_table_maps_to_every_channel() {
        let mut b = blender();
        b.add_target("joy", 1.0);
        assert_eq!(b.frame_target("Joy_A"), 1.0);
        assert_eq!(b.frame_target("Joy_B"), 1.0);
    }

    #[test]
    fn test_resolution_precedence() {
        let mut b = ExpressionBlender::new(HashMap::new(), Vec::new());
        b.set_groups(vrm_groups());

        // preset name
        assert_eq!(b.resolve("sorrow"), vec!["Fcl_ALL_Sorrow"]);
        // exact group name
        assert_eq!(b.resolve("Wink"), vec!["Wink"]);
        // legacy remap
        assert_eq!(b.resolve("happy"), vec!["Fcl_ALL_Joy"]);
        assert_eq!(b.resolve("a"), vec!["Fcl_MTH_A"]);
        // case-insensitive
        assert_eq!(b.resolve("wink"), vec!["Wink"]);
        assert_eq!(b.resolve("BLINK"), vec!["Fcl_EYE_Close"]);
        // substring either direction
        assert_eq!(b.resolve("puff"), vec!["Cheek_Puff"]);
        assert_eq!(b.resolve("big_cheek_puff_left"), vec!["Cheek_Puff"]);
        // identity
        assert_eq!(b.resolve("zzz"), vec!["zzz"]);
    }

    #[test]
    fn test_explicit_table_beats_preset() {
        let mut b = blender();
        assert_eq!(b.resolve("joy"), vec!["Joy_A", "Joy_B"]);
    }

    #[test]
    fn test_cache_invalidated_on_new_groups() {
        let mut b = ExpressionBlender::new(HashMap::new(), Vec::new());
        assert_eq!(b.resolve("joy"), vec!["joy"]);
        b.set_groups(vrm_groups());
        assert_eq!(b.resolve("joy"), vec!["Fcl_ALL_Joy"]);
    }

    #[test]
    fn test_assign_overrides_stale_value_in_same_tick() {
        let mut b = blender();
        b.add_target("sorrow", 0.8);
        b.add_target("sorrow", 0.0);
        assert_eq!(b.frame_target("Fcl_ALL_Sorrow"), 0.0);
    }

    #[test]
    fn test_one_tick_moves_toward_target_without_overshoot() {
        for alias in ["joy", "sorrow", "happy", "wink", "puff", "unmapped"] {
            for &v in &[0.0, 0.25, 0.5, 1.0] {
                let mut b = blender();
                let mut sink = RecordingSink::with(vrm_groups());
                b.add_target(alias, v);
                b.tick(1.0 / 60.0, 8.0, 2.0, &mut sink);
                for channel in b.resolve(alias) {
                    let cur = b.current(&channel);
                    assert!(cur >= 0.0 && cur <= v + 1e-6, "{} overshot: {} > {}", channel, cur, v);
                    if v > 0.0 {
                        assert!(cur > 0.0, "{} did not move toward {}", channel, v);
                    }
                }
            }
        }
    }

    #[test]
    fn test_converges_with_large_rate() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.add_target("sorrow", 0.7);
        b.tick(0.1, 100.0, 2.0, &mut sink);
        assert!((b.current("Fcl_ALL_Sorrow") - 0.7).abs() < 1e-6);
        assert_eq!(sink.last("Fcl_ALL_Sorrow"), Some(0.7));
    }

    #[test]
    fn test_persistent_written_immediately() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.set_persistent("sorrow", 0.6, &mut sink);
        assert_eq!(sink.last("Fcl_ALL_Sorrow"), Some(0.6));
        assert_eq!(b.current("Fcl_ALL_Sorrow"), 0.6);

        b.set_persistent("sorrow", 0.0, &mut sink);
        assert_eq!(b.persistent_target("Fcl_ALL_Sorrow"), 0.0);
    }

    #[test]
    fn test_zero_frame_does_not_suppress_persistent() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.set_persistent("sorrow", 0.6, &mut sink);
        b.add_target("sorrow", 0.0);
        for _ in 0..30 {
            b.tick(0.05, 8.0, 2.0, &mut sink);
        }
        assert!((b.current("Fcl_ALL_Sorrow") - 0.6).abs() < 1e-3);
    }

    #[test]
    fn test_unrefreshed_frame_targets_decay() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.add_target("sorrow", 1.0);
        b.tick(0.1, 8.0, 2.0, &mut sink);
        assert_eq!(b.frame_target("Fcl_ALL_Sorrow"), 1.0, "fresh target must hold on its own tick");

        b.tick(0.1, 8.0, 2.0, &mut sink);
        assert!((b.frame_target("Fcl_ALL_Sorrow") - 0.8).abs() < 1e-5);

        for _ in 0..10 {
            b.tick(0.1, 8.0, 2.0, &mut sink);
        }
        assert_eq!(b.frame_target("Fcl_ALL_Sorrow"), 0.0);
    }

    #[test]
    fn test_tiny_changes_not_written() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.set_persistent("sorrow", 0.5, &mut sink);
        let writes = sink.writes.len();
        b.tick(0.016, 8.0, 2.0, &mut sink);
        assert_eq!(sink.writes.len(), writes, "steady channel must not be rewritten");
    }

    #[test]
    fn test_unknown_channel_non_fatal() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.add_target("joy", 1.0); // Joy_A / Joy_B do not exist on this rig
        b.tick(0.1, 8.0, 2.0, &mut sink);
        b.tick(0.1, 8.0, 2.0, &mut sink);
        assert!(b.current("Joy_A") > 0.0);
        assert!(sink.writes.iter().any(|(n, _)| n == "Joy_A"));
    }

    #[test]
    fn test_identity_fallback_not_cached() {
        let mut b = blender();
        assert_eq!(b.resolve("zzz_unmapped"), vec!["zzz_unmapped"]);
        assert_eq!(b.cached_aliases(), 0);

        b.resolve("sorrow");
        assert_eq!(b.cached_aliases(), 1);
    }

    #[test]
    fn test_caller_supplied_names_stay_bounded() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        for i in 0..2000 {
            // substring hits on "Wink" resolve and would otherwise be cached
            b.resolve(&format!("wink_{}", i));
            b.add_target(&format!("nope_{}", i), 1.0);
            b.tick(0.1, 8.0, 2.0, &mut sink);
        }
        assert!(b.cached_aliases() <= MAX_CACHED_ALIASES);
        assert!(b.unknown.len() <= MAX_UNKNOWN_CHANNELS);
    }

    #[test]
    fn test_blink_suppressed_by_listed_alias() {
        let mut b = blender();
        assert!(b.blink_allowed());
        b.add_target("laugh", 0.9);
        assert!(!b.blink_allowed());
        b.add_target("laugh", 0.1);
        assert!(b.blink_allowed());
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let mut b = blender();
        b.add_target("sorrow", 3.0);
        assert_eq!(b.frame_target("Fcl_ALL_Sorrow"), 1.0);
        b.add_target("sorrow", f32::NAN);
        assert_eq!(b.frame_target("Fcl_ALL_Sorrow"), 0.0);
    }

    #[test]
    fn test_clear_drops_runtime_state() {
        let mut b = blender();
        let mut sink = RecordingSink::with(vrm_groups());
        b.set_persistent("sorrow", 0.6, &mut sink);
        b.add_target("aa", 1.0);
        b.clear();
        assert_eq!(b.active_count(), 0);
        assert_eq!(b.persistent_target("Fcl_ALL_Sorrow"), 0.0);
        assert_eq!(b.frame_target("Fcl_MTH_A"), 0.0);
    }
}
