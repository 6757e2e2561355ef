//! Per-site speculative optimizer for sole-spread calls
//!
//! Each `f(...x)` site starts `Unoptimized` and runs the baseline iteration
//! protocol. After `warmup_threshold` consecutive calls whose argument would
//! pass every guard, the site is optimized against the current monitor epoch.
//! Optimized sites read array elements directly as long as their guards hold.

use super::guards::{check_guards, check_shape, GuardSet};
use super::monitor::{InvalidationMonitor, WriteKind};
use super::{CallSiteStats, OptimizerConfig, OptimizerStats};
use crate::bytecode::{CallSiteId, CallSiteInfo};
use crate::runtime::value::{ObjectRef, PropertyKey, Symbol, Value};
use rustc_hash::FxHashMap as HashMap;

/// Label of the watched `Array.prototype[@@iterator]` slot
pub const ARRAY_ITERATOR_SLOT: &str = "Array.prototype[Symbol.iterator]";
/// Label of the watched `%ArrayIteratorPrototype%.next` slot
pub const ITERATOR_NEXT_SLOT: &str = "%ArrayIteratorPrototype%.next";

/// Tiering state of a call site
#[derive(Debug, Clone, Default)]
pub enum CallSiteState {
    #[default]
    Unoptimized,
    Optimized {
        guards: GuardSet,
    },
    Invalidated,
}

impl CallSiteState {
    pub fn name(&self) -> &'static str {
        match self {
            CallSiteState::Unoptimized => "unoptimized",
            CallSiteState::Optimized { .. } => "optimized",
            CallSiteState::Invalidated => "invalidated",
        }
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self, CallSiteState::Optimized { .. })
    }
}

/// Runtime record of one spread call site
#[derive(Debug, Clone, Default)]
pub struct CallSiteRecord {
    pub id: CallSiteId,
    pub line: u32,
    pub label: String,
    pub state: CallSiteState,
    /// Consecutive fast-eligible observations
    pub warmup: u32,
    /// Times this site has been invalidated
    pub deopts: u32,
    pub calls: u64,
    pub fast_path_hits: u64,
    pub baseline_calls: u64,
    pub guard_failures: u64,
    pub optimizations: u32,
    /// Call number (1-based) at which the site was last optimized
    pub optimized_at_call: Option<u64>,
}

impl CallSiteRecord {
    fn new(info: &CallSiteInfo) -> Self {
        Self {
            id: info.id,
            line: info.line,
            label: info.label.clone(),
            ..Self::default()
        }
    }

    fn stats(&self) -> CallSiteStats {
        CallSiteStats {
            id: self.id,
            line: self.line,
            label: self.label.clone(),
            state: self.state.name(),
            calls: self.calls,
            fast_path_hits: self.fast_path_hits,
            baseline_calls: self.baseline_calls,
            guard_failures: self.guard_failures,
            optimizations: self.optimizations,
            deopts: self.deopts,
            optimized_at_call: self.optimized_at_call,
        }
    }
}

/// Which path a spread call takes
#[derive(Debug, Clone, PartialEq)]
pub enum SpreadPath {
    /// Arguments read directly from the array
    Fast(Vec<Value>),
    /// Run the iteration protocol
    Baseline,
}

/// The speculative optimizer: site records plus the invalidation monitor
#[derive(Debug)]
pub struct SpreadCallOptimizer {
    config: OptimizerConfig,
    sites: HashMap<CallSiteId, CallSiteRecord>,
    monitor: InvalidationMonitor,
    array_prototype: ObjectRef,
    array_iterator_prototype: ObjectRef,
}

impl SpreadCallOptimizer {
    /// Create an optimizer and start watching the iteration protocol slots
    pub fn new(
        config: OptimizerConfig,
        array_prototype: ObjectRef,
        array_iterator_prototype: ObjectRef,
    ) -> Self {
        let mut monitor = InvalidationMonitor::new();
        monitor.watch(
            &array_prototype,
            PropertyKey::Symbol(Symbol::iterator()),
            ARRAY_ITERATOR_SLOT,
        );
        monitor.watch(
            &array_iterator_prototype,
            PropertyKey::from("next"),
            ITERATOR_NEXT_SLOT,
        );

        Self {
            config,
            sites: HashMap::default(),
            monitor,
            array_prototype,
            array_iterator_prototype,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn monitor(&self) -> &InvalidationMonitor {
        &self.monitor
    }

    /// Make compiled call sites known so statistics carry their labels
    pub fn register_sites(&mut self, sites: &[CallSiteInfo]) {
        for info in sites {
            self.sites
                .entry(info.id)
                .or_insert_with(|| CallSiteRecord::new(info));
        }
    }

    pub fn site(&self, id: CallSiteId) -> Option<&CallSiteRecord> {
        self.sites.get(&id)
    }

    /// Decide the path of one call at `site` with spread operand `arg`
    pub fn on_spread_call(&mut self, site: CallSiteId, arg: &Value) -> SpreadPath {
        let record = self.sites.entry(site).or_insert_with(|| CallSiteRecord {
            id: site,
            ..CallSiteRecord::default()
        });
        record.calls += 1;

        if !self.config.enabled {
            record.baseline_calls += 1;
            return SpreadPath::Baseline;
        }

        let epoch = self.monitor.epoch();
        let checked = match &record.state {
            CallSiteState::Optimized { guards } => Some(check_guards(guards, epoch, arg)),
            _ => None,
        };
        match checked {
            Some(Ok(values)) => {
                record.fast_path_hits += 1;
                tracing::trace!(%site, args = values.len(), "fast path");
                return SpreadPath::Fast(values);
            }
            Some(Err(guard)) => {
                record.guard_failures += 1;
                record.baseline_calls += 1;
                tracing::debug!(%site, %guard, "guard failed, using baseline");
                if guard.invalidates_site() {
                    Self::invalidate(record);
                    self.monitor.record_guard_failure(site, guard);
                }
                return SpreadPath::Baseline;
            }
            None => {}
        }

        let exhausted = record.deopts >= self.config.max_deopts || !self.monitor.is_fuse_intact();
        if matches!(record.state, CallSiteState::Invalidated) && exhausted {
            record.warmup = 0;
            record.baseline_calls += 1;
            return SpreadPath::Baseline;
        }

        // Warm-up: observe eligibility before the baseline materializes anything
        let eligible =
            self.monitor.is_fuse_intact() && check_shape(arg, &self.array_prototype).is_ok();
        record.baseline_calls += 1;
        if !eligible {
            record.warmup = 0;
            return SpreadPath::Baseline;
        }

        record.warmup += 1;
        if record.warmup >= self.config.warmup_threshold {
            record.warmup = 0;
            record.optimizations += 1;
            record.optimized_at_call = Some(record.calls);
            record.state = CallSiteState::Optimized {
                guards: GuardSet::new(
                    epoch,
                    self.array_prototype.clone(),
                    self.array_iterator_prototype.clone(),
                ),
            };
            self.monitor.add_dependent(site);

            if record.optimizations > 1 {
                tracing::info!(%site, epoch, deopts = record.deopts, "re-optimized spread call");
            } else {
                tracing::info!(%site, epoch, call = record.calls, "optimized spread call");
            }
        }
        SpreadPath::Baseline
    }

    /// Report a completed store or delete on `object[key]`
    pub fn notify_write(&mut self, object: &ObjectRef, key: &PropertyKey, kind: WriteKind) {
        let Some(sites) = self.monitor.notify_write(object, key, kind) else {
            return;
        };
        for site in sites {
            if let Some(record) = self.sites.get_mut(&site) {
                if record.state.is_optimized() {
                    Self::invalidate(record);
                }
            }
        }
    }

    fn invalidate(record: &mut CallSiteRecord) {
        record.state = CallSiteState::Invalidated;
        record.deopts += 1;
        record.warmup = 0;
        tracing::info!(site = %record.id, deopts = record.deopts, "invalidated spread call");
    }

    pub fn stats(&self) -> OptimizerStats {
        let mut sites: Vec<CallSiteStats> = self.sites.values().map(CallSiteRecord::stats).collect();
        sites.sort_by_key(|s| s.id);
        OptimizerStats {
            enabled: self.config.enabled,
            warmup_threshold: self.config.warmup_threshold,
            max_deopts: self.config.max_deopts,
            epoch: self.monitor.epoch(),
            fuse_intact: self.monitor.is_fuse_intact(),
            sites,
            invalidations: self.monitor.events().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::{Object, ObjectKind};

    struct Harness {
        optimizer: SpreadCallOptimizer,
        array_prototype: ObjectRef,
        iterator_prototype: ObjectRef,
    }

    fn harness(config: OptimizerConfig) -> Harness {
        let array_prototype = Object::ordinary(None).into_ref();
        array_prototype
            .borrow_mut()
            .set_own(PropertyKey::Symbol(Symbol::iterator()), Value::Number(1.0))
            .unwrap();
        let iterator_prototype = Object::ordinary(None).into_ref();
        iterator_prototype
            .borrow_mut()
            .set_own("next".into(), Value::Number(2.0))
            .unwrap();
        let mut optimizer = SpreadCallOptimizer::new(
            config,
            array_prototype.clone(),
            iterator_prototype.clone(),
        );
        optimizer.register_sites(&[CallSiteInfo {
            id: CallSiteId(0),
            line: 7,
            label: "add(...rest)".to_string(),
        }]);
        Harness {
            optimizer,
            array_prototype,
            iterator_prototype,
        }
    }

    fn pair(h: &Harness) -> Value {
        Value::Object(
            Object::new(
                ObjectKind::Array(vec![Some(Value::Number(1.0)), Some(Value::Number(2.0))]),
                Some(h.array_prototype.clone()),
            )
            .into_ref(),
        )
    }

    fn replace_iterator(h: &mut Harness, value: Value) {
        let key = PropertyKey::Symbol(Symbol::iterator());
        h.array_prototype
            .borrow_mut()
            .set_own(key.clone(), value)
            .unwrap();
        h.optimizer
            .notify_write(&h.array_prototype, &key, WriteKind::Store);
    }

    const SITE: CallSiteId = CallSiteId(0);

    #[test]
    fn test_warmup_then_fast_path() {
        let mut h = harness(OptimizerConfig::default().with_warmup_threshold(3));
        let arg = pair(&h);

        for _ in 0..3 {
            assert_eq!(h.optimizer.on_spread_call(SITE, &arg), SpreadPath::Baseline);
        }
        assert!(h.optimizer.site(SITE).unwrap().state.is_optimized());
        assert_eq!(h.optimizer.site(SITE).unwrap().optimized_at_call, Some(3));

        assert_eq!(
            h.optimizer.on_spread_call(SITE, &arg),
            SpreadPath::Fast(vec![Value::Number(1.0), Value::Number(2.0)])
        );
        let record = h.optimizer.site(SITE).unwrap();
        assert_eq!(record.fast_path_hits, 1);
        assert_eq!(record.baseline_calls, 3);
        assert_eq!(record.label, "add(...rest)");
    }

    #[test]
    fn test_ineligible_argument_resets_warmup() {
        let mut h = harness(OptimizerConfig::default().with_warmup_threshold(2));
        let arg = pair(&h);

        h.optimizer.on_spread_call(SITE, &arg);
        h.optimizer.on_spread_call(SITE, &Value::string("xy"));
        h.optimizer.on_spread_call(SITE, &arg);
        assert!(!h.optimizer.site(SITE).unwrap().state.is_optimized());
        h.optimizer.on_spread_call(SITE, &arg);
        assert!(h.optimizer.site(SITE).unwrap().state.is_optimized());
    }

    #[test]
    fn test_shape_guard_failure_keeps_site_optimized() {
        let mut h = harness(OptimizerConfig::default().with_warmup_threshold(1));
        let arg = pair(&h);
        h.optimizer.on_spread_call(SITE, &arg);

        let holey = Value::Object(
            Object::new(ObjectKind::Array(vec![None]), Some(h.array_prototype.clone())).into_ref(),
        );
        assert_eq!(h.optimizer.on_spread_call(SITE, &holey), SpreadPath::Baseline);
        let record = h.optimizer.site(SITE).unwrap();
        assert!(record.state.is_optimized());
        assert_eq!(record.guard_failures, 1);
        assert_eq!(record.deopts, 0);
    }

    #[test]
    fn test_watched_store_invalidates_and_fuse_blocks_reoptimization() {
        let mut h = harness(OptimizerConfig::default().with_warmup_threshold(1));
        let arg = pair(&h);
        h.optimizer.on_spread_call(SITE, &arg);

        replace_iterator(&mut h, Value::Null);
        let record = h.optimizer.site(SITE).unwrap();
        assert!(matches!(record.state, CallSiteState::Invalidated));
        assert_eq!(record.deopts, 1);

        for _ in 0..5 {
            assert_eq!(h.optimizer.on_spread_call(SITE, &arg), SpreadPath::Baseline);
        }
        assert!(!h.optimizer.site(SITE).unwrap().state.is_optimized());

        let stats = h.optimizer.stats();
        assert_eq!(stats.invalidations.len(), 1);
        assert_eq!(stats.invalidations[0].sites_affected, 1);
        assert!(!stats.fuse_intact);
    }

    #[test]
    fn test_restoration_reoptimizes_until_deopt_cap() {
        let config = OptimizerConfig::default()
            .with_warmup_threshold(1)
            .with_max_deopts(2);
        let mut h = harness(config);
        let arg = pair(&h);

        for round in 1..=3u32 {
            h.optimizer.on_spread_call(SITE, &arg);
            let optimized = h.optimizer.site(SITE).unwrap().state.is_optimized();
            assert_eq!(optimized, round <= 2, "round {}", round);

            replace_iterator(&mut h, Value::Null);
            replace_iterator(&mut h, Value::Number(1.0));
        }

        let record = h.optimizer.site(SITE).unwrap();
        assert_eq!(record.deopts, 2);
        assert_eq!(record.optimizations, 2);
        assert!(matches!(record.state, CallSiteState::Invalidated));
    }

    #[test]
    fn test_iterator_next_is_watched() {
        let mut h = harness(OptimizerConfig::default().with_warmup_threshold(1));
        let arg = pair(&h);
        h.optimizer.on_spread_call(SITE, &arg);

        h.iterator_prototype.borrow_mut().delete_own(&"next".into());
        let iterator_prototype = h.iterator_prototype.clone();
        h.optimizer
            .notify_write(&iterator_prototype, &"next".into(), WriteKind::Delete);
        assert_eq!(h.optimizer.site(SITE).unwrap().deopts, 1);
    }

    #[test]
    fn test_disabled_optimizer_never_optimizes() {
        let mut h = harness(
            OptimizerConfig::default()
                .with_enabled(false)
                .with_warmup_threshold(1),
        );
        let arg = pair(&h);
        for _ in 0..10 {
            assert_eq!(h.optimizer.on_spread_call(SITE, &arg), SpreadPath::Baseline);
        }
        let record = h.optimizer.site(SITE).unwrap();
        assert_eq!(record.calls, 10);
        assert_eq!(record.optimizations, 0);
    }
}
