//! Scheduler configuration

/// Default restart budget for one timer pass.
pub const DEFAULT_MAX_TIMER_FIRES: usize = 4 * crate::TIMER_SLOTS;

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// Descriptor capacity is fixed at compile time ([`TIMER_SLOTS`](crate::TIMER_SLOTS),
/// [`EVENT_SLOTS`](crate::EVENT_SLOTS)); everything tunable at runtime lives here.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Prefix for log records
    pub name: &'static str,
    /// Upper bound on timer firings in one pass of the loop.
    ///
    /// Each firing restarts the scan from the front of the registry, so a
    /// zero-interval timer would otherwise keep the pass alive forever.
    pub max_timer_fires: usize,
    /// Called right before the loop blocks with a non-zero wait
    pub idle_callback: Option<fn()>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "evl",
            max_timer_fires: DEFAULT_MAX_TIMER_FIRES,
            idle_callback: None,
        }
    }
}

impl SchedulerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Sets the log prefix.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the per-pass timer firing budget. Zero is raised to one.
    pub fn max_timer_fires(mut self, max: usize) -> Self {
        self.config.max_timer_fires = max.max(1);
        self
    }

    /// Sets the idle callback function.
    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}
