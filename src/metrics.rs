use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    admitted_total: AtomicU64,
    denied_total: AtomicU64,
    preflight_total: AtomicU64,
    upstream_failures_total: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admitted(&self) {
        self.admitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn denied(&self) {
        self.denied_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn preflight(&self) {
        self.preflight_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_failed(&self) {
        self.upstream_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self, tracked_keys: usize) -> String {
        format!(
            concat!(
                "# TYPE gateway_admitted_total counter\n",
                "gateway_admitted_total {}\n",
                "# TYPE gateway_denied_total counter\n",
                "gateway_denied_total {}\n",
                "# TYPE gateway_preflight_total counter\n",
                "gateway_preflight_total {}\n",
                "# TYPE gateway_upstream_failures_total counter\n",
                "gateway_upstream_failures_total {}\n",
                "# TYPE gateway_tracked_keys gauge\n",
                "gateway_tracked_keys {}\n"
            ),
            self.admitted_total.load(Ordering::Relaxed),
            self.denied_total.load(Ordering::Relaxed),
            self.preflight_total.load(Ordering::Relaxed),
            self.upstream_failures_total.load(Ordering::Relaxed),
            tracked_keys,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_counters_and_gauge() {
        let metrics = MetricsRegistry::new();
        metrics.admitted();
        metrics.admitted();
        metrics.denied();
        metrics.upstream_failed();

        let rendered = metrics.render_prometheus(7);
        assert!(rendered.contains("gateway_admitted_total 2\n"));
        assert!(rendered.contains("gateway_denied_total 1\n"));
        assert!(rendered.contains("gateway_preflight_total 0\n"));
        assert!(rendered.contains("gateway_upstream_failures_total 1\n"));
        assert!(rendered.contains("gateway_tracked_keys 7\n"));
    }
}
