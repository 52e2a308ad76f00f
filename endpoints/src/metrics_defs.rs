use shared::metrics_defs::{MetricDef, MetricType};

pub const COOKIE_SYNC_REQUESTS: MetricDef = MetricDef {
    name: "cookie_sync.requests",
    metric_type: MetricType::Counter,
    description: "Cookie sync requests. Tagged with status.",
};

pub const COOKIE_SYNC_SYNCER: MetricDef = MetricDef {
    name: "cookie_sync.syncer",
    metric_type: MetricType::Counter,
    description: "Bidder evaluations during cookie sync. Tagged with syncer, status.",
};

pub const SETUID_REQUESTS: MetricDef = MetricDef {
    name: "setuid.requests",
    metric_type: MetricType::Counter,
    description: "Setuid requests. Tagged with status.",
};

pub const SETUID_SYNCER: MetricDef = MetricDef {
    name: "setuid.syncer",
    metric_type: MetricType::Counter,
    description: "Uid cookie updates. Tagged with syncer, action.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Endpoint request duration in seconds. Tagged with endpoint, status.",
};

pub const SYNCERS_CONFIGURED: MetricDef = MetricDef {
    name: "syncers.configured",
    metric_type: MetricType::Gauge,
    description: "Bidders with a usable syncer after startup.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    COOKIE_SYNC_REQUESTS,
    COOKIE_SYNC_SYNCER,
    SETUID_REQUESTS,
    SETUID_SYNCER,
    REQUEST_DURATION,
    SYNCERS_CONFIGURED,
];
