use shared::metrics_defs::{MetricDef, MetricType};

pub const COOKIE_EJECTED: MetricDef = MetricDef {
    name: "cookie.ejected",
    metric_type: MetricType::Counter,
    description: "Uids ejected to keep the uid cookie under its size limit",
};

pub const ALL_METRICS: &[MetricDef] = &[COOKIE_EJECTED];
