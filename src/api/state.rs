use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::common::State;
use crate::monitors::MonitorRegistry;
use crate::store::Store;

#[derive(Clone)]
pub struct ApiState {
    pub state: State,
    pub registry: Arc<MonitorRegistry>,
    pub store: Store,
    pub prometheus_handle: Option<PrometheusHandle>,
}
