use tracing::trace;

// Trace-based counters; the Prometheus recorder only backs `/metrics`.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "realtypost.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn collaborator_elapsed(call: &'static str, elapsed_ms: u128, ok: bool) {
    trace!(
        target = "realtypost.metrics",
        call = call,
        elapsed_ms = elapsed_ms as u64,
        ok = ok,
        "collaborator_elapsed"
    );
}
