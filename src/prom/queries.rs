//! PromQL expressions issued by the graph engine and the cluster summary.
//!
//! Templates take already-rendered label selectors (`{k="v",...}`), a range
//! window such as `30s`, and for grouped queries the comma-separated `by (...)`
//! dimensions.

/// Window used when a request does not name one.
pub const WINDOW_DEFAULT: &str = "30s";

pub const CLUSTER_MEMORY_USAGE: &str =
    r#"sum (container_memory_working_set_bytes{id="/"}) / sum (machine_memory_bytes{}) * 100"#;

pub const CLUSTER_CPU_USAGE_1M_AVG: &str =
    r#"sum (rate (container_cpu_usage_seconds_total{id="/",}[1m])) / sum (machine_cpu_cores) * 100"#;

pub const CLUSTER_FILESYSTEM_USAGE: &str = r#"sum (container_fs_usage_bytes{device=~"^/dev/[sv]d[a-z][1-9]$",id="/"}) / sum (container_fs_limit_bytes{device=~"^/dev/[sv]d[a-z][1-9]$",id="/",}) * 100"#;

/// Render `{name="value",...}`, escaping values for a PromQL string literal.
pub fn label_selector(pairs: &[(&str, &str)]) -> String {
    let body = pairs
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label_value(value)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn overall_success_rate(window: &str) -> String {
    format!(
        r#"sum(irate(response_total{{classification="success", direction="inbound"}}[{w}])) / sum(irate(response_total{{direction="inbound"}}[{w}]))"#,
        w = window
    )
}

pub fn latency_quantile(quantile: &str, selector: &str, window: &str, group_by: &str) -> String {
    format!(
        "histogram_quantile({}, sum(irate(response_latency_ms_bucket{}[{}])) by (le, {}))",
        quantile, selector, window, group_by
    )
}

pub fn request_rate(selector: &str, window: &str, group_by: &str) -> String {
    format!(
        "sum(irate(request_total{}[{}])) by ({})",
        selector, window, group_by
    )
}

pub fn success_rate(
    success_selector: &str,
    total_selector: &str,
    window: &str,
    group_by: &str,
) -> String {
    format!(
        "sum(irate(response_total{s}[{w}])) by ({g}) / sum(irate(response_total{t}[{w}])) by ({g})",
        s = success_selector,
        t = total_selector,
        w = window,
        g = group_by
    )
}

/// Inbound traffic identity: who received requests, and from which TLS client.
pub fn inbound_identity(resource: &str) -> String {
    format!(
        r#"sum(request_total{{direction="inbound"}}) by (namespace, app, version, {}, client_id)"#,
        resource
    )
}

/// Outbound traffic identity: who sent requests, and to which destination resource.
pub fn outbound_identity(resource: &str) -> String {
    format!(
        r#"sum(request_total{{direction="outbound"}}) by (namespace, app, version, {r}, dst_namespace, dst_{r})"#,
        r = resource
    )
}
