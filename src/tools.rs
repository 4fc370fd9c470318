//! Visualization tool definitions and execution.
//!
//! "Execution" is a synchronous pass-through: the backend validates shape and
//! hands the arguments to the frontend for rendering. Also hosts the recovery
//! path for tool-call argument strings that arrive as several JSON objects
//! concatenated without a separator.

use serde_json::{json, Value};
use tracing::warn;

/// Chart tool name.
pub const TOOL_SHOW_CHART: &str = "show_chart";
/// Metrics tool name.
pub const TOOL_SHOW_METRICS: &str = "show_metrics";
/// Lightweight request tool exposed only to the realtime model.
pub const TOOL_REQUEST_VISUALIZATION: &str = "request_visualization";

/// Tool definitions in chat-completions format (nested under `function`).
pub fn chat_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": TOOL_SHOW_CHART,
                "description": "Display a chart or visualization in the dashboard. Use this when the user asks to see data visually, wants a graph, or requests data comparison.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "chart_type": {
                            "type": "string",
                            "enum": ["line", "bar", "pie", "area"],
                            "description": "The type of chart to display"
                        },
                        "title": {"type": "string", "description": "Chart title"},
                        "data": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "label": {"type": "string"},
                                    "value": {"type": "number"}
                                },
                                "required": ["label", "value"]
                            },
                            "description": "Data points for the chart"
                        }
                    },
                    "required": ["chart_type", "title", "data"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": TOOL_SHOW_METRICS,
                "description": "Update the metrics panel with key performance indicators. Use this when the user asks about specific numbers, KPIs, or wants to see summary statistics.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "metrics": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "label": {"type": "string", "description": "The metric name/label"},
                                    "value": {"type": "number", "description": "The metric value"},
                                    "unit": {"type": "string", "description": "The unit of measurement (e.g., '$', '%', 'users')"}
                                },
                                "required": ["label", "value", "unit"]
                            },
                            "description": "Array of metrics to display"
                        }
                    },
                    "required": ["metrics"]
                }
            }
        }),
    ]
}

/// Tool definitions for the realtime voice model.
///
/// The realtime API flattens name/description/parameters to the top level,
/// and the voice session only exposes the lightweight request tool; heavy
/// chart/metrics generation runs in the background instead.
pub fn realtime_tool_definitions() -> Vec<Value> {
    vec![json!({
        "type": "function",
        "name": TOOL_REQUEST_VISUALIZATION,
        "description": "Request a dashboard visualization to be prepared in the background. Call this instead of rendering data yourself, then keep talking.",
        "parameters": {
            "type": "object",
            "properties": {
                "vis_type": {
                    "type": "string",
                    "enum": ["chart", "metrics"],
                    "description": "The kind of visualization to prepare"
                },
                "description": {
                    "type": "string",
                    "description": "One sentence describing what the visualization should show"
                }
            },
            "required": ["vis_type", "description"]
        }
    })]
}

/// Execute a tool by name, shaping the arguments for client rendering.
pub fn execute_tool(name: &str, arguments: &Value) -> Value {
    match name {
        TOOL_SHOW_CHART => json!({
            "chart_type": arguments.get("chart_type").cloned().unwrap_or(Value::Null),
            "title": arguments.get("title").cloned().unwrap_or(Value::Null),
            "data": arguments.get("data").cloned().unwrap_or_else(|| json!([])),
        }),
        TOOL_SHOW_METRICS => json!({
            "metrics": arguments.get("metrics").cloned().unwrap_or_else(|| json!([])),
        }),
        other => json!({"error": format!("Unknown tool: {}", other)}),
    }
}

/// A tool invocation recovered from an argument string.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredCall {
    pub name: String,
    pub arguments: Value,
}

/// Infer which tool an argument object belongs to from its field shape.
///
/// Used by the recovery path: an object carrying `metrics` belongs to
/// `show_metrics`, one carrying `chart_type` to `show_chart`; anything else
/// keeps the declared name. Field-shape sniffing is a heuristic; see the
/// recovery note on [`recover_tool_calls`].
fn infer_tool_name(arguments: &Value, declared: &str) -> String {
    if arguments.get("metrics").is_some() {
        TOOL_SHOW_METRICS.to_string()
    } else if arguments.get("chart_type").is_some() {
        TOOL_SHOW_CHART.to_string()
    } else {
        declared.to_string()
    }
}

/// Recover tool calls from a malformed argument string.
///
/// The streaming API occasionally concatenates the argument objects of
/// several tool invocations into one string with no separator
/// (`{...}{...}`). This is a documented fallback, not a silent retry: the
/// string is split into consecutive JSON objects and each is routed to a
/// tool by field shape. Returns an empty vec when nothing parseable is
/// found; the caller logs and drops, never surfaces a user-facing error.
pub fn recover_tool_calls(arguments_str: &str, declared_name: &str) -> Vec<RecoveredCall> {
    let stream = serde_json::Deserializer::from_str(arguments_str).into_iter::<Value>();

    let mut recovered = Vec::new();
    for item in stream {
        match item {
            Ok(value @ Value::Object(_)) => {
                let name = infer_tool_name(&value, declared_name);
                recovered.push(RecoveredCall {
                    name,
                    arguments: value,
                });
            }
            Ok(other) => {
                warn!("Skipping non-object tool argument fragment: {}", other);
            }
            Err(e) => {
                warn!("Tool argument recovery stopped: {}", e);
                break;
            }
        }
    }
    recovered
}
