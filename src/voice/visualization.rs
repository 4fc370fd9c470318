//! Background visualization tasks for the voice session.
//!
//! The realtime model only requests a visualization; the heavy chart/metrics
//! generation runs here against the non-realtime LLM so voice output is never
//! blocked. Completion notifications are injected into the model's timeline
//! only when it is not mid-utterance.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::history::ConversationHistory;
use crate::modes::Mode;
use crate::persona::Persona;
use crate::prompt::build_system_prompt;
use crate::providers::{ChatProvider, RealtimePort};
use crate::tools::{chat_tool_definitions, execute_tool};
use crate::voice::frames::ServerFrame;

// ---------------------------------------------------------------------------
// Visualization kinds
// ---------------------------------------------------------------------------

/// The two visualization kinds the lightweight tool can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisKind {
    Chart,
    Metrics,
}

impl VisKind {
    pub fn parse(s: &str) -> Option<VisKind> {
        match s {
            "chart" => Some(VisKind::Chart),
            "metrics" => Some(VisKind::Metrics),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisKind::Chart => "chart",
            VisKind::Metrics => "metrics",
        }
    }
}

// ---------------------------------------------------------------------------
// Deferred notification gate
// ---------------------------------------------------------------------------

/// Single-slot-consumer scheduler for completion notifications.
///
/// Invariant: a notification is handed out for injection only while the model
/// is not responding; everything produced mid-utterance queues and is flushed
/// FIFO on the next response-done.
#[derive(Debug, Default)]
pub struct NotificationGate {
    responding: bool,
    queue: VecDeque<String>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a response-started event.
    pub fn response_started(&mut self) {
        self.responding = true;
    }

    /// Record a response-done event. Returns the queued notifications to
    /// flush, in FIFO order.
    pub fn response_done(&mut self) -> Vec<String> {
        self.responding = false;
        self.queue.drain(..).collect()
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    /// Submit a notification. Returns it back when the model is idle (caller
    /// injects immediately); queues it otherwise.
    pub fn submit(&mut self, notification: String) -> Option<String> {
        if self.responding {
            self.queue.push_back(notification);
            None
        } else {
            Some(notification)
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Inject one notification into the model's timeline and ask for a turn.
pub async fn inject_notification(upstream: &dyn RealtimePort, notification: &str) -> Result<()> {
    upstream.create_user_text_item(notification).await?;
    upstream.create_response().await
}

// ---------------------------------------------------------------------------
// Pending-task registry
// ---------------------------------------------------------------------------

/// At most one in-flight background task per visualization kind.
///
/// Starting a new request for a kind cancels the previous one first. Tasks
/// deregister themselves by generation id, so a finished task never removes
/// its replacement.
#[derive(Debug, Default)]
pub struct PendingVisualizations {
    tasks: HashMap<VisKind, (u64, CancellationToken)>,
    next_id: u64,
}

impl PendingVisualizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending task for `kind` and register a new one. Returns
    /// the (id, token) pair for the replacement task.
    pub fn replace(&mut self, kind: VisKind) -> (u64, CancellationToken) {
        if let Some((_, token)) = self.tasks.remove(&kind) {
            debug!("Cancelling pending {} visualization", kind.as_str());
            token.cancel();
        }
        let id = self.next_id;
        self.next_id += 1;
        let token = CancellationToken::new();
        self.tasks.insert(kind, (id, token.clone()));
        (id, token)
    }

    /// Cancel every pending task (mode switch, session teardown).
    pub fn cancel_all(&mut self) {
        for (kind, (_, token)) in self.tasks.drain() {
            debug!("Cancelling pending {} visualization", kind.as_str());
            token.cancel();
        }
    }

    /// Deregister a finished task. A stale id (the task was already replaced
    /// or cancelled) is a no-op.
    pub fn deregister(&mut self, kind: VisKind, id: u64) {
        if let Some((current_id, _)) = self.tasks.get(&kind) {
            if *current_id == id {
                self.tasks.remove(&kind);
            }
        }
    }

    pub fn is_pending(&self, kind: VisKind) -> bool {
        self.tasks.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

/// Everything a background visualization run needs, snapshotted at spawn
/// time so the task never touches live session state.
pub struct VisualizationJob {
    pub kind: VisKind,
    pub description: String,
    pub mode: Mode,
    pub persona: Persona,
    /// Role-tagged transcript messages at the time of the request.
    pub transcript_messages: Vec<Value>,
}

impl VisualizationJob {
    pub fn new(
        kind: VisKind,
        description: String,
        mode: Mode,
        persona: Persona,
        transcript: &ConversationHistory,
    ) -> Self {
        Self {
            kind,
            description,
            mode,
            persona,
            transcript_messages: transcript.to_messages(),
        }
    }

    fn build_messages(&self) -> Vec<Value> {
        let system_prompt = build_system_prompt(&self.mode, &self.persona);
        let mut messages = vec![serde_json::json!({"role": "system", "content": system_prompt})];
        messages.extend(self.transcript_messages.iter().cloned());
        messages.push(serde_json::json!({
            "role": "user",
            "content": format!(
                "Generate a {} visualization for the dashboard now: {}. \
                 Call the appropriate visualization tool with realistic data.",
                self.kind.as_str(),
                self.description
            ),
        }));
        messages
    }

    fn summary(&self) -> String {
        let what = match self.kind {
            VisKind::Chart => "A chart",
            VisKind::Metrics => "An updated metrics panel",
        };
        format!(
            "{} showing {} is now visible on the dashboard. Briefly let the user know.",
            what, self.description
        )
    }
}

/// Run one background visualization task to completion.
///
/// Cancellation may arrive at any time; a cancellation requested before the
/// results were forwarded suppresses every client-visible side effect, one
/// requested after is a no-op (at-most-once delivery, no rollback). The task
/// always deregisters itself from `pending` on the way out.
pub async fn run_visualization_task(
    job: VisualizationJob,
    provider: Arc<dyn ChatProvider>,
    upstream: Arc<dyn RealtimePort>,
    client_tx: UnboundedSender<ServerFrame>,
    gate: Arc<Mutex<NotificationGate>>,
    pending: Arc<Mutex<PendingVisualizations>>,
    task_id: u64,
    token: CancellationToken,
) {
    let kind = job.kind;
    let outcome = execute_job(job, provider, upstream, client_tx, gate, &token).await;
    if let Err(e) = outcome {
        warn!("Visualization task ({}) stopped: {}", kind.as_str(), e);
    }
    pending.lock().unwrap().deregister(kind, task_id);
}

async fn execute_job(
    job: VisualizationJob,
    provider: Arc<dyn ChatProvider>,
    upstream: Arc<dyn RealtimePort>,
    client_tx: UnboundedSender<ServerFrame>,
    gate: Arc<Mutex<NotificationGate>>,
    token: &CancellationToken,
) -> Result<()> {
    let messages = job.build_messages();
    let tools = chat_tool_definitions();

    // The LLM call is raced against cancellation, and the token is checked
    // again right after it returns: a cancellation requested mid-call must
    // prevent any further side effects.
    let response = tokio::select! {
        _ = token.cancelled() => {
            debug!("Visualization task cancelled during LLM call");
            return Ok(());
        }
        result = provider.chat(&messages, Some(&tools)) => result?,
    };
    if token.is_cancelled() {
        debug!("Visualization task cancelled after LLM call, dropping results");
        return Ok(());
    }

    if response.tool_calls.is_empty() {
        info!(
            "Visualization task ({}) produced no tool call, nothing to show",
            job.kind.as_str()
        );
        return Ok(());
    }

    // Past this point delivery is committed; cancellation no longer rolls
    // anything back.
    for call in &response.tool_calls {
        let arguments: Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping malformed visualization tool call: {}", e);
                continue;
            }
        };
        let result = execute_tool(&call.name, &arguments);
        let _ = client_tx.send(ServerFrame::ToolResult {
            tool: call.name.clone(),
            result,
        });
    }

    let notification = job.summary();
    let inject_now = gate.lock().unwrap().submit(notification);
    match inject_now {
        Some(notification) => {
            info!("Model idle, injecting visualization notification now");
            inject_notification(upstream.as_ref(), &notification).await?;
        }
        None => {
            info!("Model is responding, notification deferred");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::builtin;
    use crate::providers::base::{ChatResponse, ToolCallRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    // -- NotificationGate tests --

    #[test]
    fn test_gate_passes_through_when_idle() {
        let mut gate = NotificationGate::new();
        assert_eq!(gate.submit("ready".into()), Some("ready".into()));
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn test_gate_queues_while_responding() {
        let mut gate = NotificationGate::new();
        gate.response_started();
        assert_eq!(gate.submit("first".into()), None);
        assert_eq!(gate.submit("second".into()), None);
        assert_eq!(gate.queued(), 2);

        let flushed = gate.response_done();
        assert_eq!(flushed, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(gate.queued(), 0);
        assert!(!gate.is_responding());
    }

    #[test]
    fn test_gate_responding_flag_tracks_lifecycle() {
        let mut gate = NotificationGate::new();
        assert!(!gate.is_responding());
        gate.response_started();
        assert!(gate.is_responding());
        gate.response_done();
        assert!(!gate.is_responding());
    }

    // -- PendingVisualizations tests --

    #[test]
    fn test_replace_cancels_previous_same_kind() {
        let mut pending = PendingVisualizations::new();
        let (_, first_token) = pending.replace(VisKind::Chart);
        assert!(!first_token.is_cancelled());

        let (_, second_token) = pending.replace(VisKind::Chart);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut pending = PendingVisualizations::new();
        let (_, chart_token) = pending.replace(VisKind::Chart);
        let (_, metrics_token) = pending.replace(VisKind::Metrics);
        assert!(!chart_token.is_cancelled());
        assert!(!metrics_token.is_cancelled());
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_stale_deregister_is_noop() {
        let mut pending = PendingVisualizations::new();
        let (old_id, _) = pending.replace(VisKind::Chart);
        let (new_id, _) = pending.replace(VisKind::Chart);

        pending.deregister(VisKind::Chart, old_id);
        assert!(pending.is_pending(VisKind::Chart));

        pending.deregister(VisKind::Chart, new_id);
        assert!(!pending.is_pending(VisKind::Chart));
    }

    #[test]
    fn test_cancel_all() {
        let mut pending = PendingVisualizations::new();
        let (_, a) = pending.replace(VisKind::Chart);
        let (_, b) = pending.replace(VisKind::Metrics);
        pending.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(pending.is_empty());
    }

    // -- Background task tests --

    struct ToolCallProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for ToolCallProvider {
        async fn chat(
            &self,
            _messages: &[Value],
            _tools: Option<&[Value]>,
        ) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "show_chart".into(),
                    arguments: r#"{"chart_type": "line", "title": "Spend", "data": []}"#.into(),
                }],
                finish_reason: "tool_calls".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingPort {
        events: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl RealtimePort for RecordingPort {
        async fn send_event(&self, event: Value) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn job(kind: VisKind) -> VisualizationJob {
        VisualizationJob {
            kind,
            description: "monthly spending".into(),
            mode: builtin::banking_mode(),
            persona: Persona::new(),
            transcript_messages: vec![],
        }
    }

    #[tokio::test]
    async fn test_task_forwards_results_and_injects_when_idle() {
        let provider = Arc::new(ToolCallProvider {
            calls: AtomicUsize::new(0),
        });
        let upstream = Arc::new(RecordingPort::default());
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));
        let (task_id, token) = pending.lock().unwrap().replace(VisKind::Chart);
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_visualization_task(
            job(VisKind::Chart),
            provider,
            upstream.clone(),
            tx,
            gate,
            pending.clone(),
            task_id,
            token,
        )
        .await;

        // Tool result reached the client.
        let frame = rx.try_recv().unwrap();
        assert!(matches!(frame, ServerFrame::ToolResult { ref tool, .. } if tool == "show_chart"));

        // Model was idle: notification injected as item.create + response.create.
        let events = upstream.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "conversation.item.create");
        assert_eq!(events[1]["type"], "response.create");

        // Task deregistered itself.
        assert!(!pending.lock().unwrap().is_pending(VisKind::Chart));
    }

    #[tokio::test]
    async fn test_task_defers_notification_while_model_responds() {
        let provider = Arc::new(ToolCallProvider {
            calls: AtomicUsize::new(0),
        });
        let upstream = Arc::new(RecordingPort::default());
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        gate.lock().unwrap().response_started();
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));
        let (task_id, token) = pending.lock().unwrap().replace(VisKind::Metrics);
        let (tx, _rx) = mpsc::unbounded_channel();

        run_visualization_task(
            job(VisKind::Metrics),
            provider,
            upstream.clone(),
            tx,
            gate.clone(),
            pending,
            task_id,
            token,
        )
        .await;

        // Nothing was sent to the model; the notification queued instead.
        assert!(upstream.events.lock().unwrap().is_empty());
        assert_eq!(gate.lock().unwrap().queued(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_task_has_no_visible_effects() {
        let provider = Arc::new(ToolCallProvider {
            calls: AtomicUsize::new(0),
        });
        let upstream = Arc::new(RecordingPort::default());
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));
        let (task_id, token) = pending.lock().unwrap().replace(VisKind::Chart);
        let (tx, mut rx) = mpsc::unbounded_channel();

        token.cancel();
        run_visualization_task(
            job(VisKind::Chart),
            provider,
            upstream.clone(),
            tx,
            gate,
            pending.clone(),
            task_id,
            token,
        )
        .await;

        assert!(rx.try_recv().is_err(), "no client frame after cancellation");
        assert!(upstream.events.lock().unwrap().is_empty());
        // Still deregistered (replace() already dropped it from the map; the
        // self-deregister must not panic or resurrect anything).
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_after_delivery_is_a_noop() {
        let provider = Arc::new(ToolCallProvider {
            calls: AtomicUsize::new(0),
        });
        let upstream = Arc::new(RecordingPort::default());
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));
        let (task_id, token) = pending.lock().unwrap().replace(VisKind::Chart);
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_visualization_task(
            job(VisKind::Chart),
            provider,
            upstream.clone(),
            tx,
            gate,
            pending.clone(),
            task_id,
            token.clone(),
        )
        .await;

        // The task delivered its result and deregistered.
        assert!(rx.try_recv().is_ok());
        assert!(!pending.lock().unwrap().is_pending(VisKind::Chart));
        let events_after_run = upstream.events.lock().unwrap().len();

        // A late cancellation rolls nothing back and sends nothing more.
        token.cancel();
        assert!(rx.try_recv().is_err());
        assert_eq!(upstream.events.lock().unwrap().len(), events_after_run);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_tool_call_means_no_notification() {
        struct EmptyProvider;

        #[async_trait]
        impl ChatProvider for EmptyProvider {
            async fn chat(
                &self,
                _messages: &[Value],
                _tools: Option<&[Value]>,
            ) -> Result<ChatResponse> {
                Ok(ChatResponse {
                    content: Some("I couldn't make a chart.".into()),
                    tool_calls: Vec::new(),
                    finish_reason: "stop".into(),
                })
            }
        }

        let upstream = Arc::new(RecordingPort::default());
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));
        let (task_id, token) = pending.lock().unwrap().replace(VisKind::Chart);
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_visualization_task(
            job(VisKind::Chart),
            Arc::new(EmptyProvider),
            upstream.clone(),
            tx,
            gate.clone(),
            pending.clone(),
            task_id,
            token,
        )
        .await;

        assert!(rx.try_recv().is_err());
        assert!(upstream.events.lock().unwrap().is_empty());
        assert_eq!(gate.lock().unwrap().queued(), 0);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_is_swallowed_and_deregisters() {
        struct FailingProvider;

        #[async_trait]
        impl ChatProvider for FailingProvider {
            async fn chat(
                &self,
                _messages: &[Value],
                _tools: Option<&[Value]>,
            ) -> Result<ChatResponse> {
                anyhow::bail!("rate limited")
            }
        }

        let upstream = Arc::new(RecordingPort::default());
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));
        let (task_id, token) = pending.lock().unwrap().replace(VisKind::Metrics);
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_visualization_task(
            job(VisKind::Metrics),
            Arc::new(FailingProvider),
            upstream,
            tx,
            gate,
            pending.clone(),
            task_id,
            token,
        )
        .await;

        assert!(rx.try_recv().is_err());
        assert!(!pending.lock().unwrap().is_pending(VisKind::Metrics));
    }

    #[test]
    fn test_vis_kind_parse() {
        assert_eq!(VisKind::parse("chart"), Some(VisKind::Chart));
        assert_eq!(VisKind::parse("metrics"), Some(VisKind::Metrics));
        assert_eq!(VisKind::parse("hologram"), None);
    }
}
