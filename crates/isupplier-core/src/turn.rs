//! Turn controller: the conversation state machine
//!
//! A turn moves `Idle -> AwaitingReply -> Idle`. The user's message is put on
//! the transcript before the webhook is called, so it shows even when the
//! backend is slow or down. Replies are applied in backend order; failures
//! become a single assistant notice and leave progress untouched.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::attachment::Attachment;
use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::{AssistantError, Result};
use crate::lang::Lang;
use crate::reply::{custom_step_index, extract_progress, ProgressUpdate};
use crate::session::{SessionId, SessionIdentity};
use crate::state::{DisplayMessage, ProgressState};
use crate::transport::{ConversationTransport, OutboundTurn, ReplyEntry, TurnMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply,
}

/// What happened to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Blank input; nothing was appended or sent
    Ignored,
    Completed,
    Failed,
}

/// A turn whose user message is on the transcript and whose webhook call is
/// still to be made (or still running)
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub payload: OutboundTurn,
}

// Localized notices

pub fn greeting(lang: Lang) -> &'static str {
    lang.pick(
        "Hello! I'm your Tanger Med supplier assistant. Choose an action from the left to begin.",
        "Bonjour ! Choisissez une action à gauche pour commencer.",
    )
}

pub fn backend_error_notice(lang: Lang) -> &'static str {
    lang.pick(
        "Backend error. Please ensure the assistant service is running.",
        "Erreur serveur. Assurez-vous que le service de l'assistant est démarré.",
    )
}

pub fn screenshot_notice(lang: Lang) -> &'static str {
    lang.pick(
        "A screenshot is available for this step.",
        "Une capture est disponible pour cette étape.",
    )
}

pub fn attachment_error_notice(lang: Lang) -> &'static str {
    lang.pick(
        "Could not read the selected file.",
        "Impossible de lire le fichier sélectionné.",
    )
}

fn upload_message(lang: Lang, filename: &str) -> String {
    format!("{}: {}", lang.pick("Uploaded file", "Fichier téléchargé"), filename)
}

fn attachment_utterance(lang: Lang) -> &'static str {
    lang.pick("file attached", "fichier joint")
}

pub struct TurnController {
    transport: Arc<dyn ConversationTransport>,
    identity: SessionIdentity,
    lang: Lang,
    timeout: Duration,
    messages: Vec<DisplayMessage>,
    progress: ProgressState,
    in_flight: usize,
}

impl TurnController {
    pub fn new(
        transport: Arc<dyn ConversationTransport>,
        identity: SessionIdentity,
        lang: Lang,
    ) -> Self {
        Self {
            transport,
            identity,
            lang,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            messages: Vec::new(),
            progress: ProgressState::default(),
            in_flight: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> Arc<dyn ConversationTransport> {
        Arc::clone(&self.transport)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn is_thinking(&self) -> bool {
        self.in_flight > 0
    }

    pub fn state(&self) -> TurnState {
        if self.is_thinking() {
            TurnState::AwaitingReply
        } else {
            TurnState::Idle
        }
    }

    pub fn language(&self) -> Lang {
        self.lang
    }

    pub fn set_language(&mut self, lang: Lang) {
        self.lang = lang;
    }

    pub fn session_id(&mut self) -> SessionId {
        self.identity.get_or_create()
    }

    pub fn reset_session(&mut self) -> SessionId {
        self.identity.reset()
    }

    pub fn session_degraded(&self) -> bool {
        self.identity.is_degraded()
    }

    /// Append an assistant notice that doesn't come from the backend
    pub fn notify(&mut self, text: impl Into<String>) {
        self.messages.push(DisplayMessage::assistant(text));
    }

    /// Start a text turn. Returns `None` for blank input.
    pub fn begin_text(&mut self, text: &str) -> Option<PendingTurn> {
        let clean = text.trim();
        if clean.is_empty() {
            return None;
        }
        self.messages.push(DisplayMessage::user(clean));
        Some(self.open_turn(clean.to_string(), None))
    }

    /// Start an attachment turn with the fixed placeholder utterance
    pub fn begin_attachment(&mut self, attachment: Attachment) -> PendingTurn {
        self.messages
            .push(DisplayMessage::user(upload_message(self.lang, &attachment.filename)));
        let utterance = attachment_utterance(self.lang).to_string();
        self.open_turn(utterance, Some(attachment))
    }

    pub fn report_attachment_error(&mut self, err: &AssistantError) {
        warn!(error = %err, "attachment rejected");
        self.notify(attachment_error_notice(self.lang));
    }

    fn open_turn(&mut self, message: String, attachment: Option<Attachment>) -> PendingTurn {
        self.in_flight += 1;
        let payload = OutboundTurn {
            sender: self.identity.get_or_create(),
            message,
            metadata: TurnMetadata {
                lang: self.lang,
                attachment,
            },
        };
        debug!(utterance = %payload.message, in_flight = self.in_flight, "turn started");
        PendingTurn { payload }
    }

    /// Apply the outcome of a pending turn's webhook call
    pub fn finish(&mut self, pending: PendingTurn, result: Result<Vec<ReplyEntry>>) -> TurnStatus {
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            Ok(entries) => {
                let count = entries.len();
                self.apply_replies(entries);
                info!(
                    utterance = %pending.payload.message,
                    entries = count,
                    step = self.progress.current_step,
                    total = self.progress.total_steps,
                    "turn completed"
                );
                TurnStatus::Completed
            }
            Err(e) => {
                warn!(utterance = %pending.payload.message, error = %e, "turn failed");
                self.notify(backend_error_notice(self.lang));
                TurnStatus::Failed
            }
        }
    }

    pub async fn submit(&mut self, text: &str) -> TurnStatus {
        match self.begin_text(text) {
            Some(pending) => self.run(pending).await,
            None => TurnStatus::Ignored,
        }
    }

    /// Entry point for quick actions, step controls and voice transcripts
    pub async fn submit_external(&mut self, text: &str) -> TurnStatus {
        self.submit(text).await
    }

    pub async fn submit_attachment(&mut self, path: &Path) -> TurnStatus {
        match Attachment::read(path).await {
            Ok(attachment) => {
                let pending = self.begin_attachment(attachment);
                self.run(pending).await
            }
            Err(e) => {
                self.report_attachment_error(&e);
                TurnStatus::Failed
            }
        }
    }

    async fn run(&mut self, pending: PendingTurn) -> TurnStatus {
        let transport = self.transport();
        let result = transport.send(&pending.payload, self.timeout).await;
        self.finish(pending, result)
    }

    fn apply_replies(&mut self, entries: Vec<ReplyEntry>) {
        let mut custom_step = None;

        for entry in entries {
            if let Some(text) = entry.text.filter(|t| !t.is_empty()) {
                self.apply_progress(extract_progress(&text));
                let step = self.active_step();
                self.messages.push(DisplayMessage::assistant(text).with_step(step));
            }

            if let Some(image) = entry.image.filter(|i| !i.is_empty()) {
                let step = self.active_step();
                self.messages.push(
                    DisplayMessage::assistant(screenshot_notice(self.lang))
                        .with_image(image)
                        .with_step(step),
                );
            }

            if let Some(idx) = entry.custom.as_ref().and_then(custom_step_index) {
                custom_step = Some(idx);
            }
        }

        // A custom step index beats any step parsed from text in the same batch
        if let Some(idx) = custom_step {
            self.progress.set_step(idx);
        }
    }

    fn apply_progress(&mut self, update: ProgressUpdate) {
        if let Some(title) = update.title {
            self.progress.flow_title = Some(title);
        }
        if let Some(total) = update.total {
            self.progress.set_total(total);
        }
        if let Some(step) = update.step {
            self.progress.set_step(step);
        }
    }

    fn active_step(&self) -> Option<u32> {
        self.progress.has_flow().then_some(self.progress.current_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;
    use crate::state::Origin;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Transport that replays scripted outcomes and records every turn
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<Vec<ReplyEntry>>>>,
        sent: Mutex<Vec<OutboundTurn>>,
    }

    impl ScriptedTransport {
        fn replying(outcomes: Vec<Result<Vec<ReplyEntry>>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<OutboundTurn> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversationTransport for ScriptedTransport {
        async fn send(&self, turn: &OutboundTurn, _timeout: Duration) -> Result<Vec<ReplyEntry>> {
            self.sent.lock().unwrap().push(turn.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn controller(transport: Arc<ScriptedTransport>, lang: Lang) -> TurnController {
        let identity = SessionIdentity::new(Box::new(MemoryStore::default()));
        TurnController::new(transport, identity, lang)
    }

    fn texts(controller: &TurnController) -> Vec<(Origin, String)> {
        controller
            .messages()
            .iter()
            .map(|m| (m.origin, m.text.clone().unwrap_or_default()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_invoice_scenario() {
        let transport = ScriptedTransport::replying(vec![Ok(vec![ReplyEntry::text(
            "Create Invoice — Step 1/6",
        )])]);
        let mut ctl = controller(transport.clone(), Lang::En);

        let status = ctl.submit("create invoice").await;

        assert_eq!(status, TurnStatus::Completed);
        assert_eq!(
            texts(&ctl),
            vec![
                (Origin::User, "create invoice".to_string()),
                (Origin::Assistant, "Create Invoice — Step 1/6".to_string()),
            ]
        );
        let progress = ctl.progress();
        assert_eq!(progress.current_step, 0);
        assert_eq!(progress.total_steps, 6);
        assert_eq!(progress.flow_title.as_deref(), Some("Create Invoice"));
        assert_eq!(ctl.messages()[1].step_index, Some(0));
        assert_eq!(ctl.state(), TurnState::Idle);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "create invoice");
        assert_eq!(sent[0].metadata.lang, Lang::En);
    }

    #[tokio::test]
    async fn test_timeout_appends_single_notice() {
        let transport = ScriptedTransport::replying(vec![
            Ok(vec![ReplyEntry::text("Invoices — Step 2/4")]),
            Err(AssistantError::Timeout(Duration::from_secs(20))),
        ]);
        let mut ctl = controller(transport, Lang::En);
        ctl.submit("invoice details").await;
        let before = ctl.progress().clone();
        let len_before = ctl.messages().len();

        let status = ctl.submit("next").await;

        assert_eq!(status, TurnStatus::Failed);
        assert_eq!(ctl.messages().len(), len_before + 2);
        let last = ctl.messages().last().unwrap();
        assert_eq!(last.origin, Origin::Assistant);
        assert_eq!(last.text.as_deref(), Some(backend_error_notice(Lang::En)));
        assert_eq!(ctl.progress(), &before);
        assert_eq!(ctl.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_backend_error_notice_is_localized() {
        let transport =
            ScriptedTransport::replying(vec![Err(AssistantError::Backend { status: 502 })]);
        let mut ctl = controller(transport, Lang::Fr);

        ctl.submit("aide").await;

        assert_eq!(
            ctl.messages().last().unwrap().text.as_deref(),
            Some("Erreur serveur. Assurez-vous que le service de l'assistant est démarré.")
        );
    }

    #[tokio::test]
    async fn test_custom_step_only_appends_nothing() {
        let transport = ScriptedTransport::replying(vec![Ok(vec![ReplyEntry {
            custom: Some(json!({"step_index": 3})),
            ..Default::default()
        }])]);
        let mut ctl = controller(transport, Lang::En);

        ctl.submit("next").await;

        assert_eq!(ctl.progress().current_step, 3);
        assert_eq!(ctl.messages().len(), 1);
        assert_eq!(ctl.messages()[0].origin, Origin::User);
    }

    #[tokio::test]
    async fn test_custom_step_overrides_later_text() {
        let transport = ScriptedTransport::replying(vec![Ok(vec![
            ReplyEntry {
                custom: Some(json!({"step_index": 4})),
                ..Default::default()
            },
            ReplyEntry::text("Work Confirmation — Step 2/8"),
        ])]);
        let mut ctl = controller(transport, Lang::En);

        ctl.submit("work confirmation").await;

        assert_eq!(ctl.progress().current_step, 4);
        assert_eq!(ctl.progress().total_steps, 8);
    }

    #[tokio::test]
    async fn test_last_custom_step_wins() {
        let transport = ScriptedTransport::replying(vec![Ok(vec![
            ReplyEntry {
                custom: Some(json!({"step_index": 1})),
                ..Default::default()
            },
            ReplyEntry {
                custom: Some(json!({"step_index": 2})),
                ..Default::default()
            },
        ])]);
        let mut ctl = controller(transport, Lang::En);

        ctl.submit("next").await;

        assert_eq!(ctl.progress().current_step, 2);
    }

    #[tokio::test]
    async fn test_image_gets_its_own_message() {
        let transport = ScriptedTransport::replying(vec![Ok(vec![ReplyEntry {
            text: Some("Supplier Registration — Step 2/5\nClick Register.".to_string()),
            image: Some("https://assets/step2.png".to_string()),
            custom: None,
        }])]);
        let mut ctl = controller(transport, Lang::En);

        ctl.submit("supplier registration").await;

        let messages = ctl.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].image_ref, None);
        assert_eq!(messages[2].text.as_deref(), Some(screenshot_notice(Lang::En)));
        assert_eq!(messages[2].image_ref.as_deref(), Some("https://assets/step2.png"));
        assert_eq!(messages[2].step_index, Some(1));
    }

    #[tokio::test]
    async fn test_reply_without_pattern_keeps_progress() {
        let transport = ScriptedTransport::replying(vec![
            Ok(vec![ReplyEntry::text("Create Invoice — Step 3/6")]),
            Ok(vec![ReplyEntry::text("Please enter the PO number."), ReplyEntry::default()]),
        ]);
        let mut ctl = controller(transport, Lang::En);
        ctl.submit("create invoice").await;
        let before = ctl.progress().clone();

        ctl.submit("ok").await;

        assert_eq!(ctl.progress(), &before);
        assert_eq!(ctl.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_total_updates_without_title() {
        let transport = ScriptedTransport::replying(vec![
            Ok(vec![ReplyEntry::text("View Payments — Step 1/3")]),
            Ok(vec![ReplyEntry::text("You are now at Step 2/4")]),
        ]);
        let mut ctl = controller(transport, Lang::En);
        ctl.submit("payment status").await;
        ctl.submit("next").await;

        let progress = ctl.progress();
        assert_eq!(progress.flow_title.as_deref(), Some("View Payments"));
        assert_eq!(progress.current_step, 1);
        assert_eq!(progress.total_steps, 4);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let transport = ScriptedTransport::replying(vec![]);
        let mut ctl = controller(transport.clone(), Lang::En);

        assert_eq!(ctl.submit("   ").await, TurnStatus::Ignored);
        assert!(ctl.messages().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_user_message_precedes_reply() {
        let transport = ScriptedTransport::replying(vec![]);
        let mut ctl = controller(transport, Lang::En);

        let first = ctl.begin_text("  reset password ").unwrap();
        let second = ctl.begin_text("help").unwrap();

        assert_eq!(ctl.state(), TurnState::AwaitingReply);
        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(ctl.messages()[0].text.as_deref(), Some("reset password"));
        assert_eq!(first.payload.message, "reset password");

        ctl.finish(first, Ok(vec![ReplyEntry::text("Sure.")]));
        assert!(ctl.is_thinking());
        ctl.finish(second, Err(AssistantError::Transport("refused".to_string())));
        assert_eq!(ctl.state(), TurnState::Idle);
        assert_eq!(ctl.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_attachment_turn() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let transport = ScriptedTransport::replying(vec![Ok(vec![ReplyEntry::text("Received.")])]);
        let mut ctl = controller(transport.clone(), Lang::Fr);

        let status = ctl.submit_attachment(&path).await;

        assert_eq!(status, TurnStatus::Completed);
        assert_eq!(
            ctl.messages()[0].text.as_deref(),
            Some("Fichier téléchargé: invoice.pdf")
        );
        let sent = transport.sent();
        assert_eq!(sent[0].message, "fichier joint");
        let attachment = sent[0].metadata.attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "invoice.pdf");
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.size_bytes, 4);
    }

    #[tokio::test]
    async fn test_unreadable_attachment_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::replying(vec![]);
        let mut ctl = controller(transport.clone(), Lang::En);

        let status = ctl.submit_attachment(&dir.path().join("missing.pdf")).await;

        assert_eq!(status, TurnStatus::Failed);
        assert_eq!(ctl.messages().len(), 1);
        assert_eq!(
            ctl.messages()[0].text.as_deref(),
            Some(attachment_error_notice(Lang::En))
        );
        assert!(transport.sent().is_empty());
        assert!(!ctl.is_thinking());
    }

    #[tokio::test]
    async fn test_session_reset_changes_sender() {
        let transport = ScriptedTransport::replying(vec![]);
        let mut ctl = controller(transport.clone(), Lang::En);

        ctl.submit_external("create invoice").await;
        let old = ctl.session_id();
        let new = ctl.reset_session();
        ctl.submit_external("stop").await;

        let sent = transport.sent();
        assert_eq!(sent[0].sender, old);
        assert_eq!(sent[1].sender, new);
        assert_ne!(old, new);
        assert_eq!(ctl.messages().len(), 2);
    }
}
