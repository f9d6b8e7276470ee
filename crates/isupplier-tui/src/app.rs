use std::path::Path;
use std::sync::Arc;

use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use isupplier_core::flows::{self, Flow};
use isupplier_core::turn::greeting;
use isupplier_core::voice::unsupported_notice;
use isupplier_core::{
    AssistantError, Attachment, Config, Lang, PendingTurn, ReplyEntry, SessionId,
    SessionIdentity, SpeechEvent, TurnController, VoiceCapture, VoiceUpdate, WebhookClient,
};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    /// Typing a file path to attach
    AttachPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Actions,
    Chat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    Help,
    Settings,
    Screenshot(String),
}

/// Entry in the quick-action sidebar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    Start(Flow),
    Exit,
}

pub fn quick_actions() -> Vec<QuickAction> {
    let mut actions: Vec<QuickAction> = Flow::all().into_iter().map(QuickAction::Start).collect();
    actions.push(QuickAction::Exit);
    actions
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub popup: Option<Popup>,

    pub controller: TurnController,
    pub voice: VoiceCapture,
    pub session_id: SessionId,
    pub endpoint: String,

    // Chat input
    pub input: String,
    pub input_cursor: usize,
    pub attach_input: String,

    // Sidebar
    pub actions_state: ListState,

    // Transcript viewport
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    /// One-line feedback shown in the footer ("Session id copied", ...)
    pub flash: Option<String>,
    pub animation_frame: u8,

    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: &Config, events: UnboundedSender<AppEvent>) -> anyhow::Result<Self> {
        let transport = WebhookClient::from_config(config)?;
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "assistant webhook configured");

        let identity = SessionIdentity::open_default();
        let controller = TurnController::new(Arc::new(transport), identity, config.default_language)
            .with_timeout(config.timeout());

        let mut app = Self::with_parts(controller, VoiceCapture::from_config(config), events);
        app.endpoint = endpoint;
        Ok(app)
    }

    /// Assemble an app around an existing controller and voice capture
    pub fn with_parts(
        mut controller: TurnController,
        voice: VoiceCapture,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        controller.notify(greeting(controller.language()));
        let session_id = controller.session_id();

        let mut actions_state = ListState::default();
        actions_state.select(Some(0));

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Actions,
            popup: None,

            controller,
            voice,
            session_id,
            endpoint: String::new(),

            input: String::new(),
            input_cursor: 0,
            attach_input: String::new(),

            actions_state,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            flash: None,
            animation_frame: 0,

            events,
        }
    }

    pub fn lang(&self) -> Lang {
        self.controller.language()
    }

    /// Send whatever is in the input box. Ignored while a reply is pending.
    pub fn submit_input(&mut self) {
        if self.controller.is_thinking() {
            return;
        }
        let text = std::mem::take(&mut self.input);
        self.input_cursor = 0;
        if let Some(pending) = self.controller.begin_text(&text) {
            self.dispatch(pending);
        }
    }

    /// Same path as typed input, for quick actions, step controls and voice
    pub fn submit_external(&mut self, text: &str) {
        if let Some(pending) = self.controller.begin_text(text) {
            self.dispatch(pending);
        }
    }

    pub fn run_quick_action(&mut self, action: QuickAction) {
        match action {
            QuickAction::Start(flow) => {
                let trigger = flow.trigger(self.lang());
                self.submit_external(trigger);
            }
            QuickAction::Exit => self.submit_external(flows::EXIT_UTTERANCE),
        }
    }

    pub fn selected_action(&self) -> Option<QuickAction> {
        self.actions_state
            .selected()
            .and_then(|i| quick_actions().get(i).copied())
    }

    pub fn next_step(&mut self) {
        if self.controller.progress().has_flow() {
            let utterance = flows::next_step_utterance(self.lang());
            self.submit_external(utterance);
        }
    }

    pub fn previous_step(&mut self) {
        if self.controller.progress().has_flow() {
            let utterance = flows::previous_step_utterance(self.lang());
            self.submit_external(utterance);
        }
    }

    pub async fn attach_file(&mut self, path: &Path) {
        match Attachment::read(path).await {
            Ok(attachment) => {
                let pending = self.controller.begin_attachment(attachment);
                self.dispatch(pending);
            }
            Err(e) => self.controller.report_attachment_error(&e),
        }
        self.scroll_chat_to_bottom();
    }

    /// Run the webhook call off the UI task; the result comes back as an event
    fn dispatch(&mut self, pending: PendingTurn) {
        let transport = self.controller.transport();
        let timeout = self.controller.timeout();
        let tx = self.events.clone();

        tokio::spawn(async move {
            let result = transport.send(&pending.payload, timeout).await;
            let _ = tx.send(AppEvent::TurnFinished(pending, result));
        });

        self.scroll_chat_to_bottom();
    }

    pub fn finish_turn(&mut self, pending: PendingTurn, result: Result<Vec<ReplyEntry>, AssistantError>) {
        self.controller.finish(pending, result);
        self.scroll_chat_to_bottom();
    }

    pub fn toggle_voice(&mut self) {
        if self.voice.is_active() {
            self.voice.stop();
            return;
        }
        self.start_voice();
    }

    fn start_voice(&mut self) {
        match self.voice.start(self.lang()) {
            Ok(mut rx) => {
                let tx = self.events.clone();
                let generation = self.voice.generation();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if tx.send(AppEvent::Speech(generation, event)).is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "voice capture unavailable");
                self.controller.notify(unsupported_notice(self.lang()));
                self.scroll_chat_to_bottom();
            }
        }
    }

    /// Events from an earlier capture (before a restart) are dropped
    pub fn handle_speech(&mut self, generation: u64, event: SpeechEvent) {
        if generation != self.voice.generation() {
            return;
        }
        match self.voice.handle(event) {
            Some(VoiceUpdate::Transcript(text)) => self.submit_external(&text),
            Some(VoiceUpdate::Unavailable(reason)) => {
                warn!(%reason, "voice capture unavailable");
                self.controller.notify(unsupported_notice(self.lang()));
                self.scroll_chat_to_bottom();
            }
            None => {}
        }
    }

    pub fn toggle_language(&mut self) {
        let lang = self.lang().toggle();
        self.controller.set_language(lang);
        if let Err(e) = Config::save_language(lang) {
            warn!(error = %e, "could not save language preference");
        }

        // Recognizer language is fixed at start
        if self.voice.is_active() {
            self.voice.stop();
            self.start_voice();
        }
    }

    pub fn reset_session(&mut self) {
        self.session_id = self.controller.reset_session();
        self.flash = Some(self.lang().pick("New session started", "Nouvelle session démarrée").to_string());
    }

    pub fn copy_session(&mut self) {
        crate::handler::copy_to_clipboard(self.session_id.as_str());
        self.flash = Some(self.lang().pick("Session id copied", "Identifiant copié").to_string());
    }

    /// Most recent screenshot reference in the transcript
    pub fn latest_screenshot(&self) -> Option<String> {
        self.controller
            .messages()
            .iter()
            .rev()
            .find_map(|m| m.image_ref.clone())
    }

    pub fn actions_nav_down(&mut self) {
        let len = quick_actions().len();
        let i = self.actions_state.selected().map_or(0, |i| (i + 1) % len);
        self.actions_state.select(Some(i));
    }

    pub fn actions_nav_up(&mut self) {
        let len = quick_actions().len();
        let i = self
            .actions_state
            .selected()
            .map_or(0, |i| if i == 0 { len - 1 } else { i - 1 });
        self.actions_state.select(Some(i));
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.controller.is_thinking() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Keep the newest message (and the thinking line) in view
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for msg in self.controller.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.text.as_deref().unwrap_or_default().lines() {
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
            if msg.is_assistant() {
                total_lines = total_lines.saturating_add(1); // Chips / screenshot line
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }
        if self.controller.is_thinking() {
            total_lines = total_lines.saturating_add(2);
        }

        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }
}
