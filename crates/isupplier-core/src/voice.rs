//! Voice capture
//!
//! Speech recognition runs outside the process: a configured command prints
//! transcripts on stdout, one per line. `partial: ...` lines are interim
//! results; any other non-empty line (optionally `final: ...`) is final.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AssistantError, Result};
use crate::lang::Lang;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Interim(String),
    Final(String),
    Error(String),
    End,
}

pub trait SpeechRecognizer: Send {
    /// Begin continuous recognition; events arrive on the returned channel
    fn start(&mut self, lang: Lang) -> Result<mpsc::UnboundedReceiver<SpeechEvent>>;
    fn stop(&mut self);
}

pub fn unsupported_notice(lang: Lang) -> &'static str {
    lang.pick(
        "Voice recognition isn't available. Set ISUPPLIER_VOICE_CMD to a speech-to-text command.",
        "La reconnaissance vocale n'est pas disponible. Définissez ISUPPLIER_VOICE_CMD avec une commande de dictée.",
    )
}

/// Map one stdout line of a recognizer command to an event
pub fn parse_transcript_line(line: &str) -> Option<SpeechEvent> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("partial:") {
        let text = rest.trim();
        return (!text.is_empty()).then(|| SpeechEvent::Interim(text.to_string()));
    }
    let text = line.strip_prefix("final:").unwrap_or(line).trim();
    (!text.is_empty()).then(|| SpeechEvent::Final(text.to_string()))
}

/// Recognizer backed by a shell command
pub struct CommandRecognizer {
    command: String,
    task: Option<JoinHandle<()>>,
}

impl CommandRecognizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            task: None,
        }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn start(&mut self, lang: Lang) -> Result<mpsc::UnboundedReceiver<SpeechEvent>> {
        self.stop();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("ISUPPLIER_SPEECH_LANG", lang.speech_tag())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AssistantError::CapabilityUnavailable(format!("{}: {}", self.command, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AssistantError::CapabilityUnavailable("recognizer has no stdout".to_string())
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        info!(command = %self.command, lang = lang.speech_tag(), "voice capture started");

        self.task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_transcript_line(&line) {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        let event = match child.wait().await {
                            Ok(status) if !status.success() => {
                                SpeechEvent::Error(format!("recognizer {}", status))
                            }
                            Err(e) => SpeechEvent::Error(e.to_string()),
                            Ok(_) => SpeechEvent::End,
                        };
                        let _ = tx.send(event);
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(SpeechEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
        }));

        Ok(rx)
    }

    fn stop(&mut self) {
        // Aborting drops the child, which kills the process
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CommandRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What the front end should do after a recognizer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceUpdate {
    /// Final transcript to submit
    Transcript(String),
    /// Capture failed before producing anything
    Unavailable(String),
}

/// Capture state: whether the mic is live and the interim transcript
pub struct VoiceCapture {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    active: bool,
    /// Bumped on every start so events from an earlier capture can be told apart
    generation: u64,
    heard: bool,
    preview: String,
}

impl VoiceCapture {
    pub fn new(recognizer: Option<Box<dyn SpeechRecognizer>>) -> Self {
        Self {
            recognizer,
            active: false,
            generation: 0,
            heard: false,
            preview: String::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let recognizer = config
            .voice_command
            .as_ref()
            .map(|cmd| Box::new(CommandRecognizer::new(cmd.clone())) as Box<dyn SpeechRecognizer>);
        Self::new(recognizer)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Interim transcript shown in place of the input line
    pub fn preview(&self) -> &str {
        &self.preview
    }

    /// Fails with `CapabilityUnavailable` when no recognizer can run;
    /// capture stays inactive in that case
    pub fn start(&mut self, lang: Lang) -> Result<mpsc::UnboundedReceiver<SpeechEvent>> {
        let recognizer = self.recognizer.as_mut().ok_or_else(|| {
            AssistantError::CapabilityUnavailable("no speech recognizer configured".to_string())
        })?;

        match recognizer.start(lang) {
            Ok(rx) => {
                self.active = true;
                self.generation += 1;
                self.heard = false;
                self.preview.clear();
                Ok(rx)
            }
            Err(e) => {
                self.active = false;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.active = false;
        self.preview.clear();
    }

    /// Feed a recognizer event
    pub fn handle(&mut self, event: SpeechEvent) -> Option<VoiceUpdate> {
        if !self.active {
            return None;
        }

        match event {
            SpeechEvent::Interim(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.heard = true;
                    self.preview = text.to_string();
                }
                None
            }
            SpeechEvent::Final(text) => {
                self.preview.clear();
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                self.heard = true;
                Some(VoiceUpdate::Transcript(text.to_string()))
            }
            SpeechEvent::Error(reason) => {
                warn!(%reason, "voice capture error");
                self.active = false;
                self.preview.clear();
                (!self.heard).then_some(VoiceUpdate::Unavailable(reason))
            }
            SpeechEvent::End => {
                debug!("voice capture ended");
                self.active = false;
                self.preview.clear();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Recognizer that emits a fixed list of events
    struct ScriptedRecognizer {
        events: Vec<SpeechEvent>,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn start(&mut self, _lang: Lang) -> Result<mpsc::UnboundedReceiver<SpeechEvent>> {
            let (tx, rx) = mpsc::unbounded_channel();
            for event in self.events.drain(..) {
                tx.send(event).unwrap();
            }
            Ok(rx)
        }

        fn stop(&mut self) {}
    }

    fn capture(events: Vec<SpeechEvent>) -> VoiceCapture {
        VoiceCapture::new(Some(Box::new(ScriptedRecognizer { events })))
    }

    #[test]
    fn test_parse_transcript_line() {
        assert_eq!(
            parse_transcript_line("partial: create inv"),
            Some(SpeechEvent::Interim("create inv".to_string()))
        );
        assert_eq!(
            parse_transcript_line("final: create invoice"),
            Some(SpeechEvent::Final("create invoice".to_string()))
        );
        assert_eq!(
            parse_transcript_line("next"),
            Some(SpeechEvent::Final("next".to_string()))
        );
        assert_eq!(parse_transcript_line("   "), None);
        assert_eq!(parse_transcript_line("partial:"), None);
    }

    #[test]
    fn test_unavailable_without_recognizer() {
        let mut voice = VoiceCapture::new(None);
        let err = voice.start(Lang::En).unwrap_err();
        assert!(matches!(err, AssistantError::CapabilityUnavailable(_)));
        assert!(!voice.is_active());
    }

    #[test]
    fn test_interim_then_final() {
        let mut voice = capture(vec![]);
        voice.start(Lang::Fr).unwrap();

        assert_eq!(voice.handle(SpeechEvent::Interim("créer".to_string())), None);
        assert_eq!(voice.preview(), "créer");
        assert_eq!(
            voice.handle(SpeechEvent::Final(" créer facture ".to_string())),
            Some(VoiceUpdate::Transcript("créer facture".to_string()))
        );
        assert_eq!(voice.preview(), "");
        assert!(voice.is_active());
    }

    #[test]
    fn test_error_and_end_deactivate() {
        let mut voice = capture(vec![]);
        voice.start(Lang::En).unwrap();
        voice.handle(SpeechEvent::Interim("hel".to_string()));
        assert_eq!(voice.handle(SpeechEvent::Error("mic busy".to_string())), None);
        assert!(!voice.is_active());
        assert_eq!(voice.preview(), "");

        // no auto-restart: later events are dropped
        assert_eq!(voice.handle(SpeechEvent::Final("hello".to_string())), None);

        voice.start(Lang::En).unwrap();
        voice.handle(SpeechEvent::End);
        assert!(!voice.is_active());
    }

    #[tokio::test]
    async fn test_scripted_events_flow_through_channel() {
        let mut voice = capture(vec![
            SpeechEvent::Interim("pay".to_string()),
            SpeechEvent::Final("payment status".to_string()),
            SpeechEvent::End,
        ]);
        let mut rx = voice.start(Lang::En).unwrap();

        let mut finals = Vec::new();
        while let Some(event) = rx.recv().await {
            if let Some(VoiceUpdate::Transcript(text)) = voice.handle(event) {
                finals.push(text);
            }
        }
        assert_eq!(finals, vec!["payment status".to_string()]);
        assert!(!voice.is_active());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_recognizer() {
        let mut recognizer =
            CommandRecognizer::new("printf 'partial: nex\\nfinal: next\\n%s\\n' \"$ISUPPLIER_SPEECH_LANG\"");
        let mut rx = recognizer.start(Lang::Fr).unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SpeechEvent::Interim("nex".to_string()),
                SpeechEvent::Final("next".to_string()),
                SpeechEvent::Final("fr-FR".to_string()),
                SpeechEvent::End,
            ]
        );
    }

    #[test]
    fn test_error_before_transcript_is_unavailable() {
        let mut voice = capture(vec![]);
        voice.start(Lang::En).unwrap();
        assert_eq!(
            voice.handle(SpeechEvent::Error("exit status: 127".to_string())),
            Some(VoiceUpdate::Unavailable("exit status: 127".to_string()))
        );
        assert!(!voice.is_active());
    }

    #[test]
    fn test_generation_advances_per_start() {
        let mut voice = capture(vec![]);
        assert_eq!(voice.generation(), 0);
        voice.start(Lang::En).unwrap();
        voice.stop();
        voice.start(Lang::Fr).unwrap();
        assert_eq!(voice.generation(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_command_reports_error() {
        let mut recognizer = CommandRecognizer::new("definitely-not-a-recognizer-xyz");
        let mut rx = recognizer.start(Lang::En).unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SpeechEvent::Error(reason) if reason.contains("127")));
    }
}
