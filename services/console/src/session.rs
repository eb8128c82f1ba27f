//! Session wiring: one logical conversation from connect to quit.
//!
//! The session owns the reassembly engine, the transcript, the media
//! pipelines, and the single event loop that drives them. Each inbound wire
//! event is processed to completion before the next queued event or command
//! runs, so nothing interleaves mid-mutation of a buffer.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bidichat_core::reassembly::{MessageUpdate, Reassembler, Speaker};
use bidichat_core::summary;
use bidichat_core::transcript::Transcript;

use crate::capture::CpalCapture;
use crate::config::Config;
use crate::connection::{Connection, WireEvent};
use crate::log::{Direction, SessionLog};
use crate::media::{self, CameraSource, FileStill, MicPipeline};
use crate::playback::Player;

const EVENT_QUEUE: usize = 256;

/// Console commands. Anything that is not a slash command is a message.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Say(&'a str),
    MicOn,
    MicOff,
    SpeakerOn,
    Image(&'a str),
    ShowLog,
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line));
    };
    let (name, arg) = match rest.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    Some(match (name, arg) {
        ("quit", _) => Command::Quit,
        ("mic", "on") => Command::MicOn,
        ("mic", "off") => Command::MicOff,
        ("speaker", "on") => Command::SpeakerOn,
        ("image", path) if !path.is_empty() => Command::Image(path),
        ("log", _) => Command::ShowLog,
        _ => Command::Unknown(rest),
    })
}

fn speaker_tag(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::User => "you",
        Speaker::Assistant => "assistant",
    }
}

/// One live session: connection, engine state, media pipelines.
pub struct Session {
    session_id: Uuid,
    connection: Connection,
    events_rx: mpsc::Receiver<WireEvent>,
    engine: Reassembler,
    transcript: Transcript,
    log: SessionLog,
    mic: Option<MicPipeline>,
    player: Option<Player>,
}

impl Session {
    /// Generates the session id and begins connecting. Returns immediately;
    /// the connection proceeds in the background.
    pub fn start(config: &Config) -> Self {
        let session_id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let url = config.ws_url(session_id);
        info!(%url, "starting session");
        let connection = Connection::open(url, events_tx);
        Self {
            session_id,
            connection,
            events_rx,
            engine: Reassembler::new(),
            transcript: Transcript::new(),
            log: SessionLog::new(),
            mic: None,
            player: None,
        }
    }

    /// Runs until `/quit`, end of stdin, or an interrupt.
    pub async fn run(mut self) -> Result<()> {
        println!(
            "session {} — type a message, or /mic on, /mic off, /speaker on, /image <path>, /log, /quit",
            self.session_id
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                maybe_event = self.events_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.on_wire_event(event),
                        None => break,
                    }
                }
                line = lines.next_line() => {
                    match line.context("stdin read failed")? {
                        Some(line) => {
                            if !self.on_line(line.trim()) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received");
                    break;
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Handles one console line. Returns false when the session should end.
    fn on_line(&mut self, line: &str) -> bool {
        match parse_command(line) {
            None => {}
            Some(Command::Quit) => return false,
            Some(Command::Say(text)) => {
                match media::send_text(&self.connection.sender(), &self.log, text) {
                    Ok(()) => {
                        self.transcript.push_local(Speaker::User, text);
                        println!("[you] {text}");
                    }
                    Err(err) => warn!(error = ?err, "failed to package text message"),
                }
            }
            Some(Command::MicOn) => self.enable_mic(),
            Some(Command::MicOff) => {
                if let Some(mic) = &mut self.mic {
                    mic.stop();
                    println!("(mic off)");
                }
            }
            Some(Command::SpeakerOn) => self.enable_playback(),
            Some(Command::Image(path)) => self.send_still(path),
            Some(Command::ShowLog) => {
                for entry in self.log.recent(20) {
                    println!("{:>4} {} {}", entry.seq, entry.direction, entry.summary);
                }
            }
            Some(Command::Unknown(rest)) => println!("(unknown command: /{rest})"),
        }
        true
    }

    fn on_wire_event(&mut self, event: WireEvent) {
        match event {
            WireEvent::Opened => {
                self.log.record(Direction::Inbound, "channel open");
                println!("(connected)");
            }
            WireEvent::Closed => {
                self.log.record(Direction::Inbound, "channel closed");
                println!("(connection lost; retrying)");
            }
            WireEvent::Text(raw) => {
                self.log.record(Direction::Inbound, summary::summarize_raw(&raw));
                let outcome = self.engine.ingest(&raw);
                for update in &outcome.updates {
                    self.transcript.apply(update);
                    self.render(update);
                }
                if !outcome.audio.is_empty() {
                    match &mut self.player {
                        Some(player) => {
                            for frame in &outcome.audio {
                                player.enqueue(frame);
                            }
                        }
                        None => debug!(
                            frames = outcome.audio.len(),
                            "playback not started; audio dropped"
                        ),
                    }
                }
            }
        }
    }

    /// Prints finalized messages. Partial progress stays in the session log;
    /// richer rendering belongs to a real front end.
    fn render(&self, update: &MessageUpdate) {
        if let MessageUpdate::Closed { handle, truncated } = update {
            if let Some(message) = self.transcript.get(*handle) {
                let mark = if *truncated { " (interrupted)" } else { "" };
                println!("[{}] {}{}", speaker_tag(message.speaker), message.text, mark);
            }
        }
    }

    fn enable_mic(&mut self) {
        if self.mic.is_none() {
            match CpalCapture::open() {
                Ok(source) => {
                    self.mic = Some(MicPipeline::new(
                        Box::new(source),
                        self.connection.sender(),
                    ));
                }
                Err(err) => {
                    warn!(error = ?err, "microphone unavailable");
                    println!("(microphone unavailable: {err:#})");
                    return;
                }
            }
        }
        if let Some(mic) = &mut self.mic {
            match mic.start() {
                Ok(()) => println!("(mic on)"),
                Err(err) => {
                    warn!(error = ?err, "failed to start audio capture");
                    println!("(failed to start capture: {err:#})");
                }
            }
        }
    }

    fn enable_playback(&mut self) {
        if self.player.is_some() {
            debug!("playback already started");
            return;
        }
        match Player::start() {
            Ok(player) => {
                self.player = Some(player);
                println!("(speaker on)");
            }
            Err(err) => {
                warn!(error = ?err, "speaker unavailable");
                println!("(speaker unavailable: {err:#})");
            }
        }
    }

    fn send_still(&mut self, path: &str) {
        let mut camera = FileStill::new(path);
        let still = match camera.capture_still() {
            Ok(still) => still,
            Err(err) => {
                warn!(error = ?err, "camera capture failed");
                println!("(camera capture failed: {err:#})");
                return;
            }
        };
        match media::send_image(&self.connection.sender(), &self.log, &still) {
            Ok(jpeg) => {
                // Local echo: the sent image shows up immediately, no ack.
                let caption = format!("<image image/jpeg {} bytes>", jpeg.len());
                self.transcript.push_local(Speaker::User, caption.clone());
                println!("[you] {caption}");
            }
            Err(err) => warn!(error = ?err, "failed to send image"),
        }
    }

    /// Tears everything down: capture devices, playback stream, channel.
    fn shutdown(mut self) {
        if let Some(mic) = &mut self.mic {
            mic.stop();
        }
        self.player = None;
        self.connection.close();
        info!(session_id = %self.session_id, "session ended");
    }
}
