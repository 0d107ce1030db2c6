//! The agent's turn-generation loop.
//!
//! An agent connects to the relay, registers its role, and then only ever
//! speaks in reaction to inbound events: `session_start` (the company's
//! directive to open) or a relayed counterparty turn. Generation failures
//! are reported to the relay as `error` envelopes; the agent stays alive and
//! waits for its next opportunity to speak.

use anyhow::{Context, Result, anyhow};
use dealtalk_core::negotiation::{REPLY_CONTEXT_TURNS, Role};
use dealtalk_core::oracle::OracleClient;
use dealtalk_core::prompts;
use dealtalk_core::protocol::Envelope;
use dealtalk_core::sanitize;
use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{error, info, warn};

/// Pause before the opening statement, so both sides see the session start.
const OPENING_DELAY: Duration = Duration::from_secs(1);
/// "Thinking" pause before each reply. Paces the exchange; not load-bearing.
const THINKING_DELAY: Duration = Duration::from_millis(1500);

/// Whether the event loop should keep running after an envelope.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// One transcript entry in the agent's local view of the conversation.
struct Entry {
    sender: String,
    text: String,
}

pub struct Agent {
    role: Role,
    name: String,
    system_prompt: String,
    oracle: Arc<dyn OracleClient>,
    transcript: Vec<Entry>,
    /// The agent's own 1-based turn counter; goes out as `turn` on the wire.
    turn_count: u32,
    /// Cleared on `conclusion`; an inactive agent sends no further turns.
    active: bool,
    opening_delay: Duration,
    thinking_delay: Duration,
}

impl Agent {
    pub fn new(role: Role, name: String, system_prompt: String, oracle: Arc<dyn OracleClient>) -> Self {
        Self {
            role,
            name,
            system_prompt,
            oracle,
            transcript: Vec::new(),
            turn_count: 0,
            active: true,
            opening_delay: OPENING_DELAY,
            thinking_delay: THINKING_DELAY,
        }
    }

    #[cfg(test)]
    fn without_delays(mut self) -> Self {
        self.opening_delay = Duration::ZERO;
        self.thinking_delay = Duration::ZERO;
        self
    }

    /// Connects to the relay, registers, and runs the event loop until the
    /// session ends, the connection drops, or Ctrl+C.
    pub async fn run(mut self, relay_url: &str) -> Result<()> {
        let (stream, _) = connect_async(relay_url)
            .await
            .with_context(|| format!("WebSocket handshake with relay at {relay_url} failed"))?;
        let (mut sink, mut source) = stream.split();

        send_envelope(
            &mut sink,
            &Envelope::Register {
                role: self.role,
                name: self.name.clone(),
            },
        )
        .await?;
        info!(role = %self.role, agent = %self.name, "registered with relay");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted; disconnecting");
                    break;
                }
                frame = source.next() => match frame {
                    None => {
                        info!("relay closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        return Err(e).context("relay connection failed");
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if self.handle(envelope, &mut sink).await? == Flow::Stop {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "undecodable frame from relay; ignoring"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("relay sent close frame");
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
        Ok(())
    }

    async fn handle<S>(&mut self, envelope: Envelope, sink: &mut S) -> Result<Flow>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::fmt::Display,
    {
        match envelope {
            Envelope::SessionStart {
                company, investor, ..
            } => {
                info!(%company, %investor, "session started");
                if self.role == Role::Company {
                    tokio::time::sleep(self.opening_delay).await;
                    self.speak(sink, true).await?;
                }
            }
            Envelope::Message { text, sender, .. } => {
                if sender == self.name {
                    // Echo guard: never respond to our own relayed turn.
                    return Ok(Flow::Continue);
                }
                if !self.active {
                    return Ok(Flow::Continue);
                }
                info!(from = %sender, "received turn");
                self.transcript.push(Entry { sender, text });
                tokio::time::sleep(self.thinking_delay).await;
                self.speak(sink, false).await?;
            }
            Envelope::Conclusion {
                text,
                status,
                total_turns,
                ..
            } => {
                info!(%status, total_turns, "negotiation concluded:\n{text}");
                self.active = false;
            }
            Envelope::End { reason } => {
                info!(%reason, "session ended");
                self.active = false;
                return Ok(Flow::Stop);
            }
            other => {
                warn!(envelope = ?other, "unexpected envelope from relay; ignoring");
            }
        }
        Ok(Flow::Continue)
    }

    /// Generates the next utterance and sends it as a message-turn. Oracle
    /// failure or output that sanitizes to nothing becomes an `error`
    /// envelope instead; the turn counter only advances on a sent turn.
    async fn speak<S>(&mut self, sink: &mut S, opening: bool) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::fmt::Display,
    {
        let instruction = if opening {
            prompts::opening_instruction()
        } else {
            prompts::reply_instruction(&self.reply_context(), self.turn_count + 1)
        };

        let text = match self.oracle.generate(&self.system_prompt, &instruction).await {
            Ok(raw) => sanitize::clean_for_speech(&raw),
            Err(e) => {
                error!(error = %e, "turn generation failed");
                self.report_error(sink, &e.to_string()).await?;
                return Ok(());
            }
        };
        if text.is_empty() {
            error!("generation produced no speakable text");
            self.report_error(sink, "generation produced no speakable text")
                .await?;
            return Ok(());
        }

        self.turn_count += 1;
        self.transcript.push(Entry {
            sender: self.name.clone(),
            text: text.clone(),
        });
        info!(turn = self.turn_count, "sending turn");
        send_envelope(
            sink,
            &Envelope::Message {
                text,
                sender: self.name.clone(),
                role: self.role,
                turn: self.turn_count,
            },
        )
        .await
    }

    async fn report_error<S>(&self, sink: &mut S, detail: &str) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin,
        S::Error: std::fmt::Display,
    {
        send_envelope(
            sink,
            &Envelope::Error {
                error: detail.to_string(),
                sender: self.name.clone(),
            },
        )
        .await
    }

    /// The recent transcript window fed into the reply prompt.
    fn reply_context(&self) -> String {
        let start = self.transcript.len().saturating_sub(REPLY_CONTEXT_TURNS);
        self.transcript[start..]
            .iter()
            .map(|e| format!("[{}]: {}", e.sender, e.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

async fn send_envelope<S>(sink: &mut S, envelope: &Envelope) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let serialized = serde_json::to_string(envelope)?;
    sink.send(WsMessage::Text(serialized.into()))
        .await
        .map_err(|e| anyhow!("failed to send frame to relay: {e}"))
}
