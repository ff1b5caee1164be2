//! JSON-lines transport over standard streams.
//!
//! Each input line is one [`Inbound`] value; each mailbox reply is written
//! as one [`SentMessage`] line.

use std::io::{BufRead, Write};

use crate::agent::Inbox;
use crate::bus::message::Inbound;
use crate::bus::transport::{SentMessage, Transport, TransportError};

/// Transport writing replies as JSON lines to `W`.
#[derive(Debug)]
pub struct StdioTransport<W: Write + Send + 'static = std::io::Stdout> {
    out: W,
    address: Option<String>,
}

impl StdioTransport<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> StdioTransport<W> {
    pub fn new(out: W) -> Self {
        Self { out, address: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Transport for StdioTransport<W> {
    fn connect(&mut self, endpoint: &str, address: &str) -> Result<(), TransportError> {
        tracing::info!(endpoint, address, "Connected to stdio bus");
        self.address = Some(address.to_string());
        Ok(())
    }

    fn set_consumer(&mut self, stream: &str, pattern: &str) -> Result<(), TransportError> {
        if self.address.is_none() {
            return Err(TransportError::NotConnected);
        }
        // Every stream arrives on stdin; subscriptions are only recorded.
        tracing::info!(stream, pattern, "Stream consumer registered");
        Ok(())
    }

    fn send_to(
        &mut self,
        recipient: &str,
        subject: &str,
        frames: Vec<String>,
    ) -> Result<(), TransportError> {
        if self.address.is_none() {
            return Err(TransportError::NotConnected);
        }
        let message = SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            frames,
        };
        serde_json::to_writer(&mut self.out, &message)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Feed each JSON line of `reader` into `inbox` until EOF.
///
/// Undecodable lines are logged and skipped. Returns the number of messages
/// forwarded, or [`TransportError::Closed`] once the agent stops listening.
pub fn forward_lines<R: BufRead>(reader: R, inbox: &Inbox) -> Result<usize, TransportError> {
    let mut forwarded = 0;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let inbound: Inbound = match serde_json::from_str(line) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "Can't decode inbound message, ignore it");
                continue;
            }
        };
        inbox.send(inbound).map_err(|_| TransportError::Closed)?;
        forwarded += 1;
    }
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::ControlCommand;
    use std::sync::mpsc;

    #[test]
    fn test_replies_are_json_lines() {
        let mut transport = StdioTransport::new(Vec::new());
        transport.connect("stdio", "fty-metric-store").unwrap();
        transport
            .send_to("ui", "aggregated data", vec!["u1".into(), "ERROR".into(), "BAD_REQUEST".into()])
            .unwrap();

        let out = String::from_utf8(transport.into_inner()).unwrap();
        let sent: SentMessage = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(sent.recipient, "ui");
        assert_eq!(sent.frames, vec!["u1", "ERROR", "BAD_REQUEST"]);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_send_before_connect_fails() {
        let mut transport = StdioTransport::new(Vec::new());
        assert!(matches!(
            transport.send_to("ui", "s", vec![]),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_forward_lines_skips_garbage() {
        let (tx, rx) = mpsc::sync_channel(8);
        let inbox = Inbox::new(tx);
        let input = "\n{\"control\":{\"command\":\"FLUSH\"}}\nnot json\n{\"control\":{\"command\":\"TERMINATE\"}}\n";

        let forwarded = forward_lines(input.as_bytes(), &inbox).unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().unwrap(), Inbound::Control(ControlCommand::Flush));
        assert_eq!(rx.recv().unwrap(), Inbound::Control(ControlCommand::Terminate));
    }

    #[test]
    fn test_forward_lines_stops_when_agent_is_gone() {
        let (tx, rx) = mpsc::sync_channel(8);
        drop(rx);
        let inbox = Inbox::new(tx);
        let result = forward_lines("{\"control\":{\"command\":\"FLUSH\"}}\n".as_bytes(), &inbox);
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
