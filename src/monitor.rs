//! Relay of `recipient;text` lines written by monitoring scripts to a named
//! pipe.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bot::Bot;
use crate::message::Jid;

pub fn parse_line(line: &str) -> Option<(Jid, String)> {
    let (recipient, text) = line.trim().split_once(';')?;
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return None;
    }
    Some((Jid::parse(recipient), text.to_string()))
}

pub struct Monitor {
    bot: Arc<Bot>,
    pipe_file: PathBuf,
}

impl Monitor {
    pub fn new(bot: Arc<Bot>, pipe_file: impl Into<PathBuf>) -> Self {
        Self {
            bot,
            pipe_file: pipe_file.into(),
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let file = tokio::fs::File::open(&self.pipe_file).await?;
        log::info!(
            "Processing input from monitoring pipe file {}",
            self.pipe_file.display()
        );

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            // Zero bytes means no writer is attached right now
            if reader.read_line(&mut line).await? == 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match parse_line(trimmed) {
                Some((to, text)) => {
                    log::info!("Sending monitoring message to \"{}\"", to);
                    log::debug!("\twith body: \"{}\"", text);
                    self.bot.relay(&to, &text).await;
                }
                None => log::warn!("Bad message format (\"{}\")", trimmed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let (to, text) = parse_line("ops@example.com;Disk full on web01\n").unwrap();
        assert_eq!(to.to_string(), "ops@example.com");
        assert_eq!(text, "Disk full on web01");
    }

    #[test]
    fn test_parse_line_keeps_later_separators() {
        let (_, text) = parse_line("ops@example.com;load: 1.0; 0.5; 0.2").unwrap();
        assert_eq!(text, "load: 1.0; 0.5; 0.2");
    }

    #[test]
    fn test_parse_line_bad_format() {
        assert!(parse_line("no separator here").is_none());
        assert!(parse_line(";orphan text").is_none());
    }
}
