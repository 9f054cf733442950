//! Narration playback through an external command-line player.

use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use readwise_client::{AudioPlayer, AudioSource};
use readwise_core::{Error, Result};

/// Plays each track by spawning `program [args...] <url>`.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parse a command line such as `"mpv --no-video"`.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::InvalidInput("Empty player command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl AudioPlayer for CommandPlayer {
    type Handle = Child;

    fn attach(&mut self, source: &AudioSource) -> Result<Child> {
        debug!(program = %self.program, chapter = %source.chapter, "Starting player");
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&source.url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(child)
    }

    fn release(&mut self, mut handle: Child) {
        match handle.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = handle.kill() {
                    warn!(error = %e, "Failed to stop player");
                }
                let _ = handle.wait();
            }
        }
    }

    fn has_ended(&mut self, handle: &mut Child) -> bool {
        !matches!(handle.try_wait(), Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readwise_core::Lang;

    fn source() -> AudioSource {
        AudioSource {
            book_id: "b".to_string(),
            lang: Lang::En,
            chapter: "01.md".to_string(),
            url: "http://localhost/mp3".to_string(),
        }
    }

    #[test]
    fn test_parse_command_line() {
        let player = CommandPlayer::from_command_line("mpv --no-video  --really-quiet").unwrap();
        assert_eq!(player.program(), "mpv");
        assert_eq!(player.args(), ["--no-video", "--really-quiet"]);

        assert!(CommandPlayer::from_command_line("   ").is_err());
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let mut player = CommandPlayer::new("readwise-no-such-player");
        assert!(matches!(player.attach(&source()), Err(Error::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_finished_process_has_ended() {
        let mut player = CommandPlayer::new("true");
        let mut child = player.attach(&source()).unwrap();
        let _ = child.wait();
        assert!(player.has_ended(&mut child));
        player.release(child);
    }

    #[cfg(unix)]
    #[test]
    fn test_release_kills_running_player() {
        // the URL lands in $0 and is ignored
        let mut player = CommandPlayer {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
        };
        let mut child = player.attach(&source()).unwrap();
        assert!(!player.has_ended(&mut child));
        player.release(child);
    }
}
