//! Audible alerts
//!
//! Playback is best-effort: failures are logged and never reach the caller
//! of [`play_best_effort`].

use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("Failed to write bell: {0}")]
    Bell(#[from] std::io::Error),

    #[error("Failed to start sound command `{program}`: {reason}")]
    Command { program: String, reason: String },
}

/// Something that can make an alert noise
pub trait AlertSound: Send + Sync {
    fn name(&self) -> &str;

    /// Start playback without waiting for it to finish
    fn play(&self) -> Result<(), SoundError>;
}

pub type SoundPtr = Arc<dyn AlertSound>;

/// Play `sound`, swallowing any failure
pub fn play_best_effort(sound: &dyn AlertSound) -> bool {
    match sound.play() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(sound = sound.name(), error = %e, "Alert sound failed");
            false
        }
    }
}

/// Rings the terminal bell on stderr
pub struct TerminalBell;

impl AlertSound for TerminalBell {
    fn name(&self) -> &str {
        "bell"
    }

    fn play(&self) -> Result<(), SoundError> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Spawns an external player (e.g. `paplay /usr/share/sounds/alert.oga`)
pub struct CommandSound {
    program: String,
    args: Vec<String>,
}

impl CommandSound {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl AlertSound for CommandSound {
    fn name(&self) -> &str {
        "command"
    }

    fn play(&self) -> Result<(), SoundError> {
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(|_child| ())
            .map_err(|e| SoundError::Command {
                program: self.program.clone(),
                reason: e.to_string(),
            })
    }
}

/// No sound at all
pub struct Silent;

impl AlertSound for Silent {
    fn name(&self) -> &str {
        "none"
    }

    fn play(&self) -> Result<(), SoundError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts plays; optionally fails every time
    #[derive(Default)]
    pub struct CountingSound {
        pub plays: AtomicUsize,
        pub fail: bool,
    }

    impl CountingSound {
        pub fn count(&self) -> usize {
            self.plays.load(Ordering::SeqCst)
        }
    }

    impl AlertSound for CountingSound {
        fn name(&self) -> &str {
            "counting"
        }

        fn play(&self) -> Result<(), SoundError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SoundError::Command {
                    program: "missing".into(),
                    reason: "not found".into(),
                });
            }
            Ok(())
        }
    }
}
