//! External commands and the inbox that carries them to the tick thread.
//!
//! Any thread may hold a [`CommandSender`]. The [`crate::animation::Animator`]
//! owns the matching [`CommandInbox`] and drains it at the start of every
//! tick, so controllers only ever see one writer per frame.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::animation::idle::IdleState;
use crate::animation::posture::Mode;
use crate::error::CommandError;

/// Commands buffered before senders see [`CommandError::Full`]
pub const INBOX_CAPACITY: usize = 1024;

fn full_intensity() -> f32 {
    1.0
}

/// A discriminated command, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Expression alias target; persistent targets hold until zeroed
    Expression {
        name: String,
        #[serde(default = "full_intensity")]
        value: f32,
        #[serde(default)]
        persistent: bool,
    },
    /// Single bone rotation in degrees
    BoneRot { bone: String, rotation: [f32; 3] },
    /// One-shot head look-at in degrees
    Lookat { rotation: [f32; 3] },
    /// Named pose from the character profile
    Pose { name: String },
    Gesture {
        name: String,
        #[serde(default)]
        duration: Option<f32>,
    },
    /// Idle gesture override; "none" clears it
    IdleGesture { name: String },
    Posture { label: String },
    Walk {
        direction: String,
        #[serde(default)]
        speed: f32,
    },
    Mode { mode: Mode },
    /// Emotion label: drives posture and the reaction of the same name
    Emotion { name: String },
    /// Idle activity state
    Activity { state: IdleState },
    /// Voice level and whether the driving engine is active
    Audio {
        level: f32,
        #[serde(default)]
        active: Option<bool>,
    },
}

impl Command {
    /// Decode one JSON command.
    pub fn from_json(s: &str) -> Result<Self, CommandError> {
        serde_json::from_str(s).map_err(|e| CommandError::Decode(e.to_string()))
    }

    /// Wire name of the command type
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Expression { .. } => "EXPRESSION",
            Command::BoneRot { .. } => "BONE_ROT",
            Command::Lookat { .. } => "LOOKAT",
            Command::Pose { .. } => "POSE",
            Command::Gesture { .. } => "GESTURE",
            Command::IdleGesture { .. } => "IDLE_GESTURE",
            Command::Posture { .. } => "POSTURE",
            Command::Walk { .. } => "WALK",
            Command::Mode { .. } => "MODE",
            Command::Emotion { .. } => "EMOTION",
            Command::Activity { .. } => "ACTIVITY",
            Command::Audio { .. } => "AUDIO",
        }
    }
}

/// Cloneable handle for submitting commands from any thread
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), CommandError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => CommandError::Full(self.tx.len()),
            TrySendError::Disconnected(_) => CommandError::Disconnected,
        })
    }

    /// Decode a JSON command and submit it.
    pub fn send_json(&self, line: &str) -> Result<(), CommandError> {
        self.send(Command::from_json(line)?)
    }
}

/// Receiving end, drained once per tick
#[derive(Debug)]
pub struct CommandInbox {
    rx: Receiver<Command>,
    tx: Sender<Command>,
}

impl CommandInbox {
    pub fn new() -> Self {
        let (tx, rx) = bounded(INBOX_CAPACITY);
        Self { rx, tx }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Take every command queued so far without blocking.
    pub fn drain(&self) -> Vec<Command> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop everything still queued.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

impl Default for CommandInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tagged_commands() {
        let cmd = Command::from_json(r#"{"type":"WALK","direction":"forward","speed":1.5}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Walk {
                direction: "forward".into(),
                speed: 1.5
            }
        );

        let cmd = Command::from_json(r#"{"type":"EXPRESSION","name":"joy"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Expression {
                name: "joy".into(),
                value: 1.0,
                persistent: false
            }
        );

        let cmd = Command::from_json(r#"{"type":"BONE_ROT","bone":"head","rotation":[0,10,0]}"#)
            .unwrap();
        assert_eq!(cmd.kind(), "BONE_ROT");

        let cmd = Command::from_json(r#"{"type":"MODE","mode":"passive"}"#).unwrap();
        assert_eq!(cmd, Command::Mode { mode: Mode::Passive });

        let cmd = Command::from_json(r#"{"type":"ACTIVITY","state":"talking"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Activity {
                state: IdleState::Talking
            }
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Command::from_json(r#"{"type":"DANCE"}"#),
            Err(CommandError::Decode(_))
        ));
        assert!(matches!(Command::from_json("not json"), Err(CommandError::Decode(_))));
    }

    #[test]
    fn test_inbox_drains_in_order() {
        let inbox = CommandInbox::new();
        let tx = inbox.sender();
        tx.send(Command::Pose { name: "a".into() }).unwrap();
        tx.send_json(r#"{"type":"POSE","name":"b"}"#).unwrap();

        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1], Command::Pose { name: "b".into() });
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_sender_from_other_thread() {
        let inbox = CommandInbox::new();
        let tx = inbox.sender();
        std::thread::spawn(move || {
            tx.send(Command::Emotion { name: "joy".into() }).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.clear(), 1);
    }

    #[test]
    fn test_full_inbox_reports() {
        let inbox = CommandInbox::new();
        let tx = inbox.sender();
        for _ in 0..INBOX_CAPACITY {
            tx.send(Command::Posture { label: "joy".into() }).unwrap();
        }
        assert!(matches!(
            tx.send(Command::Posture { label: "joy".into() }),
            Err(CommandError::Full(_))
        ));
    }
}
