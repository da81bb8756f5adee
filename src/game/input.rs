//! Character input record and the human input queue
//!
//! `CharacterInput` has one shape for both network and bot-synthesized input.
//! Human input arrives from connection threads through a bounded
//! crossbeam channel and is drained at the start of each tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::game::catalog::WeaponCategory;
use crate::game::state::PlayerId;
use crate::util::vec2::Vec2;

/// Per-tick control state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterInput {
    /// -1 left, 0 none, 1 right
    pub direction: i8,
    /// Aim target relative to the character
    pub target: Vec2,
    pub jump: bool,
    pub hook: bool,
    /// Fire button held
    pub fire: bool,
    /// Grenade throw button held
    pub grenade: bool,
    /// Reload request, honoured on the press edge even with ammo left
    pub reload: bool,
    /// Direct selection by category
    pub wanted_weapon: Option<WeaponCategory>,
    /// Wrapping press counters (only the low 7 bits are meaningful)
    pub next_weapon: u8,
    pub prev_weapon: u8,
}

impl CharacterInput {
    /// Unit aim direction, straight right when the target is degenerate
    pub fn aim_direction(&self) -> Vec2 {
        if self.target.is_zero(0.0001) {
            Vec2::new(1.0, 0.0)
        } else {
            self.target.normalize()
        }
    }

    /// Fire went from released to pressed between `prev` and `self`
    #[inline]
    pub fn fire_pressed(&self, prev: &CharacterInput) -> bool {
        self.fire && !prev.fire
    }

    #[inline]
    pub fn grenade_pressed(&self, prev: &CharacterInput) -> bool {
        self.grenade && !prev.grenade
    }

    #[inline]
    pub fn reload_pressed(&self, prev: &CharacterInput) -> bool {
        self.reload && !prev.reload
    }

    #[inline]
    pub fn jump_pressed(&self, prev: &CharacterInput) -> bool {
        self.jump && !prev.jump
    }
}

/// Input message from a player connection
#[derive(Debug, Clone)]
pub struct InputMessage {
    pub player_id: PlayerId,
    pub input: CharacterInput,
}

/// Bounded MPSC queue between connection handlers and the tick
pub struct InputQueue {
    sender: Sender<InputMessage>,
    receiver: Receiver<InputMessage>,
    capacity: usize,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Clonable handle for one connection
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Everything queued since the last tick, in arrival order
    pub fn drain(&self) -> Vec<InputMessage> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputMessage>,
}

impl InputSender {
    /// Non-blocking submit; `Full` means the tick is falling behind
    #[inline]
    pub fn try_send(&self, player_id: PlayerId, input: CharacterInput) -> Result<(), InputQueueError> {
        self.sender
            .try_send(InputMessage { player_id, input })
            .map_err(|e| match e {
                TrySendError::Full(_) => InputQueueError::Full,
                TrySendError::Disconnected(_) => InputQueueError::Disconnected,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputQueueError {
    #[error("input queue is full")]
    Full,
    #[error("simulation stopped")]
    Disconnected,
}
