//! Anger, attachment and the aggro latch

use crate::game::constants::ai::{
    ANGER_DECAY, ANGER_WEIGHT, ATTACHMENT_DECAY, ATTACHMENT_GAIN, ATTACHMENT_WEIGHT,
};
use crate::game::constants::players::MAX_PLAYERS;
use crate::game::state::PlayerId;

#[derive(Debug, Clone)]
pub struct Emotions {
    anger: Vec<f32>,
    attachment: Vec<f32>,
    total_anger: f32,
    triggered: bool,
    trigger_level: i32,
}

impl Emotions {
    pub fn new(trigger_level: i32) -> Self {
        Self {
            anger: vec![0.0; MAX_PLAYERS],
            attachment: vec![0.0; MAX_PLAYERS],
            total_anger: 0.0,
            triggered: false,
            trigger_level,
        }
    }

    /// Clear everything, including the latch
    pub fn reset(&mut self, trigger_level: i32) {
        *self = Self::new(trigger_level);
    }

    #[inline]
    pub fn triggered(&self) -> bool {
        self.triggered
    }

    #[inline]
    pub fn latch(&mut self) {
        self.triggered = true;
    }

    #[inline]
    pub fn trigger_level(&self) -> i32 {
        self.trigger_level
    }

    pub fn set_trigger_level(&mut self, level: i32) {
        self.trigger_level = level;
    }

    #[inline]
    pub fn total_anger(&self) -> f32 {
        self.total_anger
    }

    pub fn anger(&self, player: PlayerId) -> f32 {
        self.anger.get(player).copied().unwrap_or(0.0)
    }

    pub fn attachment(&self, player: PlayerId) -> f32 {
        self.attachment.get(player).copied().unwrap_or(0.0)
    }

    /// Record a hit. Latches once the aggregate reaches the trigger level.
    pub fn add_anger(&mut self, attacker: Option<PlayerId>, amount: i32) {
        let amount = amount.max(0) as f32;
        if let Some(a) = attacker.and_then(|p| self.anger.get_mut(p)) {
            *a += amount;
        }
        self.total_anger += amount;
        if self.total_anger >= self.trigger_level as f32 {
            self.triggered = true;
        }
    }

    /// Opponent in view: attachment grows slowly toward 1
    pub fn notice(&mut self, player: PlayerId) {
        if let Some(a) = self.attachment.get_mut(player) {
            *a += (1.0 - *a) * ATTACHMENT_GAIN;
        }
    }

    /// Multiplicative per-tick decay
    pub fn decay(&mut self) {
        for a in &mut self.anger {
            *a *= ANGER_DECAY;
        }
        for a in &mut self.attachment {
            *a *= ATTACHMENT_DECAY;
        }
        self.total_anger *= ANGER_DECAY;
    }

    /// Target preference bonus; subtracted from distance when choosing targets
    pub fn preference(&self, player: PlayerId) -> f32 {
        self.anger(player) * ANGER_WEIGHT + self.attachment(player) * ATTACHMENT_WEIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_big_hit_latches() {
        let mut e = Emotions::new(5);
        e.add_anger(Some(3), 6);
        assert!(e.triggered());
        for _ in 0..1000 {
            e.decay();
        }
        assert!(e.triggered(), "latch survives decay");
        assert!(e.total_anger() < 1.0);
    }

    #[test]
    fn test_small_hits_accumulate() {
        let mut e = Emotions::new(10);
        e.add_anger(Some(1), 4);
        assert!(!e.triggered());
        e.add_anger(Some(1), 4);
        assert!(!e.triggered());
        e.add_anger(None, 4);
        assert!(e.triggered());
        assert_eq!(e.anger(1), 8.0);
    }

    #[test]
    fn test_anger_decays_monotonically() {
        let mut e = Emotions::new(100);
        e.add_anger(Some(2), 50);
        let mut last = e.total_anger();
        for _ in 0..50 {
            e.decay();
            assert!(e.total_anger() < last);
            last = e.total_anger();
        }
    }

    #[test]
    fn test_attachment_bounded() {
        let mut e = Emotions::new(5);
        for _ in 0..500 {
            e.notice(4);
        }
        assert!(e.attachment(4) <= 1.0);
        assert!(e.preference(4) > e.preference(5));
    }

    #[test]
    fn test_out_of_range_player_ignored() {
        let mut e = Emotions::new(5);
        e.add_anger(Some(MAX_PLAYERS + 10), 2);
        e.notice(MAX_PLAYERS + 10);
        assert_eq!(e.total_anger(), 2.0);
        assert_eq!(e.anger(MAX_PLAYERS + 10), 0.0);
    }

    #[test]
    fn test_reset_clears_latch() {
        let mut e = Emotions::new(1);
        e.add_anger(Some(0), 3);
        e.reset(7);
        assert!(!e.triggered());
        assert_eq!(e.trigger_level(), 7);
    }
}
