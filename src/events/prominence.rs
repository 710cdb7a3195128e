// Prominence scoring and the event context buffer
// Finalized syllables wait in a fixed ring until enough trailing context
// exists, then receive a context-relative prominence score on the way out.

use crate::events::types::SyllableEvent;

/// Capacity of the context ring (power of two, indices are masked)
pub const EVENT_BUFFER_SIZE: usize = 16;
const INDEX_MASK: usize = EVENT_BUFFER_SIZE - 1;

/// Epsilon for the context-ratio denominators
const RATIO_EPS: f32 = 1e-4;

/// Upper clamp on the stress-integral ratio
const STRESS_CLAMP: f32 = 3.0;

/// Prominence when an event has no scored context at all
const NO_CONTEXT_SCORE: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
struct BufferedEvent {
    event: SyllableEvent,
    /// Semitone offset of the event's f0 against the slow baseline,
    /// captured at finalization
    semitone_offset: f32,
    ready: bool,
}

impl BufferedEvent {
    fn vacant() -> Self {
        BufferedEvent {
            event: SyllableEvent::empty(),
            semitone_offset: 0.0,
            ready: false,
        }
    }
}

/// Fixed-capacity FIFO of finalized events awaiting context
///
/// Overflow silently overwrites the oldest pending event and advances the
/// read index; the drop is tallied so callers can observe it.
#[derive(Debug, Clone)]
pub struct EventRing {
    slots: [BufferedEvent; EVENT_BUFFER_SIZE],
    write_idx: usize,
    read_idx: usize,
    count: usize,
    dropped: u64,
}

impl EventRing {
    pub fn new() -> Self {
        EventRing {
            slots: [BufferedEvent::vacant(); EVENT_BUFFER_SIZE],
            write_idx: 0,
            read_idx: 0,
            count: 0,
            dropped: 0,
        }
    }

    /// Number of events waiting in the ring
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total events lost to overflow since construction or reset
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Admit a finalized event
    pub fn push(&mut self, event: SyllableEvent, semitone_offset: f32) {
        if self.count == EVENT_BUFFER_SIZE {
            // Full: the slot at read_idx (the oldest pending event) is
            // about to be overwritten; advance past it
            self.read_idx = (self.read_idx + 1) & INDEX_MASK;
            self.count -= 1;
            self.dropped += 1;
        }

        self.slots[self.write_idx] = BufferedEvent {
            event,
            semitone_offset,
            ready: true,
        };
        self.write_idx = (self.write_idx + 1) & INDEX_MASK;
        self.count += 1;
    }

    /// Score and remove the oldest pending event
    ///
    /// The prominence composite compares the target against the mean of
    /// its ready neighbors up to `context_size` slots on each side.
    /// Emitted slots stay ready: the ring is chronological, so the slots
    /// behind the target always hold the syllables that preceded it, and
    /// they keep serving as backward context until overwritten.
    pub fn pop_scored(&mut self, context_size: usize, accent_threshold: f32) -> Option<SyllableEvent> {
        if self.count == 0 {
            return None;
        }

        let idx = self.read_idx;
        let (prominence, delta_f0) = self.score_at(idx, context_size);

        let mut event = self.slots[idx].event;
        event.prominence_score = prominence;
        event.delta_f0 = delta_f0;
        event.is_accented = prominence > accent_threshold;

        self.read_idx = (idx + 1) & INDEX_MASK;
        self.count -= 1;

        Some(event)
    }

    fn score_at(&self, idx: usize, context_size: usize) -> (f32, f32) {
        let target = &self.slots[idx];

        let mut mean_energy = 0.0f32;
        let mut mean_peak_rate = 0.0f32;
        let mut mean_duration = 0.0f32;
        let mut mean_slope = 0.0f32;
        let mut mean_fusion = 0.0f32;
        let mut mean_stress = 0.0f32;
        let mut f0s = [0.0f32; 2 * EVENT_BUFFER_SIZE];
        let mut count = 0usize;

        for i in 1..=context_size {
            for neighbor_idx in [
                (idx + EVENT_BUFFER_SIZE - i) & INDEX_MASK,
                (idx + i) & INDEX_MASK,
            ] {
                let slot = &self.slots[neighbor_idx];
                if !slot.ready {
                    continue;
                }
                mean_energy += slot.event.energy;
                mean_peak_rate += slot.event.peak_rate;
                mean_duration += slot.event.duration_s;
                mean_slope += slot.event.rise_slope;
                mean_fusion += slot.event.fusion_score;
                mean_stress += slot.event.fusion_score * slot.event.duration_s;
                f0s[count] = slot.event.f0;
                count += 1;
            }
        }

        if count == 0 {
            return (NO_CONTEXT_SCORE, 0.0);
        }

        let n = count as f32;
        mean_energy /= n;
        mean_peak_rate /= n;
        mean_duration /= n;
        mean_slope /= n;
        mean_fusion /= n;
        mean_stress /= n;

        let s_energy = target.event.energy / (mean_energy + RATIO_EPS);
        let s_peak_rate = target.event.peak_rate / (mean_peak_rate + RATIO_EPS);
        let s_duration = target.event.duration_s / (mean_duration + RATIO_EPS);
        let s_slope = target.event.rise_slope / (mean_slope + RATIO_EPS);
        let s_fusion = target.event.fusion_score / (mean_fusion + RATIO_EPS);

        let stress = (target.event.fusion_score * target.event.duration_s
            / (mean_stress + RATIO_EPS))
            .min(STRESS_CLAMP);

        let delta_f0 = target.event.f0 - median(&mut f0s[..count]);
        let f0_bonus = (delta_f0 / 50.0).clamp(-1.0, 1.0);
        let f0_level_bonus = 0.15 * (target.semitone_offset / 12.0).clamp(0.0, 1.0);

        let prominence = 0.10 * s_energy
            + 0.10 * s_peak_rate
            + 0.18 * s_duration
            + 0.08 * s_slope
            + 0.18 * s_fusion
            + 0.13 * stress
            + 0.10 * (1.0 + f0_bonus)
            + 0.13 * (1.0 + f0_level_bonus);

        (prominence, delta_f0)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.ready = false;
        }
        self.write_idx = 0;
        self.read_idx = 0;
        self.count = 0;
        self.dropped = 0;
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new()
    }
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::OnsetType;

    fn uniform_event(timestamp: u64) -> SyllableEvent {
        let mut event = SyllableEvent::empty();
        event.timestamp_samples = timestamp;
        event.time_seconds = timestamp as f64 / 16_000.0;
        event.energy = 2.0;
        event.peak_rate = 0.01;
        event.duration_s = 0.1;
        event.rise_slope = 0.5;
        event.fusion_score = 0.6;
        event.f0 = 150.0;
        event.onset_type = OnsetType::Voiced;
        event
    }

    #[test]
    fn test_fifo_order() {
        let mut ring = EventRing::new();
        for i in 0..5 {
            ring.push(uniform_event(i * 1000), 0.0);
        }
        for i in 0..5 {
            let event = ring.pop_scored(2, 1.2).unwrap();
            assert_eq!(event.timestamp_samples, i * 1000);
        }
        assert!(ring.pop_scored(2, 1.2).is_none());
    }

    #[test]
    fn test_overflow_drops_oldest_and_counts() {
        let mut ring = EventRing::new();
        for i in 0..(EVENT_BUFFER_SIZE as u64 + 3) {
            ring.push(uniform_event(i * 1000), 0.0);
        }
        assert_eq!(ring.len(), EVENT_BUFFER_SIZE);
        assert_eq!(ring.dropped(), 3);

        // Oldest surviving event is number 3
        let event = ring.pop_scored(2, 1.2).unwrap();
        assert_eq!(event.timestamp_samples, 3000);
    }

    #[test]
    fn test_uniform_context_scores_near_one() {
        let mut ring = EventRing::new();
        for i in 0..4 {
            ring.push(uniform_event(i * 1000), 0.0);
        }
        let event = ring.pop_scored(2, 1.2).unwrap();
        assert!((event.prominence_score - 1.0).abs() < 0.05);
        assert!(!event.is_accented);
        assert!(event.delta_f0.abs() < 1e-3);
    }

    #[test]
    fn test_no_context_default_score() {
        let mut ring = EventRing::new();
        ring.push(uniform_event(0), 0.0);
        let event = ring.pop_scored(2, 1.2).unwrap();
        assert_eq!(event.prominence_score, NO_CONTEXT_SCORE);
        assert!(!event.is_accented);
    }

    #[test]
    fn test_prominent_event_outscores_neighbors() {
        let mut ring = EventRing::new();

        let mut strong = uniform_event(0);
        strong.energy *= 3.0;
        strong.peak_rate *= 3.0;
        strong.duration_s *= 2.0;
        strong.fusion_score = 0.9;
        strong.f0 = 220.0;
        ring.push(strong, 4.0);

        for i in 1..4 {
            ring.push(uniform_event(i * 1000), 0.0);
        }

        let scored = ring.pop_scored(2, 1.2).unwrap();
        assert!(scored.prominence_score > 1.2);
        assert!(scored.is_accented);
        assert!(scored.delta_f0 > 0.0);
    }

    #[test]
    fn test_clear_resets_drop_counter() {
        let mut ring = EventRing::new();
        for i in 0..(EVENT_BUFFER_SIZE as u64 + 1) {
            ring.push(uniform_event(i), 0.0);
        }
        assert_eq!(ring.dropped(), 1);
        ring.clear();
        assert_eq!(ring.dropped(), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_median_odd_and_even() {
        let mut odd = [3.0, 1.0, 2.0];
        assert_eq!(median(&mut odd), 2.0);
        let mut even = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut even), 2.5);
    }
}
