use std::collections::VecDeque;

use retimer_common::settings::FrameGenerationMode;

/// Blend factors still to be presented between the two staged frames.
#[derive(Debug, Default)]
pub struct InterpolationSchedule {
    pending: VecDeque<f32>,
}

impl InterpolationSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is pending with a fresh schedule for `mode`.
    pub fn rebuild(&mut self, mode: FrameGenerationMode) {
        self.pending.clear();
        self.pending.extend(mode.blend_factors());
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pop(&mut self) -> Option<f32> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = f32> + '_ {
        self.pending.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_replaces_pending_entries() {
        let mut schedule = InterpolationSchedule::new();
        schedule.rebuild(FrameGenerationMode::X3);
        assert_eq!(schedule.len(), 2);
        schedule.rebuild(FrameGenerationMode::X2);
        assert_eq!(schedule.pending().collect::<Vec<_>>(), vec![0.5]);
    }

    #[test]
    fn x3_pops_in_ascending_order() {
        let mut schedule = InterpolationSchedule::new();
        schedule.rebuild(FrameGenerationMode::X3);
        let first = schedule.pop().unwrap();
        let second = schedule.pop().unwrap();
        assert!((first - 1.0 / 3.0).abs() < 1e-6);
        assert!((second - 2.0 / 3.0).abs() < 1e-6);
        assert!(schedule.pop().is_none());
    }

    #[test]
    fn every_factor_is_strictly_inside_unit_interval() {
        let mut schedule = InterpolationSchedule::new();
        for mode in [FrameGenerationMode::X2, FrameGenerationMode::X3] {
            schedule.rebuild(mode);
            assert_eq!(schedule.len() as u32, mode.multiplier() - 1);
            assert!(schedule.pending().all(|f| f > 0.0 && f < 1.0));
        }
        schedule.clear();
        assert!(schedule.is_empty());
    }
}
