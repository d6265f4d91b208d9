/// Alternate-frame gate for the recognition path.
///
/// Starts enabled, flips every cycle. Skipped cycles still redraw the last
/// detections and still poll the door timer; only recognition is gated.
#[derive(Debug)]
pub struct FrameSampler {
    process_next: bool,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self { process_next: true }
    }
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this cycle runs recognition. Advances the sampler.
    pub fn next_cycle(&mut self) -> bool {
        let run = self.process_next;
        self.process_next = !self.process_next;
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cycle_runs_recognition() {
        assert!(FrameSampler::new().next_cycle());
    }

    #[test]
    fn test_alternates() {
        let mut sampler = FrameSampler::new();
        let pattern: Vec<bool> = (0..6).map(|_| sampler.next_cycle()).collect();
        assert_eq!(pattern, vec![true, false, true, false, true, false]);
    }

    #[test]
    fn test_runs_half_of_cycles() {
        for n in 0..20usize {
            let mut sampler = FrameSampler::new();
            let ran = (0..n).filter(|_| sampler.next_cycle()).count();
            assert_eq!(ran, n.div_ceil(2), "n = {n}");
        }
    }
}
