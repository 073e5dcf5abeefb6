use election_core::NodeId;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Options to configure simulated network behavior for `MockTransport`.
#[derive(Clone, Debug)]
pub struct NetworkOptions {
    /// Probability (0.0 to 1.0) of dropping a message.
    pub message_loss_probability: f64,
    /// Minimum delay to add to message delivery.
    pub min_delay: Duration,
    /// Maximum delay to add to message delivery (delay will be uniform random between min and max).
    pub max_delay: Duration,
    /// Set of pairs (A, B) indicating that node A cannot send messages to node B.
    /// Note: This simulates one-way partitions. For a full partition, add both (A, B) and (B, A).
    pub partitioned_links: HashSet<(NodeId, NodeId)>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            message_loss_probability: 0.0,
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            partitioned_links: HashSet::new(),
        }
    }
}

impl NetworkOptions {
    /// Lossy network with no delay.
    pub fn lossy(probability: f64) -> Self {
        Self {
            message_loss_probability: probability,
            ..Default::default()
        }
    }

    /// Checks if a message should be dropped due to loss probability.
    pub fn should_drop_message(&self) -> bool {
        self.message_loss_probability > 0.0 && rand::random::<f64>() < self.message_loss_probability
    }

    /// Checks if the link from `sender` to `receiver` is partitioned.
    pub fn is_partitioned(&self, sender: NodeId, receiver: NodeId) -> bool {
        self.partitioned_links.contains(&(sender, receiver))
    }

    /// Draws the delivery delay for one message, if any is configured.
    pub fn sample_delay(&self) -> Option<Duration> {
        let delay = if self.min_delay == Duration::ZERO && self.max_delay == Duration::ZERO {
            return None;
        } else if self.min_delay >= self.max_delay {
            if self.min_delay > self.max_delay {
                tracing::warn!(min = ?self.min_delay, max = ?self.max_delay, "min_delay > max_delay, using min_delay");
            }
            self.min_delay
        } else {
            rand::rng().random_range(self.min_delay..=self.max_delay)
        };
        (delay > Duration::ZERO).then_some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_perfect() {
        let options = NetworkOptions::default();
        assert!(!options.should_drop_message());
        assert!(!options.is_partitioned(1, 2));
        assert_eq!(options.sample_delay(), None);
    }

    #[test]
    fn total_loss_drops_everything() {
        let options = NetworkOptions::lossy(1.0);
        assert!((0..100).all(|_| options.should_drop_message()));
    }

    #[test]
    fn delay_within_bounds() {
        let options = NetworkOptions {
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            ..Default::default()
        };
        for _ in 0..100 {
            let d = options.sample_delay().unwrap();
            assert!(d >= Duration::from_millis(5) && d <= Duration::from_millis(10));
        }
    }

    #[test]
    fn partitions_are_one_way() {
        let mut options = NetworkOptions::default();
        options.partitioned_links.insert((1, 2));
        assert!(options.is_partitioned(1, 2));
        assert!(!options.is_partitioned(2, 1));
    }
}
