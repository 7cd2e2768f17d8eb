/// NTP-style clock offset/latency estimation from a `ClockSyncAck` exchange:
/// `delta = timestamp_ack - (timestamp_sent + timestamp_final) / 2`,
/// `latency = (timestamp_final - timestamp_sent) / 2`, each fed into a
/// sliding-window average. Non-finite samples are rejected rather than
/// allowed to poison the running average.
use midinet_protocol::RunningMean;

pub struct ClockEstimators {
    delta_est: RunningMean,
    latency_est: RunningMean,
}

impl Default for ClockEstimators {
    fn default() -> Self {
        Self {
            delta_est: RunningMean::default(),
            latency_est: RunningMean::default(),
        }
    }
}

impl ClockEstimators {
    /// Feed one `ClockSyncAck` observation. `t_final` is this host's local
    /// time at the moment the ack was received. Returns the updated
    /// `(delta, latency)` averages, or `None` if the computed sample was
    /// non-finite and was dropped without perturbing the estimators.
    pub fn observe_ack(&mut self, timestamp_sent: f64, timestamp_ack: f64, t_final: f64) -> Option<(f64, f64)> {
        let delta_sample = timestamp_ack - (timestamp_sent + t_final) / 2.0;
        let latency_sample = (t_final - timestamp_sent) / 2.0;
        if !delta_sample.is_finite() || !latency_sample.is_finite() {
            return None;
        }
        self.delta_est.feed(delta_sample);
        self.latency_est.feed(latency_sample);
        Some((self.delta_est.average(), self.latency_est.average()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_matches_the_closed_form() {
        let mut est = ClockEstimators::default();
        // Ts = 100, peer acks at Tp = 100.6 (peer is 0.5s ahead, ~0.1s one-way),
        // Tf = 100.2 locally.
        let (delta, latency) = est.observe_ack(100.0, 100.6, 100.2).unwrap();
        assert!((delta - (100.6 - (100.0 + 100.2) / 2.0)).abs() < 1e-12);
        assert!((latency - (100.2 - 100.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn converges_toward_a_simulated_half_second_skew() {
        let mut est = ClockEstimators::default();
        let mut last = (0.0, 0.0);
        for i in 0..60 {
            let ts = i as f64 * 0.2;
            let one_way = 0.01;
            let t_final = ts + 2.0 * one_way;
            let timestamp_ack = ts + 0.5 + one_way;
            last = est.observe_ack(ts, timestamp_ack, t_final).unwrap();
        }
        let (delta, _latency) = last;
        assert!((delta - 0.5).abs() < 0.01);
    }

    #[test]
    fn non_finite_sample_is_rejected_without_perturbing_state() {
        let mut est = ClockEstimators::default();
        est.observe_ack(0.0, 1.0, 2.0).unwrap();
        let before = est.delta_est.average();
        let rejected = est.observe_ack(f64::NAN, 1.0, 2.0);
        assert!(rejected.is_none());
        assert_eq!(est.delta_est.average(), before);
    }
}
