//! Auto-tuning controller: decides whether a query class should use and
//! learn from the predictor, and when to freeze that decision permanently.
//!
//! Ported from `automatical_query_tuning` in `auto_tuning.c`. The original
//! mutates `query_context.{use_aqo,learn_aqo}` in place and writes the
//! decision straight into the `queries` table; this crate separates the
//! pure decision ([`decide`]) from the store write so it can be tested
//! without a [`crate::store::Store`]. The caller (the learning pipeline, see
//! [`crate::learn`]) is responsible for calling
//! [`crate::store::Store::update_preferences`] with the result.

use crate::config::AutoTuneConfig;
use crate::numeric::{is_in_infinite_loop, is_stable, mean};
use crate::store::tables::{Sample, StatEntry};

/// The auto-tuner's verdict for one query class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningDecision {
    /// Whether the predictor's estimate should be used going forward.
    pub use_predictor: bool,
    /// Whether new samples should still be recorded.
    pub learn: bool,
    /// Whether the auto-tuner should keep revisiting this class on future
    /// executions, or freeze the decision above permanently.
    pub auto_tune: bool,
}

fn windowed_mean(samples: &[Sample], window: usize, pick: impl Fn(&Sample) -> f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let start = samples.len().saturating_sub(window);
    let values: Vec<f64> = samples[start..].iter().map(pick).collect();
    mean(&values).unwrap_or(0.0)
}

/// Runs one round of auto-tuning over a class's accumulated statistics.
///
/// `sample_uniform` supplies a uniform `[0, 1)` draw for the exploration
/// step (`pg_prng_double` in the original); callers pass their own RNG so
/// this function stays deterministic under test.
#[must_use]
pub fn decide(
    stat: &StatEntry,
    cfg: &AutoTuneConfig,
    sample_uniform: impl FnOnce() -> f64,
) -> TuningDecision {
    let num_iterations = stat.execs_with + stat.execs_without;
    let learn;
    let use_predictor;
    let mut p_use = -1.0_f64;

    if stat.execs_without < cfg.window_size as i64 + 1 {
        // Collecting the baseline ("run without AQO window_size times")
        // before AQO is allowed to drive estimates at all.
        use_predictor = false;
        learn = true;
    } else {
        let errors: Vec<f64> = stat.with_predictor.iter().map(|s| s.est_error).collect();
        let converged = is_stable(&errors, cfg.window_size, cfg.convergence_error);
        let looping = is_in_infinite_loop(
            &errors,
            cfg.window_size,
            cfg.convergence_error,
            cfg.infinite_loop,
        );

        if !converged && !looping {
            // Cardinality quality hasn't settled yet (and isn't stuck):
            // keep using and learning until it does.
            use_predictor = true;
            learn = true;
        } else {
            // Converged by cardinality error. Switch to comparing
            // execution time, probabilistically: the volatile part of the
            // algorithm, preserved as-is from the original rather than
            // replaced with a deterministic threshold.
            let t_aqo = windowed_mean(&stat.with_predictor, cfg.window_size, |s| s.exec_time)
                + windowed_mean(&stat.with_predictor, cfg.window_size, |s| s.plan_time);
            let t_not_aqo = windowed_mean(&stat.without_predictor, cfg.window_size, |s| s.exec_time)
                + windowed_mean(&stat.without_predictor, cfg.window_size, |s| s.plan_time);

            let unstability = cfg.exploration;
            let raw = t_not_aqo / (t_not_aqo + t_aqo);

            // raw < 0.5 and raw -> 0 if AQO decreases performance,
            // raw > 0.5 and raw -> 1 otherwise. Run it through a logistic
            // transform centered and rescaled so p_use lands in [0, 1].
            let mut p = 1.0 / (1.0 + ((raw - 0.5) / unstability).exp());
            let floor = 1.0 / (1.0 + (-0.5 / unstability).exp());
            p -= floor;
            p /= 1.0 - 2.0 * floor;
            p_use = p;

            let roll = sample_uniform();
            use_predictor = roll < p_use;
            learn = use_predictor;
        }
    }

    if num_iterations <= cfg.max_iterations || p_use > 0.5 {
        TuningDecision {
            use_predictor,
            learn,
            auto_tune: true,
        }
    } else {
        // Past the exploration budget and execution time still favors not
        // using AQO: freeze the class off for good.
        TuningDecision {
            use_predictor: false,
            learn: false,
            auto_tune: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(exec_time: f64, plan_time: f64, est_error: f64) -> Sample {
        Sample {
            plan_time,
            exec_time,
            est_error,
        }
    }

    #[test]
    fn collects_baseline_before_using_predictor() {
        let mut stat = StatEntry::new();
        for _ in 0..5 {
            stat.push_without(sample(1.0, 0.1, 0.0));
        }
        let cfg = AutoTuneConfig {
            window_size: 20,
            ..AutoTuneConfig::default()
        };
        let decision = decide(&stat, &cfg, || 0.0);
        assert!(!decision.use_predictor);
        assert!(decision.learn);
        assert!(decision.auto_tune);
    }

    #[test]
    fn keeps_using_predictor_while_error_still_dropping() {
        let mut stat = StatEntry::new();
        for _ in 0..25 {
            stat.push_without(sample(1.0, 0.1, 0.0));
        }
        for i in 0..25 {
            stat.push_with(sample(1.0, 0.1, 10.0 / (i as f64 + 1.0)));
        }
        let cfg = AutoTuneConfig {
            window_size: 5,
            convergence_error: 0.001,
            ..AutoTuneConfig::default()
        };
        let decision = decide(&stat, &cfg, || 0.0);
        assert!(decision.use_predictor);
        assert!(decision.learn);
    }

    #[test]
    fn converged_and_faster_keeps_using_predictor_when_roll_is_low() {
        let mut stat = StatEntry::new();
        for _ in 0..30 {
            stat.push_without(sample(10.0, 1.0, 0.0));
        }
        for _ in 0..30 {
            stat.push_with(sample(1.0, 0.1, 1.0));
        }
        let cfg = AutoTuneConfig {
            window_size: 5,
            convergence_error: 0.5,
            exploration: 0.1,
            max_iterations: 1000,
            ..AutoTuneConfig::default()
        };
        let decision = decide(&stat, &cfg, || 0.0);
        assert!(decision.use_predictor);
        assert!(decision.auto_tune);
    }

    #[test]
    fn freezes_off_past_max_iterations_when_not_favored() {
        let mut stat = StatEntry::new();
        for _ in 0..30 {
            stat.push_without(sample(1.0, 0.1, 1.0));
        }
        for _ in 0..30 {
            stat.push_with(sample(10.0, 1.0, 1.0));
        }
        let cfg = AutoTuneConfig {
            window_size: 5,
            convergence_error: 0.5,
            exploration: 0.1,
            max_iterations: 1,
            ..AutoTuneConfig::default()
        };
        let decision = decide(&stat, &cfg, || 0.999);
        assert!(!decision.use_predictor);
        assert!(!decision.learn);
        assert!(!decision.auto_tune);
    }
}
